// Shutdown signal for background tasks (maintenance loop, RPC server)

use tokio::sync::watch;

/// Receiving side; clone one per task
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is signalled (or the sender is gone)
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
