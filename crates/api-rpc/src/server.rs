//! JSON-RPC Server
//!
//! Serves the engine over JSON-RPC 2.0 on TCP. Binds to localhost unless
//! configured otherwise; identity is trusted as supplied in each request.

use crate::handler::RpcHandler;
use crate::types::{
    CallNextParams, CancelParams, CapacityParams, CreateQueueParams, ExpireParams, JoinParams,
    ListQueuesParams, MaintenanceParams, PatientTicketsParams, QueueParams, StatsParams,
    TicketParams,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9640;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// Register `method`, parsing its params as `P` and handing them to `call`
fn register<P, R, F, Fut>(
    module: &mut RpcModule<()>,
    method: &'static str,
    handler: &Arc<RpcHandler>,
    call: F,
) -> Result<(), String>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Clone + Send + 'static,
    F: Fn(Arc<RpcHandler>, P) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ErrorObjectOwned>> + Send + 'static,
{
    let handler = handler.clone();
    module
        .register_async_method(method, move |params, _, _| {
            let handler = handler.clone();
            let call = call.clone();
            async move {
                let req: P = params.parse()?;
                call(handler, req).await
            }
        })
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Every method of the API, bound to `handler`
pub fn build_module(handler: Arc<RpcHandler>) -> Result<RpcModule<()>, String> {
    let mut module = RpcModule::new(());
    let m = &mut module;

    // Queues
    register(m, "queue.create.v1", &handler, |h, p: CreateQueueParams| async move {
        h.create_queue(p).await
    })?;
    register(m, "queue.pause.v1", &handler, |h, p: QueueParams| async move {
        h.pause_queue(p).await
    })?;
    register(m, "queue.resume.v1", &handler, |h, p: QueueParams| async move {
        h.resume_queue(p).await
    })?;
    register(m, "queue.close.v1", &handler, |h, p: QueueParams| async move {
        h.close_queue(p).await
    })?;
    register(m, "queue.capacity.v1", &handler, |h, p: CapacityParams| async move {
        h.set_capacity(p).await
    })?;
    register(m, "queue.get.v1", &handler, |h, p: QueueParams| async move {
        h.get_queue(p).await
    })?;
    register(m, "queue.list.v1", &handler, |h, p: ListQueuesParams| async move {
        h.list_queues(p).await
    })?;
    register(m, "queue.call_next.v1", &handler, |h, p: CallNextParams| async move {
        h.call_next(p).await
    })?;
    register(m, "queue.expire.v1", &handler, |h, p: ExpireParams| async move {
        h.expire(p).await
    })?;

    // Tickets
    register(m, "ticket.join.v1", &handler, |h, p: JoinParams| async move {
        h.join(p).await
    })?;
    register(m, "ticket.cancel.v1", &handler, |h, p: CancelParams| async move {
        h.cancel(p).await
    })?;
    register(m, "ticket.complete.v1", &handler, |h, p: TicketParams| async move {
        h.complete(p).await
    })?;
    register(m, "ticket.get.v1", &handler, |h, p: TicketParams| async move {
        h.ticket(p).await
    })?;
    register(m, "ticket.list.v1", &handler, |h, p: QueueParams| async move {
        h.queue_board(p).await
    })?;
    register(m, "ticket.mine.v1", &handler, |h, p: PatientTicketsParams| async move {
        h.patient_tickets(p).await
    })?;

    // Admin APIs
    register(m, "admin.stats.v1", &handler, |h, p: StatsParams| async move {
        h.stats(p).await
    })?;
    register(m, "admin.maintenance.v1", &handler, |h, p: MaintenanceParams| async move {
        h.maintenance(p).await
    })?;

    Ok(module)
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: Arc<RpcHandler>) -> Self {
        Self { config, handler }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the handle together with the bound address (port 0 picks a
    /// free port).
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server on TCP"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = build_module(self.handler)?;
        let methods = module.method_names().count();

        info!(addr = %local_addr, methods = methods, "JSON-RPC server started successfully");

        Ok((server.start(module), local_addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_localhost() {
        let config = RpcServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_RPC_PORT);
    }
}
