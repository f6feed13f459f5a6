//! VisitQ CLI - Command-line client for the VisitQ daemon
//!
//! Staff and patients drive queues over JSON-RPC. The caller identity is
//! passed with `--role`/`--as` (or `VISITQ_ROLE`/`VISITQ_ACTOR`).

mod render;
mod rpc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use render::{format_eta, format_position, status_colored, Queue, QueueBoard, Ticket, TicketView};
use rpc::RpcClient;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9640";

#[derive(Parser)]
#[command(name = "visitq-cli")]
#[command(about = "VisitQ queue client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, global = true, env = "VISITQ_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Role of the caller
    #[arg(long, global = true, env = "VISITQ_ROLE", value_enum, default_value_t = Role::Patient)]
    role: Role,

    /// Id of the caller (patient, doctor, clinic or admin id)
    #[arg(long = "as", global = true, env = "VISITQ_ACTOR", default_value = "")]
    actor_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Patient,
    Doctor,
    Clinic,
    Admin,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Clinic => "clinic",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OwnerKind {
    Doctor,
    Clinic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExpectedStatus {
    Waiting,
    Serving,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue operations (staff)
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Join a queue
    Join {
        queue_id: String,

        /// Where notifications go (phone, email)
        #[arg(short, long)]
        contact: String,

        /// Patient to join for (admins only)
        #[arg(long)]
        patient: Option<String>,
    },

    /// Cancel a ticket
    Cancel {
        ticket_id: i64,

        /// Fail if the ticket is no longer in this status
        #[arg(long, value_enum)]
        expect: Option<ExpectedStatus>,
    },

    /// Complete the ticket being served
    Complete { ticket_id: i64 },

    /// Show a ticket with its position and ETA
    Ticket { ticket_id: i64 },

    /// List a patient's tickets
    Mine {
        /// Patient to list (admins only)
        #[arg(long)]
        patient: Option<String>,
    },

    /// Show system status
    Status,

    /// Run maintenance operations
    Maintenance {
        /// Force VACUUM even if not needed
        #[arg(long)]
        force_vacuum: bool,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Open a new queue
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(long, value_enum)]
        owner_kind: OwnerKind,

        #[arg(long)]
        owner_id: String,

        /// Maximum active tickets (0 = unbounded)
        #[arg(short, long, default_value = "0")]
        max: u32,
    },

    /// Stop calling patients (joins rejected)
    Pause { queue_id: String },

    /// Reopen a paused queue
    Resume { queue_id: String },

    /// Close a queue for good
    Close { queue_id: String },

    /// Change the capacity
    Capacity { queue_id: String, max: u32 },

    /// Show one queue
    Show { queue_id: String },

    /// List queues
    List {
        #[arg(long, value_enum, requires = "owner_id")]
        owner_kind: Option<OwnerKind>,

        #[arg(long)]
        owner_id: Option<String>,
    },

    /// Active tickets in call order
    Board { queue_id: String },

    /// Call the next patient
    Next {
        queue_id: String,

        /// Complete the patient being served first
        #[arg(long)]
        complete: bool,
    },

    /// Cancel waiting tickets older than the given age
    Expire {
        queue_id: String,

        #[arg(long)]
        older_than_mins: i64,
    },
}

#[derive(Deserialize)]
struct CallNextResult {
    completed: Option<Ticket>,
    called: Option<Ticket>,
}

#[derive(Deserialize)]
struct ExpireResult {
    expired: Vec<Ticket>,
}

fn owner_json(kind: OwnerKind, id: &str) -> Value {
    let kind = match kind {
        OwnerKind::Doctor => "DOCTOR",
        OwnerKind::Clinic => "CLINIC",
    };
    json!({ "kind": kind, "id": id })
}

fn print_queue(title: &str, queue: &Queue) {
    println!(
        "{} {} ({}) is {}",
        "✓".green().bold(),
        title,
        queue.id,
        status_colored(&queue.status)
    );
}

fn print_ticket_view(view: &TicketView) {
    println!("  {} {}", "Ticket:".bold(), view.ticket.id);
    println!("  {} {}", "Queue:".bold(), view.ticket.queue_id);
    println!("  {} {}", "Status:".bold(), status_colored(&view.ticket.status));
    println!("  {} {}", "Position:".bold(), format_position(&view.position));
    println!("  {} {}", "ETA:".bold(), format_eta(view.eta_ms));
}

async fn run_queue(client: &RpcClient, actor: Value, command: QueueCommand) -> Result<()> {
    match command {
        QueueCommand::Create {
            name,
            owner_kind,
            owner_id,
            max,
        } => {
            let params = json!({
                "actor": actor,
                "name": name,
                "owner": owner_json(owner_kind, &owner_id),
                "max_number": max,
            });
            let queue: Queue = client.call("queue.create.v1", params).await?;
            print_queue("Queue created", &queue);
            println!();
            println!("{}", render::queue_table(&[queue]));
        }

        QueueCommand::Pause { queue_id } => {
            let params = json!({ "actor": actor, "queue_id": queue_id });
            let queue: Queue = client.call("queue.pause.v1", params).await?;
            print_queue("Queue", &queue);
        }

        QueueCommand::Resume { queue_id } => {
            let params = json!({ "actor": actor, "queue_id": queue_id });
            let queue: Queue = client.call("queue.resume.v1", params).await?;
            print_queue("Queue", &queue);
        }

        QueueCommand::Close { queue_id } => {
            let params = json!({ "actor": actor, "queue_id": queue_id });
            let queue: Queue = client.call("queue.close.v1", params).await?;
            print_queue("Queue", &queue);
        }

        QueueCommand::Capacity { queue_id, max } => {
            let params = json!({ "actor": actor, "queue_id": queue_id, "max_number": max });
            let queue: Queue = client.call("queue.capacity.v1", params).await?;
            println!("{}", render::queue_table(&[queue]));
        }

        QueueCommand::Show { queue_id } => {
            let params = json!({ "actor": actor, "queue_id": queue_id });
            let queue: Queue = client.call("queue.get.v1", params).await?;
            println!("{}", render::queue_table(&[queue]));
        }

        QueueCommand::List {
            owner_kind,
            owner_id,
        } => {
            let owner = match (owner_kind, owner_id) {
                (Some(kind), Some(id)) => owner_json(kind, &id),
                _ => Value::Null,
            };
            let params = json!({ "actor": actor, "owner": owner });
            let queues: Vec<Queue> = client.call("queue.list.v1", params).await?;
            if queues.is_empty() {
                println!("{}", "No queues".yellow());
            } else {
                println!("{}", render::queue_table(&queues));
            }
        }

        QueueCommand::Board { queue_id } => {
            let params = json!({ "actor": actor, "queue_id": queue_id });
            let board: QueueBoard = client.call("ticket.list.v1", params).await?;
            println!(
                "{} {} - {} (avg service {})",
                board.queue.name.cyan().bold(),
                board.queue.id,
                status_colored(&board.queue.status),
                format_eta(Some(board.average_service_ms))
            );
            println!();
            if board.tickets.is_empty() {
                println!("{}", "Nobody waiting".yellow());
            } else {
                println!("{}", render::ticket_table(&board.tickets));
            }
        }

        QueueCommand::Next { queue_id, complete } => {
            let params = json!({
                "actor": actor,
                "queue_id": queue_id,
                "complete_current": complete,
            });
            let result: CallNextResult = client.call("queue.call_next.v1", params).await?;
            if let Some(done) = result.completed {
                println!("{} Ticket {} completed", "✓".green(), done.id);
            }
            match result.called {
                Some(ticket) => println!(
                    "{}",
                    format!("→ Now serving ticket {} ({})", ticket.id, ticket.patient_id)
                        .green()
                        .bold()
                ),
                None => println!("{}", "Nobody waiting".yellow()),
            }
        }

        QueueCommand::Expire {
            queue_id,
            older_than_mins,
        } => {
            let params = json!({
                "actor": actor,
                "queue_id": queue_id,
                "older_than_ms": older_than_mins * 60_000,
            });
            let result: ExpireResult = client.call("queue.expire.v1", params).await?;
            println!(
                "{} {} waiting tickets cancelled",
                "✓".green(),
                result.expired.len()
            );
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if cli.actor_id.trim().is_empty() {
        anyhow::bail!("Caller id missing: pass --as <id> or set VISITQ_ACTOR");
    }
    let client = RpcClient::new(cli.rpc_url);
    let actor = json!({ "role": cli.role.as_str(), "id": cli.actor_id });

    match cli.command {
        Commands::Queue { command } => run_queue(&client, actor, command).await?,

        Commands::Join {
            queue_id,
            contact,
            patient,
        } => {
            let params = json!({
                "actor": actor,
                "queue_id": queue_id,
                "notification_contact": contact,
                "patient_id": patient,
            });
            let view: TicketView = client.call("ticket.join.v1", params).await?;
            println!("{}", "✓ Joined the queue".green().bold());
            println!();
            print_ticket_view(&view);
        }

        Commands::Cancel { ticket_id, expect } => {
            let expected = expect.map(|s| match s {
                ExpectedStatus::Waiting => "WAITING",
                ExpectedStatus::Serving => "SERVING",
            });
            let params = json!({
                "actor": actor,
                "ticket_id": ticket_id,
                "expected_status": expected,
            });
            let ticket: Ticket = client.call("ticket.cancel.v1", params).await?;
            println!(
                "{}",
                format!("✓ Ticket {} is {}", ticket.id, ticket.status).green().bold()
            );
        }

        Commands::Complete { ticket_id } => {
            let params = json!({ "actor": actor, "ticket_id": ticket_id });
            let ticket: Ticket = client.call("ticket.complete.v1", params).await?;
            println!(
                "{}",
                format!("✓ Ticket {} is {}", ticket.id, ticket.status).green().bold()
            );
        }

        Commands::Ticket { ticket_id } => {
            let params = json!({ "actor": actor, "ticket_id": ticket_id });
            let view: TicketView = client.call("ticket.get.v1", params).await?;
            print_ticket_view(&view);
        }

        Commands::Mine { patient } => {
            let params = json!({ "actor": actor, "patient_id": patient });
            let views: Vec<TicketView> = client.call("ticket.mine.v1", params).await?;
            if views.is_empty() {
                println!("{}", "No tickets".yellow());
            } else {
                println!("{}", render::ticket_table(&views));
            }
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match client
                .call::<Value>("admin.stats.v1", json!({ "actor": actor }))
                .await
            {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), client.url());
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Queues:".bold(), stats["queue_count"]);
                    println!("  {} {}", "Tickets:".bold(), stats["ticket_count"]);
                    println!("  {} {}", "Finished:".bold(), stats["finished_ticket_count"]);
                    println!();
                    let db_mb =
                        stats["db_size_bytes"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    println!("  {} {:.2} MB", "DB Size:".bold(), db_mb);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance { force_vacuum } => {
            println!("{}", "Running maintenance...".cyan().bold());
            println!();

            let params = json!({ "actor": actor, "force_vacuum": force_vacuum });
            let result: Value = client.call("admin.maintenance.v1", params).await?;

            if result["vacuum_run"].as_bool().unwrap_or(false) {
                println!("  {} VACUUM executed", "✓".green());
            } else {
                println!("  ○ VACUUM skipped (not needed)");
            }
            println!(
                "  {} {} tickets deleted",
                "✓".green(),
                result["tickets_deleted"]
            );
            let size_before_mb =
                result["db_size_before"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
            let size_after_mb =
                result["db_size_after"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
            println!(
                "  {} {:.2} MB → {:.2} MB",
                "DB Size:".bold(),
                size_before_mb,
                size_after_mb
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
