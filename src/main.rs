use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waypoint::api::{self, SecurityConfig};
use waypoint::db::Database;
use waypoint::models::{ChangeSource, CreateItemInput, EntityType};
use waypoint::workflow::WorkflowEngine;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Workflow state machine for tracked work items")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Waypoint server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Create a work item (issue, feature, or task)
    Add {
        /// Entity type: issue, feature, or task
        entity_type: String,
        title: String,
        /// Owning item reference (e.g. F3) for tasks and nested features
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        details: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Move a work item to a new status
    Advance {
        /// Item reference: short code (I7, F3, BT12) or UUID
        reference: String,
        /// Target status; invalid moves are rejected with the legal options
        status: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Start work on an item (advance to in_progress, print its plan)
    Start {
        reference: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Complete an item (advance to completed, suggest the next task)
    Done {
        reference: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Show the legal next statuses for an item
    Next { reference: String },
    /// Show an item's audit trail
    History { reference: String },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "waypoint=info,tower_http=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database() -> anyhow::Result<Database> {
    let db = Database::open_default()?;
    db.migrate()?;
    Ok(db)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port }) => {
            serve(port).await?;
        }
        None => {
            // Default: start server
            serve(3000).await?;
        }
        Some(Commands::Add {
            entity_type,
            title,
            parent,
            details,
            assignee,
        }) => {
            let db = open_database()?;
            let entity_type = EntityType::from_str(&entity_type).ok_or_else(|| {
                anyhow::anyhow!("unknown entity type '{entity_type}' (expected issue, feature, or task)")
            })?;
            let parent_id = match parent {
                Some(reference) => {
                    let engine = WorkflowEngine::new(db.clone())?;
                    Some(engine.get_item(&reference)?.id)
                }
                None => None,
            };
            let item = db.create_item(CreateItemInput {
                entity_type,
                title,
                details,
                plan_data: None,
                parent_id,
                blocked_by_id: None,
                position: None,
                assignee,
            })?;
            println!("Created {} ({})", item.code(), item.status);
        }
        Some(Commands::Advance {
            reference,
            status,
            actor,
        }) => {
            let engine = WorkflowEngine::new(open_database()?)?;
            let outcome =
                engine.execute_transition(&reference, &status, &actor, ChangeSource::Direct)?;
            print_json(&outcome)?;
        }
        Some(Commands::Start { reference, actor }) => {
            let engine = WorkflowEngine::new(open_database()?)?;
            let started = engine.start_work(&reference, &actor)?;
            print_json(&started)?;
        }
        Some(Commands::Done { reference, actor }) => {
            let engine = WorkflowEngine::new(open_database()?)?;
            let completed = engine.complete_work(&reference, &actor)?;
            print_json(&completed)?;
        }
        Some(Commands::Next { reference }) => {
            let engine = WorkflowEngine::new(open_database()?)?;
            let targets = engine.list_legal_transitions(&reference)?;
            if targets.is_empty() {
                println!("No legal transitions from here.");
            } else {
                for target in targets {
                    println!("{target}");
                }
            }
        }
        Some(Commands::History { reference }) => {
            let engine = WorkflowEngine::new(open_database()?)?;
            let history = engine.history(&reference)?;
            print_json(&history)?;
        }
    }

    Ok(())
}

async fn serve(port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting Waypoint server on port {}", port);

    let db = open_database()?;
    let app = api::create_router_with_config(db, SecurityConfig::from_env())?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Waypoint server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}
