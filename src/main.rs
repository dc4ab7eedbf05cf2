use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tasklink::model::{
    ExecutionCreate, ExecutionStatus, Priority, RecordedBy, Task, TaskCreate, TaskKind,
    TaskPatch, TaskStatus,
};
use tasklink::store::Snapshot;
use tasklink::{sync, ApiClient, ChannelState, ClientConfig, SessionTag, TaskActions, TaskStore};

#[derive(Parser)]
#[command(
    name = "tasklink",
    about = "Live-syncing client for the task/intent tracker",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Tracker REST API base URL
    #[arg(long, env = "TASKLINK_API_URL")]
    api_url: Option<String>,

    /// Push channel WebSocket URL (default: derived from the API URL)
    #[arg(long, env = "TASKLINK_WS_URL")]
    ws_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKLINK_LOG")]
    log: Option<String>,

    /// Config directory holding config.toml (default: ~/.config/tasklink)
    #[arg(long, env = "TASKLINK_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the task list live (default when no subcommand given).
    ///
    /// Loads the collection, connects to the push channel, and re-renders on
    /// every change — yours or a peer's. Ctrl-C disconnects cleanly.
    Watch,
    /// Fetch and print the task list once.
    List,
    /// Declare a new task.
    Add {
        title: String,
        /// Priority: critical, high, medium, low, lowest
        #[arg(long)]
        priority: Option<Priority>,
        /// Kind: task, bug, chore
        #[arg(long)]
        kind: Option<TaskKind>,
        #[arg(long)]
        description: Option<String>,
        /// Due date, e.g. 2026-09-01
        #[arg(long)]
        due: Option<String>,
    },
    /// Mark a task done.
    Done { id: i64 },
    /// Delete a task.
    Rm { id: i64 },
    /// Record an execution fact against a task.
    Record {
        task_id: i64,
        /// Outcome: completed, failed, skipped, partial
        #[arg(long, default_value = "completed")]
        status: ExecutionStatus,
        #[arg(long)]
        note: Option<String>,
    },
    /// List recorded executions, optionally for one task.
    Executions { task_id: Option<i64> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ClientConfig::new(args.api_url, args.ws_url, args.log, args.config_dir);
    setup_logging(&config.log, &config.log_format);

    let tag = SessionTag::generate();
    let api = ApiClient::new(&config.api_url, tag.clone())
        .context("failed to build API client")?;
    let store = Arc::new(TaskStore::new());
    let actions = TaskActions::new(api.clone(), store.clone());

    match args.command.unwrap_or(Command::Watch) {
        Command::Watch => cmd_watch(&config, &actions, tag).await,
        Command::List => {
            actions.load().await.context("could not fetch tasks")?;
            print_tasks(&store.tasks());
            Ok(())
        }
        Command::Add {
            title,
            priority,
            kind,
            description,
            due,
        } => {
            let task = actions
                .create(TaskCreate {
                    title,
                    priority,
                    kind,
                    description,
                    due_date: due,
                    ..Default::default()
                })
                .await
                .context("could not create task")?;
            println!("created task {} — {}", task.id, task.title);
            Ok(())
        }
        Command::Done { id } => {
            let patch = TaskPatch {
                status: Some(TaskStatus::Done),
                ..Default::default()
            };
            let task = actions
                .update(id, patch)
                .await
                .with_context(|| format!("could not update task {id}"))?;
            println!("task {} done — {}", task.id, task.title);
            Ok(())
        }
        Command::Rm { id } => {
            actions
                .remove(id)
                .await
                .with_context(|| format!("could not delete task {id}"))?;
            println!("deleted task {id}");
            Ok(())
        }
        Command::Record {
            task_id,
            status,
            note,
        } => {
            let execution = actions
                .record_execution(ExecutionCreate {
                    task_id,
                    status,
                    started_at: None,
                    ended_at: None,
                    duration: None,
                    payload: None,
                    note,
                    recorded_by: Some(RecordedBy::Manual),
                })
                .await
                .with_context(|| format!("could not record execution for task {task_id}"))?;
            println!("recorded execution {} ({})", execution.id, execution.status);
            Ok(())
        }
        Command::Executions { task_id } => {
            let executions = match task_id {
                Some(id) => api.executions_for(id).await,
                None => api.executions().await,
            }
            .context("could not fetch executions")?;
            for e in &executions {
                println!(
                    "{:>5}  task {:>5}  {:<9}  {}  {}",
                    e.id,
                    e.task_id,
                    e.status.to_string(),
                    e.created_at.format("%Y-%m-%d %H:%M"),
                    e.note.as_deref().unwrap_or("")
                );
            }
            if executions.is_empty() {
                println!("no executions recorded");
            }
            Ok(())
        }
    }
}

// ─── Watch mode ───────────────────────────────────────────────────────────────

async fn cmd_watch(config: &ClientConfig, actions: &TaskActions, tag: SessionTag) -> Result<()> {
    let store = actions.store().clone();

    // A failed initial fetch is shown in the banner, not fatal — the user
    // keeps whatever loads later and the push channel keeps trying.
    let _ = actions.load().await;

    let handle = sync::spawn(config.ws_url.clone(), tag, store.clone());
    let mut revisions = store.subscribe();
    let mut states = handle.state_changes();

    render(&store.snapshot(), handle.state());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&store.snapshot(), *states.borrow());
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&store.snapshot(), *states.borrow());
            }
        }
    }

    // Deliberate teardown: normal close, no reconnect.
    handle.shutdown().await;
    Ok(())
}

fn render(snapshot: &Snapshot, state: ChannelState) {
    // Clear screen and repaint.
    print!("\x1b[2J\x1b[H");
    let indicator = match state {
        ChannelState::Open => "●",
        ChannelState::Connecting => "◐",
        ChannelState::Closed => "○",
    };
    println!("tasklink  {indicator} {state}");
    if let Some(error) = &snapshot.error {
        println!("! {error}");
    }
    if snapshot.loading {
        println!("loading…");
    }
    println!();
    print_tasks(&snapshot.tasks);
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    println!(
        "{:>5}  {:<9}  {:<8}  {:<6}  {}",
        "id", "priority", "status", "kind", "title"
    );
    for t in tasks {
        let priority = t
            .priority
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:<9}  {:<8}  {:<6}  {}{}",
            t.id,
            priority,
            t.status.to_string(),
            t.kind.to_string(),
            t.title,
            t.due_date
                .as_deref()
                .map(|d| format!("  (due {d})"))
                .unwrap_or_default()
        );
    }
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Logs go to stderr so watch-mode rendering owns stdout.
fn setup_logging(log_level: &str, log_format: &str) {
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
