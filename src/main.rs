use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use toolmesh_cli::{bootstrap, config};
use toolmesh_core_types::{BackendName, SessionId, ToolCall};
use toolmesh_engine::{CallState, EngineConfig};
use toolmesh_gateway::Resolution;
use toolmesh_registry::{AuthConfig, BackendConfig, ToolRouter, TransportKind};

#[derive(Parser)]
#[command(name = "toolmesh", version, about = "Multi-backend tool orchestration runtime")]
struct Cli {
    /// Path to the backend config file (defaults to the platform config
    /// dir, or $TOOLMESH_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage persisted backend configurations.
    #[command(subcommand)]
    Backends(BackendsCommand),
    /// List tools advertised by the connected backends.
    Tools,
    /// Execute one tool call and wait for it to settle.
    Run(RunArgs),
    /// Plan and execute a batch of tool calls from a JSON file.
    Batch(BatchArgs),
}

#[derive(Subcommand)]
enum BackendsCommand {
    /// Show configured backends.
    List,
    /// Add or replace a backend.
    Add(AddArgs),
    /// Remove a backend by name.
    Remove { name: String },
    /// Connect to all enabled backends and show their live status.
    Status,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransportArg {
    Http,
    Websocket,
}

impl From<TransportArg> for TransportKind {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Http => TransportKind::Http,
            TransportArg::Websocket => TransportKind::WebSocket,
        }
    }
}

#[derive(Args)]
struct AddArgs {
    name: String,
    #[arg(long, value_enum)]
    transport: TransportArg,
    #[arg(long)]
    endpoint: String,
    #[arg(long, default_value_t = 5)]
    priority: u8,
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
    #[arg(long, default_value_t = 1)]
    retry_count: u32,
    #[arg(long)]
    bearer_token: Option<String>,
    #[arg(long)]
    disabled: bool,
}

#[derive(Args)]
struct RunArgs {
    tool: String,
    /// Tool arguments as a JSON object.
    #[arg(long)]
    args: Option<String>,
    /// Prefer this backend when routing.
    #[arg(long)]
    backend: Option<String>,
    /// Approve confirmation prompts without asking.
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// JSON file holding an array of tool calls.
    file: PathBuf,
    /// Approve confirmation prompts without asking.
    #[arg(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_path()?,
    };

    match cli.command {
        Command::Backends(command) => run_backends(command, &config_path).await,
        Command::Tools => run_tools(&config_path).await,
        Command::Run(args) => {
            let call = build_call(&args)?;
            execute_calls(&config_path, vec![call], args.yes).await
        }
        Command::Batch(args) => {
            let raw = std::fs::read_to_string(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            let calls: Vec<ToolCall> =
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", args.file.display()))?;
            execute_calls(&config_path, calls, args.yes).await
        }
    }
}

async fn run_backends(command: BackendsCommand, config_path: &std::path::Path) -> Result<()> {
    match command {
        BackendsCommand::List => {
            let mesh = config::load_from(config_path)?;
            if mesh.backends.is_empty() {
                println!("no backends configured");
                return Ok(());
            }
            for backend in &mesh.backends {
                println!(
                    "{}  {:?}  {}  priority={}  timeout={}ms  retries={}  {}",
                    backend.name,
                    backend.transport,
                    backend.endpoint,
                    backend.priority,
                    backend.timeout_ms,
                    backend.retry_count,
                    if backend.enabled { "enabled" } else { "disabled" },
                );
            }
            Ok(())
        }
        BackendsCommand::Add(args) => {
            let mut mesh = config::load_from(config_path)?;
            let mut backend =
                BackendConfig::new(&args.name, args.transport.into(), &args.endpoint)
                    .with_priority(args.priority)
                    .with_timeout(Duration::from_millis(args.timeout_ms))
                    .with_retry_count(args.retry_count);
            backend.enabled = !args.disabled;
            if let Some(token) = args.bearer_token {
                backend.auth = Some(AuthConfig {
                    bearer_token: Some(token),
                });
            }
            mesh.upsert_backend(backend);
            config::save_to(config_path, &mesh)?;
            println!("backend {} saved", args.name);
            Ok(())
        }
        BackendsCommand::Remove { name } => {
            let mut mesh = config::load_from(config_path)?;
            if mesh.remove_backend(&BackendName::new(&name)) {
                config::save_to(config_path, &mesh)?;
                println!("backend {name} removed");
            } else {
                println!("backend {name} not found");
            }
            Ok(())
        }
        BackendsCommand::Status => {
            let mesh = config::load_from(config_path)?;
            let stack = bootstrap(&mesh, EngineConfig::default(), None).await?;
            for status in stack.registry.backends().await {
                println!(
                    "{}  {:?}  priority={}  latency={}ms  ok={}  err={}  tools={}",
                    status.name,
                    status.state,
                    status.priority,
                    status.latency_ms,
                    status.success_count,
                    status.error_count,
                    status.tool_count,
                );
            }
            Ok(())
        }
    }
}

async fn run_tools(config_path: &std::path::Path) -> Result<()> {
    let mesh = config::load_from(config_path)?;
    let stack = bootstrap(&mesh, EngineConfig::default(), None).await?;
    let tools = stack.registry.all_tools().await;
    if tools.is_empty() {
        println!("no tools advertised");
        return Ok(());
    }
    for tool in tools {
        println!(
            "{}  [{} {:?} priority={} success={:.2}]  {}",
            tool.descriptor.name,
            tool.backend,
            tool.backend_state,
            tool.backend_priority,
            tool.success_rate,
            tool.descriptor.description,
        );
    }
    Ok(())
}

fn build_call(args: &RunArgs) -> Result<ToolCall> {
    let mut call = ToolCall::new(&args.tool);
    if let Some(raw) = &args.args {
        let parsed = serde_json::from_str(raw).context("parsing --args as JSON")?;
        call = call.with_args(parsed);
    }
    if let Some(backend) = &args.backend {
        call = call.with_backend_hint(BackendName::new(backend));
    }
    Ok(call)
}

async fn execute_calls(
    config_path: &std::path::Path,
    calls: Vec<ToolCall>,
    auto_approve: bool,
) -> Result<()> {
    let mesh = config::load_from(config_path)?;
    let stack = bootstrap(&mesh, EngineConfig::default(), None).await?;

    let session = SessionId::new();
    let gateway = stack.engine.gateway();
    let mut interactions = gateway.subscribe();
    let plan = stack.engine.submit(session.clone(), calls)?;
    println!(
        "plan: {} phase(s), estimated {}ms",
        plan.phases.len(),
        plan.estimated_total_duration_ms
    );

    let wait = stack.engine.wait(&session);
    tokio::pin!(wait);
    let status = loop {
        tokio::select! {
            status = &mut wait => break status?,
            interaction = interactions.recv() => {
                let Ok(interaction) = interaction else { continue };
                let resolution = if auto_approve {
                    Resolution::Confirmed
                } else {
                    prompt_confirmation(&interaction.prompt).await?
                };
                if !stack
                    .engine
                    .resolve_confirmation(&session, &interaction.id, resolution)?
                {
                    warn!(target: "cli", "confirmation was already resolved");
                }
            }
        }
    };

    for call in &status.calls {
        match call.state {
            CallState::Completed => {
                let result = call
                    .result
                    .as_ref()
                    .map(|r| r.content.to_string())
                    .unwrap_or_default();
                println!(
                    "ok    {}  via {}  {}",
                    call.tool,
                    call.backend
                        .as_ref()
                        .map(|b| b.0.as_str())
                        .unwrap_or("-"),
                    result
                );
            }
            _ => {
                println!(
                    "fail  {}  {}",
                    call.tool,
                    call.error.as_deref().unwrap_or("never executed"),
                );
            }
        }
    }
    let progress = status.progress;
    println!(
        "done: {} completed, {} failed of {}",
        progress.completed, progress.failed, progress.total
    );
    if progress.failed > 0 {
        bail!("{} call(s) failed", progress.failed);
    }
    Ok(())
}

async fn prompt_confirmation(prompt: &str) -> Result<Resolution> {
    println!("{prompt} [y/N]");
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .context("reading confirmation input")??;
    Ok(match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Resolution::Confirmed,
        _ => Resolution::Denied,
    })
}
