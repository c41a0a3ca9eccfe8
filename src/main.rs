use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ratify_api::AppState;
use ratify_config::CoordinatorConfig;
use ratify_draft_store::{DraftStore, SqliteDraftStore};
use ratify_orchestrator::response::{
  CompleteResponse, ConflictCheckResponse, ErrorResponse, PendingTasksResponse, SubmitResponse,
};
use ratify_orchestrator::{Adapters, ApprovalController, ControllerConfig, OrchestrationError};
use ratify_registry::FhirResourceRegistry;
use ratify_types::NewDraft;
use ratify_workflow_engine::CamundaWorkflowEngine;

/// Ratify - approval coordinator for versioned benefit plan records
#[derive(Parser)]
#[command(name = "ratify")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.ratify)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to the config file (default: <data-dir>/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the HTTP API
  Serve,

  /// Create a draft, reading its content as JSON from stdin
  CreateDraft {
    #[arg(long)]
    name: String,

    /// Published resource the draft edits, if any
    #[arg(long)]
    resource_id: Option<String>,

    #[arg(long)]
    user: String,
  },

  /// Submit a draft for approval
  Submit {
    draft_id: String,

    #[arg(long)]
    user: String,
  },

  /// List tasks a principal can act on
  Pending {
    #[arg(long)]
    principal: String,
  },

  /// Approve or reject an approval task
  #[command(group(ArgGroup::new("decision").required(true).args(["approve", "reject"])))]
  Complete {
    task_id: String,

    #[arg(long)]
    principal: String,

    #[arg(long)]
    approve: bool,

    #[arg(long)]
    reject: bool,

    #[arg(long)]
    comments: Option<String>,
  },

  /// Check a draft for a version conflict
  Check { draft_id: String },

  /// Rebase a draft onto the current resource and resubmit it
  Resubmit {
    draft_id: String,

    #[arg(long)]
    user: String,
  },
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(data_dir) => data_dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".ratify"),
  };
  let config_path = cli.config.unwrap_or_else(|| data_dir.join("config.json"));

  let Some(command) = cli.command else {
    println!("ratify - use --help to see available commands");
    return Ok(ExitCode::SUCCESS);
  };

  let config = CoordinatorConfig::load(&config_path).context("failed to load config")?;

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run(command, config, data_dir).await })
}

async fn run(command: Commands, config: CoordinatorConfig, data_dir: PathBuf) -> Result<ExitCode> {
  let drafts = open_drafts(&config, &data_dir).await?;

  let controller = build_controller(&config, drafts.clone())?;
  let shutdown = shutdown_on_ctrl_c();

  match command {
    Commands::CreateDraft {
      name,
      resource_id,
      user,
    } => {
      let content = read_content_from_stdin()?;
      let draft_id = drafts
        .create(NewDraft {
          name,
          resource_id,
          content,
          created_by: user,
        })
        .await
        .context("failed to create draft")?;
      print_json(&serde_json::json!({ "success": true, "draftId": draft_id }))?;
      Ok(ExitCode::SUCCESS)
    }
    Commands::Serve => {
      let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
      ratify_api::serve(listener, AppState::new(controller, shutdown))
        .await
        .context("server failed")?;
      Ok(ExitCode::SUCCESS)
    }
    Commands::Submit { draft_id, user } => emit(
      controller
        .submit_for_approval(&draft_id, &user, &shutdown)
        .await
        .map(SubmitResponse::from),
    ),
    Commands::Pending { principal } => emit(
      controller
        .get_pending_tasks(&principal, &shutdown)
        .await
        .map(PendingTasksResponse::from),
    ),
    Commands::Complete {
      task_id,
      principal,
      approve,
      reject: _,
      comments,
    } => {
      let result = controller
        .complete_approval_task(&task_id, approve, comments.as_deref(), &principal, &shutdown)
        .await
        .map(CompleteResponse::from);
      match result {
        Ok(response) if response.is_conflict() => {
          print_json(&response)?;
          Ok(ExitCode::FAILURE)
        }
        other => emit(other),
      }
    }
    Commands::Check { draft_id } => emit(
      controller
        .check_version_conflict(&draft_id, &shutdown)
        .await
        .map(ConflictCheckResponse::from),
    ),
    Commands::Resubmit { draft_id, user } => emit(
      controller
        .resubmit_with_updated_version(&draft_id, &user, &shutdown)
        .await
        .map(SubmitResponse::from),
    ),
  }
}

async fn open_drafts(config: &CoordinatorConfig, data_dir: &Path) -> Result<Arc<SqliteDraftStore>> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let pool = SqlitePoolOptions::new()
    .connect(&config.database_url(data_dir))
    .await
    .context("failed to open draft database")?;

  let drafts = SqliteDraftStore::new(pool);
  drafts
    .migrate()
    .await
    .context("failed to migrate draft database")?;

  Ok(Arc::new(drafts))
}

fn build_controller(
  config: &CoordinatorConfig,
  drafts: Arc<SqliteDraftStore>,
) -> Result<ApprovalController> {
  let client = reqwest::Client::builder()
    .build()
    .context("failed to build http client")?;

  let mut registry = FhirResourceRegistry::new(
    client.clone(),
    &config.resource_registry.base_url,
    &config.resource_registry.resource_type,
  );
  if !config.resource_registry.version_ids {
    registry = registry.without_version_ids();
  }
  let registry = Arc::new(registry);
  let engine = Arc::new(CamundaWorkflowEngine::new(
    client,
    &config.workflow_engine.base_url,
  ));

  info!(
    registry = %config.resource_registry.base_url,
    version_ids = config.resource_registry.version_ids,
    engine = %config.workflow_engine.base_url,
    timeout_ms = config.adapter_timeout_ms,
    "adapters_configured"
  );

  Ok(ApprovalController::new(
    Adapters {
      drafts,
      registry,
      engine: engine.clone(),
      completer: engine,
    },
    ControllerConfig {
      process_key: config.workflow_engine.process_key.clone(),
      adapter_timeout: config.adapter_timeout(),
    },
  ))
}

/// A token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
  let shutdown = CancellationToken::new();
  let token = shutdown.clone();
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        info!("shutdown_requested");
        token.cancel();
      }
      Err(e) => warn!(error = %e, "ctrl_c_handler_unavailable"),
    }
  });
  shutdown
}

fn emit<T: Serialize>(result: Result<T, OrchestrationError>) -> Result<ExitCode> {
  match result {
    Ok(response) => {
      print_json(&response)?;
      Ok(ExitCode::SUCCESS)
    }
    Err(err) => {
      print_json(&ErrorResponse::from(&err))?;
      Ok(ExitCode::FAILURE)
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn read_content_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read draft content from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse draft content JSON from stdin")
  }
}
