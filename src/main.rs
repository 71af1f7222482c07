//! Kanshi Uploadr - upload client for a moderated content-sharing platform
//!
//! Uploads a video or photo, follows moderation processing until it
//! finishes, and covers the account and interaction calls around it.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kanshi_uploadr::api::ApiClient;
use kanshi_uploadr::config::{Config, StrategyKind};
use kanshi_uploadr::models::{ContentId, ContentKind, Role};
use kanshi_uploadr::storage::StorageClient;
use kanshi_uploadr::upload::{
    DirectTransfer, FfprobeDurationProbe, RelayTransfer, SelectedFile, SessionHandle,
    TransferStrategy, UploadController, UploadMetadata, UploadOutcome, UploadStage,
};
use kanshi_uploadr::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Kanshi Uploadr - upload and moderation-progress client
#[derive(Parser, Debug)]
#[command(name = "kanshi-uploadr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "KANSHI_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Backend base URL including the API prefix
    #[arg(long, env = "KANSHI_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token for backend calls
    #[arg(long, env = "KANSHI_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and print the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "KANSHI_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and print the session token
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "KANSHI_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },
    /// Upload a file and wait for processing to finish
    Upload(UploadArgs),
    /// Show a record's processing status
    Status {
        #[arg(value_enum)]
        kind: ContentKind,
        id: String,
    },
    /// Toggle a like
    Like {
        #[arg(value_enum)]
        kind: ContentKind,
        id: String,
    },
    /// Toggle a dislike
    Dislike {
        #[arg(value_enum)]
        kind: ContentKind,
        id: String,
    },
    /// Toggle saved state
    Save {
        #[arg(value_enum)]
        kind: ContentKind,
        id: String,
    },
    /// Comment on a video
    Comment { video_id: String, text: String },
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[arg(value_enum)]
    kind: ContentKind,

    file: PathBuf,

    #[arg(short, long)]
    title: String,

    #[arg(short, long, default_value = "")]
    description: String,

    /// Transfer path; overrides `upload.strategy`
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// MIME type to send instead of the one guessed from the extension
    #[arg(long)]
    mime_type: Option<String>,

    /// Log in first and check the account may upload
    #[arg(long, requires = "password")]
    email: Option<String>,

    #[arg(long, env = "KANSHI_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Viewer,
    Editor,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Viewer => Role::Viewer,
            RoleArg::Editor => Role::Editor,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.backend.base_url = base_url.clone();
    }
    if cli.token.is_some() {
        config.backend.token = cli.token.clone();
    }
    config.validate()?;

    logging::init_subscriber(&config.logging)?;
    info!("Starting Kanshi Uploadr v{}", kanshi_uploadr::VERSION);

    let api = build_api(&config)?;
    let result = run(cli.command, &config, api).await;

    if cli.print_metrics {
        eprint!("{}", metrics::gather());
    }
    result
}

/// One client for the whole run; a 401 drops the stored token
fn build_api(config: &Config) -> anyhow::Result<Arc<ApiClient>> {
    let client = ApiClient::new(&config.backend)?;
    let session = client.clone();
    let client = client.with_unauthorized_hook(Arc::new(move || {
        session.set_token(None);
        warn!("Session expired or invalid; log in again");
    }));
    Ok(Arc::new(client))
}

async fn run(command: Command, config: &Config, api: Arc<ApiClient>) -> anyhow::Result<()> {
    match command {
        Command::Login { email, password } => {
            let auth = api.login(&email, &password).await?;
            println!("Logged in as {} ({:?})", auth.user.username, auth.user.role);
            println!("{}", auth.token);
        }
        Command::Register {
            username,
            email,
            password,
            role,
        } => {
            let auth = api
                .register(&username, &email, &password, role.map(Role::from))
                .await?;
            println!("Registered {} ({:?})", auth.user.username, auth.user.role);
            println!("{}", auth.token);
        }
        Command::Upload(args) => upload(args, config, api).await?,
        Command::Status { kind, id } => {
            let record = api.get_record(kind, &ContentId::new(id)).await?;
            println!(
                "{} '{}': {:?} {}%",
                kind,
                record.title,
                record.processing_status,
                record.progress_percent()
            );
            if let Some(error) = record.processing_error {
                println!("error: {}", error);
            }
            if let Some(sensitivity) = record.sensitivity_status {
                println!("sensitivity: {:?}", sensitivity);
            }
        }
        Command::Like { kind, id } => {
            let state = api.toggle_like(kind, &ContentId::new(id)).await?;
            println!(
                "likes {} dislikes {} (liked: {})",
                state.likes, state.dislikes, state.is_liked
            );
        }
        Command::Dislike { kind, id } => {
            let state = api.toggle_dislike(kind, &ContentId::new(id)).await?;
            println!(
                "likes {} dislikes {} (disliked: {})",
                state.likes, state.dislikes, state.is_disliked
            );
        }
        Command::Save { kind, id } => {
            let state = api.toggle_save(kind, &ContentId::new(id)).await?;
            println!("saved: {}", state.is_saved);
        }
        Command::Comment { video_id, text } => {
            let comment = api.add_comment(&ContentId::new(video_id), &text).await?;
            println!("comment {} posted", comment.id);
        }
    }
    Ok(())
}

async fn upload(args: UploadArgs, config: &Config, api: Arc<ApiClient>) -> anyhow::Result<()> {
    if let (Some(email), Some(password)) = (&args.email, &args.password) {
        let auth = api.login(email, password).await?;
        if !auth.user.role.can_manage_content() {
            bail!(
                "Account role {:?} cannot upload content; an Editor or Admin account is required",
                auth.user.role
            );
        }
    }

    let strategy: Arc<dyn TransferStrategy> =
        match args.strategy.unwrap_or(config.upload.strategy) {
            StrategyKind::Direct => Arc::new(DirectTransfer::new(
                api.clone(),
                StorageClient::new(&config.storage)?,
            )),
            StrategyKind::Relay => Arc::new(
                RelayTransfer::new(api.clone())
                    .with_file_field(config.upload.relay_file_field.clone()),
            ),
        };

    let controller = UploadController::new(args.kind, &config.upload, strategy, api)
        .with_duration_probe(Arc::new(FfprobeDurationProbe::new(
            config.upload.ffprobe_path.clone(),
        )))
        .on_complete(Arc::new(|id: &ContentId| {
            println!("Upload complete ({}). Back to the dashboard.", id);
        }));

    let file = SelectedFile::from_path(&args.file, args.mime_type.as_deref()).await?;
    controller.select_file(file)?;
    controller.set_metadata(UploadMetadata::new(args.title, args.description));

    let display = tokio::spawn(show_progress(controller.session()));

    let outcome = tokio::select! {
        outcome = controller.submit() => outcome,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            Ok(UploadOutcome::Cancelled)
        }
    };
    display.abort();

    match outcome? {
        UploadOutcome::Completed(id) => info!(content_id = %id, "Done"),
        UploadOutcome::Cancelled => println!("Upload cancelled"),
    }
    Ok(())
}

/// Print stage changes and every 10% step of the active percent
async fn show_progress(session: SessionHandle) {
    let mut rx = session.subscribe();
    let mut last_stage = UploadStage::Idle;
    let mut last_bucket = 0u8;

    while rx.changed().await.is_ok() {
        let (stage, percent) = {
            let s = rx.borrow_and_update();
            let percent = match s.stage {
                UploadStage::Transferring | UploadStage::Saving => s.transfer_progress,
                _ => s.visual_progress,
            };
            (s.stage, percent)
        };

        if stage != last_stage {
            println!("{}...", stage);
            last_stage = stage;
            last_bucket = 0;
        }
        let bucket = percent / 10;
        if bucket > last_bucket {
            println!("  {}%", percent);
            last_bucket = bucket;
        }
    }
}
