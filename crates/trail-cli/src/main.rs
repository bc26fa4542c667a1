//! Trail - audit scopes from the command line
//!
//! Opens scopes against the configured sink, reads stored events back, and
//! prints the effective settings.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use trail_core::settings::ConfigError;
use trail_core::{
    AuditConfig, AuditError, AuditScopeOptions, AuditSettings, CancellationToken, ConfigLoader,
    EventCreationPolicy, EventId, ScopeFactory,
};

#[derive(Parser)]
#[command(name = "trail")]
#[command(version)]
#[command(about = "Record and inspect audit events", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "TRAIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an audit scope, save it, and close it
    Record {
        /// Event type
        #[arg(short, long)]
        event_type: String,

        /// Creation policy (defaults to the configured one)
        #[arg(short, long)]
        policy: Option<EventCreationPolicy>,

        /// Custom field as key=value; values that parse as JSON are kept typed
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,

        /// Comment to attach
        #[arg(long = "comment")]
        comments: Vec<String>,

        /// Discard the scope instead of completing it
        #[arg(long)]
        discard: bool,

        /// Number of explicit saves before closing
        #[arg(long, default_value = "0")]
        saves: u32,
    },

    /// Read a stored event back from the configured sink
    Show {
        /// Event id printed by `record`
        event_id: String,
    },

    /// Print the effective settings as TOML
    Config,
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty field name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, load_error) = load_settings(cli.config.clone());

    // CLI verbose flag takes precedence, then settings, then default
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match settings.audit.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(e) = load_error {
        warn!("Failed to load configuration: {}, using defaults", e);
    }

    match cli.command {
        Commands::Record {
            event_type,
            policy,
            fields,
            comments,
            discard,
            saves,
        } => {
            record_command(
                &settings,
                RecordArgs {
                    event_type,
                    policy,
                    fields,
                    comments,
                    discard,
                    saves,
                },
            )
            .await
        }
        Commands::Show { event_id } => show_command(&settings, event_id).await,
        Commands::Config => config_command(&settings),
    }
}

/// Load settings, falling back to defaults; the error is returned so it can
/// be logged once the subscriber is installed
fn load_settings(cli_path: Option<PathBuf>) -> (AuditSettings, Option<ConfigError>) {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(settings) => (settings, None),
        Err(e) => (AuditSettings::default(), Some(e)),
    }
}

fn configure(settings: &AuditSettings) -> anyhow::Result<Arc<AuditConfig>> {
    let config = AuditConfig::global();
    settings.apply(&config);
    let provider = trail_export::build_provider(&settings.sink)
        .with_context(|| format!("Failed to build '{}' sink", settings.sink.kind))?;
    config.set_data_provider(provider);
    Ok(config)
}

struct RecordArgs {
    event_type: String,
    policy: Option<EventCreationPolicy>,
    fields: Vec<(String, Value)>,
    comments: Vec<String>,
    discard: bool,
    saves: u32,
}

async fn record_command(settings: &AuditSettings, args: RecordArgs) -> anyhow::Result<()> {
    let factory = ScopeFactory::new(configure(settings)?);
    let cancel = CancellationToken::new();

    let mut options = AuditScopeOptions::new(&args.event_type)
        .extra_fields(args.fields.into_iter().collect::<serde_json::Map<_, _>>());
    if let Some(policy) = args.policy {
        options = options.creation_policy(policy);
    }

    let mut scope = factory
        .create_async(options, &cancel)
        .await
        .context("Failed to open audit scope")?;
    info!(event_type = %args.event_type, policy = %scope.creation_policy(), "Audit scope opened");
    print_event_id("created", scope.event_id());

    for comment in args.comments {
        scope.comment(comment);
    }

    for n in 1..=args.saves {
        scope.save_async(&cancel).await.context("Explicit save failed")?;
        print_event_id(&format!("save {}", n), scope.event_id());
    }

    if args.discard {
        scope.discard();
        println!("discarded");
    }

    let handle = scope.handle().clone();
    scope
        .dispose_async(&cancel)
        .await
        .context("Failed to close audit scope")?;
    print_event_id("closed", handle.event_id());
    Ok(())
}

fn print_event_id(stage: &str, event_id: Option<EventId>) {
    match event_id {
        Some(id) => println!("{:<8} {}", stage, id),
        None => println!("{:<8} (no event id)", stage),
    }
}

async fn show_command(settings: &AuditSettings, event_id: String) -> anyhow::Result<()> {
    let provider = trail_export::build_provider(&settings.sink)?;
    let cancel = CancellationToken::new();

    match provider
        .get_event_async(&EventId::new(event_id.clone()), &cancel)
        .await
    {
        Ok(Some(event)) => {
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
        Ok(None) => bail!("No event with id {}", event_id),
        Err(AuditError::NotSupported { provider, .. }) => {
            bail!("The '{}' sink cannot read events back", provider)
        }
        Err(e) => Err(e).context("Failed to read event"),
    }
}

fn config_command(settings: &AuditSettings) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render settings")?;
    print!("{}", rendered);
    Ok(())
}
