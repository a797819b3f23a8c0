//! CLI entry point for the join-token rotator.
//!
//! `rotate` runs one refresh of the worker join command and is meant to be
//! fired by an external scheduler or event. The other subcommands are the CI
//! helpers: stamping an image into a deployment manifest and publishing or
//! reading per-environment secret bundles.

mod infra;

use crate::infra::aws::{
    Ec2Inventory, SecretsManagerStore, SsmParameterStore, SsmRemoteExecutor, load_sdk_config,
};
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use kube_join_rotator::config::RotatorConfig;
use kube_join_rotator::locator::InstanceLocator;
use kube_join_rotator::manifest::patch_manifest;
use kube_join_rotator::orchestrator::{RefreshOrchestrator, RefreshReport};
use kube_join_rotator::secrets::{KeyNaming, fetch_bundle, parse_entries, publish_bundle};
use std::ffi::OsStr;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "kube_join_rotator")]
#[command(about = "Rotates the cluster join command and wires CI artifacts into deployments", long_about = None)]
struct Cli {
    /// Optional JSON config file; ROTATOR_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the stored join command if it is missing or stale
    Rotate {
        /// Rotate even if the stored join command is still fresh
        #[arg(long, default_value_t = false)]
        always_rotate: bool,
    },
    /// Copy an image name from the parameter store into a deployment manifest
    PatchManifest {
        /// Source YAML file path
        #[arg(long)]
        src: String,

        /// Destination YAML file path
        #[arg(long)]
        dest: String,

        /// Parameter holding the image name
        #[arg(long)]
        ssm: String,

        /// AWS region, defaults to the configured region
        #[arg(long)]
        region: Option<String>,
    },
    /// Create or update the secret bundle for one environment
    PublishSecrets {
        /// Environment name, e.g. "dev" or "prod"
        #[arg(long)]
        env: String,

        /// Secret entry as key=value (repeatable)
        #[arg(short, long = "entry", value_name = "KEY=VALUE", required = true)]
        entries: Vec<String>,
    },
    /// Print the key names of a stored secret bundle
    GetSecrets {
        /// Full secret name, e.g. "k8s/dev"
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/kube_join_rotator.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("kube_join_rotator.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let mut config = RotatorConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Rotate { always_rotate } => {
            config.always_rotate |= always_rotate;
            return Ok(rotate(&config).await);
        }
        Commands::PatchManifest {
            src,
            dest,
            ssm,
            region,
        } => {
            let region = region.unwrap_or_else(|| config.region.clone());
            let sdk_config = load_sdk_config(&region).await;
            let store = SsmParameterStore::new(&sdk_config);
            patch_manifest(&store, &src, &dest, &ssm).await?;
        }
        Commands::PublishSecrets { env, entries } => {
            let naming = KeyNaming::new(&config.secret_naming)?;
            let name = naming.name_for(&config.secret_prefix, &env);
            let bundle = parse_entries(entries.iter().map(String::as_str))?;

            let sdk_config = load_sdk_config(&config.region).await;
            let store = SecretsManagerStore::new(&sdk_config);
            let outcome = publish_bundle(&store, &name, &bundle).await?;
            info!(secret = %name, ?outcome, "Secret bundle published");
        }
        Commands::GetSecrets { name } => {
            let sdk_config = load_sdk_config(&config.region).await;
            let store = SecretsManagerStore::new(&sdk_config);
            match fetch_bundle(&store, &name).await? {
                Some(bundle) => {
                    info!(secret = %name, keys = ?bundle.keys().collect::<Vec<_>>(), "Retrieved secret");
                }
                None => {
                    error!(secret = %name, "Secret not found");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Builds fresh clients for one rotation run and maps its result to an exit code.
async fn rotate(config: &RotatorConfig) -> ExitCode {
    let sdk_config = load_sdk_config(&config.region).await;

    let orchestrator = RefreshOrchestrator::new(
        config.rotation_settings(),
        SsmParameterStore::new(&sdk_config),
        InstanceLocator::new(
            Ec2Inventory::new(&sdk_config),
            config.role_tag_key.clone(),
            config.tie_break,
        ),
        SsmRemoteExecutor::new(&sdk_config, config.document_name.clone(), config.wait_policy()),
    );

    match orchestrator.run(Utc::now()).await {
        Ok(RefreshReport::Idle { instance }) => {
            info!(instance_id = %instance, "Join command is fresh, nothing to do");
            ExitCode::SUCCESS
        }
        Ok(RefreshReport::Rotated {
            instance,
            command_id,
            verdict,
        }) => {
            info!(instance_id = %instance, command_id = %command_id, %verdict, "Join command rotated");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(class = e.class(), error = %e, "Rotation failed");
            ExitCode::from(e.exit_code())
        }
    }
}
