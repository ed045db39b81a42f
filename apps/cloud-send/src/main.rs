//! # cloud-send
//!
//! Delivers one JSON file, or every file named in a list, as telemetry
//! messages and deletes the ones the cloud confirmed.
//!
//! ## Usage
//! ```text
//! cloud-send [-c FILE | -C FILE] (-f FILE | -l FILE) [-g] [--strict]
//!            [--report FILE] [--transport KIND]
//! ```
//!
//! ## Exit Status
//! - `0` batch completed (with `--strict`: and nothing failed or was skipped)
//! - `1` setup error, connection refused, or nothing could be sent
//! - `2` usage error
//! - `130` interrupted
//!
//! ## Cleanup
//! Delivered files are deleted at the end of the run, interrupted or not,
//! unless `-g` is given. Cleanup only happens on a transport that actually
//! delivers ([`TransportKind::delivers`]); the built-in `loopback` transport
//! does not, so with it every file is kept.

use clap::{ArgGroup, Parser};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use edgelink_cloud::files::{self, FsPayloadSource};
use edgelink_cloud::{
    params_from_connection_string, run, CloudError, CloudResult, DeliveryFlow, DeliveryReport,
    Exit, ExitPolicy, LoopbackSdk, Settings, TransportKind,
};
use edgelink_core::{ConnectParams, Manifest};

#[derive(Debug, Parser)]
#[command(name = "cloud-send", version, about = "Send JSON files to the cloud")]
#[command(group(ArgGroup::new("input").required(true).args(["file", "list"])))]
struct Cli {
    /// Device configuration file
    #[arg(short = 'c', long = "conf-file")]
    conf_file: Option<PathBuf>,

    /// File holding a pre-shared connection string
    #[arg(short = 'C', long = "connection-string", conflicts_with = "conf_file")]
    connection_string: Option<PathBuf>,

    /// Single JSON file to send
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// File listing one JSON filename per line
    #[arg(short = 'l', long = "list")]
    list: Option<PathBuf>,

    /// Keep delivered files
    #[arg(short = 'g', long = "no-clean-up")]
    no_clean_up: bool,

    /// Exit nonzero if any file failed or was skipped
    #[arg(long)]
    strict: bool,

    /// Write a JSON delivery report here
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Transport to use (overrides the config file)
    #[arg(long, value_name = "KIND")]
    transport: Option<TransportKind>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match send(cli).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!(error = %e, "cloud-send failed before delivery");
            Exit::Failure.into()
        }
    }
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: `info,edgelink=debug`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,edgelink=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn send(cli: Cli) -> CloudResult<Exit> {
    let (mut settings, params) = load_identity(&cli)?;
    if let Some(kind) = cli.transport {
        settings.transport.kind = kind;
    }

    let manifest = build_manifest(&cli, settings.delivery.max_files)?;
    let policy = if cli.strict {
        ExitPolicy::Strict
    } else {
        settings.delivery.exit_policy
    };

    let kind = settings.transport.kind;
    let clean_up = clean_up_enabled(settings.delivery.clean_up && !cli.no_clean_up, kind);

    let source = FsPayloadSource::new(settings.delivery.max_payload_bytes);
    let mut flow = DeliveryFlow::new(params, manifest, source, policy);
    let session = settings.session_settings()?;

    info!(
        files = flow.manifest().len(),
        transport = %kind,
        policy = %policy,
        "Starting delivery"
    );

    let exit = match kind {
        TransportKind::Loopback => {
            run(
                LoopbackSdk::default(),
                session,
                &mut flow,
                settings.poll_interval(),
            )
            .await?
        }
    };

    if clean_up {
        files::clean_delivered(flow.manifest());
    }

    let left = files::undelivered(flow.manifest());
    for path in &left {
        info!(file = %path.display(), "Not delivered; left in place");
    }

    if let Some(path) = &cli.report {
        if let Err(e) = write_report(path, &flow.report()) {
            error!(error = %e, "Could not write delivery report");
        }
    }

    Ok(exit)
}

/// Cleanup runs only if requested and the transport really delivers.
fn clean_up_enabled(requested: bool, kind: TransportKind) -> bool {
    if requested && !kind.delivers() {
        warn!(transport = %kind, "Transport delivers nothing; keeping files");
        return false;
    }
    requested
}

/// Identity from `-C`, else from the config file (`-c` or the default path).
fn load_identity(cli: &Cli) -> CloudResult<(Settings, ConnectParams)> {
    match &cli.connection_string {
        Some(path) => {
            let settings = Settings::from_env();
            settings.validate()?;
            let params = params_from_connection_string(path)?;
            Ok((settings, params))
        }
        None => {
            let settings = Settings::load(cli.conf_file.as_deref())?;
            settings.validate_identity()?;
            let params = settings.connect_params()?;
            Ok((settings, params))
        }
    }
}

fn build_manifest(cli: &Cli, max_files: usize) -> CloudResult<Manifest> {
    if let Some(file) = &cli.file {
        files::single(file)
    } else if let Some(list) = &cli.list {
        files::load_list(list, max_files)
    } else {
        Err(CloudError::InvalidConfig("one of -f or -l is required".into()))
    }
}

fn write_report(path: &Path, report: &DeliveryReport) -> CloudResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)
        .map_err(|e| CloudError::ReportFailed(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), "Delivery report written");
    Ok(())
}
