//! # cloud-provision
//!
//! Registers this device with the provisioning service, once.
//!
//! ## Usage
//! ```text
//! cloud-provision -c FILE
//! ```
//!
//! Exits `0` when the service assigns the device, `1` otherwise, `130` if
//! interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edgelink_cloud::{run, CloudResult, Exit, LoopbackSdk, RegistrationFlow, Settings, TransportKind};

#[derive(Debug, Parser)]
#[command(name = "cloud-provision", version, about = "Register this device with the cloud")]
struct Cli {
    /// Device configuration file
    #[arg(short = 'c', long = "conf-file")]
    conf_file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match provision(cli).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!(error = %e, "cloud-provision failed before registration");
            Exit::Failure.into()
        }
    }
}

/// Initializes the tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `info,edgelink=debug`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,edgelink=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn provision(cli: Cli) -> CloudResult<Exit> {
    let settings = Settings::load(Some(&cli.conf_file))?;
    settings.validate_provisioning()?;

    let params = settings.connect_params()?;
    let session = settings.session_settings()?;
    let mut flow = RegistrationFlow::new(params);

    info!(
        device_id = %settings.device.device_id,
        endpoint = %settings.provisioning.endpoint,
        transport = %settings.transport.kind,
        "Starting registration"
    );

    match settings.transport.kind {
        TransportKind::Loopback => {
            run(
                LoopbackSdk::default(),
                session,
                &mut flow,
                settings.poll_interval(),
            )
            .await
        }
    }
}
