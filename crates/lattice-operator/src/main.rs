//! Lattice Operator - manual in-place update tracking for worker pools

use clap::Parser;

use lattice_common::crd::all_crds;
use lattice_common::kube_utils::{create_client, install_crds};
use lattice_common::telemetry::{init_telemetry, TelemetryConfig};
use lattice_operator::cli::{Cli, Commands, ControllerArgs};
use lattice_operator::controller_runner::build_inplace_status_controller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube's TLS stack needs a process-wide rustls provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        for crd in all_crds() {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: "lattice-operator".to_string(),
        log_format: cli.log_format.into(),
        ..Default::default()
    })?;

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        // Without a subcommand every setting comes from the environment
        None => ControllerArgs::try_parse_from(["controller"])?,
    };
    run_controller(args).await
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let config = args.to_config();
    config.validate()?;

    let client = create_client(args.kubeconfig.as_deref()).await?;

    if args.install_crds {
        tracing::info!("Installing CRDs...");
        install_crds(&client, &all_crds()).await?;
    }

    tracing::info!(cell = %config.cell_name, "Starting Lattice operator");
    build_inplace_status_controller(client, config).await;
    tracing::info!("Controller stopped");
    Ok(())
}
