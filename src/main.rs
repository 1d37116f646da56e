use clap::Parser;
use iowatch::cli::Cli;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting iowatch v{}", iowatch::VERSION);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

#[cfg(target_os = "linux")]
async fn run(cli: Cli) -> anyhow::Result<()> {
    use anyhow::Context;
    use iowatch::ebpf::loader::AyaBackend;
    use iowatch::Session;

    let config = cli.config();
    let session = Session::start(&config, |config, pid| {
        AyaBackend::load(&config.object_path, pid)
    })
    .await
    .context("failed to start session")?;

    info!(
        pid = session.pid(),
        "observing; metrics on http://{}/metrics",
        session.metrics_addr()
    );

    let report = session.run_until(shutdown_signal()).await;
    for probe in &report.probes {
        info!(probe = %probe.kind, attached = probe.was_attached(), "probe status");
    }
    if !report.all_released() {
        anyhow::bail!("some probes were not released");
    }

    info!("shutdown");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(_cli: Cli) -> anyhow::Result<()> {
    anyhow::bail!("iowatch requires Linux to run eBPF programs")
}

/// Resolves on the first SIGINT or SIGTERM
#[cfg(target_os = "linux")]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "cannot listen for SIGTERM, only Ctrl+C will stop the session");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for Ctrl+C either");
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = terminate.recv() => info!("SIGTERM received"),
    }
}
