use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use hvnet::{
    runner::{refresh_addresses, refresh_bridges, Runner},
    server::{api_server, state::AppState},
    source::FileSource,
};
use hvnet_config::Settings;
use hvnet_iproute::{IpRoute, SystemExecutor};
use tokio::signal::{self, unix::SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

#[derive(Debug, Parser)]
#[command(version, about = "Converges host networking to the desired cluster state")]
struct Opt {
    /// Settings file (YAML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Desired state file, overrides `state_path`
    #[arg(short, long)]
    state: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log to daily rolling files in this directory instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Diagnostics listen address, overrides `listen_addr`
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    let _guard = match &opt.log_dir {
        Some(dir) => Some(hvnet_config::setup_tracing_to_file(
            dir,
            "hvnet-agent.log",
            opt.log_level,
        )?),
        None => {
            hvnet_config::setup_tracing_to_stdout(opt.log_level)?;
            None
        }
    };

    let mut settings = match &opt.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(state) = opt.state {
        settings.state_path = state;
    }
    if let Some(listen) = opt.listen {
        settings.listen_addr = listen;
    }
    info!("settings: {:?}", settings);

    let iproute = IpRoute::new(Arc::new(SystemExecutor::new(settings.command_timeout())));
    let state = AppState::default();
    let source = Arc::new(FileSource::new(&settings.state_path));
    let runner = Runner::new(&settings, iproute, source, state.to_context()?);

    let token = CancellationToken::new();
    let tasks = vec![
        tokio::spawn(refresh_bridges(
            runner.bridges(),
            settings.bridge_sync_ttl(),
            token.clone(),
        )),
        tokio::spawn(refresh_addresses(
            runner.cache(),
            settings.address_refresh_ttl(),
            token.clone(),
        )),
        tokio::spawn(runner.run(token.clone())),
    ];
    let server = tokio::spawn({
        let token = token.clone();
        let addr = settings.listen_addr.clone();
        async move {
            let result = api_server::start(addr, state, token.clone()).await;
            if let Err(e) = &result {
                error!("diagnostics server failed: {:#}", e);
                token.cancel();
            }
            result
        }
    });

    shutdown_signal(&token).await?;
    info!("shutting down");
    token.cancel();

    for task in tasks {
        task.await?;
    }
    server.await??;

    Ok(())
}

async fn shutdown_signal(token: &CancellationToken) -> anyhow::Result<()> {
    let mut terminate = signal::unix::signal(SignalKind::terminate())?;

    tokio::select! {
        r = signal::ctrl_c() => r?,
        _ = terminate.recv() => {}
        _ = token.cancelled() => {}
    }

    Ok(())
}
