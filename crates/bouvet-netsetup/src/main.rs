//! bouvet-netsetup: applies bouvet network settings inside a guest.
//!
//! Reads the agent settings file, configures DHCP or static networking and
//! waits until the configured addresses have been announced.

mod settings;

use anyhow::Context;
use bouvet_net::{
    ArpingBroadcaster, InterfaceIpResolver, NetConfig, NetManager, OsCmdRunner, OsFileSystem,
    UbuntuNetManager,
};
use settings::{AgentSettings, SetupMode, SetupOptions};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("bouvet_netsetup=debug".parse()?)
                .add_directive("bouvet_net=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = SetupOptions::from_env();
    let config = NetConfig::from_env();
    info!(?options, ?config, "bouvet-netsetup starting");

    let settings = AgentSettings::load(&options.settings_path).await?;
    let mode = options.mode.resolve(&settings.networks);

    let fs = Arc::new(OsFileSystem::new());
    let runner = Arc::new(OsCmdRunner::new());
    let resolver = Arc::new(InterfaceIpResolver::new(
        config.resolve_attempts,
        config.resolve_interval,
    ));
    let broadcaster = Arc::new(ArpingBroadcaster::new(fs.clone(), runner.clone(), &config));
    let manager = UbuntuNetManager::new(fs, runner, resolver, broadcaster, config);

    let (tx, rx) = oneshot::channel();
    match mode {
        SetupMode::Manual => manager
            .setup_manual_networking(&settings.networks, Some(tx))
            .await
            .context("static network setup failed")?,
        SetupMode::Dhcp | SetupMode::Auto => manager
            .setup_dhcp(&settings.networks, Some(tx))
            .await
            .context("DHCP network setup failed")?,
    }
    info!(?mode, "network configuration applied");

    match rx.await {
        Ok(Ok(())) => info!("addresses announced"),
        Ok(Err(e)) => warn!(error = %e, "address announcement incomplete"),
        Err(_) => warn!("address broadcast ended without reporting"),
    }

    Ok(())
}
