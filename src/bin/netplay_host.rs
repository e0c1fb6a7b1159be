//! Netplay host
//!
//! Runs one netplay session from the command line: starts the
//! synchronization servers, optionally opens the session ports on the
//! gateway, prints session events, and stops on Ctrl-C.

use anyhow::Context;
use clap::Parser;
use netplay_host::{ChannelListener, MappingOutcome, NetplayConfig, NetplayEvent, NetplayOrchestrator};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Netplay session host
#[derive(Parser, Debug)]
#[command(name = "netplay-host")]
#[command(about = "Hosts a netplay session and maps its ports through UPnP", long_about = None)]
struct Args {
    /// JSON config file (defaults are used when it does not exist)
    #[arg(short, long, default_value = "netplay.json")]
    config: PathBuf,

    /// Bind address, overrides the config file
    #[arg(long)]
    bind: Option<IpAddr>,

    /// TCP control server port (0 lets the OS choose), overrides the config file
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Room server port to map through UPnP; no mapping when omitted
    #[arg(long)]
    room_port: Option<u16>,

    /// Write the effective config back to `--config`
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = NetplayConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(tcp_port) = args.tcp_port {
        config.tcp_port = tcp_port;
    }
    if args.save_config {
        config
            .save(&args.config)
            .with_context(|| format!("saving {}", args.config.display()))?;
        info!("Config saved to {}", args.config.display());
    }

    let orchestrator = NetplayOrchestrator::new(config)?;
    spawn_ctrl_c_handler(orchestrator.stop_handle());

    let (listener, events) = ChannelListener::new();
    orchestrator.start_listening(Arc::new(listener));

    for event in events.iter() {
        match event {
            NetplayEvent::PortObtained(port) => {
                info!("Netplay server listening on port {}", port);
                if let Some(room_port) = args.room_port {
                    orchestrator.map_ports(room_port);
                }
            }
            NetplayEvent::Desync(step) => warn!("Desync at step {}", step),
            NetplayEvent::UpnpPortsObtained(MappingOutcome::Mapped(ports)) => info!(
                "Gateway forwards room {}, TCP {}, UDP {}",
                ports.room_port, ports.tcp_port, ports.udp_port
            ),
            NetplayEvent::UpnpPortsObtained(MappingOutcome::Failed(failure)) => {
                warn!("Port mapping failed: {}", failure)
            }
            NetplayEvent::Finish => {
                info!("Netplay session finished");
                break;
            }
        }
    }

    // Dropping the orchestrator waits for port teardown.
    drop(orchestrator);
    Ok(())
}

fn spawn_ctrl_c_handler(stop: netplay_host::StopHandle) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create signal runtime: {}", e);
                return;
            }
        };
        rt.block_on(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping netplay servers");
                stop.stop();
            }
        });
    });
}
