//! Process plumbing shared by the binaries: logging setup, the capability
//! check, opening the interfaces and running a dataplane until SIGINT.
//!
//! The dataplane loop blocks in `poll(2)`, so it runs on the blocking pool
//! while the async side only waits for the signal and then cancels the token
//! the loop checks between waits.

use crate::config::PortArgs;
use crate::dataplane::Dataplane;
use crate::forward::Forwarder;
use crate::raw_socket::RawSocket;
use crate::transport::Transport;
use anyhow::Context as _;
use caps::{CapSet, Capability};
use tokio_util::sync::CancellationToken;

/// `info` by default, `RUST_LOG` overrides.
pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

pub fn require_net_raw() -> anyhow::Result<()> {
    let granted = caps::has_cap(None, CapSet::Effective, Capability::CAP_NET_RAW)
        .context("failed to read process capabilities")?;
    anyhow::ensure!(
        granted,
        "CAP_NET_RAW is required to open raw sockets (run as root or grant the capability)"
    );
    Ok(())
}

/// Opens a raw socket on every configured interface, in port order.
pub fn open_ports(args: &PortArgs) -> anyhow::Result<Vec<RawSocket>> {
    args.interfaces
        .iter()
        .map(|name| {
            RawSocket::open(name, !args.no_promiscuous)
                .with_context(|| format!("failed to open interface {name}"))
        })
        .collect()
}

pub fn boxed(ports: Vec<RawSocket>) -> Vec<Box<dyn Transport>> {
    ports
        .into_iter()
        .map(|p| Box::new(p) as Box<dyn Transport>)
        .collect()
}

/// Runs `dataplane` on a blocking thread until SIGINT or until the loop
/// fails.
pub async fn serve<F: Forwarder + 'static>(mut dataplane: Dataplane<F>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let mut worker = tokio::task::spawn_blocking(move || dataplane.run(&token));

    let joined = tokio::select! {
        joined = &mut worker => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => log::info!("SIGINT received, stopping"),
                Err(e) => log::error!("failed to wait for SIGINT: {e}"),
            }
            shutdown.cancel();
            worker.await
        }
    };
    joined
        .context("dataplane thread panicked")?
        .context("dataplane stopped with an error")
}
