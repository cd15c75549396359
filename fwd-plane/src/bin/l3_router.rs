//! Static IPv4/IPv6 router across all given interfaces.

use clap::Parser as _;
use fwd_plane::config::RouterArgs;
use fwd_plane::{Dataplane, app};
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    app::init_logging();
    let args = RouterArgs::parse();
    let (v4, v6) = args.tables()?;
    log::info!("IPv4 routes: {}", v4.stats());
    log::info!("IPv6 routes: {}", v6.stats());
    app::require_net_raw()?;

    let ports = app::open_ports(&args.ports)?;
    let macs = ports.iter().map(|p| p.mac()).collect();
    let router = args.router(Arc::new(v4), Arc::new(v6), macs)?;
    let dataplane = Dataplane::with_burst(app::boxed(ports), router, args.ports.burst);
    app::serve(dataplane).await
}
