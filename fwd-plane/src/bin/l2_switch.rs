//! Learning L2 switch across all given interfaces.

use clap::Parser as _;
use fwd_plane::config::SwitchArgs;
use fwd_plane::{Dataplane, Switch, app};
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    app::init_logging();
    let args = SwitchArgs::parse();
    let table = Arc::new(args.mac_table()?);
    log::info!("MAC table: {}", table.stats());
    app::require_net_raw()?;

    let ports = app::open_ports(&args.ports)?;
    let switch = Switch::new(table, args.native_vlan);
    let dataplane = Dataplane::with_burst(app::boxed(ports), switch, args.ports.burst);
    app::serve(dataplane).await
}
