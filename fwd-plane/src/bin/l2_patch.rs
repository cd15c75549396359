//! Cross-connects interfaces pairwise: everything received on one leaves on
//! its peer, unmodified.

use clap::Parser as _;
use fwd_plane::config::PatchArgs;
use fwd_plane::{Dataplane, Patch, Transport as _, app};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    app::init_logging();
    let args = PatchArgs::parse();
    let peers = args.peers()?;
    app::require_net_raw()?;

    let ports = app::open_ports(&args.ports)?;
    for pair in ports.chunks(2) {
        log::info!("patching {} <-> {}", pair[0].name(), pair[1].name());
    }
    let dataplane = Dataplane::with_burst(app::boxed(ports), Patch::new(peers), args.ports.burst);
    app::serve(dataplane).await
}
