//! Prints a scan page through a saved view as tab-separated text.

use clap::Parser;
use viewgrid_sync::inspect::{run, InspectArgs};
use viewgrid_sync::logging::init_tracing;

fn main() -> anyhow::Result<()> {
    let args = InspectArgs::parse();
    init_tracing(args.log_format)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(&args, &mut out)
}
