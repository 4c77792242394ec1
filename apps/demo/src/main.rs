mod args;
mod scenario;

use crate::args::DemoArgs;
use canopy_logger::Logger;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = DemoArgs::parse();

    let mut logger = Logger::builder().name(env!("CARGO_PKG_NAME")).console(true).level(args.log_level);
    if args.json {
        logger = logger.json();
    }
    let _logger = logger.init()?;

    let summary = scenario::run(&args);
    if !summary.failures.is_empty() {
        tracing::warn!(failures = summary.failures.len(), "Some subscribers rejected the event");
    }

    Ok(())
}
