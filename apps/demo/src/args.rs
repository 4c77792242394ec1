use canopy_bus::BroadcastDirection;
use canopy_logger::LevelFilter;
use clap::{Parser, ValueEnum};

/// Builds an app → module → session bus tree and publishes one session event.
#[derive(Debug, Parser)]
#[command(name = "canopy", version, about)]
pub(crate) struct DemoArgs {
    /// Module nodes attached under the application node.
    #[arg(long, default_value_t = 3)]
    pub modules: usize,

    /// Session nodes attached under every module.
    #[arg(long, default_value_t = 2)]
    pub sessions: usize,

    /// Broadcast direction of the published topic.
    #[arg(long, value_enum, default_value_t = Direction::ToChildren)]
    pub direction: Direction,

    /// Make every n-th subscriber reject the event (0 disables failures).
    #[arg(long, default_value_t = 0)]
    pub fail_every: usize,

    /// Default log level (`RUST_LOG` directives still apply on top).
    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,

    /// Log one JSON object per line instead of compact text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Direction {
    None,
    ToChildren,
    ToParent,
    ToDirectChildren,
}

impl From<Direction> for BroadcastDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::None => Self::None,
            Direction::ToChildren => Self::ToChildren,
            Direction::ToParent => Self::ToParent,
            Direction::ToDirectChildren => Self::ToDirectChildren,
        }
    }
}
