//! TuneLab Live: the consumer side of published parameters.
//!
//! - `StrategyState`: owned strategy, parameters and FLAT/LONG position
//! - `ExecutionVenue` boundary and `PaperVenue`
//! - Bar-boundary clock
//! - `HotReloader`: version-gated, cooldown-limited parameter swaps
//! - `LiveTrader`: the per-bar decision loop

pub mod clock;
pub mod reload;
pub mod state;
pub mod trader;
pub mod venue;

pub use reload::{HotReloader, ReloadOutcome};
pub use state::{PositionState, StrategyState};
pub use trader::{LiveCycle, LiveError, LiveTrader, TradeAction, TraderSettings};
pub use venue::{ExecutionVenue, Fill, PaperVenue, Side, VenueError};
