//! Domain types for TuneLab.

pub mod bar;
pub mod params;
pub mod signal;
pub mod timeframe;

pub use bar::{closes, sanitize_bars, PriceBar};
pub use params::{ParamError, ParameterSet, Signature, MAX_PERIOD};
pub use signal::{Signal, SignalKind};
pub use timeframe::{TimeUnit, Timeframe, TimeframeError};
