//! Signal generation module
//!
//! Turns venue quotes into net spreads and spreads into entry/exit decisions

mod detector;
mod spread;
mod types;

pub use detector::{Decision, DetectorConfig, OpportunityDetector, OpportunityState};
pub use spread::{SpreadCalculator, SpreadConfig};
pub use types::{Direction, InvalidReason, Spread};
