//! Match analytics core: goal trend → momentum → outcome simulation.
//!
//! Everything here is synchronous and pure apart from the simulator's RNG;
//! callers hand in plain slices cloned from the event history.

pub mod error;
pub mod momentum;
pub mod params;
pub mod pipeline;
pub mod simulation;
pub mod stats;
pub mod trend;

pub use pipeline::{AbcPipeline, CombinedResult, MatchState};
