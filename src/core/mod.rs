pub mod arc;
pub mod clock;
pub mod config;
pub mod magnitude;
pub mod orchestrator;
pub mod phase;
pub mod risk;
pub mod sync;
pub mod trigger;
