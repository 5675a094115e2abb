//! Plain data exchanged with the engine's collaborators.

pub mod instruction;
pub mod outcome;
pub mod session;
pub mod tier;
