//! Moment Engine: timing and reward pacing for conversational training
//! sessions.
//!
//! Decides which pacing phase a session is in, whether an outcome earns a
//! reward and how strong it is, and schedules that reward as a short
//! delivery arc rendered in sync across visual, audio and haptic channels.
//! The renderer is an external collaborator: the engine only emits timed
//! presentation instructions.

pub mod core;
pub mod schema;
