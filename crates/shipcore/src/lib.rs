//! `shipcore`: the command interpretation and progression engine.
//!
//! A command travels: world lockout check -> location gate -> turbo-mode
//! fast path -> semantic cache -> model gateway, then promotion, state
//! application, XP accounting and a cache write. Everything observable by
//! callers is a [`shipproto::CommandOutcome`]; failures inside the pipeline
//! surface as fixed in-universe narrations, never as raw errors.

pub mod engine;
pub mod gate;
pub mod model;
pub mod progress;
pub mod semcache;
pub mod tables;
pub mod turbo;

pub use engine::{Engine, LocationError};
pub use model::ModelGateway;
