//! Plan generation
//!
//! Turns a natural-language request plus the current project graph into a
//! [`PlanProposal`] by calling an OpenAI-compatible chat completions
//! endpoint. Proposals are staged by the reconciler as a draft overlay and
//! only persisted on acceptance.

pub mod client;
pub mod models;
pub mod prompt;

pub use client::{HttpPlanGenerator, PlanGenerator, PlannerError};
pub use models::*;
