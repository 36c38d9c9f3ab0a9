//! Run lifecycle: ten ordered stages from PRD to manifest.
//!
//! Stages run strictly one after another. Each spec stage calls its agent
//! through [`AgentInvoker`](crate::agents::AgentInvoker), validates the
//! payload against the contracts and stores it. After implementation the
//! project is verified, gated and, when the gate fails, repaired.
//!
//! Any error ends the run. The [`PipelineResult`] still carries whatever
//! artifacts were stored before the failure, along with a `failed` manifest.

pub mod events;
mod orchestrator;
mod stage;

pub use events::{EventSender, PipelineEvent};
pub use orchestrator::{PipelineConfig, PipelineOptions, PipelineOrchestrator, PipelineResult};
pub use stage::Stage;
