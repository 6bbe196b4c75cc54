//! The interactive pipeline: triggers in, spoken answers out.

pub mod controller;
pub mod trigger;

pub use controller::{
    PipelineContext, PipelineController, PipelineState, TriggerOutcome, failure_phrase,
};
pub use trigger::{Mode, read_triggers, spawn_stdin_reader};
