//! Orchestrates the pipeline end to end (`orchestrator`) and wraps a bundle
//! for optional upload to a remote FHIR server (`client`).

pub mod client;
pub mod orchestrator;

pub use orchestrator::{MessageOutcome, Orchestrator};
