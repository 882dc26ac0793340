//! HL7 v2 to FHIR R4 conversion plus PIQI data-quality scoring.
//!
//! `hl7` parses raw messages, `fhir` builds and assembles resources,
//! `piqi` evaluates a scored bundle against a declarative rule profile,
//! `pipeline` wires the three together end to end.

pub mod config;
pub mod error;
pub mod fhir;
pub mod hl7;
pub mod pipeline;
pub mod piqi;
