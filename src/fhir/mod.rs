//! FHIR R4 resource construction: builders for the individual resource
//! types (`builders`), shared coding helpers (`coding`), id generation
//! (`ids`), and message-type dispatch into a full Bundle (`bundle`).

pub mod builders;
pub mod bundle;
pub mod coding;
pub mod ids;

pub use bundle::convert_message_to_bundle;
