//! HL7 v2 text parsing: lexing raw text into messages/segments/fields
//! (`lexer`), and typed access into segments (`accessor`).

pub mod accessor;
pub mod lexer;

pub use lexer::{Message, Segment};
