//! The brief intake core: field schema, conversation step, extraction,
//! merge policy, and prompt composition.

pub mod context;
pub mod extract;
pub mod fields;
pub mod merge;
pub mod prompts;
