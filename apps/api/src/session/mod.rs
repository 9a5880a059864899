//! Session API: persistence, language resolution, and HTTP handlers.

pub mod handlers;
pub mod language;
pub mod store;
