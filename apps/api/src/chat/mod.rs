//! One chat turn: wire shapes and the orchestrator.

pub mod events;
pub mod turn;
