//! Library entry for laminar-cli used by integration tests and embedding.

pub mod commands;
pub mod description;

pub use description::Registry;
