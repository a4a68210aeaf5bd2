//! Subcommand implementations

pub mod apply;
pub mod fingerprint;
pub mod score;
pub mod serialize;
