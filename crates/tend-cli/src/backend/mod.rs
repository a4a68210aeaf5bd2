//! Apply-backends shipped with the CLI.

pub mod dir;

pub use dir::DirBackend;
