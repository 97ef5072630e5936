//! Library crate for recon-jobs-rs: scan job registry, launcher, and artifact access.
pub mod artifacts;
pub mod config;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod registry;
pub mod server;
pub mod types;
