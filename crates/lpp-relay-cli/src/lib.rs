//! The `lpp-relay` binary's library half: argument parsing, logging,
//! composition and the run loop.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used by main.rs
use anyhow as _;
use dotenvy as _;

pub mod bootstrap;
pub mod error;
pub mod logging;
pub mod parser;
pub mod relay;
pub mod signals;

pub use bootstrap::{RelayContext, bootstrap};
pub use error::{CliError, child_exit_code};
pub use parser::Cli;

/// Compose the relay from `cli` and run it to completion.
pub async fn run(cli: &Cli) -> Result<i32, CliError> {
    let ctx = bootstrap(cli)?;
    relay::run(ctx).await
}
