//! Correction client command line construction.

mod args;

pub use args::{ClientCommandBuilder, ClientVersion, LaunchCommand};
