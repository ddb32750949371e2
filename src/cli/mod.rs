pub mod commands;
pub mod scan;

pub use commands::{Cli, Commands};
