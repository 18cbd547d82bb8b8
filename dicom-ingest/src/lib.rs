pub mod cli;
pub mod envelope;
pub mod load_config;
pub mod observer;
pub mod upload;

pub use cli::{run, Cli, Commands};
