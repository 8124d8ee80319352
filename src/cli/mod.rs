//! CLI command implementations

pub mod crawl;
pub mod error;

pub use crawl::Cli;
pub use error::CliError;
