// CLI module - tail, publish and config commands over the live pipeline
pub mod args;
pub mod commands;
pub mod output;

pub use args::{Args, Command, ConnectArgs, OutputFormat};
pub use commands::execute_command;
pub use output::{ConsoleWriter, ListSizes, OutputWriter};
