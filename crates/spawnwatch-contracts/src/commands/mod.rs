mod parser;
mod registry;

pub use parser::{parse_command, Command};
pub use registry::command_help;
