//! CLI command implementations

use clap::Subcommand;

pub mod converse;
pub mod detect;
pub mod list;

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Identify the language of independent texts
    Detect(detect::DetectArgs),

    /// Identify a conversation, one message per line, sharing one context
    Converse(converse::ConverseArgs),

    /// List available components
    List {
        #[command(subcommand)]
        subcommand: ListCommands,
    },
}

/// List subcommands
#[derive(Debug, Subcommand)]
pub enum ListCommands {
    /// List registered detection backends
    Backends,

    /// List voting strategies
    Strategies,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_commands_variants() {
        let debug_str = format!("{:?}", ListCommands::Backends);
        assert!(debug_str.contains("Backends"));

        let list_cmd = Commands::List {
            subcommand: ListCommands::Strategies,
        };
        let debug_str = format!("{:?}", list_cmd);
        assert!(debug_str.contains("List"));
        assert!(debug_str.contains("Strategies"));
    }
}
