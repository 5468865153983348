// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use steno_driver::TransportKind;

#[derive(Parser)]
#[command(name = "steno-capture")]
#[command(author, version, about = "Stenograph writer stroke capture")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/stenograph/capture.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Transport backend (auto, bulk, raw)
    #[arg(short, long, global = true)]
    pub transport: Option<TransportKind>,

    /// Response read timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub read_timeout_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture strokes and print one per line (default)
    #[command(visible_alias = "c")]
    Capture,

    /// List connected writers
    #[command(visible_aliases = ["ls", "l"])]
    List,

    /// Show the key layout and the stroke bit chart
    Chart,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::parse_from([
            "steno-capture",
            "list",
            "--transport",
            "bulk",
            "--read-timeout-ms",
            "250",
        ]);
        assert!(matches!(cli.command, Some(Commands::List)));
        assert_eq!(cli.transport, Some(TransportKind::Bulk));
        assert_eq!(cli.read_timeout_ms, Some(250));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn no_subcommand_means_capture() {
        let cli = Cli::parse_from(["steno-capture"]);
        assert!(cli.command.is_none());
    }
}
