//! CLI Commands
//!
//! Argument definitions for the tradewind binary. Handlers live in `main.rs`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tradewind - autonomous Solana swap agent
#[derive(Parser, Debug)]
#[command(
    name = "tradewind",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Autonomous Solana swap agent",
    long_about = "Tradewind scans new Solana pairs, scores them for risk, buys the approved ones \
                  through Jupiter and manages exits with stop loss, profit targets and a kill switch."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

impl CliApp {
    /// Log filter chosen by flags; `None` defers to the config file
    pub fn log_level(&self) -> Option<&'static str> {
        if self.debug {
            Some("debug")
        } else if self.verbose {
            Some("info")
        } else {
            None
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the trading agent
    Run(RunCmd),

    /// Show wallet balance, open positions and the blacklist
    Status(StatusCmd),

    /// Quote a buy and check it against the order constraints
    Quote(QuoteCmd),

    /// Manage the persisted blacklist
    Blacklist(BlacklistCmd),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/tradewind.toml")]
    pub config: PathBuf,
}

/// Start trading
#[derive(Args, Debug)]
pub struct RunCmd {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Force demo mode (simulated fills) regardless of the config file
    #[arg(long, conflicts_with = "live")]
    pub demo: bool,

    /// Enable live mainnet trading (requires --i-accept-losses)
    #[arg(long, requires = "i_accept_losses")]
    pub live: bool,

    /// Acknowledge risk of financial loss (required for --live)
    #[arg(long)]
    pub i_accept_losses: bool,
}

impl RunCmd {
    /// Live trading needs the config to allow it or `--live`; `--demo`
    /// always wins
    pub fn demo_mode(&self, config_demo: bool) -> bool {
        if self.demo {
            return true;
        }
        if self.live && self.i_accept_losses {
            return false;
        }
        config_demo
    }
}

#[derive(Args, Debug)]
pub struct StatusCmd {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Number of recent trades to show
    #[arg(long, value_name = "N", default_value = "10")]
    pub trades: usize,
}

#[derive(Args, Debug)]
pub struct QuoteCmd {
    /// Mint address of the asset to buy
    #[arg(value_name = "ASSET")]
    pub asset: String,

    /// SOL to spend
    #[arg(value_name = "AMOUNT")]
    pub amount: f64,

    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(Args, Debug)]
pub struct BlacklistCmd {
    #[command(flatten)]
    pub config: ConfigArg,

    #[command(subcommand)]
    pub action: BlacklistAction,
}

#[derive(Subcommand, Debug)]
pub enum BlacklistAction {
    /// Blacklist an asset
    Add {
        asset: String,
        #[arg(long, default_value = "manual")]
        reason: String,
        /// Hours until the entry expires; omit for a permanent entry
        #[arg(long, value_name = "HOURS")]
        hours: Option<u64>,
    },
    /// Remove an asset from the blacklist
    Remove { asset: String },
    /// Show current entries
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliApp, clap::Error> {
        CliApp::try_parse_from(std::iter::once("tradewind").chain(args.iter().copied()))
    }

    #[test]
    fn test_live_requires_acknowledgement() {
        assert!(parse(&["run", "--live"]).is_err());
        assert!(parse(&["run", "--live", "--i-accept-losses"]).is_ok());
        assert!(parse(&["run", "--live", "--demo", "--i-accept-losses"]).is_err());
    }

    #[test]
    fn test_demo_mode_resolution() {
        let Command::Run(cmd) = parse(&["run"]).unwrap().command else {
            panic!("expected run");
        };
        assert!(cmd.demo_mode(true));
        assert!(!cmd.demo_mode(false));

        let Command::Run(cmd) = parse(&["run", "--demo"]).unwrap().command else {
            panic!("expected run");
        };
        assert!(cmd.demo_mode(false));

        let Command::Run(cmd) = parse(&["run", "--live", "--i-accept-losses"]).unwrap().command else {
            panic!("expected run");
        };
        assert!(!cmd.demo_mode(true));
    }

    #[test]
    fn test_global_log_flags() {
        let app = parse(&["status", "--debug"]).unwrap();
        assert_eq!(app.log_level(), Some("debug"));
        let app = parse(&["-v", "status"]).unwrap();
        assert_eq!(app.log_level(), Some("info"));
        assert_eq!(parse(&["status"]).unwrap().log_level(), None);
    }

    #[test]
    fn test_quote_and_blacklist_args() {
        let app = parse(&["quote", "MintA", "0.1", "-c", "other.toml"]).unwrap();
        let Command::Quote(cmd) = app.command else {
            panic!("expected quote");
        };
        assert_eq!(cmd.asset, "MintA");
        assert_eq!(cmd.amount, 0.1);
        assert_eq!(cmd.config.config, PathBuf::from("other.toml"));

        let app = parse(&["blacklist", "add", "MintA", "--hours", "6"]).unwrap();
        let Command::Blacklist(cmd) = app.command else {
            panic!("expected blacklist");
        };
        assert!(matches!(
            cmd.action,
            BlacklistAction::Add { ref asset, hours: Some(6), .. } if asset == "MintA"
        ));
    }
}
