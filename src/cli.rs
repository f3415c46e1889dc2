use adshot_lib::Viewport;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "adshot")]
#[command(
    version,
    about = "Ad screenshot worker - capture proof-of-placement screenshots of live ads",
    long_about = "adshot\n\nModes:\n- run: consume capture messages (one per line, JSON or backlog format) and capture them with bounded concurrency.\n- capture: capture a single placement synchronously and print the stored record.\n- reap: kill browser processes of this worker that outlived their lifetime.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML); ADSHOT_* environment variables and CLI flags override it"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume capture messages and process them until the input ends
    Run {
        #[arg(
            long,
            value_name = "PATH",
            help = "Read messages from this file instead of stdin"
        )]
        input: Option<PathBuf>,

        #[command(flatten)]
        stores: StoreArgs,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Capture one placement and print the stored record as JSON
    Capture {
        #[arg(long, help = "Publisher page to capture")]
        url: String,

        #[arg(long, help = "Placement id")]
        pid: String,

        #[arg(long = "crg-id", help = "Creative group id")]
        crg_id: String,

        #[arg(long, help = "Expected pane count for multi-pane placements")]
        pane_count: Option<u32>,

        #[command(flatten)]
        stores: StoreArgs,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Run one reaper sweep and report how many browser processes were killed
    Reap {
        #[arg(
            long,
            help = "Lifetime in seconds; defaults to session_max_lifetime from config"
        )]
        max_lifetime_secs: Option<u64>,

        #[arg(
            long,
            help = "Sweep browser children of this worker pid instead of this process"
        )]
        parent: Option<u32>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(
        long,
        value_name = "PATH",
        default_value = "placements.toml",
        help = "Placement catalog (TOML)"
    )]
    pub catalog: PathBuf,

    #[arg(
        long,
        value_name = "PATH",
        default_value = "screenshots.jsonl",
        help = "Screenshot record store (JSON lines)"
    )]
    pub records: PathBuf,
}

/// Flags that override config values when present.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    #[arg(long, help = "Maximum concurrent browser sessions")]
    pub max_concurrent: Option<usize>,

    #[arg(long, help = "Browser viewport (WIDTHxHEIGHT)")]
    pub viewport: Option<Viewport>,

    #[arg(long, help = "Output image size (WIDTHxHEIGHT)")]
    pub clip: Option<Viewport>,

    #[arg(long, help = "Navigation and element search deadline in milliseconds")]
    pub nav_timeout_ms: Option<u64>,

    #[arg(long, help = "Session lifetime in seconds before the reaper kills it")]
    pub max_lifetime_secs: Option<u64>,

    #[arg(long, help = "User agent string")]
    pub user_agent: Option<String>,

    #[arg(long, help = "Attempts per element poll phase")]
    pub poll_retries: Option<u32>,

    #[arg(long, help = "Delay between poll attempts in milliseconds")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, value_name = "DIR", help = "Where screenshots are written before upload")]
    pub screenshot_dir: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Chromium binary")]
    pub chrome: Option<PathBuf>,

    #[arg(long, help = "Show the browser window")]
    pub headful: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_defaults() {
        let cli = Cli::parse_from(["adshot", "run"]);
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Run {
                input,
                stores,
                overrides,
            } => {
                assert!(input.is_none());
                assert_eq!(stores.catalog, PathBuf::from("placements.toml"));
                assert_eq!(stores.records, PathBuf::from("screenshots.jsonl"));
                assert!(overrides.max_concurrent.is_none());
                assert!(!overrides.headful);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn capture_command_parses_ids_and_overrides() {
        let cli = Cli::parse_from([
            "adshot",
            "capture",
            "--url",
            "example.com",
            "--pid",
            "p1",
            "--crg-id",
            "c1",
            "--pane-count",
            "3",
            "--clip",
            "300x250",
            "--nav-timeout-ms",
            "15000",
            "--verbose",
            "--config",
            "adshot.toml",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("adshot.toml")));
        match cli.command {
            Commands::Capture {
                url,
                pid,
                crg_id,
                pane_count,
                overrides,
                ..
            } => {
                assert_eq!(url, "example.com");
                assert_eq!(pid, "p1");
                assert_eq!(crg_id, "c1");
                assert_eq!(pane_count, Some(3));
                assert_eq!(overrides.clip, Some(Viewport::new(300, 250)));
                assert_eq!(overrides.nav_timeout_ms, Some(15000));
            }
            _ => panic!("expected capture command"),
        }
    }

    #[test]
    fn reap_accepts_lifetime() {
        let cli = Cli::parse_from([
            "adshot",
            "reap",
            "--max-lifetime-secs",
            "90",
            "--parent",
            "4242",
        ]);
        match cli.command {
            Commands::Reap {
                max_lifetime_secs,
                parent,
            } => {
                assert_eq!(max_lifetime_secs, Some(90));
                assert_eq!(parent, Some(4242));
            }
            _ => panic!("expected reap command"),
        }
    }

    #[test]
    fn capture_requires_ids() {
        assert!(Cli::try_parse_from(["adshot", "capture", "--url", "a.com"]).is_err());
    }
}
