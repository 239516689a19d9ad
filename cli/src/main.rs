mod logging;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanlink_core::{ColorMode, Identity, PaperSize, Quality, ScanJobConfig, Scanner};

#[derive(Parser)]
#[command(name = "scanlink", about = "Client for a ScanSnap-class network scanner appliance")]
struct Cli {
    /// Emit debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Target appliance IP; omit to discover via broadcast.
    #[arg(long, global = true)]
    ip: Option<Ipv4Addr>,

    /// Discovery/connect timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    /// Pre-computed pairing identity; `pair` and `scan` fall back to
    /// their own `--identity`/`--password` handling if this is omitted.
    #[arg(long, global = true)]
    identity: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover an appliance on the LAN and print its identity.
    Discover,

    /// Pair with an appliance using a password or a pre-computed identity.
    Pair {
        /// Pairing password; if omitted (with no --identity either), it is
        /// derived from the appliance's serial number.
        #[arg(long)]
        password: Option<String>,

        /// Pre-computed pairing identity, as an alternative to --password.
        #[arg(long, conflicts_with = "password")]
        identity: Option<String>,
    },

    /// Connect to a previously paired appliance and run a scan job.
    Scan {
        /// Output directory for scanned pages.
        #[arg(long, default_value = "./scans")]
        output: PathBuf,

        /// Pairing identity to reserve the session with, overriding the
        /// global --identity.
        #[arg(long)]
        identity: Option<String>,

        #[arg(long, value_enum, default_value = "auto")]
        color: ColorArg,

        #[arg(long, value_enum, default_value = "auto")]
        quality: QualityArg,

        #[arg(long = "paper-size", value_enum, default_value = "auto")]
        paper_size: PaperArg,

        #[arg(long)]
        simplex: bool,

        #[arg(long)]
        bleed_through: bool,

        /// 0-10; only meaningful with --color bw.
        #[arg(long, default_value_t = 0)]
        bw_density: u8,

        /// Both default on; --no-multi-feed disables multi-feed detection.
        #[arg(long)]
        multi_feed: bool,
        #[arg(long)]
        no_multi_feed: bool,

        #[arg(long)]
        blank_page_removal: bool,
        #[arg(long)]
        no_blank_page_removal: bool,

        #[arg(long = "wait-button")]
        wait_button: bool,
    },
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum ColorArg {
    Auto,
    Color,
    Gray,
    Bw,
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum QualityArg {
    Auto,
    Normal,
    Fine,
    Superfine,
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum PaperArg {
    Auto,
    A4,
    A5,
    BusinessCard,
    Postcard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup(cli.verbose).ok();

    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Command::Discover => {
            let scanner = Scanner::discover(cli.ip, Identity::new(""), timeout)
                .await
                .context("discovery failed")?;
            println!("found appliance at {}", scanner.descriptor_host());
        }

        Command::Pair { password, identity } => {
            let identity = identity.or(cli.identity).map(Identity::new);
            let (_scanner, identity) = Scanner::pair(password.as_deref(), identity, cli.ip, timeout)
                .await
                .context("pairing failed")?;
            println!("paired. identity: {}", identity);
        }

        Command::Scan {
            output,
            identity,
            color,
            quality,
            paper_size,
            simplex,
            bleed_through,
            bw_density,
            multi_feed,
            no_multi_feed,
            blank_page_removal,
            no_blank_page_removal,
            wait_button,
        } => {
            let identity = identity
                .or(cli.identity)
                .context("--identity is required (or pass the global --identity)")?;

            let mut scanner = Scanner::discover(cli.ip, Identity::new(identity), timeout)
                .await
                .context("discovery failed")?;
            scanner.connect().await.context("connect failed")?;

            let config = ScanJobConfig {
                color_mode: color.into(),
                quality: quality.into(),
                duplex: !simplex,
                bleed_through,
                paper_size: paper_size.into(),
                bw_density,
                multi_feed_detection: multi_feed || !no_multi_feed,
                blank_page_removal: blank_page_removal || !no_blank_page_removal,
            };

            for (key, value) in config.describe() {
                log::info!("{}: {}", key, value);
            }

            let saved = scanner
                .scan_to_files(&output, &config, wait_button)
                .await
                .context("scan failed")?;
            println!("saved {} page(s) to {}", saved.len(), output.display());

            scanner.disconnect().await;
        }
    }

    Ok(())
}

impl From<ColorArg> for ColorMode {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => ColorMode::Auto,
            ColorArg::Color => ColorMode::Color,
            ColorArg::Gray => ColorMode::Gray,
            ColorArg::Bw => ColorMode::BlackAndWhite,
        }
    }
}

impl From<QualityArg> for Quality {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Auto => Quality::Auto,
            QualityArg::Normal => Quality::Normal,
            QualityArg::Fine => Quality::Fine,
            QualityArg::Superfine => Quality::Superfine,
        }
    }
}

impl From<PaperArg> for PaperSize {
    fn from(value: PaperArg) -> Self {
        match value {
            PaperArg::Auto => PaperSize::Auto,
            PaperArg::A4 => PaperSize::A4,
            PaperArg::A5 => PaperSize::A5,
            PaperArg::BusinessCard => PaperSize::BusinessCard,
            PaperArg::Postcard => PaperSize::Postcard,
        }
    }
}
