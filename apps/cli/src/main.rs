use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use ccgx_core::FwMode;
use ccgx_core::session::{SessionConfig, UpdateSession};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "CCGx native HID firmware update tool", long_about = None)]
struct Cli {
    /// Load settings from a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show silicon id, running image and versions
    Info(DeviceArgs),
    /// Write a .cyacd firmware into the inactive image
    Flash {
        /// Firmware file
        firmware: Option<String>,

        /// Image the firmware is built for (fw1 or fw2)
        #[arg(long)]
        target: Option<FwMode>,

        /// Seconds to wait for the device after reset
        #[arg(long)]
        replug_timeout: Option<u64>,

        /// Retry failed HID transactions
        #[arg(long)]
        retries: bool,

        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Write the effective configuration to a file
    Config {
        /// Output path
        output: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,
    },
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// USB vendor id, e.g. 0x04b4
    #[arg(long, value_parser = parse_u16)]
    vid: Option<u16>,

    /// USB product id
    #[arg(long, value_parser = parse_u16)]
    pid: Option<u16>,

    /// Quirk as KEY=VALUE, e.g. CcgxFlashSize=0x20000
    #[arg(long = "quirk", value_parser = parse_quirk)]
    quirks: Vec<(String, String)>,
}

impl DeviceArgs {
    fn apply(self, config: &mut SessionConfig) {
        if self.vid.is_some() {
            config.vendor_id = self.vid;
        }
        if self.pid.is_some() {
            config.product_id = self.pid;
        }
        config.quirks.extend(self.quirks);
    }
}

fn parse_u16(s: &str) -> Result<u16, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid id {:?}: {}", s, e))
}

fn parse_quirk(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Command::Info(device) => {
            device.apply(&mut config);
            let summary = UpdateSession::new(config).info()?;
            println!("{}", summary);
        }
        Command::Flash {
            firmware,
            target,
            replug_timeout,
            retries,
            device,
        } => {
            device.apply(&mut config);
            if firmware.is_some() {
                config.firmware_path = firmware;
            }
            if config.firmware_path.is_none() {
                return Err(anyhow!("No firmware file given"));
            }
            if target.is_some() {
                config.target_mode = target;
            }
            if let Some(secs) = replug_timeout {
                config.replug_timeout_secs = secs;
            }
            config.transaction_retries |= retries;

            let summary = UpdateSession::new(config).flash()?;
            println!("{}", summary);
        }
        Command::Config { output, device } => {
            device.apply(&mut config);
            config.save_to_file(&output)?;
            info!(path = %output.display(), "Configuration written");
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
