//! Command-line interface for drmprobe

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use drmprobe::prelude::*;
use drmprobe::{DriverOpener, OpenerConfig};
use log::debug;
use std::path::PathBuf;

/// Exit status for "this machine cannot run the test"
const EXIT_SKIP: i32 = 77;

#[derive(Parser)]
#[command(name = "drmprobe")]
#[command(version = drmprobe::VERSION)]
#[command(about = "Find, open and idle DRM devices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file overriding node paths and index ranges
    #[arg(short, long, env = "DRMPROBE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// List present device nodes and their drivers
    Devices,

    /// Print the legacy index of the first supported intel card
    Card,

    /// Open a device the way a test would
    Open {
        /// Accepted drivers, comma separated (intel, vc4, vgem, virtio, any)
        #[arg(short, long, default_value = "any")]
        driver: DriverMask,

        /// Prefer a render node
        #[arg(long, conflicts_with = "master")]
        render: bool,

        /// Become DRM master after opening
        #[arg(long)]
        master: bool,
    },

    /// Open an intel device and idle it
    Quiesce,

    /// Show version information
    Version,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    drmprobe::init();

    let config = match &cli.config {
        Some(path) => OpenerConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => OpenerConfig::default(),
    };
    debug!("using {:?}", config);

    match run(&cli, config) {
        Err(e) if e.is_skip() => {
            eprintln!("skipped: {}", e);
            std::process::exit(EXIT_SKIP);
        }
        other => other.context("drmprobe failed"),
    }
}

fn run(cli: &Cli, config: OpenerConfig) -> DrmResult<()> {
    let opener = DriverOpener::with_config(config);

    match &cli.command {
        Commands::Devices => {
            let reports = opener.scanner().list_nodes();
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
                OutputFormat::Text if reports.is_empty() => println!("No DRM nodes found."),
                OutputFormat::Text => {
                    for r in &reports {
                        let driver = r.driver.as_deref().unwrap_or("?");
                        match (&r.error, &r.platform) {
                            (Some(e), _) => println!("{:<20} {:<6} error: {}", r.node, driver, e),
                            (None, Some(platform)) => {
                                println!("{:<20} {:<6} {}", r.node, driver, platform)
                            }
                            (None, None) => println!("{:<20} {}", r.node, driver),
                        }
                    }
                }
            }
        }

        Commands::Card => {
            let index = opener.find_card_index()?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "card": index })),
                OutputFormat::Text => println!("{}", index),
            }
        }

        Commands::Open {
            driver,
            render,
            master,
        } => {
            let dev = if *render {
                opener.open_driver_render(*driver)?
            } else if *master {
                opener.open_driver_master(*driver)?
            } else {
                opener.open_driver(*driver)?
            };

            let session = if *render {
                opener.render_session().snapshot()
            } else {
                opener.legacy_session().snapshot()
            };
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "path": dev.path(),
                        "driver": dev.driver_name()?,
                        "device_id": drmprobe::detected_device_id(),
                        "session": session,
                    })
                ),
                OutputFormat::Text => {
                    println!("{} ({})", dev.path().display(), dev.driver_name()?);
                    if let Some(devid) = drmprobe::detected_device_id() {
                        println!("  chipset 0x{:04x}, gen {}", devid, drmprobe::intel_gen(devid));
                    }
                    println!("  session {:?}, {} open(s)", session.state, session.open_count);
                }
            }
        }

        Commands::Quiesce => {
            let dev = opener.open_driver(DriverMask::INTEL)?;
            require_intel(&dev)?;
            let report = force_quiescent(&dev)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!(
                    "{}: {} submissions accepted, {} rejected, caches {}",
                    dev.path().display(),
                    report.accepted,
                    report.rejected,
                    if report.caches_dropped { "dropped" } else { "kept" }
                ),
            }
        }

        Commands::Version => {
            println!("drmprobe v{}", drmprobe::version());
            println!("DRM device selection for GPU driver tests");
        }
    }

    Ok(())
}
