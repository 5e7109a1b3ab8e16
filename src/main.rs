//! mars-cal - Calibration wizard for load cell and IMU hardware

use clap::{Parser, Subcommand};
use mars_cal::app::App;
use mars_cal::config::AppConfig;
use mars_cal::error::Result;
use mars_cal::paths::AppDirs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mars-cal")]
#[command(about = "Calibrate a load cell and up to three IMUs on an Arduino-family board")]
struct Cli {
    /// Configuration file; defaults to mars-cal.toml in the app data dir
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List serial ports and flag recognized boards")]
    Ports,
    #[command(about = "Stream device output until Ctrl-C")]
    Monitor {
        #[arg(long)]
        port: Option<String>,
    },
    #[command(about = "Install required board packages and libraries")]
    Setup,
    #[command(about = "Run the load cell calibration wizard")]
    Loadcell {
        /// Device identifier embedded in the saved record (0-9999)
        mars_id: u16,
        #[arg(long)]
        port: Option<String>,
        /// Known mass in grams; defaults to the configured value
        #[arg(long)]
        known_mass: Option<f64>,
    },
    #[command(about = "Run the sequential IMU calibration wizard")]
    Imu {
        /// Device identifier embedded in the saved record (0-9999)
        mars_id: u16,
        #[arg(long)]
        port: Option<String>,
    },
    #[command(about = "Rewrite one numeric constant in a firmware source file")]
    Patch {
        file: PathBuf,
        name: String,
        value: f64,
        /// Skip writing the .backup copy
        #[arg(long)]
        no_backup: bool,
    },
    #[command(about = "List saved calibration records, newest first")]
    History,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let dirs = AppDirs::resolve()?;
    dirs.create_all()?;

    let config_path = cli
        .config
        .unwrap_or_else(|| dirs.root.join("mars-cal.toml"));
    let config = AppConfig::load_or_default(&config_path)?;
    log::debug!("Using config: {}", config_path.display());

    let app = App::new(config, dirs);

    match cli.command {
        Commands::Ports => app.list_ports(),
        Commands::Monitor { port } => app.monitor(port),
        Commands::Setup => app.setup(),
        Commands::Loadcell {
            mars_id,
            port,
            known_mass,
        } => app.run_load_cell(port, mars_id, known_mass),
        Commands::Imu { mars_id, port } => app.run_imu(port, mars_id),
        Commands::Patch {
            file,
            name,
            value,
            no_backup,
        } => app.patch(&file, &name, value, !no_backup),
        Commands::History => app.history(),
    }
}
