mod app;
mod config;
mod console;
mod preview;
mod report;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use config::Config;
use console::MenuChoice;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcall", about = "Webcam face-recognition attendance", version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    /// Run one mode directly instead of showing the menu
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags that override the config file and environment.
#[derive(Args)]
struct Overrides {
    /// Config file (default: ./rollcall.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory of <name>.jpg face images
    #[arg(long, global = true)]
    faces_dir: Option<PathBuf>,
    /// Attendance CSV file
    #[arg(long, global = true)]
    attendance_log: Option<PathBuf>,
    /// Directory containing det_10g.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// V4L2 device path (e.g., /dev/video0)
    #[arg(long, global = true)]
    camera: Option<String>,
    /// Similarity a match must exceed to be recognized
    #[arg(long, global = true)]
    threshold: Option<f64>,
    /// Write an annotated preview frame to this JPEG file
    #[arg(long, global = true)]
    preview: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.faces_dir {
            config.faces_dir = v;
        }
        if let Some(v) = self.attendance_log {
            config.attendance_log = v;
        }
        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        if let Some(v) = self.camera {
            config.camera_device = v;
        }
        if let Some(v) = self.threshold {
            config.similarity_threshold = v;
        }
        if let Some(v) = self.preview {
            config.preview_path = Some(v);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces and log attendance until 'q'
    Attend,
    /// Register a new face from the camera
    Enroll {
        /// Name to register (becomes faces/<name>.jpg)
        #[arg(short, long)]
        name: String,
    },
    /// List registered faces
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show the attendance log
    Log {
        /// Only records from this day (DD-MM-YYYY)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, rollcall_core::attendance::DATE_FORMAT)
        .map_err(|e| format!("expected DD-MM-YYYY: {e}"))
}

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.overrides.config.as_deref())?;
    cli.overrides.apply(&mut config);
    tracing::debug!(?config, "configuration resolved");

    match cli.command {
        None => run_menu(config),
        Some(Commands::Attend) => app::App::start(config)?.take_attendance(),
        Some(Commands::Enroll { name }) => app::App::start(config)?.register_face(&name),
        Some(Commands::List { json }) => report::list_faces(&config.faces_dir, json),
        Some(Commands::Log { date, json }) => report::show_log(&config.attendance_log, date, json),
        Some(Commands::Devices) => {
            report::list_devices();
            Ok(())
        }
    }
}

fn run_menu(config: Config) -> Result<()> {
    let mut app = app::App::start(config)?;

    match console::prompt_menu()? {
        MenuChoice::TakeAttendance => app.take_attendance(),
        MenuChoice::RegisterFace => {
            let name = console::prompt_name()?;
            app.register_face(&name)
        }
        MenuChoice::Exit => {
            println!("Exiting...");
            Ok(())
        }
        MenuChoice::Invalid => {
            println!("Invalid choice.");
            Ok(())
        }
    }
}
