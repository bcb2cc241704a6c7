//! `tms`: command-line access to a TMS store.

mod settings;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tms_core::{
    read_backup_file, write_backup_file, CredentialAttempt, GateOutcome, KeyValueStore, Workspace,
};
use tracing_subscriber::EnvFilter;

use crate::settings::CliSettings;

/// Environment variable holding the log filter, e.g. `TMS_LOG=tms_core=debug`.
const LOG_ENV: &str = "TMS_LOG";

#[derive(Debug, Parser)]
#[command(name = "tms")]
#[command(about = "Inspect, back up and restore a timetable management store.")]
struct Cli {
    /// Store file to use instead of the one in the settings file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the value stored under a key.
    Get { key: String },
    /// Store a value; text that is not JSON is stored as a string.
    Set { key: String, value: String },
    /// Remove a key.
    Delete { key: String },
    /// List every key in the store.
    Keys,
    /// Write a backup file (or print the snapshot with `--stdout`).
    Export {
        /// Directory to write into instead of the configured backup directory.
        #[arg(long, conflicts_with = "stdout")]
        dir: Option<PathBuf>,
        #[arg(long)]
        stdout: bool,
    },
    /// Apply a backup file if it is newer than the last one applied.
    Import { file: PathBuf },
    /// Check that the store is writable and estimate free space.
    Probe,
    /// Delete every key that is not a primary record, timetable or sync state.
    Evict,
    /// Print this store's device ID and last sync.
    Device,
    /// List courses.
    Courses,
    /// Split a course year into Division A and Division B.
    Split(DivisionArgs),
    /// Merge a split course year back into one division.
    Merge(DivisionArgs),
    /// Print a student's attendance summary.
    Attendance { student_id: String },
    /// Print the effective settings; `--save` writes them to the settings file.
    Config {
        #[arg(long)]
        save: bool,
    },
}

#[derive(Debug, Args)]
struct DivisionArgs {
    course: String,
    year: u32,
    #[command(flatten)]
    admin: AdminArgs,
}

#[derive(Debug, Args)]
struct AdminArgs {
    #[arg(long, default_value = "")]
    username: String,
    #[arg(long, default_value = "")]
    password: String,
}

impl AdminArgs {
    fn attempt(&self) -> CredentialAttempt {
        CredentialAttempt::new(self.username.as_str(), self.password.as_str())
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut settings = settings::load_settings();
    if let Some(db) = &cli.db {
        settings.database_path = db.to_string_lossy().to_string();
    }

    if let Command::Config { save } = cli.command {
        if save {
            settings::save_settings(&settings)?;
            log::info!("settings written to {}", settings::settings_file_path().display());
        }
        return print_json(&mut io::stdout(), &settings);
    }

    let mut workspace = open_workspace(&settings)?;
    execute(&mut workspace, cli.command, &settings, &mut io::stdout())
}

fn open_workspace(settings: &CliSettings) -> anyhow::Result<Workspace> {
    let path = Path::new(&settings.database_path);
    let config = settings.workspace.clone();
    if path.exists() {
        Workspace::open(path, config)
            .with_context(|| format!("Failed to open store {}", path.display()))
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
        }
        log::info!("creating new store at {}", path.display());
        Workspace::create(path, config)
            .with_context(|| format!("Failed to create store {}", path.display()))
    }
}

fn execute<S: KeyValueStore>(
    ws: &mut Workspace<S>,
    command: Command,
    settings: &CliSettings,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Get { key } => match ws.get_value(&key)? {
            Some(value) => print_json(out, &value)?,
            None => bail!("no value stored under '{key}'"),
        },
        Command::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            ws.save_data_reclaiming(&key, &value)
                .map_err(|e| anyhow::anyhow!(e.user_message()))
                .with_context(|| format!("Failed to save '{key}'"))?;
        }
        Command::Delete { key } => ws.delete_data(&key)?,
        Command::Keys => {
            for key in ws.list_keys()? {
                writeln!(out, "{key}")?;
            }
        }
        Command::Export { dir, stdout } => {
            let snapshot = ws.export_snapshot()?;
            if stdout {
                print_json(out, &snapshot)?;
            } else {
                let dir = dir.unwrap_or_else(|| PathBuf::from(&settings.backup_directory));
                std::fs::create_dir_all(&dir).context("Failed to create backup directory")?;
                let path = write_backup_file(&dir, &snapshot).context("Failed to write backup")?;
                writeln!(out, "{}", path.display())?;
            }
        }
        Command::Import { file } => {
            let snapshot = read_backup_file(&file)
                .with_context(|| format!("Failed to read backup {}", file.display()))?;
            if ws.import_snapshot(&snapshot)? {
                writeln!(out, "applied {} keys from {}", snapshot.data.len(), snapshot.device_id)?;
            } else {
                writeln!(out, "skipped: backup is not newer than the last sync")?;
            }
        }
        Command::Probe => print_json(out, &ws.probe_storage())?,
        Command::Evict => {
            for key in ws.evict_non_essential()? {
                writeln!(out, "{key}")?;
            }
        }
        Command::Device => print_json(out, ws.sync_state())?,
        Command::Courses => print_json(out, &ws.courses()?)?,
        Command::Split(args) => {
            let outcome = ws.split_division(&args.admin.attempt(), &args.course, args.year)?;
            report_gate(out, outcome)?;
        }
        Command::Merge(args) => {
            let outcome = ws.merge_divisions(&args.admin.attempt(), &args.course, args.year)?;
            report_gate(out, outcome)?;
        }
        Command::Attendance { student_id } => {
            print_json(out, &ws.attendance_summary(&student_id)?)?;
        }
        Command::Config { .. } => print_json(out, settings)?,
    }
    Ok(())
}

fn report_gate(out: &mut impl Write, outcome: GateOutcome) -> anyhow::Result<()> {
    match outcome {
        GateOutcome::Applied => writeln!(out, "done")?,
        GateOutcome::Unchanged => writeln!(out, "nothing to change")?,
        GateOutcome::Denied => bail!("admin credentials did not match"),
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}
