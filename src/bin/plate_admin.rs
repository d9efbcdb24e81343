//! plate_admin - vehicle registry and detection history tool

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use plate_watch::storage::DEFAULT_DETECTION_LIMIT;
use plate_watch::SqliteStore;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the vehicle database.
    #[arg(long, env = "PLATE_WATCH_DB_PATH", default_value = "vehicle.db")]
    db_path: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a vehicle to the registry.
    Register {
        #[arg(long)]
        plate: String,
        #[arg(long)]
        province: Option<String>,
        #[arg(long)]
        driver_name: Option<String>,
    },
    /// List registered vehicles.
    Vehicles,
    /// List recent detections, newest first.
    Detections {
        #[arg(long, default_value_t = DEFAULT_DETECTION_LIMIT)]
        limit: usize,
    },
    /// Write the latest snapshot of a plate to a JPEG file.
    Snapshot {
        #[arg(long)]
        plate: String,
        #[arg(long, default_value = "snapshot.jpg")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut store = SqliteStore::open(&args.db_path)?;

    match args.command {
        Command::Register {
            plate,
            province,
            driver_name,
        } => {
            store.register_vehicle(&plate, province.as_deref(), driver_name.as_deref())?;
            log::info!("registered {}", plate);
            print_json(&serde_json::json!({ "status": "ok", "plate": plate }))?;
        }
        Command::Vehicles => {
            for vehicle in store.list_vehicles()? {
                print_json(&vehicle)?;
            }
        }
        Command::Detections { limit } => {
            for detection in store.list_detections(limit)? {
                print_json(&detection)?;
            }
        }
        Command::Snapshot { plate, output } => {
            let snapshot = store
                .latest_snapshot(&plate)?
                .ok_or_else(|| anyhow!("no snapshot recorded for {}", plate))?;
            std::fs::write(&output, &snapshot)
                .map_err(|e| anyhow!("failed to write {}: {}", output.display(), e))?;
            print_json(&serde_json::json!({
                "plate": plate,
                "output": output.display().to_string(),
                "bytes": snapshot.len(),
            }))?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
