//! Resolve harmonic-network training settings from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults for rotated MNIST
//! cargo run --bin settings -- --dataset rotated_mnist --model deep_mnist \
//!     --data-dir ./data --device 0
//!
//! # Start from a JSON file, override single options, write the result
//! cargo run --bin settings -- --config run.json --set lr=0.001 \
//!     --set optimizer=\"momentum\" --output resolved.json
//! ```
//!
//! Logging follows `RUST_LOG`; `RUST_LOG=info` shows which options came
//! from the user.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use harmonic_settings::{DataOptions, LocalOnly, ModelRegistry, Settings, UserOptions};
use log::debug;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding the user options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override dataset name
    #[arg(long)]
    dataset: Option<String>,

    /// Override model name
    #[arg(long)]
    model: Option<String>,

    /// Override data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Device index to train on; repeat for several devices
    #[arg(long = "device")]
    devices: Vec<usize>,

    /// Extra option as KEY=VALUE; VALUE is parsed as JSON, falling back to a string
    #[arg(long = "set", value_parser = parse_key_value)]
    overrides: Vec<(String, Value)>,

    /// Write the resolved options here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List the registered models and exit
    #[arg(long)]
    list_models: bool,
}

fn parse_key_value(arg: &str) -> Result<(String, Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{arg}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{arg}`"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn user_options(args: &Args) -> Result<UserOptions> {
    let mut user = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            match serde_json::from_str::<Value>(&json)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            {
                Value::Object(map) => map,
                _ => bail!("Config file must hold a JSON object: {}", path.display()),
            }
        }
        None => UserOptions::new(),
    };

    if let Some(dataset) = &args.dataset {
        user.insert("dataset".into(), Value::from(dataset.as_str()));
    }
    if let Some(model) = &args.model {
        user.insert("model".into(), Value::from(model.as_str()));
    }
    if let Some(data_dir) = &args.data_dir {
        user.insert("data_dir".into(), Value::from(data_dir.to_string_lossy().as_ref()));
    }
    if !args.devices.is_empty() {
        user.insert("device_idxs".into(), Value::from(args.devices.clone()));
    }
    for (key, value) in &args.overrides {
        debug!("Command line override [{key}] = {value}");
        user.insert(key.clone(), value.clone());
    }
    Ok(user)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let registry = ModelRegistry::builtin();

    if args.list_models {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let user = user_options(&args)?;
    let mut settings =
        Settings::new(user, &registry).context("Failed to validate user options")?;
    settings
        .create_options(&LocalOnly)
        .context("Failed to resolve training options")?;

    let model = settings.build_model()?;
    let Some(options) = settings.options() else {
        bail!("Options were not resolved");
    };

    println!("{}", serde_json::to_string_pretty(options)?);
    println!("Model: {} ({} harmonic convolutions)", model.name, model.conv_count());
    match settings.data_options() {
        Some(DataOptions::InMemory(data)) => println!(
            "Data: in memory, {} train / {} valid / {} test samples",
            data.train.len(),
            data.valid.len(),
            data.test.len()
        ),
        Some(DataOptions::Queued(queue)) => println!(
            "Data: {} train / {} valid / {} test record files, {} threads per queue",
            queue.records.train.len(),
            queue.records.valid.len(),
            queue.records.test.len(),
            queue.num_threads
        ),
        None => println!("Data: none"),
    }

    if let Some(path) = &args.output {
        settings
            .save(path)
            .with_context(|| format!("Failed to write options to {}", path.display()))?;
        println!("Saved options to {}", path.display());
    }
    Ok(())
}
