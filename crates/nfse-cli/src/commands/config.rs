//! Config command - inspect and edit the configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;

use nfse_core::NfseConfig;

use super::default_config_path;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print one value (e.g. "ocr.language")
    Get { key: String },

    /// Change one value (e.g. "sink.spreadsheet_id" "12Jjq...")
    Set { key: String, value: String },

    /// Show the configuration file path
    Path,
}

pub async fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommand::Show => {
            if !path.exists() {
                eprintln!("{} No config file found, showing defaults.", style("ℹ").blue());
            }
            println!("{}", serde_json::to_string_pretty(&read_or_default(&path)?)?);
        }
        ConfigCommand::Init { force } => init_config(&path, force)?,
        ConfigCommand::Get { key } => {
            let json = serde_json::to_value(read_or_default(&path)?)?;
            let value = lookup(&json, &key)
                .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        ConfigCommand::Set { key, value } => set_config(&path, &key, &value)?,
        ConfigCommand::Path => {
            println!("Configuration file: {}", path.display());
            if path.exists() {
                println!("Status: {}", style("exists").green());
            } else {
                println!("Status: {}", style("not created").yellow());
                println!("Run 'nfse config init' to create it.");
            }
        }
    }
    Ok(())
}

fn read_or_default(path: &Path) -> anyhow::Result<NfseConfig> {
    if path.exists() {
        Ok(NfseConfig::from_file(path)?)
    } else {
        Ok(NfseConfig::default())
    }
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    NfseConfig::default().save(path)?;
    println!("{} Created configuration file at {}", style("✓").green(), path.display());
    Ok(())
}

/// Follow a dotted key through nested objects.
fn lookup<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(json, |current, part| current.get(part))
}

fn set_config(path: &Path, key: &str, raw: &str) -> anyhow::Result<()> {
    let mut json = serde_json::to_value(read_or_default(path)?)?;

    // Values that are not valid JSON are taken as plain strings
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let (parent_key, leaf) = key.rsplit_once('.').unwrap_or(("", key));
    let parent = if parent_key.is_empty() {
        Some(&mut json)
    } else {
        parent_key
            .split('.')
            .try_fold(&mut json, |current, part| current.get_mut(part))
    };
    let object = parent
        .and_then(Value::as_object_mut)
        .filter(|object| object.contains_key(leaf))
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    object.insert(leaf.to_string(), value.clone());

    // Round-trip through the typed config to reject wrongly typed values
    let config: NfseConfig = serde_json::from_value(json)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    config.save(path)?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
