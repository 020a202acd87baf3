//! Config command implementation.

use anyhow::Result;
use bunjin_rules::Config;

/// Show current configuration.
pub fn show(config: &Config) -> Result<()> {
    println!("Bunjin Configuration");
    println!("{:-<40}", "");

    println!("Store Directory:     {}", config.store_dir.display());
    println!("UTC Offset:          {} min", config.default_utc_offset_minutes);
    println!("Max Tree Depth:      {}", config.max_tree_depth);

    if let Some(config_path) = Config::config_file_path() {
        println!("\nConfig file: {}", config_path.display());
    }

    Ok(())
}

/// Set a configuration value in the config file.
///
/// Starts from the file alone so `--store` and `BUNJIN_*` overrides of this
/// run are not written back.
pub fn set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_file()?;
    config.set(&normalize(key), value)?;
    config.save()?;
    println!("Set {} to: {}", key, value);
    Ok(())
}

/// Get a configuration value.
pub fn get(config: &Config, key: &str) -> Result<()> {
    match config.get(&normalize(key)) {
        Some(value) => println!("{}", value),
        None => anyhow::bail!(
            "Unknown config key: {}. Valid keys: store-dir, utc-offset, max-tree-depth",
            key
        ),
    }
    Ok(())
}

/// Reset configuration to defaults.
pub fn reset() -> Result<()> {
    Config::default().save()?;
    println!("Configuration reset to defaults");
    Ok(())
}

/// Accept the short dashed aliases used on the command line.
fn normalize(key: &str) -> String {
    match key {
        "store-dir" | "store" => "store_dir".to_string(),
        "utc-offset" | "offset" => "default_utc_offset_minutes".to_string(),
        "max-tree-depth" | "max-depth" => "max_tree_depth".to_string(),
        other => other.replace('-', "_"),
    }
}
