//! Config command handlers

use anyhow::{bail, Context, Result};

use markstore_core::Config;

use crate::output::{Output, OutputFormat};

const KEYS: &str = "data_dir, db_file, threads, log_file, user_agent, timeout_secs, proxy, max_redirects";

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "db_file": config.db_file,
                    "db_path": config.db_path(),
                    "threads": config.threads,
                    "log_file": config.log_file,
                    "fetch": {
                        "user_agent": config.fetch.user_agent,
                        "timeout_secs": config.fetch.timeout_secs,
                        "proxy": config.fetch.proxy,
                        "max_redirects": config.fetch.max_redirects
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.db_path().display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:      {}", config.data_dir.display());
            println!("  db_file:       {}", display_opt_path(&config.db_file));
            println!("  threads:       {}", config.threads);
            println!("  log_file:      {}", display_opt_path(&config.log_file));
            println!("  user_agent:    {}", config.fetch.user_agent);
            println!("  timeout_secs:  {}", config.fetch.timeout_secs);
            println!(
                "  proxy:         {}",
                config.fetch.proxy.as_deref().unwrap_or("(not set)")
            );
            println!("  max_redirects: {}", config.fetch.max_redirects);
            println!();
            println!("Database:    {}", config.db_path().display());
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    apply(&mut config, &key, &value)?;
    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let unset = value.is_empty() || value == "none";
    match key {
        "data_dir" => config.data_dir = value.into(),
        "db_file" => config.db_file = (!unset).then(|| value.into()),
        "threads" => {
            config.threads = match value.parse() {
                Ok(n) if n > 0 => n,
                _ => bail!("Invalid value for threads. Use a positive number."),
            }
        }
        "log_file" => config.log_file = (!unset).then(|| value.into()),
        "user_agent" => config.fetch.user_agent = value.to_string(),
        "timeout_secs" => {
            config.fetch.timeout_secs = value
                .parse()
                .context("Invalid value for timeout_secs. Use a number of seconds.")?
        }
        "proxy" => config.fetch.proxy = (!unset).then(|| value.to_string()),
        "max_redirects" => {
            config.fetch.max_redirects = value
                .parse()
                .context("Invalid value for max_redirects. Use a number.")?
        }
        _ => bail!(
            "Unknown configuration key: '{}'\nValid keys: {}",
            key,
            KEYS
        ),
    }
    Ok(())
}

fn display_opt_path(path: &Option<std::path::PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();

        apply(&mut config, "threads", "8").unwrap();
        apply(&mut config, "proxy", "http://proxy:3128").unwrap();
        apply(&mut config, "db_file", "/tmp/b.db").unwrap();
        assert_eq!(config.threads, 8);
        assert_eq!(config.fetch.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.db_path(), std::path::PathBuf::from("/tmp/b.db"));

        apply(&mut config, "proxy", "none").unwrap();
        apply(&mut config, "db_file", "").unwrap();
        assert!(config.fetch.proxy.is_none());
        assert!(config.db_file.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(apply(&mut config, "threads", "0").is_err());
        assert!(apply(&mut config, "timeout_secs", "soon").is_err());
        assert!(apply(&mut config, "sync_url", "x").is_err());
    }
}
