use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shelfd")]
#[command(about = "Runs the shelfd library catalogue service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Drop the catalogue tables and reseed them with the demo fixtures
    /// before serving. Development only.
    #[arg(long = "seed-demo")]
    pub seed_demo: bool,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".shelfd")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct App {
    database: String,
    port: i32,
}

impl App {
    pub fn get_db(&self) -> &str {
        return &self.database;
    }

    pub fn get_port(&self) -> i32 {
        return self.port;
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub app: App,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        let yaml_with_env = Config::substitute_env_vars(&yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // Handle default values like ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!("environment variable '{}' not found", var_name);
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_env_vars_with_defaults() {
        let yaml = "app:\n  database: ${SHELFD_TEST_DB:-catalogue.db}\n  port: 8080\n";
        let substituted = Config::substitute_env_vars(yaml).unwrap();
        assert!(substituted.contains("catalogue.db"));

        let cfg: Config = serde_yaml::from_str(&substituted).unwrap();
        assert_eq!(cfg.app.get_db(), "catalogue.db");
        assert_eq!(cfg.app.get_port(), 8080);
    }

    #[test]
    fn substitutes_env_vars_from_environment() {
        unsafe { env::set_var("SHELFD_TEST_PORT", "9090") };
        let yaml = "app:\n  database: books.db\n  port: ${SHELFD_TEST_PORT}\n";
        let substituted = Config::substitute_env_vars(yaml).unwrap();
        assert!(substituted.contains("9090"));
    }
}
