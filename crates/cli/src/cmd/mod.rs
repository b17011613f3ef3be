mod dirs;
mod env;
mod info;
mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use hpcrt_lib::SiteConfig;
use hpcrt_lib::consts::CONFIG_FILE_ENV;

pub use dirs::{DirsOptions, cmd_dirs};
pub use env::cmd_env;
pub use info::cmd_info;
pub use run::{RunOptions, cmd_run};

/// Options selecting the site configuration and system.
#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
  /// Site configuration file (default: built-in generic configuration)
  #[arg(short = 'C', long, global = true, env = CONFIG_FILE_ENV)]
  pub config_file: Option<PathBuf>,

  /// System to use, as `name` or `name:partition` (default: match the hostname)
  #[arg(short, long, global = true)]
  pub system: Option<String>,

  /// Override a configuration option, as `key=value`
  #[arg(short = 'o', long = "option", global = true, value_parser = parse_option)]
  pub options: Vec<(String, Value)>,
}

/// Load and select the site configuration described by `args`.
pub fn site_config(args: &RuntimeArgs) -> Result<SiteConfig> {
  let mut config = match &args.config_file {
    Some(path) => {
      let path = dunce::canonicalize(path).unwrap_or_else(|_| path.clone());
      SiteConfig::load(&path)?
    }
    None => SiteConfig::builtin(),
  };

  config
    .select_subconfig(args.system.as_deref())
    .context("Failed to select system configuration")?;

  for (key, value) in &args.options {
    config.add_sticky_option(key, value.clone());
  }
  Ok(config)
}

/// Initialize the process runtime from `args`.
pub fn init(args: &RuntimeArgs) -> Result<()> {
  let config = site_config(args)?;
  hpcrt_lib::init_runtime(config).context("Failed to initialize runtime")?;
  Ok(())
}

/// Parse `key=value`; values that are valid JSON keep their type.
fn parse_option(s: &str) -> Result<(String, Value), String> {
  let (key, value) = s
    .split_once('=')
    .ok_or_else(|| format!("invalid option '{}': expected key=value", s))?;
  if key.is_empty() {
    return Err(format!("invalid option '{}': empty key", s));
  }

  let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
  Ok((key.to_string(), value))
}
