//! Site configuration.
//!
//! The site configuration is a JSON document made of sections, each holding a
//! list of objects:
//!
//! ```json
//! {
//!   "systems": [{ "name": "daint", "hostnames": ["daint\\d+"], "prefix": "$SCRATCH/hpcrt", ... }],
//!   "environments": [{ "name": "PrgEnv-gnu", "modules": ["PrgEnv-gnu"], "target_systems": ["daint"] }],
//!   "general": [{ "timestamp": "%FT%T" }]
//! }
//! ```
//!
//! After [`SiteConfig::select_subconfig`], the `systems` section holds only the
//! selected system and every other section only the entries whose
//! `target_systems` match it. Options are then addressed by path:
//! `systems/0/prefix`, `general/0/timestamp`, `systems/0/partitions/1/name`.
//!
//! Lookups resolve in order: sticky options, configured values, built-in
//! defaults.

mod defaults;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::environment::Environment;

/// Errors that can occur while loading or querying the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("could not read configuration file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("could not parse configuration file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid configuration: {0}")]
  Invalid(String),

  #[error("no such configuration option: {0}")]
  OptionNotFound(String),

  #[error("configuration option '{path}' is not a {expected}")]
  InvalidOption { path: String, expected: &'static str },

  #[error("could not find a configuration entry for system '{0}'")]
  SystemNotFound(String),

  #[error("system '{system}' has no partition '{partition}'")]
  PartitionNotFound { system: String, partition: String },

  #[error("invalid timestamp format: {0}")]
  InvalidTimestampFormat(String),

  #[error("environment '{0}' is not defined for the current system")]
  EnvironmentNotFound(String),

  #[error("invalid definition of environment '{name}': {source}")]
  InvalidEnvironment {
    name: String,
    #[source]
    source: serde_json::Error,
  },
}

/// A site configuration, optionally narrowed to one system.
#[derive(Debug, Clone)]
pub struct SiteConfig {
  source: Option<PathBuf>,
  document: Value,
  resolved: Value,
  system: Option<String>,
  sticky: BTreeMap<String, Value>,
}

impl SiteConfig {
  /// Build a configuration from an in-memory document.
  pub fn from_value(document: Value) -> Result<Self, ConfigError> {
    validate(&document)?;
    Ok(Self {
      source: None,
      resolved: document.clone(),
      document,
      system: None,
      sticky: BTreeMap::new(),
    })
  }

  /// Load a configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let mut config = Self::from_value(document)?;
    config.source = Some(path.to_path_buf());
    debug!(path = %path.display(), "loaded site configuration");
    Ok(config)
  }

  /// The generic configuration used when no file is given.
  pub fn builtin() -> Self {
    let document = defaults::generic_document();
    Self {
      source: None,
      resolved: document.clone(),
      document,
      system: None,
      sticky: BTreeMap::new(),
    }
  }

  /// File the configuration was loaded from, if any.
  pub fn source(&self) -> Option<&Path> {
    self.source.as_deref()
  }

  /// Name of the selected system, if a subconfig was selected.
  pub fn system_name(&self) -> Option<&str> {
    self.system.as_deref()
  }

  /// Narrow the configuration to one system.
  ///
  /// `system` is `name` or `name:partition`; in the latter case only that
  /// partition is kept. With `None`, the first system whose `hostnames`
  /// patterns match the current hostname is selected.
  pub fn select_subconfig(&mut self, system: Option<&str>) -> Result<(), ConfigError> {
    match system {
      Some(system) => self.select(system),
      None => {
        let hostname = whoami::fallible::hostname().map_err(|e| {
          ConfigError::SystemNotFound(format!("<unknown host: {}>", e))
        })?;
        self.select_for_host(&hostname)
      }
    }
  }

  /// Select the first system with a `hostnames` pattern matching `hostname`.
  pub fn select_for_host(&mut self, hostname: &str) -> Result<(), ConfigError> {
    let mut matched = None;

    'systems: for system in systems(&self.document) {
      let name = system_name(system)?;
      for pattern in system.get("hostnames").and_then(Value::as_array).into_iter().flatten() {
        let Some(pattern) = pattern.as_str() else {
          continue;
        };
        let re = Regex::new(&format!("^(?:{})", pattern))
          .map_err(|e| ConfigError::Invalid(format!("system '{}': bad hostname pattern: {}", name, e)))?;
        if re.is_match(hostname) {
          debug!(hostname = %hostname, system = %name, "hostname matched");
          matched = Some(name.to_string());
          break 'systems;
        }
      }
    }

    match matched {
      Some(name) => self.select(&name),
      None => Err(ConfigError::SystemNotFound(hostname.to_string())),
    }
  }

  fn select(&mut self, system: &str) -> Result<(), ConfigError> {
    let (sysname, partname) = match system.split_once(':') {
      Some((sys, part)) => (sys, Some(part)),
      None => (system, None),
    };

    let mut selected = systems(&self.document)
      .iter()
      .find(|s| s.get("name").and_then(Value::as_str) == Some(sysname))
      .cloned()
      .ok_or_else(|| ConfigError::SystemNotFound(sysname.to_string()))?;

    if let Some(partname) = partname {
      let partitions = selected
        .get_mut("partitions")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ConfigError::PartitionNotFound {
          system: sysname.to_string(),
          partition: partname.to_string(),
        })?;
      partitions.retain(|p| p.get("name").and_then(Value::as_str) == Some(partname));
      if partitions.is_empty() {
        return Err(ConfigError::PartitionNotFound {
          system: sysname.to_string(),
          partition: partname.to_string(),
        });
      }
    }

    let mut resolved = Map::new();
    if let Some(sections) = self.document.as_object() {
      for (section, value) in sections {
        let value = match (section.as_str(), value) {
          ("systems", _) => json!([selected.clone()]),
          (_, Value::Array(entries)) => Value::Array(filter_entries(entries, sysname)),
          (_, other) => other.clone(),
        };
        resolved.insert(section.clone(), value);
      }
    }

    self.resolved = Value::Object(resolved);
    self.system = Some(sysname.to_string());
    info!(system = %system, "selected system configuration");
    Ok(())
  }

  /// Look up an option by path.
  pub fn get(&self, path: &str) -> Result<Value, ConfigError> {
    let key = option_key(path);
    if let Some(value) = self.sticky.get(&key) {
      return Ok(value.clone());
    }

    if let Some(value) = lookup(&self.resolved, path).filter(|v| !v.is_null()) {
      return Ok(value.clone());
    }

    defaults::default_value(&key).ok_or_else(|| ConfigError::OptionNotFound(path.to_string()))
  }

  /// Look up a string option; null values yield `None`.
  pub fn get_str(&self, path: &str) -> Result<Option<String>, ConfigError> {
    match self.get(path)? {
      Value::Null => Ok(None),
      Value::String(s) => Ok(Some(s)),
      Value::Number(n) => Ok(Some(n.to_string())),
      Value::Bool(b) => Ok(Some(b.to_string())),
      _ => Err(ConfigError::InvalidOption {
        path: path.to_string(),
        expected: "string",
      }),
    }
  }

  /// Look up a list of strings.
  pub fn get_list(&self, path: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = || ConfigError::InvalidOption {
      path: path.to_string(),
      expected: "list of strings",
    };
    match self.get(path)? {
      Value::Null => Ok(Vec::new()),
      Value::Array(items) => items
        .into_iter()
        .map(|item| match item {
          Value::String(s) => Ok(s),
          _ => Err(invalid()),
        })
        .collect(),
      _ => Err(invalid()),
    }
  }

  /// Override an option for every subsequent lookup.
  ///
  /// `key` may include the section index (`systems/0/prefix`) or not
  /// (`systems/prefix`).
  pub fn add_sticky_option(&mut self, key: &str, value: impl Into<Value>) {
    let value = value.into();
    debug!(key = %key, value = %value, "sticky option");
    self.sticky.insert(option_key(key), value);
  }

  pub fn remove_sticky_option(&mut self, key: &str) -> Option<Value> {
    self.sticky.remove(&option_key(key))
  }

  /// Names of the environments defined for the selected system.
  pub fn environment_names(&self) -> Vec<String> {
    environments(&self.resolved)
      .iter()
      .filter_map(|e| e.get("name").and_then(Value::as_str))
      .map(str::to_string)
      .collect()
  }

  /// The environment called `name`.
  ///
  /// When several entries share the name, the one targeting the selected system
  /// explicitly wins over wildcard entries.
  pub fn environment(&self, name: &str) -> Result<Environment, ConfigError> {
    let entry = environments(&self.resolved)
      .iter()
      .find(|e| e.get("name").and_then(Value::as_str) == Some(name))
      .ok_or_else(|| ConfigError::EnvironmentNotFound(name.to_string()))?;

    serde_json::from_value(entry.clone()).map_err(|source| ConfigError::InvalidEnvironment {
      name: name.to_string(),
      source,
    })
  }
}

fn validate(document: &Value) -> Result<(), ConfigError> {
  let sections = document
    .as_object()
    .ok_or_else(|| ConfigError::Invalid("top level must be an object".to_string()))?;

  let systems = sections
    .get("systems")
    .and_then(Value::as_array)
    .ok_or_else(|| ConfigError::Invalid("missing 'systems' section".to_string()))?;

  if systems.is_empty() {
    return Err(ConfigError::Invalid("no systems defined".to_string()));
  }
  for system in systems {
    system_name(system)?;
  }

  for (section, value) in sections {
    if let Value::Array(entries) = value
      && entries.iter().any(|e| !e.is_object())
    {
      return Err(ConfigError::Invalid(format!(
        "section '{}' must be a list of objects",
        section
      )));
    }
  }

  Ok(())
}

fn systems(document: &Value) -> &[Value] {
  document
    .get("systems")
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or_default()
}

fn environments(document: &Value) -> &[Value] {
  document
    .get("environments")
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or_default()
}

fn system_name(system: &Value) -> Result<&str, ConfigError> {
  system
    .get("name")
    .and_then(Value::as_str)
    .filter(|n| !n.is_empty())
    .ok_or_else(|| ConfigError::Invalid("system without a name".to_string()))
}

/// Keep the entries targeting `system`; explicit targets sort before wildcards.
fn filter_entries(entries: &[Value], system: &str) -> Vec<Value> {
  let mut ranked: Vec<(u8, &Value)> = entries
    .iter()
    .filter_map(|entry| target_rank(entry, system).map(|rank| (rank, entry)))
    .collect();
  ranked.sort_by_key(|(rank, _)| *rank);
  ranked.into_iter().map(|(_, entry)| entry.clone()).collect()
}

fn target_rank(entry: &Value, system: &str) -> Option<u8> {
  let Some(targets) = entry.get("target_systems").and_then(Value::as_array) else {
    return Some(1);
  };

  let prefix = format!("{}:", system);
  let mut wildcard = false;
  for target in targets.iter().filter_map(Value::as_str) {
    if target == system || target.starts_with(&prefix) {
      return Some(0);
    }
    wildcard |= target == "*";
  }
  wildcard.then_some(1)
}

/// Drop the section index: `systems/0/prefix` -> `systems/prefix`.
fn option_key(path: &str) -> String {
  let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
  if parts.len() > 1 && parts[1].parse::<usize>().is_ok() {
    parts.remove(1);
  }
  parts.join("/")
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
  path
    .split('/')
    .filter(|p| !p.is_empty())
    .try_fold(value, |current, segment| match current {
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      Value::Object(map) => map.get(segment),
      _ => None,
    })
}
