//! Target system descriptors.
//!
//! A [`System`] is built from the selected site configuration and owns the
//! module system backend the rest of the runtime talks to.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::config::{ConfigError, SiteConfig};
use crate::environment::Environment;
use crate::modules::{self, ModuleError, ModuleSystem};

/// Errors that prevent building a system descriptor.
#[derive(Debug, Error)]
pub enum SystemError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Modules(#[from] ModuleError),

  #[error("invalid partition definition for system '{system}': {source}")]
  InvalidPartition {
    system: String,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, Deserialize)]
struct PartitionConfig {
  name: String,
  #[serde(default)]
  descr: String,
  #[serde(default = "default_local")]
  scheduler: String,
  #[serde(default = "default_local")]
  launcher: String,
  #[serde(default)]
  access: Vec<String>,
  #[serde(default)]
  environs: Vec<String>,
  #[serde(default)]
  modules: Vec<String>,
  #[serde(default)]
  variables: Vec<(String, String)>,
}

fn default_local() -> String {
  "local".to_string()
}

/// A partition of a system (login nodes, a GPU queue, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
  pub name: String,
  /// `system:partition`
  pub fullname: String,
  pub descr: String,
  pub scheduler: String,
  pub launcher: String,
  pub access: Vec<String>,
  /// Names of the environments valid on this partition.
  pub environs: Vec<String>,
  local_env: Environment,
}

impl Partition {
  /// Modules and variables every job on this partition needs.
  pub fn local_env(&self) -> &Environment {
    &self.local_env
  }
}

/// The target system the runtime operates on.
#[derive(Debug)]
pub struct System {
  name: String,
  descr: String,
  hostnames: Vec<String>,
  partitions: Vec<Partition>,
  preload_env: Environment,
  modules_system: Box<dyn ModuleSystem>,
}

impl System {
  /// Build the descriptor of the system selected in `config`.
  pub fn create(config: &SiteConfig) -> Result<Self, SystemError> {
    let name = config
      .get_str("systems/0/name")?
      .ok_or_else(|| ConfigError::OptionNotFound("systems/0/name".to_string()))?;
    let descr = config.get_str("systems/0/descr")?.unwrap_or_default();
    let hostnames = config.get_list("systems/0/hostnames")?;
    let backend = config
      .get_str("systems/0/modules_system")?
      .unwrap_or_else(|| "nomod".to_string());
    let modules_system = modules::create(&backend)?;

    let preload_env = Environment::new(format!("_hpcrt_preload_{}", name))
      .with_modules(config.get_list("systems/0/modules")?)
      .with_variables(variables(config, "systems/0/variables")?);

    let partitions: Vec<PartitionConfig> = serde_json::from_value(config.get("systems/0/partitions")?)
      .map_err(|source| SystemError::InvalidPartition {
        system: name.clone(),
        source,
      })?;
    let partitions = partitions
      .into_iter()
      .map(|p| Partition {
        fullname: format!("{}:{}", name, p.name),
        local_env: Environment::new(format!("_hpcrt_part_{}_{}", name, p.name))
          .with_modules(p.modules)
          .with_variables(p.variables),
        name: p.name,
        descr: p.descr,
        scheduler: p.scheduler,
        launcher: p.launcher,
        access: p.access,
        environs: p.environs,
      })
      .collect();

    Ok(Self {
      name,
      descr,
      hostnames,
      partitions,
      preload_env,
      modules_system,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Same as the name; partitions carry the `system:partition` form.
  pub fn fullname(&self) -> &str {
    &self.name
  }

  pub fn descr(&self) -> &str {
    &self.descr
  }

  pub fn hostnames(&self) -> &[String] {
    &self.hostnames
  }

  pub fn partitions(&self) -> &[Partition] {
    &self.partitions
  }

  pub fn partition(&self, name: &str) -> Option<&Partition> {
    self
      .partitions
      .iter()
      .find(|p| p.name == name || p.fullname == name)
  }

  /// Modules and variables loaded before any environment on this system.
  pub fn preload_env(&self) -> &Environment {
    &self.preload_env
  }

  pub fn modules_system(&self) -> &dyn ModuleSystem {
    self.modules_system.as_ref()
  }
}

fn variables(config: &SiteConfig, path: &str) -> Result<Vec<(String, String)>, SystemError> {
  serde_json::from_value(config.get(path)?).map_err(|_| {
    ConfigError::InvalidOption {
      path: path.to_string(),
      expected: "list of [name, value] pairs",
    }
    .into()
  })
}

impl fmt::Display for System {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "System: {}", self.name)?;
    if !self.descr.is_empty() {
      writeln!(f, "  Description:    {}", self.descr)?;
    }
    writeln!(f, "  Hostnames:      {}", self.hostnames.join(", "))?;
    match self.modules_system.version() {
      Some(version) => writeln!(f, "  Modules system: {} {}", self.modules_system.name(), version)?,
      None => writeln!(f, "  Modules system: {}", self.modules_system.name())?,
    }
    write!(f, "  Partitions:")?;
    if self.partitions.is_empty() {
      write!(f, " none")?;
    }
    for partition in &self.partitions {
      write!(
        f,
        "\n    {} (scheduler: {}, launcher: {}, environs: {})",
        partition.fullname,
        partition.scheduler,
        partition.launcher,
        partition.environs.join(", ")
      )?;
    }
    Ok(())
  }
}
