//! Module system backends.
//!
//! A module system loads and unloads named toolchain packages (`gcc/12.2`,
//! `cray-mpich`) by mutating the process environment. The backend is chosen from
//! the `modules_system` option of the selected system:
//!
//! - `nomod`: no module system; every operation is a no-op
//! - `lmod`: drives Lmod through `$LMOD_CMD`
//!
//! Backends implement the primitive operations of [`ModuleSystem`]; conflict
//! resolution on load is shared through the provided [`ModuleSystem::load_module`].

mod lmod;
mod nomod;

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

pub use lmod::Lmod;
pub use nomod::NoModules;

/// Errors raised by module system backends.
#[derive(Debug, Error)]
pub enum ModuleError {
  #[error("unknown modules system: {0}")]
  UnknownBackend(String),

  #[error("modules system '{backend}' is not available: {reason}")]
  Unavailable { backend: String, reason: String },

  #[error("module command failed: {command}: {stderr}")]
  Command { command: String, stderr: String },

  #[error("could not run module command '{command}': {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid module output pattern: {0}")]
  Pattern(#[from] regex::Error),
}

/// A module name, optionally qualified by a version (`name/version`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Module {
  name: String,
  version: Option<String>,
}

impl Module {
  pub fn parse(spec: &str) -> Self {
    let spec = spec.trim();
    match spec.split_once('/') {
      Some((name, version)) if !version.is_empty() => Self {
        name: name.to_string(),
        version: Some(version.to_string()),
      },
      Some((name, _)) => Self {
        name: name.to_string(),
        version: None,
      },
      None => Self {
        name: spec.to_string(),
        version: None,
      },
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn version(&self) -> Option<&str> {
    self.version.as_deref()
  }

  /// Returns true if `self` designates `other`.
  ///
  /// Names must be equal; versions are only compared when both are given, so
  /// `gcc` matches `gcc/12.2` but `gcc/11.3` does not.
  pub fn matches(&self, other: &Module) -> bool {
    if self.name != other.name {
      return false;
    }
    match (&self.version, &other.version) {
      (Some(a), Some(b)) => a == b,
      _ => true,
    }
  }
}

impl fmt::Display for Module {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.version {
      Some(version) => write!(f, "{}/{}", self.name, version),
      None => write!(f, "{}", self.name),
    }
  }
}

/// Interface to a module system backend.
///
/// All methods take `&self`: backends keep their state in the process
/// environment, which is what makes a [`Snapshot`](crate::environment::Snapshot)
/// restore revert loaded modules too.
pub trait ModuleSystem: fmt::Debug {
  /// Backend name as used in configuration (`nomod`, `lmod`).
  fn name(&self) -> &str;

  /// Backend version, if known.
  fn version(&self) -> Option<&str> {
    None
  }

  /// Currently loaded modules, in load order.
  fn loaded_modules(&self) -> Vec<String>;

  /// Modules declared as conflicting with `name`.
  fn conflicted_modules(&self, name: &str) -> Result<Vec<String>, ModuleError>;

  /// Load `name` without any conflict handling.
  fn load(&self, name: &str) -> Result<(), ModuleError>;

  /// Unload `name`.
  fn unload_module(&self, name: &str) -> Result<(), ModuleError>;

  /// Shell commands that load `name` in a non-interactive shell.
  fn emit_load_commands(&self, name: &str) -> Vec<String>;

  /// Shell commands that unload `name` in a non-interactive shell.
  fn emit_unload_commands(&self, name: &str) -> Vec<String>;

  /// Directories searched for modulefiles.
  fn searchpath(&self) -> Vec<String>;

  fn searchpath_add(&self, paths: &[&str]) -> Result<(), ModuleError>;

  fn searchpath_remove(&self, paths: &[&str]) -> Result<(), ModuleError>;

  fn is_module_loaded(&self, name: &str) -> bool {
    let wanted = Module::parse(name);
    self
      .loaded_modules()
      .iter()
      .any(|loaded| wanted.matches(&Module::parse(loaded)))
  }

  /// Load `name`, returning the modules that were unloaded to make room for it.
  ///
  /// Loading an already loaded module does nothing. With `force`, loaded
  /// modules that conflict with `name` are unloaded first; without it they are
  /// left to the backend.
  fn load_module(&self, name: &str, force: bool) -> Result<Vec<String>, ModuleError> {
    if self.is_module_loaded(name) {
      debug!(module = %name, "module already loaded");
      return Ok(Vec::new());
    }

    let mut unloaded = Vec::new();
    if force {
      let conflicts: Vec<Module> = self
        .conflicted_modules(name)?
        .iter()
        .map(|c| Module::parse(c))
        .collect();

      for loaded in self.loaded_modules() {
        let module = Module::parse(&loaded);
        if conflicts.iter().any(|c| c.matches(&module)) && !unloaded.contains(&loaded) {
          warn!(module = %name, conflict = %loaded, "unloading conflicting module");
          self.unload_module(&loaded)?;
          unloaded.push(loaded);
        }
      }
    }

    self.load(name)?;
    debug!(module = %name, "loaded module");
    Ok(unloaded)
  }
}

/// Create the backend named `kind`.
pub fn create(kind: &str) -> Result<Box<dyn ModuleSystem>, ModuleError> {
  match kind {
    "nomod" => Ok(Box::new(NoModules)),
    "lmod" => Ok(Box::new(Lmod::new()?)),
    other => Err(ModuleError::UnknownBackend(other.to_string())),
  }
}
