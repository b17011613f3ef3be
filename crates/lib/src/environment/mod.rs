//! Computational environments and process environment snapshots.
//!
//! An [`Environment`] bundles the modules to load and the variables to set for a
//! toolchain. Activating one mutates the process; a [`Snapshot`] taken before
//! activation restores the variable dimension afterwards.

mod snapshot;
pub mod vars;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use snapshot::{Snapshot, SnapshotDiff};

/// A named bundle of module loads and variable assignments.
///
/// Modules and variables keep their declaration order, which is also the order
/// in which they are applied. Variable values may reference other variables
/// (`$HOME`, `${SCRATCH}`); references are expanded at activation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
  pub name: String,
  #[serde(default)]
  pub modules: Vec<String>,
  #[serde(default)]
  pub variables: Vec<(String, String)>,
}

impl Environment {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      modules: Vec::new(),
      variables: Vec::new(),
    }
  }

  pub fn with_module(mut self, module: impl Into<String>) -> Self {
    self.modules.push(module.into());
    self
  }

  pub fn with_modules<I, S>(mut self, modules: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.modules.extend(modules.into_iter().map(Into::into));
    self
  }

  pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.variables.push((name.into(), value.into()));
    self
  }

  pub fn with_variables<I, K, V>(mut self, variables: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    self
      .variables
      .extend(variables.into_iter().map(|(k, v)| (k.into(), v.into())));
    self
  }

  /// Returns true if the environment neither loads modules nor sets variables.
  pub fn is_empty(&self) -> bool {
    self.modules.is_empty() && self.variables.is_empty()
  }
}

impl fmt::Display for Environment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)
  }
}
