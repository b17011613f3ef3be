//! Test utilities for hpcrt-lib.
//!
//! Helpers for building site configurations and stand-in module systems.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::config::SiteConfig;
use crate::modules::{ModuleError, ModuleSystem};

/// Write the fake `lmod` executable into `dir` and return its path.
#[cfg(unix)]
pub fn write_fake_lmod(dir: &Path) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join("lmod");
  std::fs::write(&path, include_str!("../../tests/fixtures/fake_lmod.sh")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// A selected configuration for system `testsys` rooted at `prefix`.
///
/// The timestamp format is the literal `ts` so derived paths are predictable.
pub fn test_config(prefix: &Path) -> SiteConfig {
  let mut config = SiteConfig::from_value(json!({
    "systems": [{
      "name": "testsys",
      "descr": "Test system",
      "hostnames": ["testhost"],
      "prefix": prefix.to_string_lossy(),
      "modules_system": "nomod",
      "partitions": [{
        "name": "login",
        "scheduler": "local",
        "launcher": "local",
        "environs": ["builtin"]
      }]
    }],
    "environments": [{
      "name": "builtin",
      "variables": [["HPCRT_TEST_CC", "cc"]]
    }],
    "general": [{ "timestamp": "ts" }]
  }))
  .unwrap();
  config.select_subconfig(Some("testsys")).unwrap();
  config
}

/// In-memory module system.
///
/// Modules named in `missing` fail to load. Conflicts are declared per module
/// with [`FakeModules::with_conflict`].
#[derive(Debug, Default)]
pub struct FakeModules {
  loaded: RefCell<Vec<String>>,
  paths: RefCell<Vec<String>>,
  conflicts: Vec<(String, String)>,
  missing: Vec<String>,
}

impl FakeModules {
  pub fn new(loaded: &[&str]) -> Self {
    Self {
      loaded: RefCell::new(loaded.iter().map(|m| m.to_string()).collect()),
      ..Default::default()
    }
  }

  pub fn with_conflict(mut self, module: &str, conflict: &str) -> Self {
    self.conflicts.push((module.to_string(), conflict.to_string()));
    self
  }

  pub fn with_missing(mut self, module: &str) -> Self {
    self.missing.push(module.to_string());
    self
  }
}

impl ModuleSystem for FakeModules {
  fn name(&self) -> &str {
    "fake"
  }

  fn loaded_modules(&self) -> Vec<String> {
    self.loaded.borrow().clone()
  }

  fn conflicted_modules(&self, name: &str) -> Result<Vec<String>, ModuleError> {
    Ok(
      self
        .conflicts
        .iter()
        .filter(|(m, _)| m == name)
        .map(|(_, c)| c.clone())
        .collect(),
    )
  }

  fn load(&self, name: &str) -> Result<(), ModuleError> {
    if self.missing.iter().any(|m| m == name) {
      return Err(ModuleError::Command {
        command: format!("module load {}", name),
        stderr: format!("module '{}' not found", name),
      });
    }
    self.loaded.borrow_mut().push(name.to_string());
    Ok(())
  }

  fn unload_module(&self, name: &str) -> Result<(), ModuleError> {
    self.loaded.borrow_mut().retain(|m| m != name);
    Ok(())
  }

  fn emit_load_commands(&self, name: &str) -> Vec<String> {
    vec![format!("module load {}", name)]
  }

  fn emit_unload_commands(&self, name: &str) -> Vec<String> {
    vec![format!("module unload {}", name)]
  }

  fn searchpath(&self) -> Vec<String> {
    self.paths.borrow().clone()
  }

  fn searchpath_add(&self, paths: &[&str]) -> Result<(), ModuleError> {
    let mut current = self.paths.borrow_mut();
    for path in paths.iter().rev() {
      current.retain(|p| p != path);
      current.insert(0, path.to_string());
    }
    Ok(())
  }

  fn searchpath_remove(&self, paths: &[&str]) -> Result<(), ModuleError> {
    self.paths.borrow_mut().retain(|p| !paths.contains(&p.as_str()));
    Ok(())
  }
}
