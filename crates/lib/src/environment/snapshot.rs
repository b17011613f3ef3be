//! Point-in-time images of the process environment.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

use super::vars;

/// An immutable capture of all process environment variables.
///
/// Restoring a snapshot makes the process environment match it exactly:
/// variables present in the snapshot are reassigned and variables set after the
/// capture are removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
  variables: BTreeMap<OsString, OsString>,
}

/// Differences between two snapshots, by variable name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
  pub added: Vec<String>,
  pub removed: Vec<String>,
  pub changed: Vec<String>,
}

impl SnapshotDiff {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
  }
}

impl Snapshot {
  /// Capture the current process environment.
  pub fn capture() -> Self {
    Self {
      variables: std::env::vars_os().collect(),
    }
  }

  /// Restore the process environment to this snapshot.
  pub fn restore(&self) {
    let stale: Vec<OsString> = std::env::vars_os()
      .map(|(name, _)| name)
      .filter(|name| !self.variables.contains_key(name))
      .collect();

    for name in stale {
      vars::remove_var(&name);
    }

    for (name, value) in &self.variables {
      if std::env::var_os(name).as_ref() != Some(value) {
        vars::set_var(name, value);
      }
    }
  }

  /// Value of `name` at capture time.
  pub fn get(&self, name: &str) -> Option<&OsString> {
    self.variables.get(OsStr::new(name))
  }

  pub fn len(&self) -> usize {
    self.variables.len()
  }

  pub fn is_empty(&self) -> bool {
    self.variables.is_empty()
  }

  /// Compute what changed going from `self` to `other`.
  pub fn diff(&self, other: &Snapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();

    for (name, value) in &other.variables {
      match self.variables.get(name) {
        None => diff.added.push(name.to_string_lossy().into_owned()),
        Some(old) if old != value => diff.changed.push(name.to_string_lossy().into_owned()),
        Some(_) => {}
      }
    }

    for name in self.variables.keys() {
      if !other.variables.contains_key(name) {
        diff.removed.push(name.to_string_lossy().into_owned());
      }
    }

    diff
  }
}
