//! Process environment mutation.
//!
//! All writes to the process environment go through this module. The runtime
//! assumes a single writer: environment switches are confined to one thread of
//! control at a time, and tests that touch the environment run serially.

use std::ffi::OsStr;

/// Returns true if `name` can be used as an environment variable name.
///
/// Empty names and names containing `=` or NUL are rejected by the platform.
pub fn is_valid_name(name: &str) -> bool {
  !name.is_empty() && !name.contains('=') && !name.contains('\0')
}

/// Returns true if `value` can be stored in an environment variable.
pub fn is_valid_value(value: &str) -> bool {
  !value.contains('\0')
}

/// Set a process environment variable.
///
/// `name` and `value` must satisfy [`is_valid_name`] and [`is_valid_value`].
pub(crate) fn set_var<K: AsRef<OsStr>, V: AsRef<OsStr>>(name: K, value: V) {
  // SAFETY: environment access is single-writer (see module docs).
  unsafe { std::env::set_var(name, value) }
}

/// Remove a process environment variable.
pub(crate) fn remove_var<K: AsRef<OsStr>>(name: K) {
  // SAFETY: environment access is single-writer (see module docs).
  unsafe { std::env::remove_var(name) }
}
