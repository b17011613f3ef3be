//! Variable expansion for configuration values and environment assignments.
//!
//! Supported forms:
//!
//! - `$NAME` and `${NAME}` are replaced by the value of the process variable
//! - a leading `~` (alone or followed by `/`) is replaced by the home directory
//!
//! References to unset variables are left untouched, so `$UNSET/bin` expands to
//! `$UNSET/bin`. A `$` that does not start a reference passes through unchanged.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use hpcrt_lib::util::expand::expand_with;
//!
//! let lookup = |name: &str| (name == "SCRATCH").then(|| "/scratch/user".to_string());
//! assert_eq!(expand_with("${SCRATCH}/stage:$NOPE", None, lookup), "/scratch/user/stage:$NOPE");
//! assert_eq!(expand_with("~/stage", Some(Path::new("/home/me")), lookup), "/home/me/stage");
//! ```

use std::path::Path;

/// Expand `input` against the process environment and the user's home directory.
pub fn expand(input: &str) -> String {
  let home = dirs::home_dir();
  expand_with(input, home.as_deref(), |name| std::env::var(name).ok())
}

/// Expand variable references in `input`, resolving names with `lookup`.
///
/// A leading `~` is left alone when `home` is `None`.
pub fn expand_with<F>(input: &str, home: Option<&Path>, lookup: F) -> String
where
  F: Fn(&str) -> Option<String>,
{
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  if let Some(after) = rest.strip_prefix('~')
    && (after.is_empty() || after.starts_with('/'))
    && let Some(home) = home
  {
    out.push_str(&home.to_string_lossy());
    rest = after;
  }

  while let Some(pos) = rest.find('$') {
    out.push_str(&rest[..pos]);
    let tail = &rest[pos + 1..];

    match parse_reference(tail) {
      Some((name, consumed)) => {
        match lookup(name) {
          Some(value) => out.push_str(&value),
          None => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &tail[consumed..];
      }
      None => {
        out.push('$');
        rest = tail;
      }
    }
  }

  out.push_str(rest);
  out
}

/// Parse the variable reference following a `$`.
///
/// Returns the variable name and the number of bytes consumed after the `$`.
fn parse_reference(s: &str) -> Option<(&str, usize)> {
  if let Some(body) = s.strip_prefix('{') {
    let end = body.find('}')?;
    let name = &body[..end];
    if name.is_empty() {
      return None;
    }
    return Some((name, end + 2));
  }

  let len = s
    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
    .unwrap_or(s.len());
  if len == 0 { None } else { Some((&s[..len], len)) }
}
