//! Lmod backend.
//!
//! Lmod is driven through `$LMOD_CMD sh <subcommand> ...`, which prints shell
//! statements on stdout (`NAME='value'; export NAME;`, `unset NAME;`). The
//! statements are applied to the process environment, so module state lives in
//! `LOADEDMODULES`, `MODULEPATH` and friends like it would in an interactive
//! shell.

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use tracing::{debug, trace, warn};

use super::{ModuleError, ModuleSystem};
use crate::environment::vars;

const BACKEND: &str = "lmod";

/// Patterns used to read Lmod output.
#[derive(Debug, Clone)]
struct Patterns {
  version: Regex,
  error: Regex,
  conflict: Regex,
}

impl Patterns {
  fn new() -> Result<Self, ModuleError> {
    Ok(Self {
      version: Regex::new(r"Version\s+(\S+)")?,
      error: Regex::new(r"(?i)\berror\b")?,
      conflict: Regex::new(r"conflict\(([^)]*)\)")?,
    })
  }
}

/// A statement printed by `$LMOD_CMD sh`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
  Set(String, String),
  Unset(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Lmod {
  command: PathBuf,
  version: String,
  patterns: Patterns,
}

impl Lmod {
  /// Create the backend from `$LMOD_CMD`.
  pub fn new() -> Result<Self, ModuleError> {
    let command = std::env::var_os("LMOD_CMD").ok_or_else(|| ModuleError::Unavailable {
      backend: BACKEND.to_string(),
      reason: "LMOD_CMD is not set".to_string(),
    })?;
    Self::with_command(command)
  }

  /// Create the backend from an explicit `lmod` executable.
  pub fn with_command(command: impl Into<PathBuf>) -> Result<Self, ModuleError> {
    let command = command.into();
    let patterns = Patterns::new()?;
    let output = Command::new(&command)
      .arg("--version")
      .output()
      .map_err(|source| ModuleError::Spawn {
        command: format!("{} --version", command.display()),
        source,
      })?;

    // Lmod prints its banner on stderr
    let banner = format!(
      "{}{}",
      String::from_utf8_lossy(&output.stderr),
      String::from_utf8_lossy(&output.stdout)
    );
    let version = patterns
      .version
      .captures(&banner)
      .map(|caps| caps[1].to_string())
      .ok_or_else(|| ModuleError::Unavailable {
        backend: BACKEND.to_string(),
        reason: format!("could not determine Lmod version from {}", command.display()),
      })?;

    debug!(command = %command.display(), version = %version, "using Lmod");
    Ok(Self {
      command,
      version,
      patterns,
    })
  }

  pub fn command(&self) -> &Path {
    &self.command
  }

  /// Run `$LMOD_CMD sh <args>`, returning stdout and stderr.
  fn run(&self, args: &[&str]) -> Result<(String, String), ModuleError> {
    let command_line = format!("{} sh {}", self.command.display(), args.join(" "));
    trace!(command = %command_line, "running module command");

    let output = Command::new(&self.command)
      .arg("sh")
      .args(args)
      .output()
      .map_err(|source| ModuleError::Spawn {
        command: command_line.clone(),
        source,
      })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() || self.patterns.error.is_match(&stderr) {
      return Err(ModuleError::Command {
        command: command_line,
        stderr: stderr.trim().to_string(),
      });
    }

    Ok((stdout, stderr))
  }

  /// Run a module command and apply the statements it prints.
  fn execute(&self, args: &[&str]) -> Result<(), ModuleError> {
    let (stdout, _) = self.run(args)?;
    apply(&parse_statements(&stdout));
    Ok(())
  }
}

impl ModuleSystem for Lmod {
  fn name(&self) -> &str {
    BACKEND
  }

  fn version(&self) -> Option<&str> {
    Some(&self.version)
  }

  fn loaded_modules(&self) -> Vec<String> {
    split_path_var("LOADEDMODULES")
  }

  fn conflicted_modules(&self, name: &str) -> Result<Vec<String>, ModuleError> {
    // `show` prints the modulefile on stderr
    let (_, stderr) = self.run(&["show", name])?;
    let conflicts = self
      .patterns
      .conflict
      .captures_iter(&stderr)
      .flat_map(|caps| {
        caps[1]
          .split(',')
          .map(|c| c.trim().trim_matches(|q: char| q == '"' || q == '\'').to_string())
          .filter(|c| !c.is_empty())
          .collect::<Vec<_>>()
      })
      .collect();
    Ok(conflicts)
  }

  fn load(&self, name: &str) -> Result<(), ModuleError> {
    self.execute(&["load", name])
  }

  fn unload_module(&self, name: &str) -> Result<(), ModuleError> {
    self.execute(&["unload", name])
  }

  fn emit_load_commands(&self, name: &str) -> Vec<String> {
    vec![format!("module load {}", name)]
  }

  fn emit_unload_commands(&self, name: &str) -> Vec<String> {
    vec![format!("module unload {}", name)]
  }

  fn searchpath(&self) -> Vec<String> {
    split_path_var("MODULEPATH")
  }

  fn searchpath_add(&self, paths: &[&str]) -> Result<(), ModuleError> {
    if paths.is_empty() {
      return Ok(());
    }
    let mut args = vec!["use"];
    args.extend_from_slice(paths);
    self.execute(&args)
  }

  fn searchpath_remove(&self, paths: &[&str]) -> Result<(), ModuleError> {
    if paths.is_empty() {
      return Ok(());
    }
    let mut args = vec!["unuse"];
    args.extend_from_slice(paths);
    self.execute(&args)
  }
}

fn split_path_var(name: &str) -> Vec<String> {
  std::env::var(name)
    .map(|value| {
      value
        .split(':')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
    })
    .unwrap_or_default()
}

fn apply(statements: &[Statement]) {
  for statement in statements {
    match statement {
      Statement::Set(name, value) => {
        if vars::is_valid_name(name) && vars::is_valid_value(value) {
          trace!(name = %name, value = %value, "set");
          vars::set_var(name, value);
        } else {
          warn!(name = %name, "ignoring invalid assignment from Lmod");
        }
      }
      Statement::Unset(names) => {
        for name in names.iter().filter(|n| vars::is_valid_name(n)) {
          trace!(name = %name, "unset");
          vars::remove_var(name);
        }
      }
    }
  }
}

/// Parse the shell statements printed by Lmod.
///
/// Only assignments and `unset` matter; everything else (function definitions,
/// `false`, comments) is skipped.
fn parse_statements(output: &str) -> Vec<Statement> {
  split_statements(output)
    .into_iter()
    .filter_map(|s| parse_statement(s.trim()))
    .collect()
}

/// Split on `;` and newlines outside of quotes.
fn split_statements(output: &str) -> Vec<&str> {
  let mut statements = Vec::new();
  let mut start = 0;
  let mut in_single = false;
  let mut in_double = false;
  let mut escaped = false;

  for (i, c) in output.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' if !in_single => escaped = true,
      '\'' if !in_double => in_single = !in_single,
      '"' if !in_single => in_double = !in_double,
      ';' | '\n' if !in_single && !in_double => {
        statements.push(&output[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  statements.push(&output[start..]);
  statements.retain(|s| !s.trim().is_empty());
  statements
}

fn parse_statement(statement: &str) -> Option<Statement> {
  if let Some(rest) = statement.strip_prefix("unset ") {
    let names: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    return (!names.is_empty()).then_some(Statement::Unset(names));
  }

  let assignment = statement.strip_prefix("export ").unwrap_or(statement);
  let (name, value) = assignment.split_once('=')?;
  if !is_identifier(name) {
    return None;
  }
  Some(Statement::Set(name.to_string(), unquote(value)))
}

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Remove shell quoting from a single word.
fn unquote(word: &str) -> String {
  let mut out = String::with_capacity(word.len());
  let mut chars = word.chars();

  while let Some(c) = chars.next() {
    match c {
      '\'' => {
        for c in chars.by_ref() {
          if c == '\'' {
            break;
          }
          out.push(c);
        }
      }
      '"' => {
        while let Some(c) = chars.next() {
          match c {
            '"' => break,
            '\\' => match chars.next() {
              Some(n @ ('"' | '\\' | '$' | '`')) => out.push(n),
              Some(n) => {
                out.push('\\');
                out.push(n);
              }
              None => out.push('\\'),
            },
            _ => out.push(c),
          }
        }
      }
      '\\' => {
        if let Some(n) = chars.next() {
          out.push(n);
        }
      }
      _ => out.push(c),
    }
  }

  out
}
