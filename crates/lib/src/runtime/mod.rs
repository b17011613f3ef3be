//! The runtime context.
//!
//! The runtime context groups the selected site configuration, the target
//! system descriptor and the parameters of the current invocation: when it
//! started and how many times the current operation has been retried. Stage
//! and output directories are derived from these on every access.
//!
//! One context is *current* per thread. [`init_runtime`] installs it once;
//! [`runtime`] retrieves it. The guards in this module ([`TempRuntime`],
//! [`TempEnvironment`], [`ModuleUse`]) switch the current context or the
//! process environment for a scope and restore them when dropped, in reverse
//! order of creation.
//!
//! # Example
//!
//! ```no_run
//! use hpcrt_lib::config::SiteConfig;
//! use hpcrt_lib::runtime::{init_runtime, runtime};
//!
//! let mut config = SiteConfig::builtin();
//! config.select_subconfig(None)?;
//! init_runtime(config)?;
//!
//! let rt = runtime()?;
//! let stagedir = rt.make_stagedir(&["generic", "default", "hello"], true)?;
//! println!("staging in {}", stagedir.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod activation;
mod scoped;
mod types;

use std::cell::{Cell, RefCell};
use std::fmt::Write;
use std::path::PathBuf;
use std::rc::Rc;

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ConfigError, SiteConfig};
use crate::consts::{OUTPUT_DIR, PERFLOG_DIR, RETRY_SUFFIX, STAGE_DIR};
use crate::modules::ModuleSystem;
use crate::system::System;
use crate::util::expand::expand;
use crate::util::fs::make_dir;

pub use activation::{
  emit_load_env_commands, emit_load_env_commands_with, is_env_loaded, is_env_loaded_with, load_env,
  load_env_with,
};
pub use scoped::{ModuleUse, TempEnvironment, TempRuntime, switch_runtime, with_runtime};
pub use types::RuntimeError;

thread_local! {
  static CURRENT: RefCell<Option<Rc<RuntimeContext>>> = const { RefCell::new(None) };
}

/// Install `context` as the current runtime, returning the previous one.
fn swap_current(context: Option<Rc<RuntimeContext>>) -> Option<Rc<RuntimeContext>> {
  CURRENT.try_with(|current| current.replace(context)).ok().flatten()
}

fn current() -> Option<Rc<RuntimeContext>> {
  CURRENT.try_with(|current| current.borrow().clone()).ok().flatten()
}

/// Initialize the current runtime from `site_config`.
///
/// Does nothing if a runtime is already current; the existing one is returned.
pub fn init_runtime(site_config: SiteConfig) -> Result<Rc<RuntimeContext>, RuntimeError> {
  if let Some(existing) = current() {
    debug!("runtime already initialized");
    return Ok(existing);
  }

  let context = Rc::new(RuntimeContext::new(site_config)?);
  swap_current(Some(Rc::clone(&context)));
  info!(system = %context.system().name(), "runtime initialized");
  Ok(context)
}

/// The current runtime context.
///
/// Fails with [`RuntimeError::NotConfigured`] if none was initialized.
pub fn runtime() -> Result<Rc<RuntimeContext>, RuntimeError> {
  current().ok_or(RuntimeError::NotConfigured)
}

/// The runtime context of the framework on the current system.
#[derive(Debug)]
pub struct RuntimeContext {
  site_config: SiteConfig,
  system: System,
  current_run: Cell<u64>,
  timestamp: DateTime<Local>,
}

impl RuntimeContext {
  /// Create a context for the system selected in `site_config`, timestamped now.
  pub fn new(site_config: SiteConfig) -> Result<Self, RuntimeError> {
    Self::with_timestamp(site_config, Local::now())
  }

  /// Create a context with an explicit timestamp.
  pub fn with_timestamp(site_config: SiteConfig, timestamp: DateTime<Local>) -> Result<Self, RuntimeError> {
    let system = System::create(&site_config)?;
    Ok(Self {
      site_config,
      system,
      current_run: Cell::new(0),
      timestamp,
    })
  }

  pub fn site_config(&self) -> &SiteConfig {
    &self.site_config
  }

  pub fn system(&self) -> &System {
    &self.system
  }

  pub fn modules_system(&self) -> &dyn ModuleSystem {
    self.system.modules_system()
  }

  /// Number of retries of the current operation; 0 for the first run.
  pub fn current_run(&self) -> u64 {
    self.current_run.get()
  }

  /// Start the next retry.
  pub fn next_run(&self) {
    self.current_run.set(self.current_run.get() + 1);
    debug!(run = self.current_run.get(), "next run");
  }

  /// Look up a configuration option.
  pub fn get_option(&self, key: &str) -> Result<Value, RuntimeError> {
    Ok(self.site_config.get(key)?)
  }

  /// Human readable description of the current system.
  pub fn show_config(&self) -> String {
    self.system.to_string()
  }

  /// Start time of the runtime, formatted with `general/0/timestamp`.
  pub fn timestamp(&self) -> Result<String, RuntimeError> {
    let format = self
      .site_config
      .get_str("general/0/timestamp")?
      .unwrap_or_default();

    let mut formatted = String::new();
    write!(formatted, "{}", self.timestamp.format(&format))
      .map_err(|_| ConfigError::InvalidTimestampFormat(format.clone()))?;
    Ok(formatted)
  }

  /// Installation prefix.
  pub fn prefix(&self) -> Result<PathBuf, RuntimeError> {
    Ok(self.system_dir("prefix")?.unwrap_or_else(|| PathBuf::from(".")))
  }

  /// Configured stage directory, if any.
  pub fn stagedir(&self) -> Result<Option<PathBuf>, RuntimeError> {
    self.system_dir("stagedir")
  }

  /// Configured output directory, if any.
  pub fn outputdir(&self) -> Result<Option<PathBuf>, RuntimeError> {
    self.system_dir("outputdir")
  }

  /// Configured performance log directory, if any.
  pub fn perflogdir(&self) -> Result<Option<PathBuf>, RuntimeError> {
    self.system_dir("perflogdir")
  }

  /// `<stagedir or prefix/stage>/<timestamp>`
  pub fn stage_prefix(&self) -> Result<PathBuf, RuntimeError> {
    let base = match self.stagedir()? {
      Some(dir) => dir,
      None => self.prefix()?.join(STAGE_DIR),
    };
    Ok(base.join(self.timestamp()?))
  }

  /// `<outputdir or prefix/output>/<timestamp>`
  pub fn output_prefix(&self) -> Result<PathBuf, RuntimeError> {
    let base = match self.outputdir()? {
      Some(dir) => dir,
      None => self.prefix()?.join(OUTPUT_DIR),
    };
    Ok(base.join(self.timestamp()?))
  }

  /// `<perflogdir or prefix/perflogs>`; not timestamped.
  pub fn perflog_prefix(&self) -> Result<PathBuf, RuntimeError> {
    match self.perflogdir()? {
      Some(dir) => Ok(dir),
      None => Ok(self.prefix()?.join(PERFLOG_DIR)),
    }
  }

  /// Stage directory for `dirs` in the current run, without creating it.
  pub fn stage_path(&self, dirs: &[&str]) -> Result<PathBuf, RuntimeError> {
    let path = self.stage_prefix()?.join(self.format_dirs(dirs).iter().collect::<PathBuf>());
    debug!(path = %path.display(), "stage path");
    Ok(path)
  }

  /// Output directory for `dirs` in the current run, without creating it.
  pub fn output_path(&self, dirs: &[&str]) -> Result<PathBuf, RuntimeError> {
    let path = self.output_prefix()?.join(self.format_dirs(dirs).iter().collect::<PathBuf>());
    debug!(path = %path.display(), "output path");
    Ok(path)
  }

  /// Create the stage directory for `dirs`.
  ///
  /// With `wipeout`, an existing directory is removed first.
  pub fn make_stagedir(&self, dirs: &[&str], wipeout: bool) -> Result<PathBuf, RuntimeError> {
    let path = self.stage_path(dirs)?;
    make_dir(&path, wipeout).map_err(|source| RuntimeError::Io {
      path: path.clone(),
      source,
    })?;
    Ok(path)
  }

  /// Create the output directory for `dirs`.
  ///
  /// With `wipeout`, an existing directory is removed first.
  pub fn make_outputdir(&self, dirs: &[&str], wipeout: bool) -> Result<PathBuf, RuntimeError> {
    let path = self.output_path(dirs)?;
    make_dir(&path, wipeout).map_err(|source| RuntimeError::Io {
      path: path.clone(),
      source,
    })?;
    Ok(path)
  }

  /// Append the retry suffix to the last directory on retries.
  fn format_dirs(&self, dirs: &[&str]) -> Vec<String> {
    let mut dirs: Vec<String> = dirs.iter().map(|d| d.to_string()).collect();
    let run = self.current_run();
    if run > 0
      && let Some(last) = dirs.last_mut()
    {
      last.push_str(&format!("{}{}", RETRY_SUFFIX, run));
    }
    dirs
  }

  fn system_dir(&self, key: &str) -> Result<Option<PathBuf>, RuntimeError> {
    let value = self.site_config.get_str(&format!("systems/0/{}", key))?;
    Ok(
      value
        .filter(|v| !v.is_empty())
        .map(|v| PathBuf::from(expand(&v))),
    )
  }
}
