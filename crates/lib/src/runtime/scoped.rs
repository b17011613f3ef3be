//! Scoped switches of the current runtime and of the process environment.
//!
//! Each switch is a guard: creating it applies the change, dropping it reverts
//! it. Guards compose freely and unwind in reverse order of creation, also
//! when the scope is left by an early return or a panic.

use std::path::Path;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::activation::apply_environments;
use super::{RuntimeContext, RuntimeError, runtime, swap_current};
use crate::config::SiteConfig;
use crate::consts::TEMP_ENV_NAME;
use crate::environment::{Environment, Snapshot};
use crate::modules::ModuleSystem;

/// Makes another runtime current until dropped.
///
/// The runtime that was current on creation, or the absence of one, is
/// restored on drop.
#[derive(Debug)]
#[must_use = "the previous runtime is restored when the guard is dropped"]
pub struct TempRuntime {
  previous: Option<Rc<RuntimeContext>>,
  current: Option<Rc<RuntimeContext>>,
}

impl TempRuntime {
  /// Switch to a runtime built from `site_config`, or to no runtime at all.
  ///
  /// If the runtime cannot be built the current one stays in place.
  pub fn new(site_config: Option<SiteConfig>) -> Result<Self, RuntimeError> {
    let context = site_config.map(RuntimeContext::new).transpose()?;
    Ok(Self::enter(context.map(Rc::new)))
  }

  /// Switch to an already built runtime.
  pub fn install(context: RuntimeContext) -> Self {
    Self::enter(Some(Rc::new(context)))
  }

  /// Switch to a runtime loaded from a configuration file.
  ///
  /// `system` selects the subconfiguration (by hostname when `None`) and
  /// `options` are added as sticky options. Without a file, no runtime is
  /// current inside the scope.
  pub fn from_file(
    path: Option<&Path>,
    system: Option<&str>,
    options: &[(&str, Value)],
  ) -> Result<Self, RuntimeError> {
    let Some(path) = path else {
      return Self::new(None);
    };

    let mut config = SiteConfig::load(path)?;
    config.select_subconfig(system)?;
    for (key, value) in options {
      config.add_sticky_option(key, value.clone());
    }
    Self::new(Some(config))
  }

  /// The runtime installed by this guard.
  pub fn runtime(&self) -> Option<&Rc<RuntimeContext>> {
    self.current.as_ref()
  }

  fn enter(context: Option<Rc<RuntimeContext>>) -> Self {
    let previous = swap_current(context.clone());
    match &context {
      Some(context) => info!(system = %context.system().name(), "switched runtime"),
      None => debug!("cleared runtime"),
    }
    Self {
      previous,
      current: context,
    }
  }
}

impl Drop for TempRuntime {
  fn drop(&mut self) {
    swap_current(self.previous.take());
    debug!("restored previous runtime");
  }
}

/// Run `f` with a runtime built from `site_config` current.
///
/// The previous runtime is restored before returning, whatever `f` returns.
pub fn with_runtime<T, E, F>(site_config: Option<SiteConfig>, f: F) -> Result<T, E>
where
  F: FnOnce() -> Result<T, E>,
  E: From<RuntimeError>,
{
  let _guard = TempRuntime::new(site_config)?;
  f()
}

/// Wrap `f` so that every call runs with a runtime built from `site_config`.
///
/// A fresh runtime is built per call, so each call starts from run 0.
pub fn switch_runtime<A, T, E, F>(site_config: Option<SiteConfig>, f: F) -> impl Fn(A) -> Result<T, E>
where
  F: Fn(A) -> Result<T, E>,
  E: From<RuntimeError>,
{
  move |arg| with_runtime(site_config.clone(), || f(arg))
}

/// Activates an anonymous environment until dropped.
///
/// The process environment is restored to its state before activation on
/// drop. If activation fails the environment is restored right away.
#[derive(Debug)]
#[must_use = "the environment is restored when the guard is dropped"]
pub struct TempEnvironment {
  snapshot: Snapshot,
  environment: Environment,
  commands: Vec<String>,
}

impl TempEnvironment {
  /// Activate `modules` and `variables` with the current runtime's module system.
  pub fn new(modules: &[&str], variables: &[(&str, &str)]) -> Result<Self, RuntimeError> {
    let rt = runtime()?;
    Self::with_modules_system(rt.modules_system(), modules, variables)
  }

  /// Activate `modules` and `variables` with `modules_system`.
  pub fn with_modules_system(
    modules_system: &dyn ModuleSystem,
    modules: &[&str],
    variables: &[(&str, &str)],
  ) -> Result<Self, RuntimeError> {
    let environment = Environment::new(TEMP_ENV_NAME)
      .with_modules(modules.iter().copied())
      .with_variables(variables.iter().copied());

    let snapshot = Snapshot::capture();
    let mut commands = Vec::new();
    if let Err(err) = apply_environments(modules_system, &[&environment], &mut commands) {
      snapshot.restore();
      return Err(err);
    }

    Ok(Self {
      snapshot,
      environment,
      commands,
    })
  }

  /// The activated environment.
  pub fn environment(&self) -> &Environment {
    &self.environment
  }

  /// Shell commands equivalent to the activation.
  pub fn commands(&self) -> &[String] {
    &self.commands
  }
}

impl Drop for TempEnvironment {
  fn drop(&mut self) {
    self.snapshot.restore();
    debug!("restored process environment");
  }
}

/// Adds directories to the module search path until dropped.
///
/// The directories are removed from the module system of the runtime that was
/// current on creation.
#[derive(Debug)]
#[must_use = "the search path is restored when the guard is dropped"]
pub struct ModuleUse {
  context: Rc<RuntimeContext>,
  paths: Vec<String>,
}

impl ModuleUse {
  pub fn new(paths: &[&str]) -> Result<Self, RuntimeError> {
    let context = runtime()?;
    context.modules_system().searchpath_add(paths)?;
    Ok(Self {
      context,
      paths: paths.iter().map(|p| p.to_string()).collect(),
    })
  }
}

impl Drop for ModuleUse {
  fn drop(&mut self) {
    let paths: Vec<&str> = self.paths.iter().map(String::as_str).collect();
    if let Err(err) = self.context.modules_system().searchpath_remove(&paths) {
      warn!(error = %err, "could not restore module search path");
    }
  }
}
