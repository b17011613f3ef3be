//! Environment activation.
//!
//! Activating an environment loads its modules through the module system of the
//! current system and sets its variables in the process. Every side effect is
//! recorded as a shell command, so the same activation can be replayed in a job
//! script.

use tracing::{debug, trace};

use super::{RuntimeError, runtime};
use crate::environment::{Environment, Snapshot, vars};
use crate::modules::ModuleSystem;
use crate::util::expand::expand;

/// Activate `environments` in order with the current runtime's module system.
///
/// See [`load_env_with`].
pub fn load_env(environments: &[&Environment]) -> Result<(Snapshot, Vec<String>), RuntimeError> {
  let rt = runtime()?;
  load_env_with(rt.modules_system(), environments)
}

/// Activate `environments` in order with `modules`.
///
/// Returns the process environment as it was before activation and the shell
/// commands reproducing the activation, in the order they were applied.
///
/// Activation is not transactional. If a module fails to load or a variable
/// cannot be set, the error names the offending environment and everything
/// applied before it stays in effect. Modules are loaded with conflict
/// resolution, so conflicting modules may have been unloaded too. Callers that
/// need a rollback capture a [`Snapshot`] beforehand, or use
/// [`TempEnvironment`](super::TempEnvironment).
pub fn load_env_with(
  modules: &dyn ModuleSystem,
  environments: &[&Environment],
) -> Result<(Snapshot, Vec<String>), RuntimeError> {
  let snapshot = Snapshot::capture();
  let mut commands = Vec::new();
  apply_environments(modules, environments, &mut commands)?;

  if tracing::enabled!(tracing::Level::DEBUG) {
    let diff = snapshot.diff(&Snapshot::capture());
    debug!(
      added = ?diff.added,
      changed = ?diff.changed,
      removed = ?diff.removed,
      "environment activated"
    );
  }

  Ok((snapshot, commands))
}

/// Returns true if `environment` is active with the current runtime's module system.
pub fn is_env_loaded(environment: &Environment) -> Result<bool, RuntimeError> {
  let rt = runtime()?;
  Ok(is_env_loaded_with(rt.modules_system(), environment))
}

/// Returns true if every module of `environment` is loaded and every variable
/// holds its expanded value.
pub fn is_env_loaded_with(modules: &dyn ModuleSystem, environment: &Environment) -> bool {
  let modules_loaded = environment.modules.iter().all(|m| modules.is_module_loaded(m));
  if !modules_loaded {
    return false;
  }

  environment
    .variables
    .iter()
    .all(|(name, value)| std::env::var(name).ok().as_deref() == Some(expand(value).as_str()))
}

/// Shell commands activating `environments`, leaving the process unchanged.
pub fn emit_load_env_commands(environments: &[&Environment]) -> Result<Vec<String>, RuntimeError> {
  let rt = runtime()?;
  emit_load_env_commands_with(rt.modules_system(), environments)
}

/// Shell commands activating `environments` with `modules`.
///
/// The environments are activated and the process environment is restored
/// afterwards, also when activation fails.
pub fn emit_load_env_commands_with(
  modules: &dyn ModuleSystem,
  environments: &[&Environment],
) -> Result<Vec<String>, RuntimeError> {
  let snapshot = Snapshot::capture();
  let mut commands = Vec::new();
  let result = apply_environments(modules, environments, &mut commands);
  snapshot.restore();
  result?;
  Ok(commands)
}

pub(super) fn apply_environments(
  modules: &dyn ModuleSystem,
  environments: &[&Environment],
  commands: &mut Vec<String>,
) -> Result<(), RuntimeError> {
  for environment in environments {
    debug!(environment = %environment.name, "loading environment");

    for module in &environment.modules {
      let conflicts = modules
        .load_module(module, true)
        .map_err(|source| RuntimeError::ModuleLoad {
          environment: environment.name.clone(),
          module: module.clone(),
          source,
        })?;

      for conflict in &conflicts {
        record(commands, modules.emit_unload_commands(conflict));
      }
      record(commands, modules.emit_load_commands(module));
    }

    for (name, value) in &environment.variables {
      let expanded = expand(value);
      if !vars::is_valid_name(name) || !vars::is_valid_value(&expanded) {
        return Err(RuntimeError::InvalidVariable {
          environment: environment.name.clone(),
          name: name.clone(),
        });
      }

      vars::set_var(name, &expanded);
      record(commands, [format!("export {}={}", name, value)]);
    }
  }

  Ok(())
}

fn record(commands: &mut Vec<String>, emitted: impl IntoIterator<Item = String>) {
  for command in emitted {
    trace!(command = %command, "emit");
    commands.push(command);
  }
}
