//! Env command implementation.
//!
//! Prints the shell commands that activate the named environments on the
//! current system, without changing the environment of this process.

use anyhow::{Context, Result, bail};

use hpcrt_lib::runtime::{self, emit_load_env_commands};
use hpcrt_lib::{Environment, RuntimeContext};

use crate::output::{OutputFormat, print_json};

pub fn cmd_env(names: &[String], partition: Option<&str>, output: OutputFormat) -> Result<()> {
  let rt = runtime::runtime()?;
  let environments = resolve_environments(&rt, names, partition)?;
  let refs: Vec<&Environment> = environments.iter().collect();

  let commands = emit_load_env_commands(&refs).context("Failed to activate environments")?;

  if output.is_json() {
    print_json(&commands)?;
  } else {
    for command in &commands {
      println!("{}", command);
    }
  }

  Ok(())
}

/// The environments to activate for `names`, in activation order.
///
/// With a partition, the system's preload environment and the partition's
/// local environment come first.
pub(crate) fn resolve_environments(
  rt: &RuntimeContext,
  names: &[String],
  partition: Option<&str>,
) -> Result<Vec<Environment>> {
  let mut environments = Vec::new();

  if let Some(partition) = partition {
    let system = rt.system();
    let Some(part) = system.partition(partition) else {
      bail!("System '{}' has no partition '{}'", system.name(), partition);
    };
    environments.push(system.preload_env().clone());
    environments.push(part.local_env().clone());
  }

  for name in names {
    let environment = rt
      .site_config()
      .environment(name)
      .with_context(|| format!("Unknown environment '{}'", name))?;
    environments.push(environment);
  }

  Ok(environments)
}
