//! Run command implementation.
//!
//! Runs a command inside the requested environments, in a fresh stage
//! directory per attempt. Failed attempts are retried with the run counter
//! advanced, so every retry stages into its own `<name>_retry<N>` directory.
//! The job's stdout and stderr are kept in `job.out` and `job.err`; on success
//! they are copied to the output directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use hpcrt_lib::runtime::{self, RuntimeContext, load_env};
use hpcrt_lib::{Environment, Snapshot};

use super::env::resolve_environments;
use crate::output::{OutputFormat, format_duration, print_info, print_json, print_success, print_warning, symbols};

const STDOUT_FILE: &str = "job.out";
const STDERR_FILE: &str = "job.err";
const ENV_SCRIPT: &str = "job.env";

pub struct RunOptions {
  pub environments: Vec<String>,
  pub partition: Option<String>,
  pub name: String,
  pub retries: u32,
  pub timeout: Option<Duration>,
  pub command: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Attempt {
  run: u64,
  stagedir: PathBuf,
  exit_code: Option<i32>,
  timed_out: bool,
  elapsed_ms: u128,
}

impl Attempt {
  fn succeeded(&self) -> bool {
    !self.timed_out && self.exit_code == Some(0)
  }
}

#[derive(Debug, Serialize)]
struct RunReport {
  success: bool,
  outputdir: Option<PathBuf>,
  attempts: Vec<Attempt>,
}

pub async fn cmd_run(options: RunOptions, output: OutputFormat) -> Result<()> {
  let rt = runtime::runtime()?;
  let partition = match &options.partition {
    Some(name) => name.clone(),
    None => match rt.system().partitions().first() {
      Some(p) => p.name.clone(),
      None => bail!("System '{}' has no partitions", rt.system().name()),
    },
  };

  let environments = resolve_environments(&rt, &options.environments, Some(&partition))?;
  let env_label = if options.environments.is_empty() {
    "default".to_string()
  } else {
    options.environments.join("+")
  };
  let dirs = [rt.system().name(), partition.as_str(), env_label.as_str(), options.name.as_str()];

  let mut report = RunReport {
    success: false,
    outputdir: None,
    attempts: Vec::new(),
  };

  for attempt in 0..=options.retries {
    if attempt > 0 {
      rt.next_run();
      if !output.is_json() {
        print_warning(&format!("Retrying ({} of {})", attempt, options.retries));
      }
    }

    let result = run_attempt(&rt, &dirs, &environments, &options).await?;
    if !output.is_json() {
      print_attempt(&result);
    }

    let succeeded = result.succeeded();
    let stagedir = result.stagedir.clone();
    report.attempts.push(result);

    if succeeded {
      let outputdir = rt.make_outputdir(&dirs, true)?;
      for file in [STDOUT_FILE, STDERR_FILE, ENV_SCRIPT] {
        copy_artifact(&stagedir, &outputdir, file)?;
      }
      report.success = true;
      report.outputdir = Some(outputdir);
      break;
    }
  }

  if output.is_json() {
    print_json(&report)?;
  } else if let Some(outputdir) = &report.outputdir {
    print_success(&format!("Output saved in {}", outputdir.display()));
  }

  if !report.success {
    bail!(
      "Command failed after {} attempt(s): {}",
      report.attempts.len(),
      options.command.join(" ")
    );
  }
  Ok(())
}

/// Run one attempt in a fresh stage directory.
///
/// The environments are activated for the duration of the attempt only.
async fn run_attempt(
  rt: &RuntimeContext,
  dirs: &[&str],
  environments: &[Environment],
  options: &RunOptions,
) -> Result<Attempt> {
  let stagedir = rt.make_stagedir(dirs, true)?;
  info!(run = rt.current_run(), stagedir = %stagedir.display(), "starting attempt");

  let snapshot = Snapshot::capture();
  let result = activate_and_spawn(&stagedir, environments, options).await;
  snapshot.restore();

  let (exit_code, timed_out, elapsed) = result?;
  Ok(Attempt {
    run: rt.current_run(),
    stagedir,
    exit_code,
    timed_out,
    elapsed_ms: elapsed.as_millis(),
  })
}

async fn activate_and_spawn(
  stagedir: &Path,
  environments: &[Environment],
  options: &RunOptions,
) -> Result<(Option<i32>, bool, Duration)> {
  let refs: Vec<&Environment> = environments.iter().collect();
  let (_, commands) = load_env(&refs).context("Failed to activate environments")?;

  let mut script = commands.join("\n");
  script.push('\n');
  std::fs::write(stagedir.join(ENV_SCRIPT), script).context("Failed to write environment script")?;

  let stdout = File::create(stagedir.join(STDOUT_FILE)).context("Failed to create job.out")?;
  let stderr = File::create(stagedir.join(STDERR_FILE)).context("Failed to create job.err")?;

  let (program, args) = options
    .command
    .split_first()
    .context("No command given")?;

  debug!(program = %program, args = ?args, "spawning job");
  let start = Instant::now();
  let mut child = Command::new(program)
    .args(args)
    .current_dir(stagedir)
    .stdin(Stdio::null())
    .stdout(Stdio::from(stdout))
    .stderr(Stdio::from(stderr))
    .kill_on_drop(true)
    .spawn()
    .with_context(|| format!("Failed to spawn '{}'", program))?;

  let status = match options.timeout {
    Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
      Ok(status) => Some(status?),
      Err(_) => {
        warn!(limit = ?limit, "job timed out");
        child.kill().await.context("Failed to kill timed out job")?;
        None
      }
    },
    None => Some(child.wait().await?),
  };

  let elapsed = start.elapsed();
  match status {
    Some(status) => Ok((status.code(), false, elapsed)),
    None => Ok((None, true, elapsed)),
  }
}

fn copy_artifact(stagedir: &Path, outputdir: &Path, name: &str) -> Result<()> {
  std::fs::copy(stagedir.join(name), outputdir.join(name))
    .with_context(|| format!("Failed to copy {} to {}", name, outputdir.display()))?;
  Ok(())
}

fn print_attempt(attempt: &Attempt) {
  let elapsed = format_duration(Duration::from_millis(attempt.elapsed_ms as u64));
  let outcome = if attempt.timed_out {
    "timed out".to_string()
  } else {
    match attempt.exit_code {
      Some(code) => format!("exit code {}", code),
      None => "killed by signal".to_string(),
    }
  };
  print_info(&format!(
    "Run {} {} {} ({}, {})",
    attempt.run,
    symbols::ARROW,
    attempt.stagedir.display(),
    outcome,
    elapsed
  ));
}
