mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hpcrt_lib::consts::APP_NAME;
use tracing_subscriber::EnvFilter;

use crate::cmd::{DirsOptions, RunOptions, RuntimeArgs};
use crate::output::{OutputFormat, print_error};

/// hpcrt - runtime context for HPC test runs
#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Output format
  #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  format: OutputFormat,

  #[command(flatten)]
  runtime: RuntimeArgs,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show the selected system and its directories
  Info,

  /// Print the stage and output directories of a run
  Dirs {
    /// Directory segments below the prefixes
    segments: Vec<String>,

    /// Run number (0 for the first run, N for the Nth retry)
    #[arg(long, default_value_t = 0)]
    run: u64,

    /// Create the directories
    #[arg(long)]
    create: bool,

    /// Keep existing directory contents when creating
    #[arg(long, requires = "create")]
    keep: bool,
  },

  /// Print the shell commands that activate environments
  Env {
    /// Environment names
    #[arg(required = true)]
    environments: Vec<String>,

    /// Also activate the local environment of this partition
    #[arg(short, long)]
    partition: Option<String>,
  },

  /// Run a command inside an environment, retrying on failure
  Run {
    /// Environments to activate, in order
    #[arg(short, long = "env")]
    environments: Vec<String>,

    /// Partition to run on (default: the first one)
    #[arg(short, long)]
    partition: Option<String>,

    /// Job name, used as the leaf directory
    #[arg(short, long, default_value = "job")]
    name: String,

    /// Number of retries after a failed attempt
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Time limit per attempt (e.g. "30s", "5m")
    #[arg(long)]
    timeout: Option<humantime::Duration>,

    /// Command to run
    #[arg(last = true, required = true)]
    command: Vec<String>,
  },
}

fn default_filter(verbose: u8) -> &'static str {
  match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
  let cli = Cli::parse();

  // Logs go to stderr so they never mix with command output
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(err) = run(cli).await {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}

async fn run(cli: Cli) -> Result<()> {
  cmd::init(&cli.runtime)?;

  match cli.command {
    Commands::Info => cmd::cmd_info(cli.format),
    Commands::Dirs {
      segments,
      run,
      create,
      keep,
    } => cmd::cmd_dirs(
      DirsOptions {
        segments,
        run,
        create,
        wipeout: !keep,
      },
      cli.format,
    ),
    Commands::Env {
      environments,
      partition,
    } => cmd::cmd_env(&environments, partition.as_deref(), cli.format),
    Commands::Run {
      environments,
      partition,
      name,
      retries,
      timeout,
      command,
    } => {
      let options = RunOptions {
        environments,
        partition,
        name,
        retries,
        timeout: timeout.map(Into::into),
        command,
      };
      cmd::cmd_run(options, cli.format).await
    }
  }
}
