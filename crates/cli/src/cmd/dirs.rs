//! Dirs command implementation.
//!
//! Prints the stage and output directories the runtime derives for a set of
//! segments at a given run number, optionally creating them.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use hpcrt_lib::runtime;

use crate::output::{OutputFormat, print_json, print_stat};

pub struct DirsOptions {
  pub segments: Vec<String>,
  pub run: u64,
  pub create: bool,
  pub wipeout: bool,
}

#[derive(Debug, Serialize)]
struct Dirs {
  run: u64,
  stagedir: PathBuf,
  outputdir: PathBuf,
  created: bool,
}

pub fn cmd_dirs(options: DirsOptions, output: OutputFormat) -> Result<()> {
  let rt = runtime()?;
  for _ in 0..options.run {
    rt.next_run();
  }

  let segments: Vec<&str> = options.segments.iter().map(String::as_str).collect();
  let (stagedir, outputdir) = if options.create {
    (
      rt.make_stagedir(&segments, options.wipeout)?,
      rt.make_outputdir(&segments, options.wipeout)?,
    )
  } else {
    (rt.stage_path(&segments)?, rt.output_path(&segments)?)
  };

  let dirs = Dirs {
    run: rt.current_run(),
    stagedir,
    outputdir,
    created: options.create,
  };

  if output.is_json() {
    print_json(&dirs)?;
  } else {
    print_stat("Stage", &dirs.stagedir.display().to_string());
    print_stat("Output", &dirs.outputdir.display().to_string());
  }

  Ok(())
}
