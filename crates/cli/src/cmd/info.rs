//! Info command implementation.
//!
//! Shows the selected system, its partitions and the directory prefixes of the
//! current invocation.

use anyhow::Result;
use serde_json::json;

use hpcrt_lib::runtime;

use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_info(output: OutputFormat) -> Result<()> {
  let rt = runtime()?;
  let system = rt.system();

  if output.is_json() {
    let partitions: Vec<_> = system
      .partitions()
      .iter()
      .map(|p| {
        json!({
          "name": p.name,
          "fullname": p.fullname,
          "scheduler": p.scheduler,
          "launcher": p.launcher,
          "environs": p.environs,
        })
      })
      .collect();
    let info = json!({
      "system": system.name(),
      "descr": system.descr(),
      "hostnames": system.hostnames(),
      "modules_system": rt.modules_system().name(),
      "partitions": partitions,
      "environments": rt.site_config().environment_names(),
      "timestamp": rt.timestamp()?,
      "prefix": rt.prefix()?,
      "stage_prefix": rt.stage_prefix()?,
      "output_prefix": rt.output_prefix()?,
      "perflog_prefix": rt.perflog_prefix()?,
    });
    return print_json(&info);
  }

  println!("{}", rt.show_config());
  println!();
  print_stat("Prefix", &rt.prefix()?.display().to_string());
  print_stat("Stage prefix", &rt.stage_prefix()?.display().to_string());
  print_stat("Output prefix", &rt.output_prefix()?.display().to_string());
  print_stat("Perflog prefix", &rt.perflog_prefix()?.display().to_string());
  print_stat("Environments", &rt.site_config().environment_names().join(", "));

  Ok(())
}
