//! Built-in option defaults and the generic fallback configuration.

use serde_json::{Value, json};

/// Default value of an option, keyed without the section index
/// (`systems/prefix`, `general/timestamp`).
pub(crate) fn default_value(key: &str) -> Option<Value> {
  let value = match key {
    "systems/descr" => json!(""),
    "systems/hostnames" => json!([]),
    "systems/prefix" => json!("."),
    "systems/stagedir" | "systems/outputdir" | "systems/perflogdir" => Value::Null,
    "systems/modules_system" => json!("nomod"),
    "systems/modules" | "systems/variables" | "systems/partitions" => json!([]),
    "general/timestamp" => json!("%FT%T"),
    "general/verbose" => json!(0),
    _ => return None,
  };
  Some(value)
}

/// Configuration used when no site configuration file is given.
///
/// Describes a single `generic` system matching any hostname, without a module
/// system, with one local partition and the `builtin` environment.
pub(crate) fn generic_document() -> Value {
  json!({
    "systems": [{
      "name": "generic",
      "descr": "Generic example system",
      "hostnames": [".*"],
      "modules_system": "nomod",
      "partitions": [{
        "name": "default",
        "descr": "Login nodes",
        "scheduler": "local",
        "launcher": "local",
        "environs": ["builtin"]
      }]
    }],
    "environments": [{
      "name": "builtin",
      "cc": "cc",
      "cxx": "",
      "ftn": ""
    }]
  })
}
