//! Error types for the runtime context.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::modules::ModuleError;
use crate::system::SystemError;

/// Errors raised by the runtime context and environment activation.
#[derive(Debug, Error)]
pub enum RuntimeError {
  /// The runtime was queried before one was initialized.
  #[error("no runtime context is configured")]
  NotConfigured,

  /// The system descriptor could not be built from the configuration.
  #[error("could not create system descriptor: {0}")]
  Fatal(#[from] SystemError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  /// A module of an environment failed to load.
  #[error("could not load environment '{environment}': module '{module}': {source}")]
  ModuleLoad {
    environment: String,
    module: String,
    #[source]
    source: ModuleError,
  },

  /// A variable of an environment cannot be set in the process.
  #[error("could not load environment '{environment}': invalid variable '{name}'")]
  InvalidVariable { environment: String, name: String },

  #[error(transparent)]
  Modules(#[from] ModuleError),

  #[error("could not create directory {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl RuntimeError {
  /// Returns true for errors that should abort the enclosing operation.
  pub fn is_fatal(&self) -> bool {
    matches!(self, RuntimeError::NotConfigured | RuntimeError::Fatal(_))
  }
}
