//! hpcrt-lib: runtime context for HPC test runs
//!
//! This crate provides the state a test framework run needs on an HPC system:
//! - `SiteConfig`: the site configuration, narrowed to the current system
//! - `System`: the target system descriptor and its module system backend
//! - `RuntimeContext`: run timestamp, retry counter and derived stage/output paths
//! - `Environment`: toolchain environments and their activation in the process
//! - scoped guards that switch the runtime or the process environment and
//!   restore it on drop

pub mod config;
pub mod consts;
pub mod environment;
pub mod modules;
pub mod runtime;
pub mod system;
pub mod util;

pub use config::{ConfigError, SiteConfig};
pub use environment::{Environment, Snapshot};
pub use modules::{ModuleError, ModuleSystem};
pub use runtime::{RuntimeContext, RuntimeError, init_runtime, runtime};
pub use system::{Partition, System, SystemError};
