/// Application name, used for environment variable prefixes and default paths.
pub const APP_NAME: &str = "hpcrt";

/// Environment variable pointing at the site configuration file.
pub const CONFIG_FILE_ENV: &str = "HPCRT_CONFIG_FILE";

/// Name given to environments synthesized by `TempEnvironment`.
pub const TEMP_ENV_NAME: &str = "_hpcrt_temp_env";

/// Suffix appended to the leaf directory of retried runs.
pub const RETRY_SUFFIX: &str = "_retry";

/// Directory names under the installation prefix.
pub const STAGE_DIR: &str = "stage";
pub const OUTPUT_DIR: &str = "output";
pub const PERFLOG_DIR: &str = "perflogs";
