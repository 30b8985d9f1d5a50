// ⚙️ Runtime configuration
// defaults -> .env -> CATALOG_* environment -> command-line flags

use clap::builder::BoolishValueParser;
use dotenvy::dotenv;
use std::path::PathBuf;

pub const DEFAULT_DATABASE: &str = "vehicle-catalog.db";
pub const DEFAULT_LOG_FILTER: &str = "info";

pub const DATABASE_VAR: &str = "CATALOG_DATABASE";
pub const OVERWRITE_VAR: &str = "CATALOG_OVERWRITE";
pub const LOG_VAR: &str = "CATALOG_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Handed to the Destination; existing attributes are only replaced when set
    pub overwrite_existing: bool,
    /// tracing-subscriber EnvFilter directive
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE),
            overwrite_existing: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, leaving already-set variables alone
    pub fn load_dotenv() {
        if let Ok(path) = dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
    }
}

// ============================================================================
// COMMAND LINE
// ============================================================================

/// Global flags; each falls back to its CATALOG_* variable, then the default
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// SQLite database file
    #[arg(long = "database", global = true, env = DATABASE_VAR, default_value = DEFAULT_DATABASE)]
    pub database_path: PathBuf,

    /// Replace attributes a model already has (env accepts 1/0, yes/no, on/off, true/false)
    #[arg(long, global = true, env = OVERWRITE_VAR, value_parser = BoolishValueParser::new())]
    pub overwrite: bool,

    /// Log filter (RUST_LOG syntax)
    #[arg(long = "log", global = true, env = LOG_VAR, default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
}

impl From<ConfigArgs> for AppConfig {
    fn from(args: ConfigArgs) -> Self {
        AppConfig {
            database_path: args.database_path,
            overwrite_existing: args.overwrite,
            log_filter: args.log_filter,
        }
    }
}
