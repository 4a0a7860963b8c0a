//! Build environment handling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("unknown environment: {0}")]
    Unknown(String),

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    /// Selects the build environment when `--env` is not passed.
    pub const KILN_ENV: &str = "KILN_ENV";
    /// Overrides the config file search.
    pub const KILN_CONFIG_PATH: &str = "KILN_CONFIG_PATH";

    pub const RUST_LOG: &str = "RUST_LOG";
}

/// The build environment a run executes under.
///
/// Selects the `kiln.config.{env}.yaml` overlay and is exposed to
/// plugins through their capability API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Development,
    Production,
    Test,
}

impl Env {
    /// String form used in overlay file names and env vars.
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Development => "development",
            Env::Production => "production",
            Env::Test => "test",
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Env::Development),
            "production" | "prod" => Ok(Env::Production),
            "test" => Ok(Env::Test),
            other => Err(EnvError::Unknown(other.to_string())),
        }
    }
}

/// Load `.env` files for the given environment.
///
/// Files load in order, later overriding earlier: `.env`, `.env.local`,
/// `.env.{env}`. Missing files are skipped.
pub fn load_dotenv(env: Env) {
    let _ = dotenvy::from_filename(".env");
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(format!(".env.{}", env.as_str()));
}
