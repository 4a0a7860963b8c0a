//! Configuration file discovery and parsing.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::env::Env;
use crate::value::shallow_merge;

/// Candidate config files, checked in order; the first that exists wins.
pub const DEFAULT_CONFIG_FILES: &[&str] =
    &["kiln.config.yaml", "kiln.config.yml", "kiln.config.json"];

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid config in {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("config root in {path} must be a mapping")]
    NotAnObject { path: PathBuf },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },
}

/// A loaded user configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The (possibly overlaid) configuration object.
    pub config: Value,
    /// Base file the config came from, if any existed.
    pub path: Option<PathBuf>,
}

/// Configuration loader.
///
/// Looks for the first existing candidate file under `cwd`, expands
/// `${VAR}` / `${VAR:-default}` references, then overlays the
/// environment-specific variant (`kiln.config.development.yaml` next to
/// `kiln.config.yaml`, and so on) over the base file.
pub struct ConfigLoader {
    cwd: PathBuf,
    env: Env,
    candidates: Vec<String>,
}

impl ConfigLoader {
    /// Create a loader for the given working directory and environment.
    pub fn new(cwd: impl AsRef<Path>, env: Env) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            env,
            candidates: DEFAULT_CONFIG_FILES.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Replace the candidate file list.
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Load the user configuration.
    ///
    /// Returns an empty object when no candidate file exists.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let Some(base_path) = self.find_base_file() else {
            debug!(cwd = %self.cwd.display(), "no config file found, using empty config");
            return Ok(LoadedConfig {
                config: Value::Object(Map::new()),
                path: None,
            });
        };

        let mut config = self.load_file(&base_path)?;

        let overlay_path = env_variant(&base_path, self.env);
        if overlay_path.exists() {
            debug!(overlay = %overlay_path.display(), "applying environment overlay");
            let overlay = self.load_file(&overlay_path)?;
            shallow_merge(&mut config, overlay);
        }

        Ok(LoadedConfig {
            config,
            path: Some(base_path),
        })
    }

    /// Load from an explicit config file, bypassing candidate search.
    ///
    /// Unlike [`load`](Self::load), a missing file is an error here: the
    /// caller asked for this path specifically.
    pub fn load_path(&self, path: &Path) -> Result<LoadedConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut config = self.load_file(path)?;

        let overlay_path = env_variant(path, self.env);
        if overlay_path.exists() {
            let overlay = self.load_file(&overlay_path)?;
            shallow_merge(&mut config, overlay);
        }

        Ok(LoadedConfig {
            config,
            path: Some(path.to_path_buf()),
        })
    }

    fn find_base_file(&self) -> Option<PathBuf> {
        self.candidates
            .iter()
            .map(|name| self.cwd.join(name))
            .find(|path| path.exists())
    }

    fn load_file(&self, path: &Path) -> Result<Value, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let expanded = self.expand_env_vars(&contents)?;
        let value = parse_by_extension(path, &expanded)?;

        if !value.is_object() {
            return Err(ConfigError::NotAnObject {
                path: path.to_path_buf(),
            });
        }
        Ok(value)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();

        for cap in re.captures_iter(content) {
            let full_match = cap.get(0).unwrap().as_str();
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match std::env::var(var_name) {
                Ok(v) => v,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        return Err(ConfigError::EnvVarNotFound {
                            var: var_name.to_string(),
                        })
                    }
                },
            };

            result = result.replace(full_match, &value);
        }

        Ok(result)
    }
}

/// Derive the environment-specific variant of a config path, e.g.
/// `kiln.config.yaml` -> `kiln.config.production.yaml`.
fn env_variant(base: &Path, env: Env) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let ext = base
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    base.with_file_name(format!("{}.{}.{}", stem, env.as_str(), ext))
}

fn parse_by_extension(path: &Path, contents: &str) -> Result<Value, ConfigError> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
    match ext {
        "json" => serde_json::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        _ => serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}
