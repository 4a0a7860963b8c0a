//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, ValueHint};
use serde_json::{Map, Value};

use kiln_config::{load_dotenv, Env};
use kiln_core::{Core, CoreOptions, RunOptions};

use crate::builtins;
use crate::error::CliError;

/// Kiln - pluggable build-tool runtime
///
/// Dispatches a named command through the preset/plugin pipeline.
#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    author,
    version,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Increase verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "KILN_CONFIG_PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    /// Working directory (defaults to the current directory)
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub cwd: Option<PathBuf>,

    /// Build environment (development, production, test)
    #[arg(short, long, global = true, env = "KILN_ENV", default_value = "development")]
    pub env: String,

    /// Command to dispatch
    pub command: String,

    /// Command arguments as key=value pairs (bare keys become true)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Wire up the orchestrator and drive the run.
    pub async fn execute(self) -> Result<(), CliError> {
        let env: Env = self.env.parse()?;
        load_dotenv(env);

        let cwd = match self.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };

        let mut opts = CoreOptions::new(cwd, env);
        opts.presets.push(builtins::BUILTIN_PRESET.into());
        opts.config_path = self.config;

        let mut core = Core::new(opts, Arc::new(builtins::resolver()));
        let args = parse_args(&self.args)?;
        core.run(RunOptions::new(self.command).with_args(args)).await?;
        Ok(())
    }
}

/// Parse `key=value` pairs into an argument bag.
///
/// Values parse as JSON scalars where possible (`retries=3`,
/// `watch=true`), falling back to plain strings; a bare `key` becomes
/// `true`. Leading dashes are stripped so `--watch` works too.
fn parse_args(pairs: &[String]) -> Result<Value, CliError> {
    let mut args = Map::new();
    for pair in pairs {
        let pair = pair.trim_start_matches('-');
        if pair.is_empty() {
            return Err(CliError::BadArg { arg: pair.to_string() });
        }
        match pair.split_once('=') {
            Some((key, _)) if key.is_empty() => {
                return Err(CliError::BadArg { arg: pair.to_string() })
            }
            Some((key, value)) => {
                let value = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                args.insert(key.to_string(), value);
            }
            None => {
                args.insert(pair.to_string(), Value::Bool(true));
            }
        }
    }
    Ok(Value::Object(args))
}
