//! Named commands registered by plugins and dispatched by the run loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use crate::plugin::PluginId;

/// Boxed command handler: `(args) -> ()`.
pub type CommandFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A registered command.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    /// Plugin the registration is attributed to.
    pub plugin: PluginId,
    pub(crate) f: CommandFn,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .finish()
    }
}

/// Name → command table. One handler per name, last registration wins.
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: HashMap<String, Command>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, displacing any previous handler of the same
    /// name.
    pub fn insert(&mut self, command: Command) {
        if let Some(previous) = self.commands.get(&command.name) {
            warn!(
                command = %command.name,
                previous = %previous.plugin,
                new = %command.plugin,
                "command re-registered, keeping the later handler"
            );
        }
        self.commands.insert(command.name.clone(), command);
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered command names, sorted for stable output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
