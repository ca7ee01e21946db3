//! Built-in commands.
//!
//! Each command is a small struct implementing [`Command`]; dependencies it needs
//! beyond the per-message [`CommandContext`](crate::command::CommandContext)
//! (settings store, pacing, file paths) are injected at construction.

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    command::Command,
    registry::{CommandRegistry, RegistryLoader},
    settings::SettingsStore,
    Result,
};

mod broadcast;
mod group;
mod relay;

pub use broadcast::{SendCommand, SendToAllGroupsCommand, SendToGroupsCommand};
pub use group::{AllCommand, HelpCommand, MultiTagCommand, PingCommand, SayCommand};
pub use relay::{SendCleanedMessagesCommand, SendCleanedToChannelCommand};

/// Collaborators shared by the built-in command set.
#[derive(Clone)]
pub struct BuiltinDeps {
    pub bot_name: String,
    pub settings: Arc<SettingsStore>,
    /// Pause between successive group sends of a multi-group broadcast.
    pub broadcast_interval: Duration,
    /// Pause between successive blocks relayed from the cleaned-messages file.
    pub relay_interval: Duration,
    pub cleaned_messages_file: PathBuf,
}

/// Build a registry holding every built-in command.
pub fn builtin_registry(deps: &BuiltinDeps) -> Result<CommandRegistry> {
    let commands: Vec<Arc<dyn Command>> = vec![
        Arc::new(PingCommand::new()),
        Arc::new(HelpCommand::new(&deps.bot_name)),
        Arc::new(AllCommand::new()),
        Arc::new(SayCommand::new()),
        Arc::new(MultiTagCommand::new(deps.settings.clone())),
        Arc::new(SendCommand::new()),
        Arc::new(SendToGroupsCommand::new(deps.broadcast_interval)),
        Arc::new(SendToAllGroupsCommand::new(deps.broadcast_interval)),
        Arc::new(SendCleanedMessagesCommand::new(
            deps.cleaned_messages_file.clone(),
            deps.relay_interval,
        )),
        Arc::new(SendCleanedToChannelCommand::new(
            deps.cleaned_messages_file.clone(),
            deps.relay_interval,
        )),
    ];

    let mut registry = CommandRegistry::new();
    for command in commands {
        let spec = command.spec();
        tracing::debug!(command = spec.name, category = ?spec.category, "loading command");
        registry.register(command)?;
    }
    Ok(registry)
}

/// Loader for [`RegistryHandle`](crate::registry::RegistryHandle) that rebuilds the
/// built-in set on every reload.
pub fn builtin_loader(deps: BuiltinDeps) -> RegistryLoader {
    Arc::new(move || builtin_registry(&deps))
}

/// Parse `"Quoted target" rest of message`.
///
/// Returns the trimmed target and trimmed message; `None` unless both are non-empty
/// and separated by whitespace.
pub(crate) fn parse_quoted_target(args: &str) -> Option<(String, String)> {
    let rest = args.trim_start().strip_prefix('"')?;
    let (target, tail) = rest.split_once('"')?;
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    let target = target.trim();
    let message = tail.trim();
    if target.is_empty() || message.is_empty() {
        return None;
    }
    Some((target.to_string(), message.to_string()))
}
