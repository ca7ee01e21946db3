use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{command::Command, errors::Error, Result};

/// Name/alias index over registered commands.
///
/// Immutable once shared: the dispatcher holds it behind an `Arc` and swaps the whole
/// snapshot on reload.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command under its name and every alias.
    ///
    /// Fails without modifying the registry if any key is already taken.
    pub fn register(&mut self, command: Arc<dyn Command>) -> Result<()> {
        let keys: Vec<String> = command
            .spec()
            .keys()
            .map(|k| k.to_ascii_lowercase())
            .collect();

        for (i, key) in keys.iter().enumerate() {
            if self.index.contains_key(key) || keys[..i].contains(key) {
                return Err(Error::DuplicateCommand { key: key.clone() });
            }
        }

        let slot = self.commands.len();
        for key in keys {
            self.index.insert(key, slot);
        }
        tracing::debug!(command = command.spec().name, "registered command");
        self.commands.push(command);
        Ok(())
    }

    pub fn resolve(&self, token: &str) -> Option<Arc<dyn Command>> {
        let slot = *self.index.get(&token.to_ascii_lowercase())?;
        self.commands.get(slot).cloned()
    }

    /// Commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Command>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Builds a fresh registry (startup and reload).
pub type RegistryLoader = Arc<dyn Fn() -> Result<CommandRegistry> + Send + Sync>;

/// Shared, reloadable registry.
///
/// Readers take a snapshot `Arc` and keep using it for the whole dispatch, so a
/// concurrent reload is never observed half-way.
pub struct RegistryHandle {
    loader: RegistryLoader,
    current: RwLock<Arc<CommandRegistry>>,
}

impl RegistryHandle {
    /// Run the loader once; a failure (e.g. a duplicate name) is fatal to the caller.
    pub fn load(loader: RegistryLoader) -> Result<Self> {
        let registry = loader()?;
        tracing::info!(commands = registry.len(), "command registry loaded");
        Ok(Self {
            loader,
            current: RwLock::new(Arc::new(registry)),
        })
    }

    pub fn snapshot(&self) -> Arc<CommandRegistry> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-run discovery and publish the result. On failure the old registry stays.
    pub fn reload(&self) -> Result<usize> {
        let fresh = (self.loader)()?;
        let count = fresh.len();
        self.swap(fresh);
        tracing::info!(commands = count, "command registry reloaded");
        Ok(count)
    }

    /// Publish `current + command` as a new snapshot.
    pub fn register(&self, command: Arc<dyn Command>) -> Result<()> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = CommandRegistry::clone(&guard);
        next.register(command)?;
        *guard = Arc::new(next);
        Ok(())
    }

    fn swap(&self, registry: CommandRegistry) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(registry);
    }
}
