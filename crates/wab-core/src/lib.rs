//! Core of the WhatsApp group bot: command registry, permission gate,
//! dispatcher, per-chat settings and the built-in command set.
//!
//! Transport-agnostic. The WhatsApp connection lives behind
//! [`messaging::port::MessagingPort`], implemented in the gateway crate.

pub mod bulk;
pub mod command;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod security;
pub mod settings;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
