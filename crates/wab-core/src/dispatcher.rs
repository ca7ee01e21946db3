//! Inbound message pipeline.
//!
//! One call to [`Dispatcher::dispatch`] per inbound envelope, awaited to completion
//! before the next one so replies keep their order:
//!
//! 1. ingest (drop empty envelopes and the bot's own echoes outside its self-chat)
//! 2. owner-only gate (silent)
//! 3. parse `<prefix><name> <args>`
//! 4. resolve against the current registry snapshot
//! 5. permission gate (one rejection reply on denial, then stop)
//! 6. execute inside an isolated task; any error or panic becomes one generic reply
//! 7. silent tag-all re-broadcast for flagged groups
//!
//! Nothing in here returns an error to the transport loop.

use std::sync::Arc;

use crate::{
    command::{Command, CommandContext, Invocation, MessageContext, OwnerSet},
    domain::UserId,
    messaging::{port::MessagingPort, types::InboundEnvelope},
    registry::{CommandRegistry, RegistryHandle},
    security::{self, AccessControl, Decision},
    settings::SettingsStore,
    Result,
};

pub const DEFAULT_PREFIX: &str = "!";

pub const FAILURE_REPLY: &str =
    "❌ An error occurred while executing the command. Please try again later.";

/// What happened to one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// No payload, or the bot's own message outside its self-chat.
    Ignored,
    /// Owner-only mode and the sender is not an owner.
    Blocked,
    /// Text without a well-formed invocation.
    NotCommand,
    /// Well-formed invocation of an unregistered name.
    UnknownCommand,
    Denied(Decision),
    Executed,
    Failed,
}

pub struct Dispatcher {
    messenger: Arc<dyn MessagingPort>,
    registry: RegistryHandle,
    access: AccessControl,
    settings: Arc<SettingsStore>,
    prefix: String,
    self_id: Option<UserId>,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        registry: RegistryHandle,
        access: AccessControl,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            messenger,
            registry,
            access,
            settings,
            prefix: DEFAULT_PREFIX.to_string(),
            self_id: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.is_empty() {
            self.prefix = prefix;
        }
        self
    }

    /// The bot account's own JID, enabling commands from its self-chat.
    pub fn with_self_id(mut self, id: UserId) -> Self {
        self.self_id = Some(id);
        self
    }

    // ============== Admin surface ==============

    pub fn register_command(&self, command: Arc<dyn Command>) -> Result<()> {
        self.registry.register(command)
    }

    pub fn reload(&self) -> Result<usize> {
        self.registry.reload()
    }

    pub fn registry(&self) -> Arc<CommandRegistry> {
        self.registry.snapshot()
    }

    pub fn set_owner_only_mode(&self, enabled: bool) {
        self.access.set_owner_only_mode(enabled);
    }

    pub fn owner_only_mode(&self) -> bool {
        self.access.owner_only_mode()
    }

    pub fn set_owners(&self, owners: impl IntoIterator<Item = UserId>) {
        self.access.set_owners(owners);
    }

    pub fn owners(&self) -> Arc<OwnerSet> {
        self.access.owners()
    }

    // ============== Pipeline ==============

    pub async fn dispatch(&self, envelope: InboundEnvelope) -> Outcome {
        let Some(message) = self.ingest(envelope) else {
            return Outcome::Ignored;
        };

        if !self.access.admits(&message.sender_id) {
            tracing::debug!(sender = %message.sender_id, "ignored message from non-owner");
            return Outcome::Blocked;
        }

        let outcome = self.run_command(&message).await;

        // A denied command stops here; everything else still gets tagged.
        if !matches!(outcome, Outcome::Denied(_)) {
            self.silent_tag(&message).await;
        }
        outcome
    }

    fn ingest(&self, envelope: InboundEnvelope) -> Option<MessageContext> {
        if !envelope.has_content {
            return None;
        }

        let sender_id = envelope.sender();
        let is_self_chat = self
            .self_id
            .as_ref()
            .is_some_and(|me| me.as_chat() == envelope.chat_id);
        if envelope.from_me && !is_self_chat {
            return None;
        }

        Some(MessageContext {
            is_group: envelope.chat_id.is_group(),
            chat_id: envelope.chat_id,
            sender_id,
            raw_text: envelope.text.unwrap_or_default(),
            is_self: envelope.from_me && is_self_chat,
        })
    }

    async fn run_command(&self, message: &MessageContext) -> Outcome {
        let Some(invocation) = Invocation::parse(&self.prefix, &message.raw_text) else {
            return Outcome::NotCommand;
        };

        let registry = self.registry.snapshot();
        let Some(command) = registry.resolve(&invocation.name) else {
            tracing::debug!(command = %invocation.name, "unknown command");
            return Outcome::UnknownCommand;
        };

        let owners = self.access.owners();
        let spec = command.spec();
        let decision = security::check(spec, message, &owners);
        if let Some(text) = decision.rejection(spec) {
            tracing::info!(
                command = spec.name,
                chat = %message.chat_id,
                sender = %message.sender_id,
                ?decision,
                "command denied"
            );
            if let Err(e) = self.messenger.send_text(&message.chat_id, text, &[]).await {
                tracing::warn!(chat = %message.chat_id, error = %e, "failed to send rejection");
            }
            return Outcome::Denied(decision);
        }

        let name = spec.name;
        let kind = if message.is_group { "group" } else { "private" };
        tracing::info!(command = name, chat = %message.chat_id, kind, "executing command");

        let ctx = CommandContext {
            messenger: self.messenger.clone(),
            message: message.clone(),
            invocation,
            owners,
            registry: registry.clone(),
            prefix: self.prefix.clone(),
        };

        // Own task so a panicking command is contained like an error.
        let result = tokio::spawn(async move { command.execute(&ctx).await }).await;
        let failure = match result {
            Ok(Ok(())) => {
                tracing::info!(command = name, "command executed successfully");
                return Outcome::Executed;
            }
            Ok(Err(e)) => e.to_string(),
            Err(join) if join.is_panic() => "command panicked".to_string(),
            Err(join) => join.to_string(),
        };

        tracing::error!(command = name, chat = %message.chat_id, error = %failure, "command failed");
        if let Err(e) = self
            .messenger
            .send_text(&message.chat_id, FAILURE_REPLY, &[])
            .await
        {
            tracing::warn!(chat = %message.chat_id, error = %e, "failed to send failure reply");
        }
        Outcome::Failed
    }

    /// Re-send the message text to its group with every participant silently mentioned.
    async fn silent_tag(&self, message: &MessageContext) {
        if !message.is_group || message.raw_text.trim().is_empty() {
            return;
        }
        if !self.settings.get(&message.chat_id).multi_tag {
            return;
        }

        let result = async {
            let mentions = self.messenger.group_participants(&message.chat_id).await?;
            self.messenger
                .send_text(&message.chat_id, &message.raw_text, &mentions)
                .await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(chat = %message.chat_id, error = %e, "multi-tag re-broadcast failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        command::{Category, CommandSpec, Scope},
        commands::{builtin_loader, BuiltinDeps},
        domain::ChatId,
        errors::Error,
        settings::ChatFlag,
        testing::RecordingMessenger,
    };

    const GROUP: &str = "g@g.us";
    const OWNER: &str = "owner@s.whatsapp.net";
    const USER: &str = "user@s.whatsapp.net";
    const BOT: &str = "bot@s.whatsapp.net";

    struct Harness {
        messenger: Arc<RecordingMessenger>,
        settings: Arc<SettingsStore>,
        dispatcher: Dispatcher,
    }

    fn harness() -> Harness {
        let messenger = Arc::new(
            RecordingMessenger::new()
                .with_group(GROUP, "General", &["A", "B", "C"])
                .with_group("ops@g.us", "Ops", &["A", "B", "C"]),
        );
        let settings = Arc::new(SettingsStore::in_memory());
        let registry = RegistryHandle::load(builtin_loader(BuiltinDeps {
            bot_name: "Bot".to_string(),
            settings: settings.clone(),
            broadcast_interval: Duration::ZERO,
            relay_interval: Duration::ZERO,
            cleaned_messages_file: PathBuf::from("/nonexistent/cleaned_messages.txt"),
        }))
        .unwrap();
        let dispatcher = Dispatcher::new(
            messenger.clone(),
            registry,
            AccessControl::new([UserId::new(OWNER)], false),
            settings.clone(),
        )
        .with_self_id(UserId::new(BOT));

        Harness {
            messenger,
            settings,
            dispatcher,
        }
    }

    fn in_group(sender: &str, text: &str) -> InboundEnvelope {
        InboundEnvelope::text(ChatId::new(GROUP), Some(UserId::new(sender)), text)
    }

    fn in_private(sender: &str, text: &str) -> InboundEnvelope {
        InboundEnvelope::text(ChatId::new(sender), None, text)
    }

    struct Exploding {
        spec: CommandSpec,
        panic: bool,
    }

    #[async_trait]
    impl Command for Exploding {
        fn spec(&self) -> &CommandSpec {
            &self.spec
        }

        async fn execute(&self, _ctx: &CommandContext) -> Result<()> {
            if self.panic {
                panic!("boom");
            }
            Err(Error::External("boom".to_string()))
        }
    }

    fn exploding(name: &'static str, panic: bool) -> Arc<dyn Command> {
        Arc::new(Exploding {
            spec: CommandSpec {
                name,
                aliases: &[],
                category: Category::Group,
                scope: Scope::Any,
                owner_only: false,
                description: "",
                usage: "",
            },
            panic,
        })
    }

    #[tokio::test]
    async fn ping_in_group_replies_once() {
        let h = harness();
        let outcome = h.dispatcher.dispatch(in_group(USER, "!ping")).await;

        assert_eq!(outcome, Outcome::Executed);
        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id.as_str(), GROUP);
        assert_eq!(sent[0].text, "🏓 Pong!");
        assert!(sent[0].mentions.is_empty());
    }

    #[tokio::test]
    async fn aliases_and_case_resolve() {
        let h = harness();
        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "!PING")).await,
            Outcome::Executed
        );
        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "!everyone")).await,
            Outcome::Executed
        );
    }

    #[tokio::test]
    async fn text_without_prefix_sends_nothing() {
        let h = harness();
        for text in ["hello", "ping", " !ping", ""] {
            assert_eq!(
                h.dispatcher.dispatch(in_group(USER, text)).await,
                Outcome::NotCommand
            );
        }
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unknown_commands_are_silent() {
        let h = harness();
        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "!!!")).await,
            Outcome::NotCommand
        );
        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "! ping")).await,
            Outcome::NotCommand
        );
        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "!nosuchcommand")).await,
            Outcome::UnknownCommand
        );
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn group_only_command_in_private_is_denied_once() {
        let h = harness();
        let outcome = h.dispatcher.dispatch(in_private(USER, "!all")).await;

        assert_eq!(outcome, Outcome::Denied(Decision::DenyWrongScope));
        assert_eq!(
            h.messenger.texts(),
            vec!["❌ This command can only be used in groups."]
        );
    }

    #[tokio::test]
    async fn private_only_command_in_group_is_denied() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(in_group(OWNER, "!send \"Ops\" hi"))
            .await;

        assert_eq!(outcome, Outcome::Denied(Decision::DenyWrongScope));
        assert_eq!(
            h.messenger.texts(),
            vec!["❌ This command can only be used in private chats."]
        );
        assert!(h.messenger.sent_to("ops@g.us").is_empty());
    }

    #[tokio::test]
    async fn owner_command_from_non_owner_is_denied() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(in_private(USER, "!sendcleanedmessages"))
            .await;

        assert_eq!(outcome, Outcome::Denied(Decision::DenyNotOwner));
        assert_eq!(
            h.messenger.texts(),
            vec!["❌ This command is restricted to bot owners only."]
        );
    }

    #[tokio::test]
    async fn owner_only_mode_silences_non_owners() {
        let h = harness();
        h.dispatcher.set_owner_only_mode(true);

        for text in ["!ping", "!help", "!nosuch", "hello"] {
            assert_eq!(
                h.dispatcher.dispatch(in_group(USER, text)).await,
                Outcome::Blocked
            );
        }
        assert!(h.messenger.sent().is_empty());

        assert_eq!(
            h.dispatcher.dispatch(in_group(OWNER, "!ping")).await,
            Outcome::Executed
        );
    }

    #[tokio::test]
    async fn owner_only_mode_blocks_silent_tag_too() {
        let h = harness();
        h.settings
            .set(&ChatId::new(GROUP), ChatFlag::MultiTag, true)
            .unwrap();
        h.dispatcher.set_owner_only_mode(true);

        h.dispatcher.dispatch(in_group(USER, "good morning")).await;
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn owner_set_can_be_replaced() {
        let h = harness();
        h.dispatcher.set_owners([UserId::new(USER)]);
        h.dispatcher.set_owner_only_mode(true);

        assert!(h.dispatcher.owners().contains(&UserId::new(USER)));
        assert_eq!(
            h.dispatcher.dispatch(in_group(OWNER, "!ping")).await,
            Outcome::Blocked
        );
        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "!ping")).await,
            Outcome::Executed
        );
    }

    #[tokio::test]
    async fn send_from_private_chat_end_to_end() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(in_private(OWNER, "!send \"Ops\" Hello"))
            .await;

        assert_eq!(outcome, Outcome::Executed);
        let to_ops = h.messenger.sent_to("ops@g.us");
        assert_eq!(to_ops.len(), 1);
        assert_eq!(to_ops[0].text, "Hello");
        assert_eq!(
            to_ops[0].mentions,
            vec![UserId::new("A"), UserId::new("B"), UserId::new("C")]
        );
        assert_eq!(
            h.messenger.sent_to(OWNER)[0].text,
            "✅ Message sent to \"Ops\""
        );
        assert_eq!(h.messenger.sent().len(), 2);
    }

    #[tokio::test]
    async fn send_to_unknown_group_replies_not_found() {
        let h = harness();
        h.dispatcher
            .dispatch(in_private(OWNER, "!send \"Nonexistent\" Hi"))
            .await;

        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id.as_str(), OWNER);
        assert!(sent[0].text.contains("not found"));
    }

    #[tokio::test]
    async fn silent_tag_rebroadcasts_plain_text() {
        let h = harness();
        h.settings
            .set(&ChatId::new(GROUP), ChatFlag::MultiTag, true)
            .unwrap();

        let outcome = h.dispatcher.dispatch(in_group(USER, "good morning")).await;

        assert_eq!(outcome, Outcome::NotCommand);
        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id.as_str(), GROUP);
        assert_eq!(sent[0].text, "good morning");
        assert_eq!(
            sent[0].mentions,
            vec![UserId::new("A"), UserId::new("B"), UserId::new("C")]
        );
    }

    #[tokio::test]
    async fn command_and_silent_tag_are_independent_sends() {
        let h = harness();
        h.settings
            .set(&ChatId::new(GROUP), ChatFlag::MultiTag, true)
            .unwrap();

        h.dispatcher.dispatch(in_group(USER, "!ping")).await;

        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text, "🏓 Pong!");
        assert!(sent[0].mentions.is_empty());
        assert_eq!(sent[1].text, "!ping");
        assert_eq!(sent[1].mentions.len(), 3);
    }

    #[tokio::test]
    async fn silent_tag_skips_unflagged_groups_and_denials() {
        let h = harness();
        h.dispatcher.dispatch(in_group(USER, "good morning")).await;
        assert!(h.messenger.sent().is_empty());

        h.settings
            .set(&ChatId::new(GROUP), ChatFlag::MultiTag, true)
            .unwrap();
        h.dispatcher
            .dispatch(in_group(USER, "!sendtoallgroups hi"))
            .await;
        assert_eq!(h.messenger.sent().len(), 1);
    }

    #[tokio::test]
    async fn multitag_command_toggles_silent_tag() {
        let h = harness();
        h.dispatcher.dispatch(in_group(USER, "!multitag on")).await;
        assert!(h.settings.get(&ChatId::new(GROUP)).multi_tag);

        h.dispatcher.dispatch(in_group(USER, "hello all")).await;
        assert_eq!(h.messenger.sent().last().unwrap().text, "hello all");

        h.dispatcher.dispatch(in_group(USER, "!multitag off")).await;
        let before = h.messenger.sent().len();
        h.dispatcher.dispatch(in_group(USER, "quiet now")).await;
        assert_eq!(h.messenger.sent().len(), before);
    }

    #[tokio::test]
    async fn failing_command_yields_one_generic_reply() {
        let h = harness();
        h.dispatcher
            .register_command(exploding("explode", false))
            .unwrap();

        let outcome = h.dispatcher.dispatch(in_group(USER, "!explode")).await;

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(h.messenger.texts(), vec![FAILURE_REPLY]);

        // Pipeline keeps working afterwards.
        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "!ping")).await,
            Outcome::Executed
        );
    }

    #[tokio::test]
    async fn panicking_command_is_contained() {
        let h = harness();
        h.dispatcher
            .register_command(exploding("panic", true))
            .unwrap();

        let outcome = h.dispatcher.dispatch(in_private(USER, "!panic")).await;

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(h.messenger.texts(), vec![FAILURE_REPLY]);
    }

    #[tokio::test]
    async fn duplicate_runtime_registration_fails() {
        let h = harness();
        let err = h
            .dispatcher
            .register_command(exploding("ping", false))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCommand { .. }));
    }

    #[tokio::test]
    async fn reload_drops_ad_hoc_commands() {
        let h = harness();
        h.dispatcher
            .register_command(exploding("explode", false))
            .unwrap();
        assert_eq!(h.dispatcher.reload().unwrap(), 10);

        assert_eq!(
            h.dispatcher.dispatch(in_group(USER, "!explode")).await,
            Outcome::UnknownCommand
        );
    }

    #[tokio::test]
    async fn own_messages_only_count_in_self_chat() {
        let h = harness();

        let mut echo = in_group(BOT, "!ping");
        echo.from_me = true;
        assert_eq!(h.dispatcher.dispatch(echo).await, Outcome::Ignored);

        let mut self_chat = in_private(BOT, "!ping");
        self_chat.from_me = true;
        assert_eq!(h.dispatcher.dispatch(self_chat).await, Outcome::Executed);
        assert_eq!(h.messenger.sent_to(BOT)[0].text, "🏓 Pong!");
    }

    #[tokio::test]
    async fn envelopes_without_content_are_ignored() {
        let h = harness();
        let mut env = in_group(USER, "!ping");
        env.has_content = false;
        assert_eq!(h.dispatcher.dispatch(env).await, Outcome::Ignored);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn custom_prefix() {
        let h = harness();
        let dispatcher = h.dispatcher.with_prefix(".");
        assert_eq!(
            dispatcher.dispatch(in_group(USER, "!ping")).await,
            Outcome::NotCommand
        );
        assert_eq!(
            dispatcher.dispatch(in_group(USER, ".ping")).await,
            Outcome::Executed
        );
    }
}
