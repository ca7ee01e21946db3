use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use wab_core::{
    commands::{builtin_loader, BuiltinDeps},
    config::Config,
    dispatcher::Dispatcher,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    registry::RegistryHandle,
    security::AccessControl,
    settings::SettingsStore,
};

use crate::{EventSource, GatewayMessenger};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Wire the dispatcher to the gateway and process events until Ctrl-C.
pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let gateway = Arc::new(GatewayMessenger::new(
        &cfg.gateway_url,
        cfg.gateway_token.clone(),
    ));
    let self_id = gateway
        .me()
        .await
        .context("gateway did not report the paired account")?;
    tracing::info!(me = %self_id, gateway = %cfg.gateway_url, "connected to gateway");

    // Throttle in front of the gateway; 429 retry stays in the adapter.
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        gateway.clone(),
        ThrottleConfig::default(),
    ));

    let settings = Arc::new(
        SettingsStore::open(cfg.settings_file.clone()).context("failed to load group settings")?,
    );
    let registry = RegistryHandle::load(builtin_loader(BuiltinDeps {
        bot_name: cfg.bot_name.clone(),
        settings: settings.clone(),
        broadcast_interval: cfg.broadcast_interval,
        relay_interval: cfg.relay_interval,
        cleaned_messages_file: cfg.cleaned_messages_file.clone(),
    }))
    .context("failed to load commands")?;
    let access = AccessControl::new(cfg.owner_jids.iter().cloned(), cfg.owner_only_mode);

    let dispatcher = Dispatcher::new(messenger, registry, access, settings)
        .with_prefix(cfg.command_prefix.clone())
        .with_self_id(self_id);
    tracing::info!(
        commands = dispatcher.registry().len(),
        owners = dispatcher.owners().len(),
        owner_only = dispatcher.owner_only_mode(),
        prefix = %cfg.command_prefix,
        "bot ready"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    poll_loop(gateway.as_ref(), &dispatcher, cfg.poll_timeout, cancel).await;
    Ok(())
}

/// Long-poll `source` and dispatch every envelope, one at a time, in arrival order.
///
/// Poll failures back off exponentially (1s doubling to 60s). Cancellation is
/// checked between envelopes, so an in-flight command always completes.
pub async fn poll_loop<S: EventSource + ?Sized>(
    source: &S,
    dispatcher: &Dispatcher,
    poll_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut cursor = 0u64;
    let mut backoff = Duration::from_secs(1);

    tracing::info!("event loop started");
    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = source.next_batch(cursor, poll_timeout) => result,
        };

        match batch {
            Ok(batch) => {
                backoff = Duration::from_secs(1);
                cursor = batch.cursor;
                for envelope in batch.events {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let chat = envelope.chat_id.clone();
                    let outcome = dispatcher.dispatch(envelope).await;
                    tracing::debug!(%chat, ?outcome, "message handled");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, backoff_secs = backoff.as_secs(), "event poll failed, backing off");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
    tracing::info!("event loop stopped");
}
