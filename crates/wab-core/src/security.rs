use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};

use crate::{
    command::{CommandSpec, MessageContext, OwnerSet, Scope},
    domain::UserId,
};

// ============== Permission Gate ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    DenyWrongScope,
    DenyNotOwner,
}

impl Decision {
    /// User-facing rejection text for a denied command; `None` when allowed.
    pub fn rejection(self, spec: &CommandSpec) -> Option<&'static str> {
        match self {
            Decision::Allow => None,
            Decision::DenyWrongScope if spec.scope == Scope::GroupOnly => {
                Some("❌ This command can only be used in groups.")
            }
            Decision::DenyWrongScope => Some("❌ This command can only be used in private chats."),
            Decision::DenyNotOwner => Some("❌ This command is restricted to bot owners only."),
        }
    }
}

/// Evaluate whether `spec` may run in `ctx`. First matching rule wins.
pub fn check(spec: &CommandSpec, ctx: &MessageContext, owners: &OwnerSet) -> Decision {
    match spec.scope {
        Scope::GroupOnly if !ctx.is_group => return Decision::DenyWrongScope,
        Scope::PrivateOnly if ctx.is_group => return Decision::DenyWrongScope,
        _ => {}
    }
    if spec.owner_only && !owners.contains(&ctx.sender_id) {
        return Decision::DenyNotOwner;
    }
    Decision::Allow
}

// ============== Owner configuration ==============

/// Process-wide owner list and owner-only mode.
///
/// Initialized from configuration; changed only through the explicit setters,
/// never by message content.
#[derive(Debug, Default)]
pub struct AccessControl {
    owners: RwLock<Arc<OwnerSet>>,
    owner_only: AtomicBool,
}

impl AccessControl {
    pub fn new(owners: impl IntoIterator<Item = UserId>, owner_only: bool) -> Self {
        Self {
            owners: RwLock::new(Arc::new(owners.into_iter().collect())),
            owner_only: AtomicBool::new(owner_only),
        }
    }

    pub fn owners(&self) -> Arc<OwnerSet> {
        self.owners.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_owners(&self, owners: impl IntoIterator<Item = UserId>) {
        let next: OwnerSet = owners.into_iter().collect();
        tracing::info!(owners = next.len(), "owner list updated");
        *self.owners.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }

    pub fn owner_only_mode(&self) -> bool {
        self.owner_only.load(Ordering::SeqCst)
    }

    pub fn set_owner_only_mode(&self, enabled: bool) {
        self.owner_only.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "owner-only mode changed");
    }

    /// Global gate: in owner-only mode non-owners are ignored entirely.
    pub fn admits(&self, sender: &UserId) -> bool {
        !self.owner_only_mode() || self.owners().contains(sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Category;
    use crate::domain::ChatId;

    fn spec(scope: Scope, owner_only: bool) -> CommandSpec {
        CommandSpec {
            name: "x",
            aliases: &[],
            category: Category::Group,
            scope,
            owner_only,
            description: "",
            usage: "",
        }
    }

    fn ctx(is_group: bool, sender: &str) -> MessageContext {
        MessageContext {
            chat_id: ChatId::new(if is_group { "1@g.us" } else { sender }),
            sender_id: UserId::new(sender),
            is_group,
            raw_text: "!x".to_string(),
            is_self: false,
        }
    }

    fn owners() -> OwnerSet {
        [UserId::new("owner@s.whatsapp.net")].into_iter().collect()
    }

    #[test]
    fn scope_rules() {
        let o = owners();
        assert_eq!(
            check(&spec(Scope::GroupOnly, false), &ctx(false, "u"), &o),
            Decision::DenyWrongScope
        );
        assert_eq!(
            check(&spec(Scope::PrivateOnly, false), &ctx(true, "u"), &o),
            Decision::DenyWrongScope
        );
        assert_eq!(
            check(&spec(Scope::Any, false), &ctx(true, "u"), &o),
            Decision::Allow
        );
    }

    #[test]
    fn scope_is_checked_before_ownership() {
        let d = check(&spec(Scope::PrivateOnly, true), &ctx(true, "u"), &owners());
        assert_eq!(d, Decision::DenyWrongScope);
    }

    #[test]
    fn owner_only_commands() {
        let s = spec(Scope::PrivateOnly, true);
        assert_eq!(
            check(&s, &ctx(false, "u@s.whatsapp.net"), &owners()),
            Decision::DenyNotOwner
        );
        assert_eq!(
            check(&s, &ctx(false, "owner@s.whatsapp.net"), &owners()),
            Decision::Allow
        );
    }

    #[test]
    fn rejection_texts_name_the_reason() {
        let group_only = spec(Scope::GroupOnly, false);
        let private_only = spec(Scope::PrivateOnly, false);
        assert_eq!(
            Decision::DenyWrongScope.rejection(&group_only),
            Some("❌ This command can only be used in groups.")
        );
        assert_eq!(
            Decision::DenyWrongScope.rejection(&private_only),
            Some("❌ This command can only be used in private chats.")
        );
        assert_eq!(
            Decision::DenyNotOwner.rejection(&private_only),
            Some("❌ This command is restricted to bot owners only.")
        );
        assert_eq!(Decision::Allow.rejection(&private_only), None);
    }

    #[test]
    fn owner_only_mode_admits_owners_only() {
        let acl = AccessControl::new([UserId::new("owner")], false);
        assert!(acl.admits(&UserId::new("someone")));

        acl.set_owner_only_mode(true);
        assert!(!acl.admits(&UserId::new("someone")));
        assert!(acl.admits(&UserId::new("owner")));

        acl.set_owners([UserId::new("someone")]);
        assert!(acl.admits(&UserId::new("someone")));
        assert!(!acl.admits(&UserId::new("owner")));
    }
}
