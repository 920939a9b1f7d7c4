//! Collaborator interfaces.
//!
//! The core consumes a handful of external services through narrow traits.
//! None of them is required: [`Hooks::default`] wires no-op implementations,
//! and without a [`BlobStorage`] media stays inline.
//!
//! Apart from [`MembershipSource`], every hook runs after the primary
//! transaction has committed. A failing hook is logged and swallowed; it never
//! undoes or fails the write that triggered it.

use crate::codec::MediaDescriptor;
use crate::model::{Actor, EntityId, GroupId, RowAction, TenantId};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{service}: {message}")]
pub struct HookError {
    pub service: &'static str,
    pub message: String,
}

impl HookError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

/// Who is calling, as established by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub actor: Actor,
    pub tenant_id: Option<TenantId>,
}

impl Session {
    pub fn new(actor: Actor, tenant_id: Option<TenantId>) -> Self {
        Self { actor, tenant_id }
    }
}

/// Group and role memberships of an actor.
pub trait MembershipSource: Send + Sync {
    fn groups_of(&self, actor: &Actor) -> Vec<GroupId>;
    fn roles_of(&self, actor: &Actor) -> Vec<String>;
}

pub trait NotificationSender: Send + Sync {
    fn send(
        &self,
        recipient: &str,
        template_alias: &str,
        model: &serde_json::Value,
        attachments: &[MediaDescriptor],
    ) -> Result<(), HookError>;
}

pub trait BlobStorage: Send + Sync {
    /// Store `bytes` and return their public URL.
    fn store(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, HookError>;
}

/// Emitted after every committed row write or transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowEvent {
    pub entity_id: EntityId,
    pub action: RowAction,
    pub row: serde_json::Value,
}

pub trait WebhookDispatcher: Send + Sync {
    fn dispatch(&self, event: &RowEvent) -> Result<(), HookError>;
}

pub struct NoMembership;

impl MembershipSource for NoMembership {
    fn groups_of(&self, _actor: &Actor) -> Vec<GroupId> {
        Vec::new()
    }

    fn roles_of(&self, _actor: &Actor) -> Vec<String> {
        Vec::new()
    }
}

pub struct NoNotifications;

impl NotificationSender for NoNotifications {
    fn send(
        &self,
        _recipient: &str,
        _template_alias: &str,
        _model: &serde_json::Value,
        _attachments: &[MediaDescriptor],
    ) -> Result<(), HookError> {
        Ok(())
    }
}

pub struct NoWebhooks;

impl WebhookDispatcher for NoWebhooks {
    fn dispatch(&self, _event: &RowEvent) -> Result<(), HookError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct Hooks {
    pub membership: Arc<dyn MembershipSource>,
    pub notifier: Arc<dyn NotificationSender>,
    pub blobs: Option<Arc<dyn BlobStorage>>,
    pub webhooks: Arc<dyn WebhookDispatcher>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            membership: Arc::new(NoMembership),
            notifier: Arc::new(NoNotifications),
            blobs: None,
            webhooks: Arc::new(NoWebhooks),
        }
    }
}

impl Hooks {
    pub fn with_membership(mut self, source: Arc<dyn MembershipSource>) -> Self {
        self.membership = source;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStorage>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_webhooks(mut self, webhooks: Arc<dyn WebhookDispatcher>) -> Self {
        self.webhooks = webhooks;
        self
    }
}

/// In-memory collaborators that record what they receive.
#[cfg(any(test, feature = "test_utils"))]
pub mod recording {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct StaticMembership {
        pub groups: HashMap<Actor, Vec<GroupId>>,
        pub roles: HashMap<Actor, Vec<String>>,
    }

    impl StaticMembership {
        pub fn with_groups(mut self, actor: Actor, groups: Vec<GroupId>) -> Self {
            self.groups.insert(actor, groups);
            self
        }

        pub fn with_roles(mut self, actor: Actor, roles: &[&str]) -> Self {
            self.roles
                .insert(actor, roles.iter().map(|r| r.to_string()).collect());
            self
        }
    }

    impl MembershipSource for StaticMembership {
        fn groups_of(&self, actor: &Actor) -> Vec<GroupId> {
            self.groups.get(actor).cloned().unwrap_or_default()
        }

        fn roles_of(&self, actor: &Actor) -> Vec<String> {
            self.roles.get(actor).cloned().unwrap_or_default()
        }
    }

    /// Records every event and notification; optionally fails all of them.
    #[derive(Default)]
    pub struct Recorder {
        pub events: Mutex<Vec<RowEvent>>,
        pub sent: Mutex<Vec<(String, String)>>,
        pub stored: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl Recorder {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn outcome(&self, service: &'static str) -> Result<(), HookError> {
            if self.fail {
                Err(HookError::new(service, "unavailable"))
            } else {
                Ok(())
            }
        }
    }

    impl WebhookDispatcher for Recorder {
        fn dispatch(&self, event: &RowEvent) -> Result<(), HookError> {
            self.events.lock().push(event.clone());
            self.outcome("webhook")
        }
    }

    impl NotificationSender for Recorder {
        fn send(
            &self,
            recipient: &str,
            template_alias: &str,
            _model: &serde_json::Value,
            _attachments: &[MediaDescriptor],
        ) -> Result<(), HookError> {
            self.sent
                .lock()
                .push((recipient.to_string(), template_alias.to_string()));
            self.outcome("notification")
        }
    }

    impl BlobStorage for Recorder {
        fn store(&self, bucket: &str, path: &str, _bytes: &[u8]) -> Result<String, HookError> {
            self.outcome("blob")?;
            let url = format!("https://blobs.test/{}/{}", bucket, path);
            self.stored.lock().push(url.clone());
            Ok(url)
        }
    }
}
