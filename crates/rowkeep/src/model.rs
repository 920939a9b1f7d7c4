//! # Domain Model
//!
//! Core records of the dynamic data model: [`Entity`] (a user-defined record type),
//! [`Row`] (one instance of an entity), and the records that hang off a row
//! (tags, comments, logs) or widen its reach ([`LinkedAccount`]).
//!
//! Property definitions live in [`crate::catalog`], value encoding in
//! [`crate::codec`], and workflow definitions in [`crate::workflow`].
//!
//! ## Identity
//!
//! Every record is keyed by a v4 UUID. The aliases below exist for readability
//! only; they do not prevent mixing ids of different kinds.
//!
//! ## Visibility
//!
//! [`Visibility`] is a closed enum carrying its own grant payload (tenant id,
//! group ids, user ids), so a row can never hold a visibility class without the
//! matching grant record. [`VisibilityClass`] is the payload-free form used as an
//! entity default.
//!
//! ## Folios
//!
//! A folio is the human-readable sequential number of a row, scoped to
//! `(tenant, entity, parent row)` and rendered as `PREFIX-0001`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EntityId = Uuid;
pub type PropertyId = Uuid;
pub type RowId = Uuid;
pub type ValueId = Uuid;
pub type TenantId = Uuid;
pub type UserId = Uuid;
pub type GroupId = Uuid;
pub type ApiKeyId = Uuid;
pub type LinkedAccountId = Uuid;
pub type TagId = Uuid;
pub type StateId = Uuid;
pub type StepId = Uuid;

/// Who performed an operation. A row creator is either a user or an API key, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Actor {
    User(UserId),
    ApiKey(ApiKeyId),
}

impl Actor {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::ApiKey(_) => None,
        }
    }
}

/// Payload-free visibility class, used as an entity's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityClass {
    #[default]
    Private,
    Public,
    Tenant,
    Groups,
    Users,
}

/// Row visibility together with its grant record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "class", content = "grant", rename_all = "lowercase")]
pub enum Visibility {
    /// Creator only.
    #[default]
    Private,
    /// Anyone may read; comment/update/delete follow the row's [`RowGrants`].
    Public,
    /// Members of the granted tenant.
    Tenant(TenantId),
    /// Members of any granted group.
    Groups(Vec<GroupId>),
    /// Explicit allow-list.
    Users(Vec<UserId>),
}

impl Visibility {
    pub fn class(&self) -> VisibilityClass {
        match self {
            Visibility::Private => VisibilityClass::Private,
            Visibility::Public => VisibilityClass::Public,
            Visibility::Tenant(_) => VisibilityClass::Tenant,
            Visibility::Groups(_) => VisibilityClass::Groups,
            Visibility::Users(_) => VisibilityClass::Users,
        }
    }
}

/// Explicit rights granted to readers who are not the creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowGrants {
    pub can_comment: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl RowGrants {
    pub fn all() -> Self {
        Self {
            can_comment: true,
            can_update: true,
            can_delete: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFeatures {
    pub has_workflow: bool,
    pub has_tags: bool,
    pub has_comments: bool,
    pub has_tasks: bool,
    pub requires_linked_accounts: bool,
    pub has_api: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    /// Stable identifier, also the namespace of the entity's static columns.
    pub name: String,
    pub slug: String,
    pub title: String,
    pub title_plural: String,
    /// Folio prefix, e.g. `INV`.
    pub prefix: String,
    pub order: i32,
    pub features: EntityFeatures,
    pub default_visibility: VisibilityClass,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            slug: name.to_lowercase(),
            title: name.clone(),
            title_plural: format!("{}s", name),
            name,
            prefix: prefix.into(),
            order: 0,
            features: EntityFeatures::default(),
            default_visibility: VisibilityClass::Private,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Render a folio number with this entity's prefix.
    pub fn folio_string(&self, folio: u32) -> String {
        format_folio(&self.prefix, folio)
    }
}

/// `prefix-0001`, upper-cased.
pub fn format_folio(prefix: &str, folio: u32) -> String {
    format!("{}-{:04}", prefix, folio).to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: RowId,
    pub entity_id: EntityId,
    pub folio: u32,
    /// `None` for global data.
    pub tenant_id: Option<TenantId>,
    pub creator: Option<Actor>,
    pub linked_account_id: Option<LinkedAccountId>,
    /// Set on detail rows.
    pub parent_row_id: Option<RowId>,
    pub visibility: Visibility,
    pub grants: RowGrants,
    pub workflow_state_id: Option<StateId>,
    /// Static (column-backed) property values, keyed by property name.
    #[serde(default)]
    pub columns: std::collections::BTreeMap<String, crate::codec::StorageSlots>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row {
    pub fn new(entity_id: EntityId, folio: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            entity_id,
            folio,
            tenant_id: None,
            creator: None,
            linked_account_id: None,
            parent_row_id: None,
            visibility: Visibility::Private,
            grants: RowGrants::default(),
            workflow_state_id: None,
            columns: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_detail(&self) -> bool {
        self.parent_row_id.is_some()
    }
}

/// Stored content of one dynamic property for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    pub id: ValueId,
    pub row_id: RowId,
    pub property_id: PropertyId,
    #[serde(flatten)]
    pub slots: crate::codec::StorageSlots,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Value {
    pub fn new(row_id: RowId, property_id: PropertyId, slots: crate::codec::StorageSlots) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            row_id,
            property_id,
            slots,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Linked,
    Rejected,
}

/// A cross-tenant relationship. Once `Linked`, rows attached to the link are
/// reachable from both tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    pub id: LinkedAccountId,
    pub account_id: TenantId,
    pub linked_account_id: TenantId,
    pub status: LinkStatus,
    pub created_by: Option<Actor>,
    pub created_at: DateTime<Utc>,
}

impl LinkedAccount {
    pub fn involves(&self, tenant: TenantId) -> bool {
        self.account_id == tenant || self.linked_account_id == tenant
    }
}

/// Per-entity tag registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub entity_id: EntityId,
    pub value: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowTag {
    pub row_id: RowId,
    pub tag_id: TagId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowComment {
    pub id: Uuid,
    pub row_id: RowId,
    pub actor: Actor,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Created,
    Updated,
    Deleted,
    Transitioned,
}

impl std::fmt::Display for RowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RowAction::Created => "created",
            RowAction::Updated => "updated",
            RowAction::Deleted => "deleted",
            RowAction::Transitioned => "transitioned",
        };
        f.write_str(s)
    }
}

/// Audit entry. `row_id` is `None` for entries that outlive their row (deletions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowLog {
    pub id: Uuid,
    pub entity_id: EntityId,
    pub row_id: Option<RowId>,
    pub actor: Option<Actor>,
    pub action: RowAction,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RowLog {
    pub fn new(
        entity_id: EntityId,
        row_id: Option<RowId>,
        actor: Option<Actor>,
        action: RowAction,
        details: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            row_id,
            actor,
            action,
            details,
            created_at: Utc::now(),
        }
    }
}
