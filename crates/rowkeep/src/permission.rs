//! # Permission Evaluator
//!
//! Computes what a [`Requester`] may do with a [`Row`]. The decision is driven
//! by the row's [`Visibility`], not by its workflow state:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | requester created the row, or is a superuser | full access |
//! | `Private` | full if the creator is unset, otherwise nothing |
//! | `Public` | read, plus the row's explicit [`RowGrants`] |
//! | `Tenant(t)` | read + grants when the requester's tenant is `t` |
//! | `Groups(gs)` | read + grants when the requester belongs to any of `gs` |
//! | `Users(us)` | read + grants when the requester is listed in `us` |
//!
//! [`effective_access`] then narrows update/delete by what the row's current
//! [`WorkflowState`] allows.
//!
//! ## Listing
//!
//! Bulk reads use [`VisibilityPredicate`], the same table compiled into one
//! membership test evaluated while scanning, instead of calling [`evaluate`]
//! per row. For every row `r`, `predicate.matches(r) == evaluate(r).can_read`.
//!
//! ## Error surface
//!
//! A row the requester cannot read is reported as `NotFound`, never as
//! `Unauthorized`, so its existence does not leak. See [`Access::require`].

use crate::error::{Result, RowkeepError};
use crate::model::{Actor, GroupId, Row, RowGrants, TenantId, UserId, Visibility};
use crate::workflow::WorkflowState;
use std::collections::BTreeSet;

/// The caller of an operation, with memberships already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub actor: Actor,
    pub tenant_id: Option<TenantId>,
    pub group_ids: Vec<GroupId>,
    pub roles: Vec<String>,
    pub is_superuser: bool,
}

impl Requester {
    pub fn user(id: UserId) -> Self {
        Self::new(Actor::User(id))
    }

    pub fn api_key(id: crate::model::ApiKeyId) -> Self {
        Self::new(Actor::ApiKey(id))
    }

    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            tenant_id: None,
            group_ids: Vec::new(),
            roles: Vec::new(),
            is_superuser: false,
        }
    }

    pub fn in_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant_id = Some(tenant);
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.group_ids.extend(groups);
        self
    }

    pub fn with_roles<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn in_any_group(&self, groups: &[GroupId]) -> bool {
        groups.iter().any(|g| self.group_ids.contains(g))
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.actor.user_id()
    }

    pub fn created(&self, row: &Row) -> bool {
        row.creator == Some(self.actor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    pub can_read: bool,
    pub can_comment: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    Read,
    Comment,
    Update,
    Delete,
}

impl Right {
    fn as_str(&self) -> &'static str {
        match self {
            Right::Read => "read",
            Right::Comment => "comment on",
            Right::Update => "update",
            Right::Delete => "delete",
        }
    }
}

impl Access {
    pub fn full() -> Self {
        Self {
            can_read: true,
            can_comment: true,
            can_update: true,
            can_delete: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Read plus the row's explicit grants.
    pub fn read_with(grants: RowGrants) -> Self {
        Self {
            can_read: true,
            can_comment: grants.can_comment,
            can_update: grants.can_update,
            can_delete: grants.can_delete,
        }
    }

    pub fn allows(&self, right: Right) -> bool {
        match right {
            Right::Read => self.can_read,
            Right::Comment => self.can_comment,
            Right::Update => self.can_update,
            Right::Delete => self.can_delete,
        }
    }

    /// Unreadable rows fail as `NotFound`; missing rights as `Unauthorized`.
    pub fn require(&self, right: Right, row: &Row) -> Result<()> {
        if !self.can_read {
            return Err(RowkeepError::not_found("Row", row.id));
        }
        if !self.allows(right) {
            return Err(RowkeepError::Unauthorized(format!(
                "not allowed to {} row {}",
                right.as_str(),
                row.id
            )));
        }
        Ok(())
    }
}

/// Rights of `requester` on `row` from its visibility alone.
pub fn evaluate(row: &Row, requester: &Requester) -> Access {
    if requester.is_superuser || requester.created(row) {
        return Access::full();
    }
    match &row.visibility {
        Visibility::Private => {
            if row.creator.is_none() {
                Access::full()
            } else {
                Access::none()
            }
        }
        Visibility::Public => Access::read_with(row.grants),
        Visibility::Tenant(tenant) => {
            if requester.tenant_id == Some(*tenant) {
                Access::read_with(row.grants)
            } else {
                Access::none()
            }
        }
        Visibility::Groups(groups) => {
            if requester.in_any_group(groups) {
                Access::read_with(row.grants)
            } else {
                Access::none()
            }
        }
        Visibility::Users(users) => match requester.user_id() {
            Some(u) if users.contains(&u) => Access::read_with(row.grants),
            _ => Access::none(),
        },
    }
}

/// [`evaluate`], with update/delete masked by the row's workflow state.
pub fn effective_access(row: &Row, state: Option<&WorkflowState>, requester: &Requester) -> Access {
    let mut access = evaluate(row, requester);
    if requester.is_superuser {
        return access;
    }
    if let Some(state) = state {
        access.can_update &= state.can_update;
        access.can_delete &= state.can_delete;
    }
    access
}

/// Only the creator or a superuser may change a row's visibility or grants.
/// Rows without a creator are open to anyone who can read them.
pub fn can_change_visibility(row: &Row, requester: &Requester) -> bool {
    if requester.is_superuser || requester.created(row) {
        return true;
    }
    row.creator.is_none() && evaluate(row, requester).can_read
}

/// The visibility table compiled into a single membership test for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityPredicate {
    /// Superusers see every row.
    Unrestricted,
    Restricted {
        actor: Actor,
        tenant: Option<TenantId>,
        groups: BTreeSet<GroupId>,
        user: Option<UserId>,
    },
}

impl VisibilityPredicate {
    pub fn for_requester(requester: &Requester) -> Self {
        if requester.is_superuser {
            return VisibilityPredicate::Unrestricted;
        }
        VisibilityPredicate::Restricted {
            actor: requester.actor,
            tenant: requester.tenant_id,
            groups: requester.group_ids.iter().copied().collect(),
            user: requester.user_id(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let VisibilityPredicate::Restricted {
            actor,
            tenant,
            groups,
            user,
        } = self
        else {
            return true;
        };

        row.creator == Some(*actor)
            || match &row.visibility {
                Visibility::Private => row.creator.is_none(),
                Visibility::Public => true,
                Visibility::Tenant(t) => *tenant == Some(*t),
                Visibility::Groups(gs) => gs.iter().any(|g| groups.contains(g)),
                Visibility::Users(us) => user.is_some_and(|u| us.contains(&u)),
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn row_by(creator: Actor, visibility: Visibility) -> Row {
        let mut row = Row::new(Uuid::new_v4(), 1);
        row.creator = Some(creator);
        row.visibility = visibility;
        row
    }

    #[test]
    fn private_row_is_creator_only() {
        let owner = Uuid::new_v4();
        let row = row_by(Actor::User(owner), Visibility::Private);

        assert_eq!(evaluate(&row, &Requester::user(owner)), Access::full());
        assert_eq!(
            evaluate(&row, &Requester::user(Uuid::new_v4()).superuser()),
            Access::full()
        );
        assert_eq!(evaluate(&row, &Requester::user(Uuid::new_v4())), Access::none());
    }

    #[test]
    fn private_row_without_creator_is_open() {
        let mut row = Row::new(Uuid::new_v4(), 1);
        row.visibility = Visibility::Private;
        assert_eq!(evaluate(&row, &Requester::user(Uuid::new_v4())), Access::full());
    }

    #[test]
    fn public_row_applies_explicit_grants() {
        let mut row = row_by(Actor::User(Uuid::new_v4()), Visibility::Public);
        row.grants.can_comment = true;
        let access = evaluate(&row, &Requester::user(Uuid::new_v4()));
        assert!(access.can_read && access.can_comment);
        assert!(!access.can_update && !access.can_delete);
    }

    #[test]
    fn tenant_row_requires_matching_tenant() {
        let tenant = Uuid::new_v4();
        let row = row_by(Actor::User(Uuid::new_v4()), Visibility::Tenant(tenant));

        let member = Requester::user(Uuid::new_v4()).in_tenant(tenant);
        let outsider = Requester::user(Uuid::new_v4()).in_tenant(Uuid::new_v4());
        let tenantless = Requester::user(Uuid::new_v4());

        assert!(evaluate(&row, &member).can_read);
        assert!(!evaluate(&row, &outsider).can_read);
        assert!(!evaluate(&row, &tenantless).can_read);
    }

    #[test]
    fn group_and_user_grants() {
        let group = Uuid::new_v4();
        let user = Uuid::new_v4();
        let by_group = row_by(Actor::User(Uuid::new_v4()), Visibility::Groups(vec![group]));
        let by_user = row_by(Actor::User(Uuid::new_v4()), Visibility::Users(vec![user]));

        assert!(evaluate(&by_group, &Requester::user(user).with_groups([group])).can_read);
        assert!(!evaluate(&by_group, &Requester::user(user)).can_read);
        assert!(evaluate(&by_user, &Requester::user(user)).can_read);
        assert!(!evaluate(&by_user, &Requester::api_key(user)).can_read);
    }

    #[test]
    fn workflow_state_masks_update_and_delete() {
        let owner = Uuid::new_v4();
        let row = row_by(Actor::User(owner), Visibility::Private);
        let mut state = WorkflowState::new(row.entity_id, 2, "completed", "Completed");
        state.can_update = false;
        state.can_delete = false;

        let access = effective_access(&row, Some(&state), &Requester::user(owner));
        assert!(access.can_read && access.can_comment);
        assert!(!access.can_update && !access.can_delete);

        let admin = Requester::user(Uuid::new_v4()).superuser();
        assert_eq!(effective_access(&row, Some(&state), &admin), Access::full());
    }

    #[test]
    fn require_hides_unreadable_rows() {
        let row = row_by(Actor::User(Uuid::new_v4()), Visibility::Private);
        let stranger = Requester::user(Uuid::new_v4());
        let err = evaluate(&row, &stranger).require(Right::Read, &row).unwrap_err();
        assert!(matches!(err, RowkeepError::NotFound { .. }));

        let public = row_by(Actor::User(Uuid::new_v4()), Visibility::Public);
        let err = evaluate(&public, &stranger)
            .require(Right::Update, &public)
            .unwrap_err();
        assert!(matches!(err, RowkeepError::Unauthorized(_)));
    }

    #[test]
    fn visibility_change_needs_ownership() {
        let owner = Uuid::new_v4();
        let mut row = row_by(Actor::User(owner), Visibility::Public);
        row.grants = RowGrants::all();
        assert!(can_change_visibility(&row, &Requester::user(owner)));
        assert!(!can_change_visibility(&row, &Requester::user(Uuid::new_v4())));
    }

    #[test]
    fn superuser_predicate_is_unrestricted() {
        let admin = Requester::user(Uuid::new_v4()).superuser();
        assert_eq!(
            VisibilityPredicate::for_requester(&admin),
            VisibilityPredicate::Unrestricted
        );
    }

    // A small id pool makes collisions between row grants and requester
    // memberships likely.
    fn pool() -> impl Strategy<Value = Uuid> {
        (0u128..4).prop_map(Uuid::from_u128)
    }

    fn arb_actor() -> impl Strategy<Value = Actor> {
        prop_oneof![pool().prop_map(Actor::User), pool().prop_map(Actor::ApiKey)]
    }

    fn arb_visibility() -> impl Strategy<Value = Visibility> {
        prop_oneof![
            Just(Visibility::Private),
            Just(Visibility::Public),
            pool().prop_map(Visibility::Tenant),
            prop::collection::vec(pool(), 0..3).prop_map(Visibility::Groups),
            prop::collection::vec(pool(), 0..3).prop_map(Visibility::Users),
        ]
    }

    fn arb_row() -> impl Strategy<Value = Row> {
        (prop::option::of(arb_actor()), arb_visibility()).prop_map(|(creator, visibility)| {
            let mut row = Row::new(Uuid::nil(), 1);
            row.creator = creator;
            row.visibility = visibility;
            row
        })
    }

    fn arb_requester() -> impl Strategy<Value = Requester> {
        (
            arb_actor(),
            prop::option::of(pool()),
            prop::collection::vec(pool(), 0..3),
            any::<bool>(),
        )
            .prop_map(|(actor, tenant, groups, is_superuser)| Requester {
                actor,
                tenant_id: tenant,
                group_ids: groups,
                roles: Vec::new(),
                is_superuser,
            })
    }

    proptest! {
        #[test]
        fn predicate_agrees_with_evaluate(row in arb_row(), requester in arb_requester()) {
            let predicate = VisibilityPredicate::for_requester(&requester);
            prop_assert_eq!(predicate.matches(&row), evaluate(&row, &requester).can_read);
        }
    }
}
