//! # Workflow Engine definitions
//!
//! Each entity may carry a small state machine:
//!
//! - [`WorkflowState`]: an ordered node. `can_update`/`can_delete` say what a
//!   row sitting in the state allows.
//! - [`WorkflowStep`]: a directed edge `from -> to` with an action name and a
//!   [`StepAssignee`] saying who may invoke it.
//! - [`RowWorkflowTransition`]: the immutable log entry of one executed step.
//!
//! There is no implicit terminal state: a state is terminal when no step
//! leaves it. A new row enters the state with the lowest `order`.
//!
//! The store-facing operations (performing a transition, managing states and
//! steps) live in [`crate::commands::workflow`]; this module holds the types and
//! the pure checks they share.

use crate::error::{Result, RowkeepError};
use crate::model::{Actor, EntityId, GroupId, Row, RowId, StateId, StepId, UserId};
use crate::permission::Requester;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification sent when a row enters a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTemplate {
    pub template_alias: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub id: StateId,
    pub entity_id: EntityId,
    pub order: i32,
    pub name: String,
    pub title: String,
    pub color: Option<String>,
    pub can_update: bool,
    pub can_delete: bool,
    pub notification: Option<NotificationTemplate>,
}

impl WorkflowState {
    pub fn new(entity_id: EntityId, order: i32, name: &str, title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            order,
            name: name.to_string(),
            title: title.to_string(),
            color: None,
            can_update: true,
            can_delete: true,
            notification: None,
        }
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn with_rights(mut self, can_update: bool, can_delete: bool) -> Self {
        self.can_update = can_update;
        self.can_delete = can_delete;
        self
    }

    pub fn with_notification(mut self, template_alias: &str, recipients: &[&str]) -> Self {
        self.notification = Some(NotificationTemplate {
            template_alias: template_alias.to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
        });
        self
    }
}

/// Who may invoke a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "camelCase")]
pub enum StepAssignee {
    /// The row's creator.
    Creator,
    /// Any member of the row's tenant.
    Tenant,
    Roles(Vec<String>),
    Groups(Vec<GroupId>),
    Users(Vec<UserId>),
}

impl StepAssignee {
    /// Superusers are always permitted.
    pub fn permits(&self, row: &Row, requester: &Requester) -> bool {
        if requester.is_superuser {
            return true;
        }
        match self {
            StepAssignee::Creator => requester.created(row),
            StepAssignee::Tenant => row.tenant_id.is_some() && requester.tenant_id == row.tenant_id,
            StepAssignee::Roles(roles) => roles.iter().any(|r| requester.has_role(r)),
            StepAssignee::Groups(groups) => requester.in_any_group(groups),
            StepAssignee::Users(users) => requester.user_id().is_some_and(|u| users.contains(&u)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: StepId,
    pub entity_id: EntityId,
    pub action: String,
    pub from_state_id: StateId,
    pub to_state_id: StateId,
    pub assign_to: StepAssignee,
}

impl WorkflowStep {
    pub fn new(entity_id: EntityId, action: &str, from: StateId, to: StateId) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            action: action.to_string(),
            from_state_id: from,
            to_state_id: to,
            assign_to: StepAssignee::Creator,
        }
    }

    pub fn assigned_to(mut self, assignee: StepAssignee) -> Self {
        self.assign_to = assignee;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowWorkflowTransition {
    pub id: Uuid,
    pub row_id: RowId,
    pub step_id: StepId,
    pub from_state_id: StateId,
    pub to_state_id: StateId,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
}

/// Pending, Completed and Cancelled, joined by three creator-assignable steps.
pub fn default_workflow(entity_id: EntityId) -> (Vec<WorkflowState>, Vec<WorkflowStep>) {
    let pending = WorkflowState::new(entity_id, 1, "pending", "Pending").with_color("yellow");
    let completed = WorkflowState::new(entity_id, 2, "completed", "Completed")
        .with_color("green")
        .with_rights(false, false);
    let cancelled = WorkflowState::new(entity_id, 3, "cancelled", "Cancelled")
        .with_color("red")
        .with_rights(false, true);

    let steps = vec![
        WorkflowStep::new(entity_id, "cancel", pending.id, cancelled.id),
        WorkflowStep::new(entity_id, "complete", pending.id, completed.id),
        WorkflowStep::new(entity_id, "reopen", completed.id, pending.id),
    ];
    (vec![pending, completed, cancelled], steps)
}

/// The state with the lowest order.
pub fn initial_state(states: &[WorkflowState]) -> Option<&WorkflowState> {
    states.iter().min_by_key(|s| s.order)
}

pub fn is_terminal(state: &WorkflowState, steps: &[WorkflowStep]) -> bool {
    !steps.iter().any(|s| s.from_state_id == state.id)
}

/// Check that `step` may run on `row` now, on behalf of `requester`.
pub fn check_transition(row: &Row, step: &WorkflowStep, requester: &Requester) -> Result<()> {
    if row.workflow_state_id != Some(step.from_state_id) {
        return Err(RowkeepError::InvalidTransition {
            step: step.id,
            expected: Some(step.from_state_id),
            actual: row.workflow_state_id,
        });
    }
    if !step.assign_to.permits(row, requester) {
        return Err(RowkeepError::Unauthorized(format!(
            "not assigned to step '{}'",
            step.action
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_in(state: StateId, creator: Actor) -> Row {
        let mut row = Row::new(Uuid::new_v4(), 1);
        row.workflow_state_id = Some(state);
        row.creator = Some(creator);
        row
    }

    #[test]
    fn default_workflow_shape() {
        let entity = Uuid::new_v4();
        let (states, steps) = default_workflow(entity);
        let names: Vec<_> = states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["pending", "completed", "cancelled"]);
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.assign_to == StepAssignee::Creator));
        assert_eq!(initial_state(&states).unwrap().name, "pending");
        assert!(is_terminal(&states[2], &steps));
        assert!(!is_terminal(&states[1], &steps));
    }

    #[test]
    fn initial_state_ignores_list_order() {
        let entity = Uuid::new_v4();
        let states = vec![
            WorkflowState::new(entity, 3, "c", "C"),
            WorkflowState::new(entity, 1, "a", "A"),
            WorkflowState::new(entity, 2, "b", "B"),
        ];
        assert_eq!(initial_state(&states).unwrap().name, "a");
        assert!(initial_state(&[]).is_none());
    }

    #[test]
    fn wrong_source_state_is_invalid() {
        let owner = Uuid::new_v4();
        let (states, steps) = default_workflow(Uuid::new_v4());
        let reopen = &steps[2];
        let row = row_in(states[0].id, Actor::User(owner));

        match check_transition(&row, reopen, &Requester::user(owner)) {
            Err(RowkeepError::InvalidTransition {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Some(states[1].id));
                assert_eq!(actual, Some(states[0].id));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn only_assignees_may_transition() {
        let owner = Uuid::new_v4();
        let (states, steps) = default_workflow(Uuid::new_v4());
        let row = row_in(states[0].id, Actor::User(owner));
        let complete = &steps[1];

        assert!(check_transition(&row, complete, &Requester::user(owner)).is_ok());
        assert!(matches!(
            check_transition(&row, complete, &Requester::user(Uuid::new_v4())),
            Err(RowkeepError::Unauthorized(_))
        ));
        assert!(check_transition(&row, complete, &Requester::user(Uuid::new_v4()).superuser()).is_ok());
    }

    #[test]
    fn assignee_kinds() {
        let tenant = Uuid::new_v4();
        let group = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut row = row_in(Uuid::new_v4(), Actor::User(Uuid::new_v4()));
        row.tenant_id = Some(tenant);

        let member = Requester::user(user)
            .in_tenant(tenant)
            .with_groups([group])
            .with_roles(["Approver"]);
        let outsider = Requester::user(Uuid::new_v4());

        for assignee in [
            StepAssignee::Tenant,
            StepAssignee::Roles(vec!["Approver".into()]),
            StepAssignee::Groups(vec![group]),
            StepAssignee::Users(vec![user]),
        ] {
            assert!(assignee.permits(&row, &member), "{assignee:?}");
            assert!(!assignee.permits(&row, &outsider), "{assignee:?}");
        }
    }

    #[test]
    fn tenant_assignee_needs_a_tenant_row() {
        let row = row_in(Uuid::new_v4(), Actor::User(Uuid::new_v4()));
        assert!(!StepAssignee::Tenant.permits(&row, &Requester::user(Uuid::new_v4())));
    }
}
