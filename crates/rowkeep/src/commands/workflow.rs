//! Workflow commands: executing steps on rows and maintaining an entity's
//! states and steps.
//!
//! A transition needs the requester to see the row and to be an assignee of
//! the step; the row's update right does not matter. Destination-state
//! notifications are not sent here; the caller receives the state in the
//! [`TransitionOutcome`] and notifies after commit.

use super::helpers::{log, readable_row};
use crate::catalog::Schema;
use crate::error::{Result, RowkeepError};
use crate::model::{EntityId, RowAction, RowId, StateId, StepId};
use crate::permission::{evaluate, Requester, Right};
use crate::store::{DataStore, Tables};
use crate::view::RowView;
use crate::workflow::{check_transition, RowWorkflowTransition, WorkflowState, WorkflowStep};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub row: RowView,
    pub transition: RowWorkflowTransition,
    /// The state the row entered.
    pub state: WorkflowState,
}

pub fn perform_transition<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
    step_id: StepId,
) -> Result<TransitionOutcome> {
    let outcome = store.transaction(|tables| {
        let mut row = tables.row(row_id)?.clone();
        evaluate(&row, requester).require(Right::Read, &row)?;
        let step = tables
            .workflow_steps
            .get(&step_id)
            .filter(|s| s.entity_id == row.entity_id)
            .cloned()
            .ok_or_else(|| RowkeepError::not_found("WorkflowStep", step_id))?;
        check_transition(&row, &step, requester)?;

        let state = tables
            .workflow_states
            .get(&step.to_state_id)
            .cloned()
            .ok_or_else(|| RowkeepError::not_found("WorkflowState", step.to_state_id))?;

        row.workflow_state_id = Some(state.id);
        row.updated_at = Utc::now();
        tables.rows.insert(row.id, row.clone());

        let transition = RowWorkflowTransition {
            id: Uuid::new_v4(),
            row_id: row.id,
            step_id: step.id,
            from_state_id: step.from_state_id,
            to_state_id: step.to_state_id,
            actor: requester.actor,
            created_at: Utc::now(),
        };
        tables.transitions.push(transition.clone());
        log(
            tables,
            row.entity_id,
            Some(row.id),
            requester.actor,
            RowAction::Transitioned,
            Some(step.action.clone()),
        );

        let schema = Schema::load(tables, row.entity_id)?;
        Ok(TransitionOutcome {
            row: RowView::build(tables, &schema, &row, requester),
            transition,
            state,
        })
    })?;

    info!(
        target: "rowkeep::workflow",
        row_id = %outcome.row.row.id,
        folio = %outcome.row.folio,
        state = %outcome.state.name,
        "Transition performed"
    );
    Ok(outcome)
}

/// Steps leaving the row's current state that the requester may invoke.
pub fn available_steps<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
) -> Result<Vec<WorkflowStep>> {
    store.read(|tables| {
        let row = tables.row(row_id)?;
        evaluate(row, requester).require(Right::Read, row)?;
        Ok(tables
            .steps_of(row.entity_id)
            .into_iter()
            .filter(|s| Some(s.from_state_id) == row.workflow_state_id)
            .filter(|s| s.assign_to.permits(row, requester))
            .cloned()
            .collect())
    })
}

/// Transition history of a row, oldest first.
pub fn transitions<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
) -> Result<Vec<RowWorkflowTransition>> {
    store.read(|tables| {
        readable_row(tables, requester, row_id)?;
        Ok(tables
            .transitions
            .iter()
            .filter(|t| t.row_id == row_id)
            .cloned()
            .collect())
    })
}

/// States (ordered) and steps of an entity.
pub fn get_workflow<S: DataStore>(
    store: &S,
    entity_id: EntityId,
) -> Result<(Vec<WorkflowState>, Vec<WorkflowStep>)> {
    store.read(|tables| {
        tables.entity(entity_id)?;
        Ok((
            tables.states_of(entity_id).into_iter().cloned().collect(),
            tables.steps_of(entity_id).into_iter().cloned().collect(),
        ))
    })
}

pub fn add_state<S: DataStore>(store: &S, state: WorkflowState) -> Result<WorkflowState> {
    store.transaction(|tables| {
        tables.entity(state.entity_id)?;
        if state.name.trim().is_empty() {
            return Err(RowkeepError::Definition("state name cannot be empty".into()));
        }
        for existing in tables.states_of(state.entity_id) {
            if existing.name == state.name {
                return Err(RowkeepError::Definition(format!(
                    "duplicate state name '{}'",
                    state.name
                )));
            }
            if existing.order == state.order {
                return Err(RowkeepError::Definition(format!(
                    "duplicate state order {}",
                    state.order
                )));
            }
        }
        tables.workflow_states.insert(state.id, state.clone());
        Ok(state.clone())
    })
}

pub fn add_step<S: DataStore>(store: &S, step: WorkflowStep) -> Result<WorkflowStep> {
    store.transaction(|tables| {
        tables.entity(step.entity_id)?;
        if step.action.trim().is_empty() {
            return Err(RowkeepError::Definition("step action cannot be empty".into()));
        }
        for id in [step.from_state_id, step.to_state_id] {
            state_of_entity(tables, step.entity_id, id)?;
        }
        if tables
            .steps_of(step.entity_id)
            .iter()
            .any(|s| s.from_state_id == step.from_state_id && s.action == step.action)
        {
            return Err(RowkeepError::Definition(format!(
                "state already has a '{}' step",
                step.action
            )));
        }
        tables.workflow_steps.insert(step.id, step.clone());
        Ok(step.clone())
    })
}

/// Remove a step. Past transitions keep referring to it.
pub fn delete_step<S: DataStore>(store: &S, step_id: StepId) -> Result<WorkflowStep> {
    store.transaction(|tables| {
        tables
            .workflow_steps
            .remove(&step_id)
            .ok_or_else(|| RowkeepError::not_found("WorkflowStep", step_id))
    })
}

/// Remove a state and every step touching it. Fails while rows sit in it.
pub fn delete_state<S: DataStore>(store: &S, state_id: StateId) -> Result<WorkflowState> {
    store.transaction(|tables| {
        let occupied = tables
            .rows
            .values()
            .filter(|r| r.workflow_state_id == Some(state_id))
            .count();
        if occupied > 0 {
            return Err(RowkeepError::Definition(format!(
                "{} row(s) are still in state {}",
                occupied, state_id
            )));
        }
        let state = tables
            .workflow_states
            .remove(&state_id)
            .ok_or_else(|| RowkeepError::not_found("WorkflowState", state_id))?;
        tables
            .workflow_steps
            .retain(|_, s| s.from_state_id != state_id && s.to_state_id != state_id);
        Ok(state)
    })
}

fn state_of_entity(tables: &Tables, entity_id: EntityId, state_id: StateId) -> Result<&WorkflowState> {
    tables
        .workflow_states
        .get(&state_id)
        .filter(|s| s.entity_id == entity_id)
        .ok_or_else(|| RowkeepError::not_found("WorkflowState", state_id))
}
