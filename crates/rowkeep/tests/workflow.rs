use rowkeep::api::RowkeepApi;
use rowkeep::catalog::{Property, PropertyType};
use rowkeep::codec::TypedValue;
use rowkeep::commands::create::NewRow;
use rowkeep::commands::update::RowUpdate;
use rowkeep::config::RowkeepConfig;
use rowkeep::error::RowkeepError;
use rowkeep::hooks::{Hooks, MembershipSource, Session};
use rowkeep::model::{Actor, Entity, GroupId, RowAction};
use rowkeep::store::memory::InMemoryStore;
use std::sync::Arc;
use uuid::Uuid;

struct Admins(Vec<Actor>);

impl MembershipSource for Admins {
    fn groups_of(&self, _actor: &Actor) -> Vec<GroupId> {
        Vec::new()
    }

    fn roles_of(&self, actor: &Actor) -> Vec<String> {
        if self.0.contains(actor) {
            vec!["SuperAdmin".to_string()]
        } else {
            Vec::new()
        }
    }
}

struct Setup {
    api: RowkeepApi<InMemoryStore>,
    admin: Session,
    clerk: Session,
    entity: Entity,
}

fn setup() -> Setup {
    let tenant = Uuid::new_v4();
    let admin = Session::new(Actor::User(Uuid::new_v4()), Some(tenant));
    let clerk = Session::new(Actor::User(Uuid::new_v4()), Some(tenant));
    let api = RowkeepApi::in_memory(RowkeepConfig::default())
        .with_hooks(Hooks::default().with_membership(Arc::new(Admins(vec![admin.actor]))));

    let mut entity = Entity::new("invoice", "INV");
    entity.features.has_workflow = true;
    let entity = api.create_entity(&admin, entity).unwrap();
    api.add_property(
        &admin,
        Property::new(entity.id, "amount", "Amount", PropertyType::Number).required(),
    )
    .unwrap();

    Setup {
        api,
        admin,
        clerk,
        entity,
    }
}

fn step_id(s: &Setup, action: &str) -> Uuid {
    let (_, steps) = s.api.get_workflow(s.entity.id).unwrap();
    steps.into_iter().find(|st| st.action == action).unwrap().id
}

#[test]
fn rows_start_pending_and_move_along_steps() {
    let s = setup();
    let row = s
        .api
        .create_row(
            &s.clerk,
            &NewRow::new(s.entity.id)
                .in_tenant(s.clerk.tenant_id.unwrap())
                .value("amount", TypedValue::Number(10.0)),
        )
        .unwrap();
    assert_eq!(row.workflow_state.as_ref().unwrap().name, "pending");

    let steps: Vec<_> = s
        .api
        .available_steps(&s.clerk, row.row.id)
        .unwrap()
        .into_iter()
        .map(|st| st.action)
        .collect();
    assert_eq!(steps, ["cancel", "complete"]);

    let err = s
        .api
        .perform_transition(&s.clerk, row.row.id, step_id(&s, "reopen"))
        .unwrap_err();
    assert!(matches!(err, RowkeepError::InvalidTransition { .. }));

    let done = s
        .api
        .perform_transition(&s.clerk, row.row.id, step_id(&s, "complete"))
        .unwrap();
    assert_eq!(done.state.name, "completed");

    let locked = s.api.update_row(
        &s.clerk,
        row.row.id,
        &RowUpdate::default().set("amount", TypedValue::Number(20.0)),
    );
    assert!(matches!(locked, Err(RowkeepError::Unauthorized(_))));

    s.api
        .perform_transition(&s.clerk, row.row.id, step_id(&s, "reopen"))
        .unwrap();
    s.api
        .update_row(
            &s.clerk,
            row.row.id,
            &RowUpdate::default().set("amount", TypedValue::Number(20.0)),
        )
        .unwrap();

    let history = s.api.transitions(&s.clerk, row.row.id).unwrap();
    assert_eq!(history.len(), 2);
    let actions: Vec<_> = s
        .api
        .row_logs(&s.clerk, row.row.id)
        .unwrap()
        .into_iter()
        .map(|l| l.action)
        .collect();
    assert_eq!(
        actions,
        [
            RowAction::Created,
            RowAction::Transitioned,
            RowAction::Transitioned,
            RowAction::Updated
        ]
    );
}

#[test]
fn occupied_states_cannot_be_deleted() {
    let s = setup();
    let row = s
        .api
        .create_row(
            &s.clerk,
            &NewRow::new(s.entity.id).value("amount", TypedValue::Number(1.0)),
        )
        .unwrap();
    let pending = row.workflow_state.unwrap();

    assert!(matches!(
        s.api.delete_state(&s.clerk, pending.id),
        Err(RowkeepError::Unauthorized(_))
    ));
    assert!(matches!(
        s.api.delete_state(&s.admin, pending.id),
        Err(RowkeepError::Definition(_))
    ));

    s.api.delete_row(&s.clerk, row.row.id).unwrap();
    s.api.delete_state(&s.admin, pending.id).unwrap();
    let (states, steps) = s.api.get_workflow(s.entity.id).unwrap();
    assert_eq!(states.len(), 2);
    assert!(steps
        .iter()
        .all(|st| st.from_state_id != pending.id && st.to_state_id != pending.id));
}
