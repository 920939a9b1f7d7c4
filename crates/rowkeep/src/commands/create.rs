use super::helpers::{
    apply_new_values, check_link, create_detail_rows, default_visibility, log, resolve_tags,
    set_row_tags,
};
use crate::catalog::Schema;
use crate::codec::TypedValue;
use crate::error::{Result, RowkeepError};
use crate::model::{
    Actor, EntityId, LinkedAccountId, Row, RowAction, RowGrants, TenantId, Visibility,
};
use crate::permission::Requester;
use crate::store::DataStore;
use crate::view::RowView;
use crate::workflow::initial_state;
use std::collections::BTreeMap;
use tracing::info;

/// Input for a new row. Values are keyed by property name; the schema routes
/// each one to its static column or dynamic value.
#[derive(Debug, Clone, Default)]
pub struct NewRow {
    pub entity_id: EntityId,
    pub tenant_id: Option<TenantId>,
    pub linked_account_id: Option<LinkedAccountId>,
    /// `None` applies the entity's default visibility class.
    pub visibility: Option<Visibility>,
    pub grants: RowGrants,
    pub values: BTreeMap<String, TypedValue>,
    pub details: Vec<NewDetailRow>,
    pub tags: Vec<String>,
}

impl NewRow {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            ..Default::default()
        }
    }

    pub fn in_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant_id = Some(tenant);
        self
    }

    pub fn linked(mut self, link: LinkedAccountId) -> Self {
        self.linked_account_id = Some(link);
        self
    }

    pub fn visible_to(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn granting(mut self, grants: RowGrants) -> Self {
        self.grants = grants;
        self
    }

    pub fn value(mut self, name: &str, value: TypedValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn detail(mut self, detail: NewDetailRow) -> Self {
        self.details.push(detail);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDetailRow {
    pub values: BTreeMap<String, TypedValue>,
}

impl NewDetailRow {
    pub fn value(mut self, name: &str, value: TypedValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }
}

/// Tenant a new row lands in. Superusers may place rows in any tenant or in
/// the global scope; everyone else creates rows in their own tenant.
fn target_tenant(requester: &Requester, requested: Option<TenantId>) -> Result<Option<TenantId>> {
    if requester.is_superuser {
        return Ok(requested);
    }
    match requested {
        None => Ok(requester.tenant_id),
        Some(tenant) if requester.tenant_id == Some(tenant) => Ok(Some(tenant)),
        Some(tenant) => Err(RowkeepError::Unauthorized(format!(
            "cannot create rows in tenant {}",
            tenant
        ))),
    }
}

pub fn run<S: DataStore>(store: &S, requester: &Requester, input: &NewRow) -> Result<RowView> {
    let tenant_id = target_tenant(requester, input.tenant_id)?;
    let view = store.transaction(|tables| {
        let schema = Schema::load(tables, input.entity_id)?;
        let entity = &schema.entity;

        if !entity.active {
            return Err(RowkeepError::validation(
                "entity",
                format!("'{}' is inactive", entity.name),
            ));
        }
        if matches!(requester.actor, Actor::ApiKey(_)) && !entity.features.has_api {
            return Err(RowkeepError::Unauthorized(format!(
                "entity '{}' does not accept API keys",
                entity.name
            )));
        }
        check_link(tables, entity, tenant_id, input.linked_account_id)?;
        let tag_ids = resolve_tags(tables, entity, &input.tags)?;

        let folio = tables.next_folio(tenant_id, entity.id, None);
        let mut row = Row::new(entity.id, folio);
        row.tenant_id = tenant_id;
        row.creator = Some(requester.actor);
        row.linked_account_id = input.linked_account_id;
        row.visibility = input
            .visibility
            .clone()
            .unwrap_or_else(|| default_visibility(entity, tenant_id, requester));
        row.grants = input.grants;
        if entity.features.has_workflow {
            let states: Vec<_> = tables.states_of(entity.id).into_iter().cloned().collect();
            row.workflow_state_id = initial_state(&states).map(|s| s.id);
        }

        apply_new_values(tables, &schema, &mut row, &input.values)?;
        tables.rows.insert(row.id, row.clone());
        create_detail_rows(tables, &schema, &row, &input.details)?;
        set_row_tags(tables, row.id, &tag_ids);
        log(tables, entity.id, Some(row.id), requester.actor, RowAction::Created, None);

        Ok(RowView::build(tables, &schema, &row, requester))
    })?;

    info!(
        target: "rowkeep::rows",
        row_id = %view.row.id,
        folio = %view.folio,
        details = view.details.len(),
        "Row created"
    );
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Property, PropertyType};
    use crate::store::memory::fixtures::StoreFixture;
    use crate::workflow::StepAssignee;
    use uuid::Uuid;

    #[test]
    fn first_row_gets_folio_one() {
        let fx = StoreFixture::invoices();
        let view = run(&fx.store, &fx.owner(), &fx.invoice(500.0, "To Paid")).unwrap();
        assert_eq!(view.folio, "INV-0001");
        assert_eq!(view.value("amount"), Some(&TypedValue::Number(500.0)));
        assert_eq!(view.value("status"), Some(&TypedValue::Select("To Paid".into())));
        assert_eq!(view.row.creator, Some(fx.owner().actor));
    }

    #[test]
    fn folios_increase_per_tenant() {
        let fx = StoreFixture::invoices();
        let other = Uuid::new_v4();
        let other_owner = Requester::user(Uuid::new_v4()).in_tenant(other);
        run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).unwrap();
        let second = run(&fx.store, &fx.owner(), &fx.invoice(2.0, "Paid")).unwrap();
        let elsewhere = run(
            &fx.store,
            &other_owner,
            &fx.invoice(3.0, "Paid").in_tenant(other),
        )
        .unwrap();
        assert_eq!(second.row.folio, 2);
        assert_eq!(elsewhere.row.folio, 1);
    }

    #[test]
    fn rows_land_in_the_requesters_tenant() {
        let fx = StoreFixture::invoices();
        let intruder = Requester::user(Uuid::new_v4()).in_tenant(Uuid::new_v4());
        assert!(matches!(
            run(&fx.store, &intruder, &fx.invoice(1.0, "Paid")),
            Err(RowkeepError::Unauthorized(_))
        ));
        assert_eq!(fx.row_count(), 0);

        let unscoped = NewRow::new(fx.entity.id).value("amount", TypedValue::Number(2.0));
        let view = run(&fx.store, &fx.owner(), &unscoped).unwrap();
        assert_eq!(view.row.tenant_id, Some(fx.tenant));
        assert_eq!(view.row.visibility, Visibility::Tenant(fx.tenant));

        let admin = Requester::user(Uuid::new_v4()).superuser();
        let placed = run(&fx.store, &admin, &fx.invoice(3.0, "Paid")).unwrap();
        assert_eq!(placed.row.tenant_id, Some(fx.tenant));
        assert_eq!(placed.row.folio, 2);
    }

    #[test]
    fn missing_required_value_names_the_property() {
        let fx = StoreFixture::invoices();
        let input = NewRow::new(fx.entity.id).value("status", TypedValue::Select("Paid".into()));
        match run(&fx.store, &fx.owner(), &input) {
            Err(RowkeepError::Validation { property, .. }) => assert_eq!(property, "amount"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fx.row_count(), 0);
    }

    #[test]
    fn default_value_fills_missing_input() {
        let fx = StoreFixture::invoices();
        fx.add_property(
            Property::new(fx.entity.id, "currency", "Currency", PropertyType::Text)
                .required()
                .with_default("EUR"),
        );
        let view = run(&fx.store, &fx.owner(), &fx.invoice(10.0, "Paid")).unwrap();
        assert_eq!(view.value("currency"), Some(&TypedValue::Text("EUR".into())));
    }

    #[test]
    fn unknown_and_system_names_are_rejected() {
        let fx = StoreFixture::invoices();
        let unknown = fx.invoice(1.0, "Paid").value("colour", TypedValue::Text("red".into()));
        assert!(matches!(
            run(&fx.store, &fx.owner(), &unknown),
            Err(RowkeepError::Validation { .. })
        ));
        let system = fx.invoice(1.0, "Paid").value("folio", TypedValue::Id("X".into()));
        assert!(run(&fx.store, &fx.owner(), &system).is_err());
    }

    #[test]
    fn static_columns_live_on_the_row() {
        let fx = StoreFixture::invoices();
        fx.add_property(
            Property::new(fx.entity.id, "reference", "Reference", PropertyType::Text).static_column(),
        );
        let view = run(
            &fx.store,
            &fx.owner(),
            &fx.invoice(1.0, "Paid").value("reference", TypedValue::Text("PO-7".into())),
        )
        .unwrap();
        assert!(view.row.columns.contains_key("reference"));
        assert_eq!(view.value("reference"), Some(&TypedValue::Text("PO-7".into())));
        let dynamic_count = fx
            .store
            .read(|t| Ok(t.values_of(view.row.id).count()))
            .unwrap();
        assert_eq!(dynamic_count, 2);
    }

    #[test]
    fn detail_rows_restart_folio() {
        let fx = StoreFixture::invoices().with_lines();
        let input = fx
            .invoice(100.0, "To Paid")
            .detail(NewDetailRow::default().value("line", TypedValue::Text("Paper".into())))
            .detail(NewDetailRow::default().value("line", TypedValue::Text("Ink".into())));
        let view = run(&fx.store, &fx.owner(), &input).unwrap();
        assert_eq!(view.details.len(), 2);
        assert_eq!(view.details[0].row.folio, 1);
        assert_eq!(view.details[1].row.folio, 2);
        assert_eq!(view.details[1].row.parent_row_id, Some(view.row.id));
        assert_eq!(
            view.details[1].value("line"),
            Some(&TypedValue::Text("Ink".into()))
        );
    }

    #[test]
    fn failing_detail_rolls_back_everything() {
        let fx = StoreFixture::invoices().with_lines();
        let input = fx
            .invoice(100.0, "To Paid")
            .detail(NewDetailRow::default().value("amount", TypedValue::Number(1.0)));
        assert!(run(&fx.store, &fx.owner(), &input).is_err());
        assert_eq!(fx.row_count(), 0);
        assert_eq!(fx.store.read(|t| Ok(t.values.len())).unwrap(), 0);
    }

    #[test]
    fn workflow_entities_start_in_first_state() {
        let fx = StoreFixture::invoices().with_workflow();
        let view = run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).unwrap();
        assert_eq!(view.workflow_state.unwrap().name, "pending");
        let steps = fx.store.read(|t| Ok(t.steps_of(fx.entity.id).len())).unwrap();
        assert_eq!(steps, 3);
        let creator_only = fx
            .store
            .read(|t| {
                Ok(t.steps_of(fx.entity.id)
                    .iter()
                    .all(|s| s.assign_to == StepAssignee::Creator))
            })
            .unwrap();
        assert!(creator_only);
    }

    #[test]
    fn api_keys_need_api_entities() {
        let fx = StoreFixture::invoices();
        let key = Requester::api_key(Uuid::new_v4()).in_tenant(fx.tenant);
        assert!(matches!(
            run(&fx.store, &key, &fx.invoice(1.0, "Paid")),
            Err(RowkeepError::Unauthorized(_))
        ));
    }

    #[test]
    fn inactive_entities_reject_rows() {
        let fx = StoreFixture::invoices();
        fx.store
            .transaction(|t| {
                t.entities.get_mut(&fx.entity.id).unwrap().active = false;
                Ok(())
            })
            .unwrap();
        assert!(run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).is_err());
    }

    #[test]
    fn default_visibility_comes_from_entity() {
        let fx = StoreFixture::invoices();
        let view = run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).unwrap();
        assert_eq!(view.row.visibility, Visibility::Tenant(fx.tenant));
    }

    #[test]
    fn select_outside_options_fails() {
        let fx = StoreFixture::invoices();
        let err = run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Void")).unwrap_err();
        assert!(matches!(err, RowkeepError::Validation { ref property, .. } if property == "status"));
    }

    #[test]
    fn creation_is_logged() {
        let fx = StoreFixture::invoices();
        let view = run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).unwrap();
        let logs = fx.store.read(|t| Ok(t.logs.clone())).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].row_id, Some(view.row.id));
        assert_eq!(logs[0].action, RowAction::Created);
    }
}
