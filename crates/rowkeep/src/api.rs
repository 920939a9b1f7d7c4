//! # API Facade
//!
//! The API layer is a **thin facade** over the command layer. It is the single
//! entry point an embedding application talks to.
//!
//! ## Role and Responsibilities
//!
//! The API facade:
//! - **Resolves the caller**: a [`Session`] becomes a [`Requester`] through the
//!   configured [`MembershipSource`](crate::hooks::MembershipSource); holders of
//!   the configured superuser role bypass row permissions.
//! - **Gates definition changes**: entities, properties, workflows and tag
//!   registries are edited by superusers only.
//! - **Fills defaults** from [`RowkeepConfig`] (page sizes, media bucket).
//! - **Runs post-commit hooks**: webhooks after every row write or transition,
//!   destination-state notifications, and media externalization.
//!
//! ## Post-commit Hooks
//!
//! Hooks run only once the primary transaction has committed. Their failures
//! are logged at `warn` and swallowed; the caller still gets the committed
//! result. Media externalization uploads inline attachments to the configured
//! [`BlobStorage`](crate::hooks::BlobStorage) and rewrites the descriptors in a
//! follow-up transaction. If the upload or the rewrite fails, content stays
//! inline.
//!
//! ## Generic Over DataStore
//!
//! `RowkeepApi<S: DataStore>` is generic over the storage backend:
//! - Production: `RowkeepApi<FileStore>`
//! - Testing and embedding: `RowkeepApi<InMemoryStore>`

use crate::catalog::Property;
use crate::codec::{MediaContent, MediaDescriptor, TypedValue};
use crate::commands::{
    self,
    create::NewRow,
    entities::{DeletePolicy, EntityUpdate},
    get::RowsQuery,
    properties::PropertyUpdate,
    update::RowUpdate,
    workflow::TransitionOutcome,
};
use crate::config::RowkeepConfig;
use crate::error::{Result, RowkeepError};
use crate::hooks::{BlobStorage, HookError, Hooks, RowEvent, Session};
use crate::model::{
    Entity, EntityId, LinkedAccount, LinkedAccountId, PropertyId, RowAction, RowComment, RowId,
    RowLog, StateId, StepId, Tag, TenantId,
};
use crate::permission::Requester;
use crate::query::RowPage;
use crate::store::fs::FileStore;
use crate::store::fs_backend::FsBackend;
use crate::store::memory::InMemoryStore;
use crate::store::{DataStore, Store};
use crate::view::RowView;
use crate::workflow::{RowWorkflowTransition, WorkflowState, WorkflowStep};
use tracing::warn;

/// The main API facade for rowkeep operations.
pub struct RowkeepApi<S: DataStore> {
    store: S,
    config: RowkeepConfig,
    hooks: Hooks,
}

impl RowkeepApi<InMemoryStore> {
    pub fn in_memory(config: RowkeepConfig) -> Self {
        let store = InMemoryStore::new().with_retry(config.retry_config());
        Self::new(store, config)
    }
}

impl RowkeepApi<FileStore> {
    /// File store under `config.data_dir`.
    pub fn open(config: RowkeepConfig) -> Result<Self> {
        let root = config
            .data_dir
            .clone()
            .ok_or_else(|| RowkeepError::Store("data_dir is not configured".to_string()))?;
        let backend = FsBackend::new(root).with_file_name(&config.store_file);
        let store = Store::with_backend(backend).with_retry(config.retry_config());
        Ok(Self::new(store, config))
    }
}

impl<S: DataStore> RowkeepApi<S> {
    pub fn new(store: S, config: RowkeepConfig) -> Self {
        Self {
            store,
            config,
            hooks: Hooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RowkeepConfig {
        &self.config
    }

    /// Resolve memberships for `session`.
    pub fn requester(&self, session: &Session) -> Requester {
        let membership = &self.hooks.membership;
        let roles = membership.roles_of(&session.actor);
        let mut requester = Requester::new(session.actor)
            .with_groups(membership.groups_of(&session.actor))
            .with_roles(roles);
        if let Some(tenant) = session.tenant_id {
            requester = requester.in_tenant(tenant);
        }
        if requester.has_role(&self.config.superuser_role) {
            requester = requester.superuser();
        }
        requester
    }

    fn admin(&self, session: &Session) -> Result<Requester> {
        let requester = self.requester(session);
        if !requester.is_superuser {
            return Err(RowkeepError::Unauthorized(format!(
                "definition changes need the {} role",
                self.config.superuser_role
            )));
        }
        Ok(requester)
    }

    // --- Rows ---

    pub fn create_row(&self, session: &Session, input: &NewRow) -> Result<RowView> {
        let requester = self.requester(session);
        let view = commands::create::run(&self.store, &requester, input)?;
        let view = self.externalize_media(&requester, view);
        if let Some(state) = &view.workflow_state {
            self.notify(state, &view);
        }
        self.emit(RowAction::Created, &view);
        Ok(view)
    }

    pub fn update_row(&self, session: &Session, row_id: RowId, update: &RowUpdate) -> Result<RowView> {
        let requester = self.requester(session);
        let view = commands::update::run(&self.store, &requester, row_id, update)?;
        let view = self.externalize_media(&requester, view);
        self.emit(RowAction::Updated, &view);
        Ok(view)
    }

    pub fn delete_row(&self, session: &Session, row_id: RowId) -> Result<RowView> {
        let requester = self.requester(session);
        let view = commands::delete::run(&self.store, &requester, row_id)?;
        self.emit(RowAction::Deleted, &view);
        Ok(view)
    }

    /// Fetch a row within the session's tenant scope.
    pub fn get_row(&self, session: &Session, row_id: RowId) -> Result<RowView> {
        let requester = self.requester(session);
        commands::get::get_row(&self.store, &requester, row_id, session.tenant_id)
    }

    /// List rows. The page size is capped at `max_page_size`.
    pub fn get_rows(&self, session: &Session, query: &RowsQuery) -> Result<RowPage> {
        let requester = self.requester(session);
        let mut query = query.clone();
        query.page = self
            .config
            .page(query.page.page, Some(query.page.page_size));
        commands::get::get_rows(&self.store, &requester, &query)
    }

    pub fn count_rows(&self, session: &Session, query: &RowsQuery) -> Result<usize> {
        let requester = self.requester(session);
        commands::get::count_rows(&self.store, &requester, query)
    }

    /// A query over `entity_id` in the session's scope with the configured page size.
    pub fn query(&self, session: &Session, entity_id: EntityId) -> RowsQuery {
        let mut query = RowsQuery::new(entity_id).page(self.config.page(1, None));
        query.scope = session.tenant_id;
        query
    }

    pub fn row_logs(&self, session: &Session, row_id: RowId) -> Result<Vec<RowLog>> {
        commands::get::row_logs(&self.store, &self.requester(session), row_id)
    }

    pub fn add_comment(&self, session: &Session, row_id: RowId, body: &str) -> Result<RowComment> {
        commands::comments::add_comment(&self.store, &self.requester(session), row_id, body)
    }

    pub fn comments(&self, session: &Session, row_id: RowId) -> Result<Vec<RowComment>> {
        commands::comments::comments(&self.store, &self.requester(session), row_id)
    }

    pub fn set_row_tags(&self, session: &Session, row_id: RowId, tags: &[String]) -> Result<RowView> {
        let requester = self.requester(session);
        let view = commands::tags::set_row_tags(&self.store, &requester, row_id, tags)?;
        self.emit(RowAction::Updated, &view);
        Ok(view)
    }

    // --- Workflow ---

    pub fn perform_transition(
        &self,
        session: &Session,
        row_id: RowId,
        step_id: StepId,
    ) -> Result<TransitionOutcome> {
        let requester = self.requester(session);
        let outcome = commands::workflow::perform_transition(&self.store, &requester, row_id, step_id)?;
        self.notify(&outcome.state, &outcome.row);
        self.emit(RowAction::Transitioned, &outcome.row);
        Ok(outcome)
    }

    pub fn available_steps(&self, session: &Session, row_id: RowId) -> Result<Vec<WorkflowStep>> {
        commands::workflow::available_steps(&self.store, &self.requester(session), row_id)
    }

    pub fn transitions(&self, session: &Session, row_id: RowId) -> Result<Vec<RowWorkflowTransition>> {
        commands::workflow::transitions(&self.store, &self.requester(session), row_id)
    }

    pub fn get_workflow(&self, entity_id: EntityId) -> Result<(Vec<WorkflowState>, Vec<WorkflowStep>)> {
        commands::workflow::get_workflow(&self.store, entity_id)
    }

    pub fn add_state(&self, session: &Session, state: WorkflowState) -> Result<WorkflowState> {
        self.admin(session)?;
        commands::workflow::add_state(&self.store, state)
    }

    pub fn add_step(&self, session: &Session, step: WorkflowStep) -> Result<WorkflowStep> {
        self.admin(session)?;
        commands::workflow::add_step(&self.store, step)
    }

    pub fn delete_step(&self, session: &Session, step_id: StepId) -> Result<WorkflowStep> {
        self.admin(session)?;
        commands::workflow::delete_step(&self.store, step_id)
    }

    pub fn delete_state(&self, session: &Session, state_id: StateId) -> Result<WorkflowState> {
        self.admin(session)?;
        commands::workflow::delete_state(&self.store, state_id)
    }

    // --- Definitions ---

    pub fn create_entity(&self, session: &Session, entity: Entity) -> Result<Entity> {
        self.admin(session)?;
        commands::entities::create_entity(&self.store, entity)
    }

    pub fn update_entity(&self, session: &Session, entity_id: EntityId, update: &EntityUpdate) -> Result<Entity> {
        self.admin(session)?;
        commands::entities::update_entity(&self.store, entity_id, update)
    }

    pub fn delete_entity(&self, session: &Session, entity_id: EntityId, policy: DeletePolicy) -> Result<Entity> {
        self.admin(session)?;
        commands::entities::delete_entity(&self.store, entity_id, policy)
    }

    pub fn get_entity(&self, entity_id: EntityId) -> Result<Entity> {
        commands::entities::get_entity(&self.store, entity_id)
    }

    pub fn list_entities(&self) -> Result<Vec<Entity>> {
        commands::entities::list_entities(&self.store)
    }

    pub fn add_property(&self, session: &Session, property: Property) -> Result<Property> {
        self.admin(session)?;
        commands::properties::add_property(&self.store, property)
    }

    pub fn update_property(
        &self,
        session: &Session,
        property_id: PropertyId,
        update: &PropertyUpdate,
    ) -> Result<Property> {
        self.admin(session)?;
        commands::properties::update_property(&self.store, property_id, update)
    }

    pub fn delete_property(&self, session: &Session, property_id: PropertyId) -> Result<Property> {
        self.admin(session)?;
        commands::properties::delete_property(&self.store, property_id)
    }

    pub fn set_options(
        &self,
        session: &Session,
        property_id: PropertyId,
        options: &[(String, Option<String>)],
    ) -> Result<Vec<crate::catalog::PropertyOption>> {
        self.admin(session)?;
        commands::properties::set_options(&self.store, property_id, options)
    }

    pub fn get_properties(&self, entity_id: EntityId) -> Result<Vec<Property>> {
        commands::properties::get_properties(&self.store, entity_id)
    }

    // --- Tags ---

    pub fn list_tags(&self, entity_id: EntityId) -> Result<Vec<Tag>> {
        commands::tags::list_tags(&self.store, entity_id)
    }

    pub fn create_tag(
        &self,
        session: &Session,
        entity_id: EntityId,
        value: &str,
        color: Option<&str>,
    ) -> Result<Tag> {
        self.admin(session)?;
        commands::tags::create_tag(&self.store, entity_id, value, color)
    }

    pub fn rename_tag(&self, session: &Session, entity_id: EntityId, old: &str, new: &str) -> Result<Tag> {
        self.admin(session)?;
        commands::tags::rename_tag(&self.store, entity_id, old, new)
    }

    pub fn delete_tag(&self, session: &Session, entity_id: EntityId, value: &str) -> Result<Tag> {
        self.admin(session)?;
        commands::tags::delete_tag(&self.store, entity_id, value)
    }

    // --- Linked accounts ---

    /// Request a link from the session's tenant to `partner`.
    pub fn create_link(&self, session: &Session, partner: TenantId) -> Result<LinkedAccount> {
        let requester = self.requester(session);
        let account = session
            .tenant_id
            .ok_or_else(|| RowkeepError::validation("linkedAccount", "session has no tenant"))?;
        commands::links::create_link(&self.store, &requester, account, partner)
    }

    pub fn accept_link(&self, session: &Session, link_id: LinkedAccountId) -> Result<LinkedAccount> {
        commands::links::accept_link(&self.store, &self.requester(session), link_id)
    }

    pub fn reject_link(&self, session: &Session, link_id: LinkedAccountId) -> Result<LinkedAccount> {
        commands::links::reject_link(&self.store, &self.requester(session), link_id)
    }

    pub fn list_links(&self, session: &Session) -> Result<Vec<LinkedAccount>> {
        match session.tenant_id {
            Some(tenant) => commands::links::list_links(&self.store, tenant),
            None => Ok(Vec::new()),
        }
    }

    // --- Hooks ---

    fn emit(&self, action: RowAction, view: &RowView) {
        let event = RowEvent {
            entity_id: view.row.entity_id,
            action,
            row: view.to_json(),
        };
        if let Err(e) = self.hooks.webhooks.dispatch(&event) {
            warn!(target: "rowkeep::hooks", row_id = %view.row.id, action = %action, error = %e, "Webhook dispatch failed");
        }
    }

    fn notify(&self, state: &WorkflowState, view: &RowView) {
        let Some(template) = &state.notification else {
            return;
        };
        let model = view.to_json();
        let attachments: Vec<MediaDescriptor> = view
            .values
            .values()
            .filter_map(|v| match v {
                TypedValue::Media(media) => Some(media.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();
        for recipient in &template.recipients {
            if let Err(e) = self
                .hooks
                .notifier
                .send(recipient, &template.template_alias, &model, &attachments)
            {
                warn!(
                    target: "rowkeep::hooks",
                    row_id = %view.row.id,
                    state = %state.name,
                    recipient = %recipient,
                    error = %e,
                    "Notification failed"
                );
            }
        }
    }

    fn externalize_media(&self, requester: &Requester, view: RowView) -> RowView {
        let Some(blobs) = &self.hooks.blobs else {
            return view;
        };
        let mut pending = Vec::new();
        collect_inline_media(&view, &mut pending);

        let mut stored = Vec::new();
        for (row_id, name, media) in pending {
            match self.upload(blobs.as_ref(), row_id, &name, &media) {
                Ok(media) => stored.push((row_id, name, media)),
                Err(e) => warn!(
                    target: "rowkeep::media",
                    row_id = %row_id,
                    property = %name,
                    error = %e,
                    "Keeping media inline"
                ),
            }
        }
        if stored.is_empty() {
            return view;
        }

        match commands::update::store_media_refs(&self.store, requester, view.row.id, &stored) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(target: "rowkeep::media", row_id = %view.row.id, error = %e, "Keeping media inline");
                view
            }
        }
    }

    fn upload(
        &self,
        blobs: &dyn BlobStorage,
        row_id: RowId,
        property: &str,
        media: &[MediaDescriptor],
    ) -> std::result::Result<Vec<MediaDescriptor>, HookError> {
        media
            .iter()
            .map(|descriptor| {
                let bytes = descriptor
                    .decoded_bytes()
                    .map_err(|e| HookError::new("blob", e.to_string()))?;
                let Some(bytes) = bytes else {
                    return Ok(descriptor.clone());
                };
                let path = format!("{}/{}/{}", row_id, property, descriptor.name);
                let url = blobs.store(&self.config.media_bucket, &path, &bytes)?;
                Ok(MediaDescriptor {
                    content: MediaContent::Stored { url },
                    ..descriptor.clone()
                })
            })
            .collect()
    }
}

fn collect_inline_media(view: &RowView, out: &mut Vec<(RowId, String, Vec<MediaDescriptor>)>) {
    for (name, value) in &view.values {
        if let TypedValue::Media(media) = value {
            if media.iter().any(MediaDescriptor::is_inline) {
                out.push((view.row.id, name.clone(), media.clone()));
            }
        }
    }
    for detail in &view.details {
        collect_inline_media(detail, out);
    }
}
