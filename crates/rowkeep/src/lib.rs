//! # Rowkeep Architecture
//!
//! Rowkeep stores **user-defined record types** for many tenants. An
//! [`Entity`](model::Entity) is a schema defined at runtime, its
//! [`Property`](catalog::Property) list declares typed fields, and each
//! [`Row`](model::Row) is one record. Rows carry row-level visibility and may
//! move through a per-entity workflow state machine.
//!
//! ## The Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - Resolves sessions into requesters                        │
//! │  - Gates definition changes to superusers                   │
//! │  - Runs post-commit hooks (webhooks, notifications, media)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs)                              │
//! │  - Pure business logic over a DataStore                     │
//! │  - One transaction per operation                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Domain modules                                             │
//! │  catalog · codec · permission · workflow · query · view     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - DataStore trait, atomic retrying transactions            │
//! │  - FileStore (production), InMemoryStore (testing)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Static and Dynamic Fields
//!
//! A property is bound once, when a [`Schema`](catalog::Schema) is loaded, to
//! either a static field on the row (system fields and declared columns) or a
//! dynamic [`Value`](model::Value) keyed by property id. Commands address
//! values by property name and never care which binding applies.
//!
//! ## No I/O in the Core
//!
//! Nothing from `api.rs` inward writes to stdout or installs a tracing
//! subscriber. External services are reached only through the traits in
//! [`hooks`].
//!
//! ## Testing Strategy
//!
//! 1. **Commands**: thorough unit tests against `InMemoryStore` and the
//!    `StoreFixture` helpers. Most of the testing lives here.
//! 2. **API**: dispatch, gating and hook behaviour with recording hooks.
//! 3. **Integration** (`tests/`): end-to-end scenarios, file persistence and
//!    concurrent writers.
//!
//! ## Module Overview
//!
//! - [`api`]: the facade, entry point for all operations
//! - [`commands`]: business logic per concern
//! - [`store`]: storage abstraction and implementations
//! - [`catalog`]: property definitions and schema loading
//! - [`codec`]: typed values and their storage slots
//! - [`permission`]: requester rights and the listing predicate
//! - [`workflow`]: workflow states, steps and transition rules
//! - [`query`]: filters, search, sorting and pages
//! - [`view`]: the row projection returned to callers
//! - [`model`]: entities, rows and the records around them
//! - [`tags`]: tag naming rules
//! - [`hooks`]: collaborator interfaces
//! - [`config`]: configuration management
//! - [`error`]: error types

pub mod api;
pub mod catalog;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod hooks;
pub mod model;
pub mod permission;
pub mod query;
pub mod store;
pub mod tags;
pub mod view;
pub mod workflow;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
