//! # Command Layer
//!
//! The business logic of rowkeep. Each command is a plain function generic over
//! a [`DataStore`](crate::store::DataStore); it validates input, checks rights
//! through the [`permission`](crate::permission) evaluator, and applies its
//! changes inside a single store transaction.
//!
//! ## What Commands Do NOT Do
//!
//! - **External side effects**: no webhooks, notifications or blob uploads.
//!   Those run in [`crate::api`] after the transaction has committed.
//! - **Identity resolution**: commands receive a resolved
//!   [`Requester`](crate::permission::Requester).
//! - **Admin gating**: definition commands (entities, properties, workflow
//!   definitions) trust their caller; the API facade restricts them.
//!
//! ## Structured Returns
//!
//! Row commands return [`RowView`](crate::view::RowView), the row resolved
//! through its schema together with the requester's effective rights.
//! Definition commands return the stored definition.
//!
//! ## Testing Strategy
//!
//! Most of the testing lives here. Tests run against `InMemoryStore`, usually
//! through the `StoreFixture` helpers, and cover every branch and error kind.
//!
//! ## Command Modules
//!
//! - [`create`]: create rows with their values and detail rows
//! - [`update`]: upsert values, replace detail rows, change visibility
//! - [`delete`]: cascade-delete rows
//! - [`get`]: fetch one row, list and count rows
//! - [`workflow`]: perform transitions, manage states and steps
//! - [`entities`]: entity definitions
//! - [`properties`]: property definitions and options
//! - [`tags`]: per-entity tag registry
//! - [`comments`]: row comments
//! - [`links`]: cross-tenant linked accounts
//! - [`helpers`]: pieces shared by the row commands

pub mod comments;
pub mod create;
pub mod delete;
pub mod entities;
pub mod get;
pub mod helpers;
pub mod links;
pub mod properties;
pub mod tags;
pub mod update;
pub mod workflow;
