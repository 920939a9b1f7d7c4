use super::helpers::readable_row;
use crate::error::{Result, RowkeepError};
use crate::model::{RowComment, RowId};
use crate::permission::{effective_access, Requester, Right};
use crate::store::DataStore;
use chrono::Utc;
use uuid::Uuid;

/// Add a comment to a row. Needs the comment right on an entity with comments.
pub fn add_comment<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
    body: &str,
) -> Result<RowComment> {
    let body = body.trim();
    store.transaction(|tables| {
        let row = tables.row(row_id)?;
        effective_access(row, tables.state_of_row(row), requester).require(Right::Comment, row)?;
        let entity = tables.entity(row.entity_id)?;
        if !entity.features.has_comments {
            return Err(RowkeepError::validation(
                "comment",
                format!("entity '{}' does not take comments", entity.name),
            ));
        }
        if body.is_empty() {
            return Err(RowkeepError::validation("comment", "cannot be empty"));
        }
        let comment = RowComment {
            id: Uuid::new_v4(),
            row_id,
            actor: requester.actor,
            body: body.to_string(),
            created_at: Utc::now(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    })
}

/// Comments of a row, oldest first.
pub fn comments<S: DataStore>(store: &S, requester: &Requester, row_id: RowId) -> Result<Vec<RowComment>> {
    store.read(|tables| {
        readable_row(tables, requester, row_id)?;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.row_id == row_id)
            .cloned()
            .collect())
    })
}
