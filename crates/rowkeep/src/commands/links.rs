//! Cross-tenant link accounts.
//!
//! A link is requested by one tenant (`account_id`) towards another
//! (`linked_account_id`) and starts `Pending`. Only the invited tenant may
//! accept or reject it. Rows attached to a `Linked` link are in scope for
//! both tenants.

use crate::error::{Result, RowkeepError};
use crate::model::{LinkStatus, LinkedAccount, LinkedAccountId, TenantId};
use crate::permission::Requester;
use crate::store::DataStore;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

pub fn create_link<S: DataStore>(
    store: &S,
    requester: &Requester,
    account: TenantId,
    linked_account: TenantId,
) -> Result<LinkedAccount> {
    if account == linked_account {
        return Err(RowkeepError::validation(
            "linkedAccount",
            "cannot link a tenant to itself",
        ));
    }
    if !requester.is_superuser && requester.tenant_id != Some(account) {
        return Err(RowkeepError::Unauthorized(
            "links are requested from the requester's own tenant".to_string(),
        ));
    }

    let link = store.transaction(|tables| {
        let duplicate = tables.linked_accounts.values().any(|l| {
            l.status != LinkStatus::Rejected && l.involves(account) && l.involves(linked_account)
        });
        if duplicate {
            return Err(RowkeepError::validation(
                "linkedAccount",
                "a link between these tenants already exists",
            ));
        }
        let link = LinkedAccount {
            id: Uuid::new_v4(),
            account_id: account,
            linked_account_id: linked_account,
            status: LinkStatus::Pending,
            created_by: Some(requester.actor),
            created_at: Utc::now(),
        };
        tables.linked_accounts.insert(link.id, link.clone());
        Ok(link)
    })?;

    info!(target: "rowkeep::links", link_id = %link.id, "Link requested");
    Ok(link)
}

pub fn accept_link<S: DataStore>(
    store: &S,
    requester: &Requester,
    link_id: LinkedAccountId,
) -> Result<LinkedAccount> {
    answer(store, requester, link_id, LinkStatus::Linked)
}

pub fn reject_link<S: DataStore>(
    store: &S,
    requester: &Requester,
    link_id: LinkedAccountId,
) -> Result<LinkedAccount> {
    answer(store, requester, link_id, LinkStatus::Rejected)
}

/// Links involving `tenant`, oldest first.
pub fn list_links<S: DataStore>(store: &S, tenant: TenantId) -> Result<Vec<LinkedAccount>> {
    store.read(|tables| {
        let mut links: Vec<LinkedAccount> = tables
            .linked_accounts
            .values()
            .filter(|l| l.involves(tenant))
            .cloned()
            .collect();
        links.sort_by_key(|l| l.created_at);
        Ok(links)
    })
}

fn answer<S: DataStore>(
    store: &S,
    requester: &Requester,
    link_id: LinkedAccountId,
    status: LinkStatus,
) -> Result<LinkedAccount> {
    let link = store.transaction(|tables| {
        let link = tables
            .linked_accounts
            .get_mut(&link_id)
            .ok_or_else(|| RowkeepError::not_found("LinkedAccount", link_id))?;
        if !requester.is_superuser && requester.tenant_id != Some(link.linked_account_id) {
            return Err(RowkeepError::Unauthorized(
                "only the invited tenant can answer a link".to_string(),
            ));
        }
        if link.status != LinkStatus::Pending {
            return Err(RowkeepError::validation(
                "linkedAccount",
                format!("is already {:?}", link.status).to_lowercase(),
            ));
        }
        link.status = status;
        Ok(link.clone())
    })?;

    info!(target: "rowkeep::links", link_id = %link.id, status = ?link.status, "Link answered");
    Ok(link)
}
