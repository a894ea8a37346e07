//! Cross-process exclusivity for generations on one campaign.
//!
//! Postgres leases are session-level advisory locks held on a connection
//! detached from the pool; the lock is released when the lease drops and the
//! connection closes.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use sqlx::{Connection, PgConnection, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Held for the duration of one generation. Dropping it releases the campaign.
pub struct CampaignLease {
    campaign_id: Uuid,
    held: Held,
}

enum Held {
    Session(PgConnection),
    Local(LocalLease),
}

impl CampaignLease {
    #[must_use]
    pub fn campaign_id(&self) -> Uuid {
        self.campaign_id
    }
}

impl fmt::Debug for CampaignLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("CampaignLease");
        out.field("campaign_id", &self.campaign_id);
        match &self.held {
            Held::Session(conn) => out.field("advisory", conn),
            Held::Local(lease) => out.field("local", &lease.campaign_id),
        };
        out.finish()
    }
}

/// Advisory lock key for a campaign. Both halves of the UUID are folded so
/// campaigns sharing a prefix still get distinct keys.
#[must_use]
pub fn advisory_key(campaign_id: Uuid) -> i64 {
    let (hi, lo) = campaign_id.as_u64_pair();
    i64::from_ne_bytes((hi ^ lo.rotate_left(32)).to_ne_bytes())
}

/// Tries `pg_try_advisory_lock` on a dedicated connection.
///
/// Returns `Ok(None)` when another session already holds the campaign.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if no connection is available or the query fails.
pub async fn try_lock_campaign(
    pool: &PgPool,
    campaign_id: Uuid,
) -> Result<Option<CampaignLease>, DbError> {
    let mut conn = pool.acquire().await?.detach();
    let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(advisory_key(campaign_id))
        .fetch_one(&mut conn)
        .await?;

    if !acquired {
        conn.close().await?;
        return Ok(None);
    }
    Ok(Some(CampaignLease {
        campaign_id,
        held: Held::Session(conn),
    }))
}

/// In-process lease table standing in for advisory locks.
#[derive(Debug, Clone, Default)]
pub(crate) struct LocalLeases {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl LocalLeases {
    pub(crate) fn try_lock(&self, campaign_id: Uuid) -> Option<CampaignLease> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(campaign_id) {
            return None;
        }
        Some(CampaignLease {
            campaign_id,
            held: Held::Local(LocalLease {
                campaign_id,
                active: Arc::clone(&self.active),
            }),
        })
    }
}

struct LocalLease {
    campaign_id: Uuid,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for LocalLease {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.campaign_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_key_is_stable_and_distinguishes_campaigns() {
        let a: Uuid = "7f0c1c52-4a4e-4d7b-9d53-0d3f7f6f2a10".parse().unwrap();
        let b: Uuid = "7f0c1c52-4a4e-4d7b-9d53-0d3f7f6f2a11".parse().unwrap();
        assert_eq!(advisory_key(a), advisory_key(a));
        assert_ne!(advisory_key(a), advisory_key(b));
    }

    #[test]
    fn local_lease_is_exclusive_until_dropped() {
        let leases = LocalLeases::default();
        let campaign = Uuid::new_v4();

        let lease = leases.try_lock(campaign).unwrap();
        assert_eq!(lease.campaign_id(), campaign);
        assert!(leases.try_lock(campaign).is_none());
        assert!(leases.try_lock(Uuid::new_v4()).is_some());

        drop(lease);
        assert!(leases.try_lock(campaign).is_some());
    }
}
