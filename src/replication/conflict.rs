//! Conflict resolution between local and replicated history.

use crate::execution::mutable_state::ActivityProgress;
use crate::interfaces::ClusterMetadata;
use crate::version_history::{Result, VersionHistories, VersionHistory, VersionHistoryError};

/// What to do with a replicated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Local history already covers the event.
    Apply,
    /// Local history won a divergence; drop the event.
    Discard,
    /// Local history is missing events; ask the source to resend from here.
    RequestResend { event_id: i64, version: i64 },
}

/// Decide how an event at `event_id` from a peer whose current branch is
/// `incoming` relates to the local current branch.
///
/// When one branch extends the other, the event is applied if it lies
/// within the shared part and resent from the LCA otherwise. When the
/// branches diverged, the branch whose last version is higher wins.
pub fn decide(
    local: &VersionHistories,
    incoming: &VersionHistory,
    event_id: i64,
) -> Result<Decision> {
    let current = local.current()?;
    let lca = current.find_lca_item(incoming)?;
    let resend = Decision::RequestResend {
        event_id: lca.event_id,
        version: lca.version,
    };

    if current.is_lca_appendable(lca)? || incoming.is_lca_appendable(lca)? {
        if event_id > lca.event_id {
            return Ok(resend);
        }
        return Ok(Decision::Apply);
    }

    let local_version = current.last_item()?.version;
    let incoming_version = incoming.last_item()?.version;
    match incoming_version.cmp(&local_version) {
        std::cmp::Ordering::Less => Ok(Decision::Discard),
        std::cmp::Ordering::Greater => Ok(resend),
        std::cmp::Ordering::Equal => Err(VersionHistoryError::DivergedAtSameVersion {
            version: local_version,
        }),
    }
}

/// Whether `incoming` progress is strictly newer than `stored`.
///
/// Ordered by version, then attempt, then heartbeat time.
pub fn supersedes(stored: &ActivityProgress, incoming: &ActivityProgress) -> bool {
    (incoming.version, incoming.attempt, incoming.last_heartbeat)
        > (stored.version, stored.attempt, stored.last_heartbeat)
}

/// Whether accepting `incoming` invalidates the timers created for `stored`.
pub fn needs_timer_reset(
    cluster: &dyn ClusterMetadata,
    stored: &ActivityProgress,
    incoming: &ActivityProgress,
) -> bool {
    !cluster.is_version_from_same_cluster(incoming.version, stored.version)
        || incoming.attempt > stored.attempt
}
