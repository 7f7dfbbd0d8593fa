// ── Reconciliation ──
//
// The one funnel every write goes through. A candidate snapshot is
// accepted only if it is strictly newer than the stored one, or ties on
// `observed_at` and comes from push while the stored one came from pull.
// Everything here is synchronous and free of I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strum::Display;

use crate::model::{Snapshot, Source};
use crate::store::SnapshotStore;

/// Why a candidate was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    /// `observed_at` earlier than the stored snapshot's.
    Older,
    /// Same `observed_at`, and the tie-break does not favour the candidate.
    Duplicate,
}

/// Result of submitting a candidate.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accepted(Arc<Snapshot>),
    Rejected {
        reason: RejectReason,
        current_observed_at: DateTime<Utc>,
    },
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Decide whether `candidate` supersedes `current`.
pub fn supersedes(candidate: &Snapshot, current: Option<&Snapshot>) -> Result<(), RejectReason> {
    let Some(current) = current else {
        return Ok(());
    };

    match candidate.observed_at().cmp(&current.observed_at()) {
        std::cmp::Ordering::Greater => Ok(()),
        std::cmp::Ordering::Less => Err(RejectReason::Older),
        std::cmp::Ordering::Equal
            if candidate.source() == Source::Push && current.source() == Source::Pull =>
        {
            Ok(())
        }
        std::cmp::Ordering::Equal => Err(RejectReason::Duplicate),
    }
}

/// Run `candidate` through the ordering rule and, on acceptance, stamp
/// the next sequence number and swap it into `store`.
///
/// Rejections are expected under concurrent push and pull and are not
/// errors.
pub fn submit(store: &SnapshotStore, candidate: Snapshot) -> Outcome {
    let current = store.current();

    if let Err(reason) = supersedes(&candidate, current.as_deref()) {
        let current_observed_at = current
            .as_deref()
            .map_or(candidate.observed_at(), Snapshot::observed_at);
        tracing::trace!(
            source = %candidate.source(),
            observed_at = %candidate.observed_at(),
            %current_observed_at,
            %reason,
            "snapshot rejected"
        );
        return Outcome::Rejected {
            reason,
            current_observed_at,
        };
    }

    let sequence = current.as_deref().map_or(1, |c| c.sequence() + 1);
    let accepted = store.replace(candidate.with_sequence(sequence));
    tracing::debug!(
        sequence,
        source = %accepted.source(),
        observed_at = %accepted.observed_at(),
        "snapshot accepted"
    );
    Outcome::Accepted(accepted)
}
