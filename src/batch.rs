//! Candidate selection shared by both engines.

use std::collections::BTreeSet;

use crate::session::Uid;

/// Order in which a batch is cut and then processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Server search order (ascending UID).
    Search,
    /// Highest UID first.
    NewestFirst,
}

/// Split search results against the seen set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Seen UIDs still present in the folder.
    pub retained: BTreeSet<Uid>,
    /// Unseen UIDs to handle this run, in processing order.
    pub candidates: Vec<Uid>,
    /// Unseen UIDs left for a later run by the batch limit.
    pub deferred: usize,
}

/// Select this run's candidates.
///
/// `retained` is `seen ∩ found`, so UIDs that left the folder age out of the
/// seen set. Candidates are cut to `limit` after ordering.
pub fn select(found: &[Uid], seen: &BTreeSet<Uid>, limit: Option<usize>, order: Order) -> Batch {
    let retained: BTreeSet<Uid> = found.iter().copied().filter(|u| seen.contains(u)).collect();
    let mut candidates: Vec<Uid> = found.iter().copied().filter(|u| !seen.contains(u)).collect();
    if order == Order::NewestFirst {
        candidates.sort_unstable_by(|a, b| b.cmp(a));
    }
    let mut deferred = 0;
    if let Some(limit) = limit {
        if candidates.len() > limit {
            deferred = candidates.len() - limit;
            candidates.truncate(limit);
        }
    }
    Batch {
        retained,
        candidates,
        deferred,
    }
}
