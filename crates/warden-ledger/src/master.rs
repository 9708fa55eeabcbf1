//! Master keeper election.
//!
//! Every keeper of a group computes the same master from the same member
//! list: the median of the sorted keeper ids. Only the master repairs and
//! pays, so a group never double-repairs or double-pays.

use warden_types::KeeperId;

/// The master among `keepers`, or `None` for an empty group.
pub fn master_keeper(keepers: &[KeeperId]) -> Option<KeeperId> {
    let mut sorted = keepers.to_vec();
    sorted.sort();
    sorted.dedup();
    let mid = sorted.len() / 2;
    sorted.into_iter().nth(mid)
}
