//! The next-item-to-estimate heuristic.
//!
//! Estimate counts are read from a possibly stale replica, so this is a
//! load-balancing bias, not a coordination primitive: peers may pick the
//! same item concurrently and the skew self-corrects as estimates arrive.

use log::debug;
use rand::Rng;

use crate::ItemVotes;

/// Picks the next item from the candidate set: two independent uniform
/// draws (with replacement, so both draws may land on the same item),
/// decided by [`duel`].
pub fn pick_next_item<'a, R: Rng>(
    candidates: &[&'a ItemVotes],
    rng: &mut R,
) -> Option<&'a ItemVotes> {
    match candidates {
        [] => None,
        [only] => Some(*only),
        _ => {
            let first = candidates[rng.random_range(0..candidates.len())];
            let second = candidates[rng.random_range(0..candidates.len())];
            let winner = duel(first, second);
            debug!(
                "pick_next_item: {} vs {} -> {}",
                first.id, second.id, winner.id
            );
            Some(winner)
        }
    }
}

/// Deterministic comparison of two drawn candidates: fewer finished
/// estimates wins, then fewer total estimates, then the first contender.
pub fn duel<'a>(first: &'a ItemVotes, second: &'a ItemVotes) -> &'a ItemVotes {
    if second.finished_estimate_count < first.finished_estimate_count {
        return second;
    }
    if second.finished_estimate_count == first.finished_estimate_count
        && second.total_estimate_count < first.total_estimate_count
    {
        return second;
    }
    first
}
