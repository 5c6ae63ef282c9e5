mod config;
use log::debug;

use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    rc::Rc,
};

pub use crate::config::*;

pub mod builder;
pub mod estimate;
pub mod manual;
pub mod quick_start;
pub mod selection;
pub mod session;
pub mod store;

use crate::estimate::Estimate;
use crate::store::{ReplicatedStore, ESTIMATES, ESTIMATE_KEY_SEPARATOR, ITEMS, TOP_VOTES};

/// Per-item counters and derived statistics.
///
/// Rebuilt from scratch on every rescan; never updated in place.
#[derive(Debug, Clone)]
pub struct ItemVotes {
    pub id: String,
    pub bold_text: String,
    pub text: String,
    pub top_vote_count: u32,
    pub total_estimate_count: u32,
    /// Estimate records that are no longer `pending` (including explicit
    /// abstentions).
    pub finished_estimate_count: u32,
    // Countable finalized estimates, encoded form -> frequency.
    estimate_tallies: BTreeMap<String, u32>,
}

impl ItemVotes {
    fn new(id: &str, content: ItemContent) -> ItemVotes {
        ItemVotes {
            id: id.to_string(),
            bold_text: content.bold_text,
            text: content.text,
            top_vote_count: 0,
            total_estimate_count: 0,
            finished_estimate_count: 0,
            estimate_tallies: BTreeMap::new(),
        }
    }

    pub fn pending_estimate_count(&self) -> u32 {
        self.total_estimate_count - self.finished_estimate_count
    }

    /// The multiset of countable finalized estimates, in their encoded form.
    pub fn estimate_tallies(&self) -> &BTreeMap<String, u32> {
        &self.estimate_tallies
    }

    fn record_estimate(&mut self, raw: &str) {
        self.total_estimate_count += 1;
        let est = Estimate::parse(raw);
        if !matches!(est, Estimate::Pending) {
            self.finished_estimate_count += 1;
        }
        if est.shall_count() {
            *self.estimate_tallies.entry(raw.to_string()).or_insert(0) += 1;
        }
    }

    /// The middle countable estimate, by normalized value; the upper middle
    /// for even sample sizes. `None` without countable data.
    pub fn median_estimate(&self) -> Option<String> {
        let mut flat: Vec<(&String, f64)> = Vec::new();
        for (raw, freq) in self.estimate_tallies.iter() {
            let value = Estimate::parse(raw).normalized_value();
            for _ in 0..*freq {
                flat.push((raw, value));
            }
        }
        if flat.is_empty() {
            return None;
        }
        flat.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        Some(flat[flat.len() / 2].0.clone())
    }

    /// Mean normalized value over the countable estimates; 0 when there is
    /// no countable data.
    pub fn average_estimate(&self) -> f64 {
        let mut count: u32 = 0;
        let mut sum = 0.0;
        for (raw, freq) in self.estimate_tallies.iter() {
            count += freq;
            sum += Estimate::parse(raw).normalized_value() * f64::from(*freq);
        }
        if count == 0 {
            0.0
        } else {
            sum / f64::from(count)
        }
    }

    /// Population standard deviation divided by the mean; 0 when there is
    /// no countable data or the mean itself is 0.
    pub fn relative_std_deviation(&self) -> f64 {
        let mut count: u32 = 0;
        for freq in self.estimate_tallies.values() {
            count += freq;
        }
        let mean = self.average_estimate();
        if count == 0 || mean == 0.0 {
            return 0.0;
        }
        let mut squares = 0.0;
        for (raw, freq) in self.estimate_tallies.iter() {
            let deviation = Estimate::parse(raw).normalized_value() - mean;
            squares += deviation * deviation * f64::from(*freq);
        }
        (squares / f64::from(count)).sqrt() / mean
    }
}

/// The aggregate view of one store snapshot.
///
/// Pure given its snapshot, except for the session-local random draws
/// backing [`VoteSummary::shuffled_items`], which are intentionally
/// non-deterministic and never replicated.
pub struct VoteSummary {
    items: BTreeMap<String, ItemVotes>,
    voter_count: u32,
    random_order: Rc<RefCell<HashMap<String, f64>>>,
}

impl VoteSummary {
    /// Scans the items, topVotes and estimates tables of the local replica
    /// and rebuilds every counter.
    pub fn scan(
        store: &dyn ReplicatedStore,
        random_order: Rc<RefCell<HashMap<String, f64>>>,
    ) -> VoteSummary {
        let mut items: BTreeMap<String, ItemVotes> = BTreeMap::new();
        store.for_each(ITEMS, &mut |id, raw| {
            items.insert(
                id.to_string(),
                ItemVotes::new(id, ItemContent::from_free_text(raw)),
            );
        });

        let mut voter_count: u32 = 0;
        store.for_each(TOP_VOTES, &mut |_voter, ids| {
            voter_count += 1;
            for item_id in ids.split(',') {
                // References to ids this replica has not seen yet are
                // skipped; the next rescan picks them up.
                if let Some(votes) = items.get_mut(item_id) {
                    votes.top_vote_count += 1;
                }
            }
        });

        store.for_each(ESTIMATES, &mut |key, value| {
            // Keys look like `anna_for_bob0`; anything else is not an
            // estimate record.
            if let Some((_participant, item_id)) = key.split_once(ESTIMATE_KEY_SEPARATOR) {
                if let Some(votes) = items.get_mut(item_id) {
                    votes.record_estimate(value);
                }
            }
        });

        debug!("scan: {} items, {} voters", items.len(), voter_count);
        VoteSummary {
            items,
            voter_count,
            random_order,
        }
    }

    pub fn item(&self, id: &str) -> Option<&ItemVotes> {
        self.items.get(id)
    }

    /// Participants that have cast a top vote.
    pub fn voter_count(&self) -> u32 {
        self.voter_count
    }

    /// Items by descending vote count; ties prefer the higher average
    /// estimate, then fewer total estimates (items still needing attention
    /// surface first).
    pub fn sorted_items(&self) -> Vec<&ItemVotes> {
        let mut list: Vec<&ItemVotes> = self.items.values().collect();
        list.sort_by(|a, b| {
            b.top_vote_count
                .cmp(&a.top_vote_count)
                .then(
                    b.average_estimate()
                        .partial_cmp(&a.average_estimate())
                        .unwrap_or(Ordering::Equal),
                )
                .then(a.total_estimate_count.cmp(&b.total_estimate_count))
        });
        list
    }

    /// Items in id order: a presentation ordering unaffected by the vote
    /// outcome.
    pub fn stable_items(&self) -> Vec<&ItemVotes> {
        self.items.values().collect()
    }

    /// Items in a randomized order that stays fixed for the lifetime of
    /// this session. The draw per item is cached in the session-owned map
    /// and never replicated, so peers disagree on this ordering but each
    /// peer sees a stable one.
    pub fn shuffled_items(&self) -> Vec<&ItemVotes> {
        let mut list: Vec<&ItemVotes> = self.items.values().collect();
        let mut draws = self.random_order.borrow_mut();
        for votes in list.iter() {
            draws
                .entry(votes.id.clone())
                .or_insert_with(rand::random::<f64>);
        }
        list.sort_by(|a, b| {
            draws[&a.id]
                .partial_cmp(&draws[&b.id])
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    pub fn min_finished_estimate_count(&self) -> u32 {
        self.items
            .values()
            .map(|votes| votes.finished_estimate_count)
            .min()
            .unwrap_or(0)
    }

    pub fn max_finished_estimate_count(&self) -> u32 {
        self.items
            .values()
            .map(|votes| votes.finished_estimate_count)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fresh_order() -> Rc<RefCell<HashMap<String, f64>>> {
        Rc::new(RefCell::new(HashMap::new()))
    }

    fn scan(store: &MemoryStore) -> VoteSummary {
        VoteSummary::scan(store, fresh_order())
    }

    #[test]
    fn top_votes_split_and_sum_up() {
        let store = MemoryStore::new();
        store.put(ITEMS, "anna0", "Docs: write the guide");
        store.put(ITEMS, "anna1", "Refactor the login flow");
        store.put(ITEMS, "bob0", "Ops: automate deployments");
        store.put(TOP_VOTES, "anna", "anna1,bob0");
        store.put(TOP_VOTES, "bob", "anna1");
        store.put(TOP_VOTES, "carl", "bob0,anna1,gone99");

        let summary = scan(&store);
        assert_eq!(summary.voter_count(), 3);
        let counted: u32 = summary
            .stable_items()
            .iter()
            .map(|votes| votes.top_vote_count)
            .sum();
        // Five references name known items; the stale `gone99` is skipped.
        assert_eq!(counted, 5);
        assert_eq!(summary.item("anna1").unwrap().top_vote_count, 3);
        assert_eq!(summary.item("bob0").unwrap().top_vote_count, 2);
        assert_eq!(summary.item("anna0").unwrap().top_vote_count, 0);
    }

    #[test]
    fn item_content_is_split_on_the_first_colon() {
        let store = MemoryStore::new();
        store.put(ITEMS, "anna0", "Docs: write the guide: part one");
        store.put(ITEMS, "anna1", "no label here");
        let summary = scan(&store);
        let labeled = summary.item("anna0").unwrap();
        assert_eq!(labeled.bold_text, "Docs:");
        assert_eq!(labeled.text, " write the guide: part one");
        let plain = summary.item("anna1").unwrap();
        assert_eq!(plain.bold_text, "");
        assert_eq!(plain.text, "no label here");
    }

    #[test]
    fn median_uses_the_upper_middle() {
        let store = MemoryStore::new();
        store.put(ITEMS, "a0", "topic");
        store.put(ESTIMATES, "p1_for_a0", "Geld,1");
        store.put(ESTIMATES, "p2_for_a0", "Geld,2");
        store.put(ESTIMATES, "p3_for_a0", "Geld,3");
        let summary = scan(&store);
        assert_eq!(
            summary.item("a0").unwrap().median_estimate(),
            Some("Geld,2".to_string())
        );

        store.put(ESTIMATES, "p4_for_a0", "Geld,4");
        let summary = scan(&store);
        // Even count: the upper middle, not an interpolated value.
        assert_eq!(
            summary.item("a0").unwrap().median_estimate(),
            Some("Geld,3".to_string())
        );
    }

    #[test]
    fn sentinels_keep_statistics_at_zero() {
        let store = MemoryStore::new();
        store.put(ITEMS, "a0", "topic");
        store.put(ESTIMATES, "p1_for_a0", "pending");
        store.put(ESTIMATES, "p2_for_a0", "unknown");
        let summary = scan(&store);
        let votes = summary.item("a0").unwrap();
        assert_eq!(votes.total_estimate_count, 2);
        assert_eq!(votes.finished_estimate_count, 1);
        assert_eq!(votes.pending_estimate_count(), 1);
        assert_eq!(votes.average_estimate(), 0.0);
        assert_eq!(votes.relative_std_deviation(), 0.0);
        assert_eq!(votes.median_estimate(), None);
    }

    #[test]
    fn mixed_categories_aggregate_on_normalized_values() {
        let store = MemoryStore::new();
        store.put(ITEMS, "a0", "topic");
        store.put(ESTIMATES, "p1_for_a0", "Geld,100");
        store.put(ESTIMATES, "p2_for_a0", "Zeit,2,3");
        store.put(ESTIMATES, "p3_for_a0", "unknown");
        let summary = scan(&store);
        let votes = summary.item("a0").unwrap();
        assert_eq!(votes.average_estimate(), 200.0);
        assert_eq!(votes.relative_std_deviation(), 0.5);
        assert_eq!(votes.median_estimate(), Some("Zeit,2,3".to_string()));
        assert_eq!(votes.finished_estimate_count, 3);
        assert_eq!(votes.estimate_tallies().len(), 2);
    }

    #[test]
    fn sorted_items_break_ties_toward_fewer_estimates() {
        let store = MemoryStore::new();
        store.put(ITEMS, "x0", "first");
        store.put(ITEMS, "y0", "second");
        store.put(ITEMS, "z0", "third");
        store.put(TOP_VOTES, "p1", "x0,y0,z0");
        store.put(TOP_VOTES, "p2", "x0,y0,z0");
        store.put(TOP_VOTES, "p3", "z0");
        // Same vote count and same (zero) average for x0 and y0; y0 has an
        // estimate already, so x0 sorts first.
        store.put(ESTIMATES, "p1_for_y0", "Geld,0");

        let summary = scan(&store);
        let order: Vec<&str> = summary
            .sorted_items()
            .iter()
            .map(|votes| votes.id.as_str())
            .collect();
        assert_eq!(order, vec!["z0", "x0", "y0"]);
    }

    #[test]
    fn higher_average_wins_the_vote_count_tie() {
        let store = MemoryStore::new();
        store.put(ITEMS, "a0", "first");
        store.put(ITEMS, "b0", "second");
        store.put(TOP_VOTES, "p1", "a0,b0");
        store.put(ESTIMATES, "p1_for_a0", "Geld,5");
        store.put(ESTIMATES, "p1_for_b0", "Geld,20");
        let summary = scan(&store);
        let order: Vec<&str> = summary
            .sorted_items()
            .iter()
            .map(|votes| votes.id.as_str())
            .collect();
        assert_eq!(order, vec!["b0", "a0"]);
    }

    #[test]
    fn shuffled_order_is_stable_within_a_session() {
        let store = MemoryStore::new();
        for idx in 0..8 {
            store.put(ITEMS, &format!("a{}", idx), "topic");
        }
        let order = fresh_order();
        let summary = VoteSummary::scan(&store, Rc::clone(&order));
        let first: Vec<String> = summary
            .shuffled_items()
            .iter()
            .map(|votes| votes.id.clone())
            .collect();
        // A rebuild reuses the cached draws.
        let summary = VoteSummary::scan(&store, Rc::clone(&order));
        let second: Vec<String> = summary
            .shuffled_items()
            .iter()
            .map(|votes| votes.id.clone())
            .collect();
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        let stable: Vec<String> = summary
            .stable_items()
            .iter()
            .map(|votes| votes.id.clone())
            .collect();
        assert_eq!(sorted, stable);
    }

    #[test]
    fn min_and_max_finished_counts_span_the_items() {
        let store = MemoryStore::new();
        store.put(ITEMS, "a0", "first");
        store.put(ITEMS, "b0", "second");
        store.put(ESTIMATES, "p1_for_b0", "Geld,10");
        store.put(ESTIMATES, "p2_for_b0", "unknown");
        store.put(ESTIMATES, "p1_for_a0", "pending");
        let summary = scan(&store);
        assert_eq!(summary.min_finished_estimate_count(), 0);
        assert_eq!(summary.max_finished_estimate_count(), 2);
    }

    #[test]
    fn malformed_estimate_keys_are_skipped() {
        let store = MemoryStore::new();
        store.put(ITEMS, "a0", "topic");
        store.put(ESTIMATES, "not-an-estimate-key", "Geld,10");
        store.put(ESTIMATES, "p1_for_gone", "Geld,10");
        let summary = scan(&store);
        assert_eq!(summary.item("a0").unwrap().total_estimate_count, 0);
    }
}
