//! The participant session: identity, writes into the shared tables, the
//! memoized summary and the estimation loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{EstimationError, SessionPhase, SessionRules};
use crate::estimate::{Estimate, PENDING};
use crate::selection;
use crate::store::{
    ReplicatedStore, DOTS_PER_VOTER, ESTIMATES, ESTIMATE_KEY_SEPARATOR, ITEMS, STATE, TOP_VOTES,
};
use crate::{ItemVotes, VoteSummary};

/// How far the local participant has advanced, derived from the shared
/// tables and the session's own records.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ParticipantPhase {
    /// No top vote cast yet.
    Voting,
    /// An item is active or candidates remain.
    Estimating,
    /// Everything covered locally; waiting for the other participants.
    Summary,
    /// The shared state was set to ended.
    Ended,
}

/// One participant's session over the replicated store.
///
/// Owns the memoized [`VoteSummary`]: the cache is dropped on every local
/// write and whenever the store version stamp moves, and rebuilt lazily on
/// the next read. The item currently being estimated lives only in this
/// struct; if the process dies after the `pending` write the record stays
/// in the store and the item simply becomes selectable again.
pub struct Participant {
    name: String,
    store: Rc<dyn ReplicatedStore>,
    rules: SessionRules,
    mark_callback: Box<dyn Fn()>,
    cached_summary: Option<(u64, Rc<VoteSummary>)>,
    random_order: Rc<RefCell<HashMap<String, f64>>>,
    added_item_count: u32,
    current_item: Option<String>,
    rng: StdRng,
}

impl Participant {
    /// A session over the given store. A `clean` admin created the shared
    /// session and seeds the per-voter quota; everyone else reads the quota
    /// from the store.
    pub fn new(
        store: Rc<dyn ReplicatedStore>,
        name: &str,
        clean: bool,
        admin: bool,
        rules: SessionRules,
        mark_callback: Box<dyn Fn()>,
    ) -> Participant {
        let rng = match rules.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut participant = Participant {
            name: name.to_string(),
            store,
            rules,
            mark_callback,
            cached_summary: None,
            random_order: Rc::new(RefCell::new(HashMap::new())),
            added_item_count: 0,
            current_item: None,
            rng,
        };
        if clean && admin {
            if let Some(dots) = participant.rules.dots_per_voter {
                participant.set_dots_per_voter(dots);
            }
        }
        info!(
            "participant {} ready (admin: {}, clean: {})",
            participant.name, admin, clean
        );
        participant
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores one submitted agenda entry and returns its generated key.
    ///
    /// Keys are `<name><sequence>`; the sequence advances past keys the
    /// store already knows, so a contributor's own repeated submissions
    /// cannot collide. Two contributors sharing a name can still collide;
    /// that limitation is accepted.
    pub fn add_item(&mut self, free_text: &str) -> String {
        let trimmed = free_text.trim();
        let mut key;
        loop {
            key = format!("{}{}", self.name, self.added_item_count);
            self.added_item_count += 1;
            if self.store.get(ITEMS, &key).is_none() {
                break;
            }
        }
        debug!("add_item: {} -> {:?}", key, trimmed);
        self.store.put(ITEMS, &key, trimmed);
        self.invalidate_cache();
        key
    }

    /// Splits a submission block on blank lines and adds every non-empty
    /// chunk as its own item (the submission form accepts several at once).
    pub fn add_item_block(&mut self, block: &str) -> Vec<String> {
        let normalized = block.replace("\r\n", "\n");
        let mut keys = Vec::new();
        for chunk in normalized.split("\n\n") {
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                keys.push(self.add_item(trimmed));
            }
        }
        keys
    }

    /// Records this participant's ranking choice(s) and starts the
    /// estimation loop. Rejected without any write when the selection is
    /// empty or exceeds the configured quota.
    pub fn vote_for_top(&mut self, selection: &[String]) -> Result<(), EstimationError> {
        if selection.is_empty() {
            return Err(EstimationError::NothingSelected);
        }
        if let Some(quota) = self.dots_per_voter() {
            if selection.len() > quota as usize {
                return Err(EstimationError::TooManySelections {
                    chosen: selection.len(),
                    quota,
                });
            }
        }
        self.store.put(TOP_VOTES, &self.name, &selection.join(","));
        self.invalidate_cache();
        if self.rules.with_estimation {
            self.advance_to_next_item();
        }
        Ok(())
    }

    pub fn has_no_top_vote(&self) -> bool {
        self.store.get(TOP_VOTES, &self.name).is_none()
    }

    /// Finalizes the estimate for the active item, then moves on to the
    /// next one.
    pub fn save_estimate(&mut self, estimate: &Estimate) -> Result<(), EstimationError> {
        let item_id = match self.current_item.take() {
            Some(id) => id,
            None => return Err(EstimationError::NoActiveItem),
        };
        let key = estimate_key(&self.name, &item_id);
        info!("{} estimates {}: {}", self.name, item_id, estimate.encode());
        self.store.put(ESTIMATES, &key, &estimate.encode());
        self.invalidate_cache();
        self.advance_to_next_item();
        Ok(())
    }

    /// Discards the memoized summary and tells the presentation layer to
    /// refresh. Any number of invalidations before the next read collapse
    /// into a single rescan.
    pub fn invalidate_cache(&mut self) {
        self.cached_summary = None;
        (self.mark_callback)();
        debug!("invalidate cache");
    }

    /// The memoized aggregate view. Rebuilt when explicitly invalidated or
    /// when the store version stamp moved (a replicated change arrived).
    pub fn vote_summary(&mut self) -> Rc<VoteSummary> {
        let current = self.store.version();
        if let Some((version, summary)) = &self.cached_summary {
            if *version == current {
                return Rc::clone(summary);
            }
        }
        let summary = Rc::new(VoteSummary::scan(
            self.store.as_ref(),
            Rc::clone(&self.random_order),
        ));
        self.cached_summary = Some((current, Rc::clone(&summary)));
        summary
    }

    /// The item this participant is currently estimating, selecting one
    /// first when none is active and candidates remain.
    pub fn current_item_id(&mut self) -> Option<String> {
        if self.current_item.is_none() && self.rules.with_estimation {
            self.advance_to_next_item();
        }
        self.current_item.clone()
    }

    pub fn current_item_text(&mut self) -> Option<String> {
        let id = self.current_item_id()?;
        self.vote_summary().item(&id).map(|votes| votes.text.clone())
    }

    pub fn current_item_bold_text(&mut self) -> Option<String> {
        let id = self.current_item_id()?;
        self.vote_summary()
            .item(&id)
            .map(|votes| votes.bold_text.clone())
    }

    /// Whether the estimation loop still has work for this participant.
    pub fn has_further_items(&mut self) -> bool {
        self.current_item_id().is_some()
    }

    /// The derived position in the session lifecycle.
    pub fn phase(&mut self) -> ParticipantPhase {
        if self.session_state() == SessionPhase::Ended {
            return ParticipantPhase::Ended;
        }
        if self.has_no_top_vote() {
            return ParticipantPhase::Voting;
        }
        if self.rules.with_estimation && self.has_further_items() {
            ParticipantPhase::Estimating
        } else {
            ParticipantPhase::Summary
        }
    }

    /// The shared lifecycle flag; a session without a record is running.
    pub fn session_state(&self) -> SessionPhase {
        self.store
            .get(STATE, STATE)
            .and_then(|raw| SessionPhase::parse(&raw))
            .unwrap_or(SessionPhase::Running)
    }

    pub fn set_session_state(&mut self, phase: SessionPhase) {
        self.store.put(STATE, STATE, phase.as_str());
        self.invalidate_cache();
    }

    pub fn dots_per_voter(&self) -> Option<u32> {
        self.store
            .get(DOTS_PER_VOTER, DOTS_PER_VOTER)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn set_dots_per_voter(&mut self, dots: u32) {
        self.store.put(DOTS_PER_VOTER, DOTS_PER_VOTER, &dots.to_string());
    }

    /// Joins an existing collaborative session by its node id.
    pub fn connect_to(&self, node_id: &str) -> Result<(), EstimationError> {
        self.store.connect_to_node(node_id)
    }

    /// Runs the selection heuristic when no item is active. Writing the
    /// `pending` record immediately makes the pick visible to every peer's
    /// next rescan.
    fn advance_to_next_item(&mut self) {
        if self.current_item.is_some() {
            return;
        }
        if self.session_state() == SessionPhase::Ended {
            return;
        }
        if self.has_no_top_vote() {
            return;
        }
        let summary = self.vote_summary();
        let candidates: Vec<&ItemVotes> = summary
            .stable_items()
            .into_iter()
            .filter(|votes| votes.top_vote_count > 0 && self.is_open_for_me(&votes.id))
            .collect();
        if let Some(winner) = selection::pick_next_item(&candidates, &mut self.rng) {
            let item_id = winner.id.clone();
            info!("next item for {}: {}", self.name, item_id);
            self.store
                .put(ESTIMATES, &estimate_key(&self.name, &item_id), PENDING);
            self.current_item = Some(item_id);
            self.invalidate_cache();
        }
    }

    /// An item is open for this participant while their own estimate record
    /// is absent or still pending.
    fn is_open_for_me(&self, item_id: &str) -> bool {
        match self.store.get(ESTIMATES, &estimate_key(&self.name, item_id)) {
            None => true,
            Some(value) => value == PENDING,
        }
    }
}

fn estimate_key(participant: &str, item_id: &str) -> String {
    format!("{}{}{}", participant, ESTIMATE_KEY_SEPARATOR, item_id)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::builder::ParticipantBuilder;
    use crate::store::MemoryStore;

    fn seeded_rules() -> SessionRules {
        SessionRules {
            random_seed: Some(7),
            ..SessionRules::DEFAULT_RULES
        }
    }

    fn admin_on(store: Rc<MemoryStore>) -> Participant {
        ParticipantBuilder::new(store, "admin")
            .admin(true)
            .clean(true)
            .rules(seeded_rules())
            .build()
            .unwrap()
    }

    #[test]
    fn repeated_submissions_get_distinct_keys() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = admin_on(Rc::clone(&store));
        let first = admin.add_item("Docs: write the guide");
        let second = admin.add_item("Docs: write the guide");
        assert_ne!(first, second);
        assert_eq!(first, "admin0");
        assert_eq!(second, "admin1");
    }

    #[test]
    fn key_generation_skips_records_already_in_the_store() {
        let store = Rc::new(MemoryStore::new());
        store.put(ITEMS, "admin0", "already there");
        let mut admin = admin_on(Rc::clone(&store));
        assert_eq!(admin.add_item("fresh"), "admin1");
    }

    #[test]
    fn item_blocks_split_on_blank_lines() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = admin_on(store);
        let keys = admin.add_item_block("First topic\r\n\nSecond: topic\n\n\n");
        assert_eq!(keys, vec!["admin0".to_string(), "admin1".to_string()]);
        let summary = admin.vote_summary();
        assert_eq!(summary.item("admin1").unwrap().bold_text, "Second:");
    }

    #[test]
    fn empty_and_oversized_votes_are_rejected_without_a_write() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = admin_on(store);
        let items: Vec<String> = (0..5).map(|idx| admin.add_item(&format!("t{}", idx))).collect();

        assert_eq!(admin.vote_for_top(&[]), Err(EstimationError::NothingSelected));
        assert_eq!(
            admin.vote_for_top(&items),
            Err(EstimationError::TooManySelections { chosen: 5, quota: 4 })
        );
        assert!(admin.has_no_top_vote());
    }

    #[test]
    fn admin_runs_a_session_end_to_end() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = admin_on(store);
        let first = admin.add_item("Docs: write the guide");
        let _second = admin.add_item("Refactor the login flow");

        assert!(admin.has_no_top_vote());
        assert_eq!(admin.current_item_id(), None);
        assert_eq!(admin.phase(), ParticipantPhase::Voting);

        admin.vote_for_top(&[first.clone()]).unwrap();
        assert!(!admin.has_no_top_vote());
        // The voted item is the only candidate, so it becomes active and a
        // pending record appears for it.
        assert_eq!(admin.current_item_id(), Some(first.clone()));
        assert_eq!(admin.current_item_bold_text(), Some("Docs:".to_string()));
        assert_eq!(admin.phase(), ParticipantPhase::Estimating);
        let summary = admin.vote_summary();
        assert_eq!(summary.item(&first).unwrap().pending_estimate_count(), 1);
        drop(summary);

        admin.save_estimate(&Estimate::Money(10.0)).unwrap();
        assert_eq!(admin.current_item_id(), None);
        assert_eq!(admin.phase(), ParticipantPhase::Summary);
        let summary = admin.vote_summary();
        let votes = summary.item(&first).unwrap();
        assert_eq!(votes.average_estimate(), 10.0);
        assert_eq!(votes.pending_estimate_count(), 0);
        assert_eq!(votes.finished_estimate_count, 1);
    }

    #[test]
    fn saving_without_an_active_item_is_rejected() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = admin_on(store);
        assert_eq!(
            admin.save_estimate(&Estimate::Money(1.0)),
            Err(EstimationError::NoActiveItem)
        );
    }

    #[test]
    fn an_ended_session_selects_nothing() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = admin_on(store);
        let first = admin.add_item("topic");
        admin.set_session_state(SessionPhase::Ended);
        admin.vote_for_top(&[first]).unwrap();
        assert_eq!(admin.current_item_id(), None);
        assert_eq!(admin.phase(), ParticipantPhase::Ended);
    }

    #[test]
    fn invalidations_collapse_into_one_rescan() {
        let store: Rc<dyn ReplicatedStore> = Rc::new(MemoryStore::new());
        let marks = Rc::new(Cell::new(0u32));
        let marks_seen = Rc::clone(&marks);
        let mut admin = ParticipantBuilder::new(Rc::clone(&store), "admin")
            .admin(true)
            .clean(true)
            .rules(seeded_rules())
            .on_change(Box::new(move || marks_seen.set(marks_seen.get() + 1)))
            .build()
            .unwrap();

        let before = admin.vote_summary();
        assert!(Rc::ptr_eq(&before, &admin.vote_summary()));

        let marks_before = marks.get();
        admin.invalidate_cache();
        admin.invalidate_cache();
        assert_eq!(marks.get(), marks_before + 2);

        let after = admin.vote_summary();
        assert!(!Rc::ptr_eq(&before, &after));
        // Both invalidations collapsed into the single rebuild above.
        assert!(Rc::ptr_eq(&after, &admin.vote_summary()));
    }

    #[test]
    fn replicated_changes_are_picked_up_through_the_version_stamp() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = admin_on(Rc::clone(&store));
        let before = admin.vote_summary();
        assert_eq!(before.voter_count(), 0);
        // Another peer's vote arrives in the replica.
        store.put(TOP_VOTES, "bob", "admin0");
        let after = admin.vote_summary();
        assert!(!Rc::ptr_eq(&before, &after));
        assert_eq!(after.voter_count(), 1);
    }

    #[test]
    fn dot_voting_sessions_skip_the_estimation_loop() {
        let store = Rc::new(MemoryStore::new());
        let mut admin = ParticipantBuilder::new(store, "admin")
            .admin(true)
            .clean(true)
            .rules(SessionRules {
                with_estimation: false,
                ..seeded_rules()
            })
            .build()
            .unwrap();
        let first = admin.add_item("topic");
        admin.vote_for_top(&[first.clone()]).unwrap();
        assert_eq!(admin.current_item_id(), None);
        assert_eq!(admin.phase(), ParticipantPhase::Summary);
        let summary = admin.vote_summary();
        assert_eq!(summary.item(&first).unwrap().total_estimate_count, 0);
    }
}
