pub use crate::config::*;

use std::rc::Rc;

use crate::session::Participant;
use crate::store::ReplicatedStore;

/// Assembles a [`Participant`] session.
///
/// ```
/// use std::rc::Rc;
/// use estimation_voting::builder::ParticipantBuilder;
/// use estimation_voting::store::MemoryStore;
///
/// let store = Rc::new(MemoryStore::new());
/// let mut participant = ParticipantBuilder::new(store, "anna")
///     .admin(true)
///     .clean(true)
///     .build()?;
///
/// participant.add_item("Docs: write the onboarding guide");
///
/// # Ok::<(), estimation_voting::EstimationError>(())
/// ```
pub struct ParticipantBuilder {
    store: Rc<dyn ReplicatedStore>,
    name: String,
    clean: bool,
    admin: bool,
    rules: SessionRules,
    mark_callback: Option<Box<dyn Fn()>>,
    join: Option<String>,
}

impl ParticipantBuilder {
    pub fn new(store: Rc<dyn ReplicatedStore>, name: &str) -> ParticipantBuilder {
        ParticipantBuilder {
            store,
            name: name.to_string(),
            clean: false,
            admin: false,
            rules: SessionRules::DEFAULT_RULES,
            mark_callback: None,
            join: None,
        }
    }

    /// Whether this participant created a fresh session (as opposed to
    /// joining an existing one).
    pub fn clean(mut self, clean: bool) -> ParticipantBuilder {
        self.clean = clean;
        self
    }

    pub fn admin(mut self, admin: bool) -> ParticipantBuilder {
        self.admin = admin;
        self
    }

    pub fn rules(mut self, rules: SessionRules) -> ParticipantBuilder {
        self.rules = rules;
        self
    }

    /// The presentation layer's refresh hook, fired on every cache
    /// invalidation.
    pub fn on_change(mut self, callback: Box<dyn Fn()>) -> ParticipantBuilder {
        self.mark_callback = Some(callback);
        self
    }

    /// Joins the session hosted at the given node before building.
    pub fn join(mut self, node_id: &str) -> ParticipantBuilder {
        self.join = Some(node_id.to_string());
        self
    }

    pub fn build(self) -> Result<Participant, EstimationError> {
        if let Some(node_id) = &self.join {
            self.store.connect_to_node(node_id)?;
        }
        let mark_callback = self.mark_callback.unwrap_or_else(|| Box::new(|| {}));
        Ok(Participant::new(
            self.store,
            &self.name,
            self.clean,
            self.admin,
            self.rules,
            mark_callback,
        ))
    }
}
