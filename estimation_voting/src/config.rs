// ********* Public data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The shared lifecycle flag of a collaborative session.
///
/// It lives in the replicated `state` table; a session that has no record
/// yet is considered running.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SessionPhase {
    Running,
    Ended,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Running => "running",
            SessionPhase::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<SessionPhase> {
        match s {
            "running" => Some(SessionPhase::Running),
            "ended" => Some(SessionPhase::Ended),
            _ => None,
        }
    }
}

/// The label/body split of a submitted agenda entry.
///
/// Contributors submit free text; an optional leading label is separated by
/// the first colon. The label keeps its colon, as it is displayed verbatim
/// in front of the body.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ItemContent {
    pub bold_text: String,
    pub text: String,
}

impl ItemContent {
    pub fn from_free_text(trimmed: &str) -> ItemContent {
        match trimmed.find(':') {
            Some(idx) => ItemContent {
                bold_text: trimmed[..idx + 1].to_string(),
                text: trimmed[idx + 1..].to_string(),
            },
            None => ItemContent {
                bold_text: String::new(),
                text: trimmed.to_string(),
            },
        }
    }
}

// ********* Configuration **********

/// Session-level knobs.
///
/// `dots_per_voter` and the session state are shared through the store; the
/// remaining fields are local to one participant process.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SessionRules {
    /// Upper bound on the number of items one voter may select. A clean
    /// admin writes this value into the shared configuration table.
    pub dots_per_voter: Option<u32>,
    /// Seed for the selection draws and the shuffled display order. Mostly
    /// useful to make replays reproducible; live sessions leave it unset.
    pub random_seed: Option<u64>,
    /// Whether the session runs the estimation loop after voting. Dot-voting
    /// flavours turn this off and jump straight to the summary.
    pub with_estimation: bool,
}

impl SessionRules {
    pub const DEFAULT_RULES: SessionRules = SessionRules {
        dots_per_voter: Some(4),
        random_seed: None,
        with_estimation: true,
    };
}

/// Errors surfaced synchronously at the point of an attempted action.
///
/// None of these is fatal: the action is rejected before any write happens.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum EstimationError {
    /// An action that needs a selection was invoked without one.
    NothingSelected,
    /// A multi-choice vote exceeded the configured per-voter quota.
    TooManySelections { chosen: usize, quota: u32 },
    /// An estimate was saved while no item is active.
    NoActiveItem,
    /// The transport layer failed to join the requested node.
    ConnectionFailed(String),
}

impl Error for EstimationError {}

impl Display for EstimationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimationError::NothingSelected => write!(f, "no selection was made"),
            EstimationError::TooManySelections { chosen, quota } => {
                write!(f, "{} items selected, but the quota is {}", chosen, quota)
            }
            EstimationError::NoActiveItem => write!(f, "no item is being estimated"),
            EstimationError::ConnectionFailed(node) => {
                write!(f, "could not connect to node {}", node)
            }
        }
    }
}
