//! The compound textual encoding of estimates.
//!
//! An estimate is stored as `category,component[,component]`. Two categories
//! carry a numeric value: money (`Geld`, one component) and time (`Zeit`,
//! duration and person count). The sentinels `pending` and `unknown` mark an
//! estimate in progress and an explicit abstention.

/// Value reserved while a participant is actively considering an item.
pub const PENDING: &str = "pending";
/// Value recording an explicit abstention.
pub const UNKNOWN: &str = "unknown";

const MONEY_TAG: &str = "Geld";
const TIME_TAG: &str = "Zeit";

/// One unit of time, per person, counts as this many money units.
const TIME_UNIT_FACTOR: f64 = 50.0;

/// A single participant's judgment about one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimate {
    Pending,
    Unknown,
    /// Monetary estimate, in money units.
    Money(f64),
    /// Time estimate: a duration and how many people it occupies.
    Time { duration: f64, persons: f64 },
    /// A category this version does not recognize. It decodes to value 0
    /// but still counts as a cast estimate.
    Other(String),
}

impl Estimate {
    /// Decodes the compound encoding. Total: every input yields an
    /// `Estimate`. Missing or unparseable numeric components come back as
    /// `NaN` and propagate into the statistics of the affected item; they
    /// are deliberately not coerced to a number.
    pub fn parse(raw: &str) -> Estimate {
        match raw {
            PENDING => return Estimate::Pending,
            UNKNOWN => return Estimate::Unknown,
            _ => {}
        }
        let mut parts = raw.split(',');
        match parts.next().unwrap_or("") {
            MONEY_TAG => Estimate::Money(parse_component(parts.next())),
            TIME_TAG => Estimate::Time {
                duration: parse_component(parts.next()),
                persons: parse_component(parts.next()),
            },
            _ => Estimate::Other(raw.to_string()),
        }
    }

    /// The inverse of [`Estimate::parse`] for the recognized forms;
    /// unrecognized input is re-emitted verbatim.
    pub fn encode(&self) -> String {
        match self {
            Estimate::Pending => PENDING.to_string(),
            Estimate::Unknown => UNKNOWN.to_string(),
            Estimate::Money(amount) => format!("{},{}", MONEY_TAG, amount),
            Estimate::Time { duration, persons } => {
                format!("{},{},{}", TIME_TAG, duration, persons)
            }
            Estimate::Other(raw) => raw.clone(),
        }
    }

    /// The unit-normalized numeric value, in money units.
    pub fn normalized_value(&self) -> f64 {
        match self {
            Estimate::Money(amount) => *amount,
            Estimate::Time { duration, persons } => TIME_UNIT_FACTOR * duration * persons,
            Estimate::Pending | Estimate::Unknown | Estimate::Other(_) => 0.0,
        }
    }

    /// Whether this record participates in aggregate statistics.
    pub fn shall_count(&self) -> bool {
        !matches!(self, Estimate::Pending | Estimate::Unknown)
    }
}

fn parse_component(part: Option<&str>) -> f64 {
    match part {
        Some(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        None => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_decodes_to_its_amount() {
        assert_eq!(Estimate::parse("Geld,5").normalized_value(), 5.0);
        assert_eq!(Estimate::parse("Geld,5"), Estimate::Money(5.0));
    }

    #[test]
    fn time_multiplies_duration_persons_and_unit() {
        assert_eq!(Estimate::parse("Zeit,2,3").normalized_value(), 300.0);
    }

    #[test]
    fn sentinels_are_zero_and_not_counted() {
        for raw in [PENDING, UNKNOWN] {
            let est = Estimate::parse(raw);
            assert_eq!(est.normalized_value(), 0.0);
            assert!(!est.shall_count());
        }
    }

    #[test]
    fn unrecognized_categories_count_with_value_zero() {
        let est = Estimate::parse("Sterne,4");
        assert_eq!(est, Estimate::Other("Sterne,4".to_string()));
        assert_eq!(est.normalized_value(), 0.0);
        assert!(est.shall_count());
    }

    #[test]
    fn unparseable_components_propagate_nan() {
        assert!(Estimate::parse("Geld,viel").normalized_value().is_nan());
        assert!(Estimate::parse("Geld").normalized_value().is_nan());
        assert!(Estimate::parse("Zeit,2").normalized_value().is_nan());
    }

    #[test]
    fn recognized_forms_round_trip() {
        for raw in ["Geld,5", "Zeit,2,3", "pending", "unknown"] {
            assert_eq!(Estimate::parse(raw).encode(), raw);
        }
    }
}
