//! Condition expressions attached to rule nodes.
//!
//! Drafts store conditions in source form (free text typed in the rule
//! editor). They are parsed into the closed [`Condition`] type once, when a
//! tree is validated or compiled, so that evaluation never has to interpret
//! strings.
//!
//! Accepted source forms:
//!
//! ```text
//! hour >= 6 && hour < 12      half-open local hour range
//! hour >= 6 and hour < 12     same, spelled out
//! hour < 12                   from midnight
//! hour >= 18                  until midnight
//! contains:meeting            case-sensitive substring
//! contains:"stand up"         quoted literal (keeps inner whitespace)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ConditionParseError;

/// Number of hours in a day; the exclusive upper bound of any hour range.
pub const HOURS_PER_DAY: u8 = 24;

const CONTAINS_PREFIX: &str = "contains:";

/// A parsed rule condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Local hour `h` satisfies `from <= h < to`.
    HourRange { from: u8, to: u8 },
    /// The transcript contains `literal` (case-sensitive).
    TextContains { literal: String },
}

impl Condition {
    /// Build an hour range, checking `from < to <= 24`.
    pub fn hour_range(from: u8, to: u8) -> Result<Self, ConditionParseError> {
        if to > HOURS_PER_DAY {
            return Err(ConditionParseError::HourOutOfRange(to));
        }
        if from >= to {
            return Err(ConditionParseError::EmptyRange { from, to });
        }
        Ok(Self::HourRange { from, to })
    }

    /// Build a substring test. The literal must not be empty.
    pub fn text_contains(literal: impl Into<String>) -> Result<Self, ConditionParseError> {
        let literal = literal.into();
        if literal.is_empty() {
            return Err(ConditionParseError::EmptyLiteral);
        }
        Ok(Self::TextContains { literal })
    }

    /// Evaluate against a local hour (0-23) and a transcript.
    pub fn matches(&self, local_hour: u32, transcript: &str) -> bool {
        match self {
            Condition::HourRange { from, to } => {
                local_hour >= u32::from(*from) && local_hour < u32::from(*to)
            }
            Condition::TextContains { literal } => transcript.contains(literal.as_str()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::HourRange { from, to } => write!(f, "hour >= {} && hour < {}", from, to),
            Condition::TextContains { literal } => write!(f, "{}\"{}\"", CONTAINS_PREFIX, literal),
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ConditionParseError::Empty);
        }

        if let Some(rest) = source.strip_prefix(CONTAINS_PREFIX) {
            return Condition::text_contains(unquote(rest.trim()));
        }

        parse_hour_range(source)
    }
}

/// Strip one pair of surrounding double quotes, if present.
fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn parse_hour_range(source: &str) -> Result<Condition, ConditionParseError> {
    let mut lower: Option<u8> = None;
    let mut upper: Option<u8> = None;

    for clause in source.split("&&").flat_map(|c| c.split(" and ")) {
        let clause = clause.trim();
        let rest = clause
            .strip_prefix("hour")
            .ok_or_else(|| ConditionParseError::Unrecognized(source.to_string()))?
            .trim_start();

        // `>=` must be tried before anything starting with `>`.
        let (bound, value) = if let Some(v) = rest.strip_prefix(">=") {
            (&mut lower, v)
        } else if let Some(v) = rest.strip_prefix('<') {
            if v.starts_with('=') {
                return Err(ConditionParseError::UnsupportedOperator(clause.to_string()));
            }
            (&mut upper, v)
        } else {
            return Err(ConditionParseError::UnsupportedOperator(clause.to_string()));
        };

        let value = value.trim();
        let hour: u8 = value
            .parse()
            .map_err(|_| ConditionParseError::InvalidHour(value.to_string()))?;
        if hour > HOURS_PER_DAY {
            return Err(ConditionParseError::HourOutOfRange(hour));
        }
        if bound.replace(hour).is_some() {
            return Err(ConditionParseError::DuplicateBound(clause.to_string()));
        }
    }

    Condition::hour_range(lower.unwrap_or(0), upper.unwrap_or(HOURS_PER_DAY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_hour_range() {
        let c: Condition = "hour >= 6 && hour < 12".parse().unwrap();
        assert_eq!(c, Condition::HourRange { from: 6, to: 12 });

        let spelled: Condition = "hour >= 6 and hour < 12".parse().unwrap();
        assert_eq!(spelled, c);
    }

    #[test]
    fn parses_open_ended_ranges() {
        assert_eq!(
            "hour < 12".parse::<Condition>().unwrap(),
            Condition::HourRange { from: 0, to: 12 }
        );
        assert_eq!(
            "hour>=18".parse::<Condition>().unwrap(),
            Condition::HourRange { from: 18, to: 24 }
        );
    }

    #[test]
    fn parses_contains_forms() {
        assert_eq!(
            "contains:meeting".parse::<Condition>().unwrap(),
            Condition::TextContains {
                literal: "meeting".to_string()
            }
        );
        assert_eq!(
            "contains:\" stand up\"".parse::<Condition>().unwrap(),
            Condition::TextContains {
                literal: " stand up".to_string()
            }
        );
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        assert!(matches!(
            "".parse::<Condition>(),
            Err(ConditionParseError::Empty)
        ));
        assert!(matches!(
            "weekday == mon".parse::<Condition>(),
            Err(ConditionParseError::Unrecognized(_))
        ));
        assert!(matches!(
            "hour <= 5".parse::<Condition>(),
            Err(ConditionParseError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            "hour > 5".parse::<Condition>(),
            Err(ConditionParseError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            "hour >= 12 && hour < 6".parse::<Condition>(),
            Err(ConditionParseError::EmptyRange { from: 12, to: 6 })
        ));
        assert!(matches!(
            "hour < 30".parse::<Condition>(),
            Err(ConditionParseError::HourOutOfRange(30))
        ));
        assert!(matches!(
            "hour >= 1 && hour >= 2".parse::<Condition>(),
            Err(ConditionParseError::DuplicateBound(_))
        ));
        assert!(matches!(
            "contains:\"\"".parse::<Condition>(),
            Err(ConditionParseError::EmptyLiteral)
        ));
    }

    #[test]
    fn hour_range_is_half_open() {
        let morning = Condition::hour_range(6, 12).unwrap();
        assert!(!morning.matches(5, ""));
        assert!(morning.matches(6, ""));
        assert!(morning.matches(11, ""));
        assert!(!morning.matches(12, ""));
    }

    #[test]
    fn text_contains_is_case_sensitive() {
        let c = Condition::text_contains("Gym").unwrap();
        assert!(c.matches(0, "went to the Gym today"));
        assert!(!c.matches(0, "went to the gym today"));
    }

    #[test]
    fn display_is_reparseable() {
        for c in [
            Condition::hour_range(0, 24).unwrap(),
            Condition::text_contains("lunch with Ana").unwrap(),
        ] {
            assert_eq!(c.to_string().parse::<Condition>().unwrap(), c);
        }
    }
}
