//! Topic filter parsing and matching.
//!
//! Topics are slash-separated strings like `home/ble/whitelist`. Filters use
//! MQTT wildcard rules:
//! - Exact: `home/ble/whitelist`
//! - Single level: `home/+/whitelist`
//! - Multi level (last level only): `home/#`, which also matches `home`
//! - Everything: `#`
//!
//! Matching is level-by-level without regex.

/// A level in a topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    /// Exact literal match for this level
    Literal(String),
    /// `+` - matches exactly one level
    Single,
    /// `#` - matches the remaining levels, including none
    Multi,
}

/// A parsed subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
    levels: Vec<Level>,
}

impl TopicFilter {
    /// Parse a filter.
    pub fn new(filter: &str) -> Result<Self, TopicError> {
        if filter.is_empty() {
            return Err(TopicError::Empty);
        }

        let parts: Vec<&str> = filter.split('/').collect();
        let last = parts.len() - 1;

        let levels = parts
            .iter()
            .enumerate()
            .map(|(i, &part)| match part {
                "#" if i == last => Ok(Level::Multi),
                "#" => Err(TopicError::MisplacedMultiLevel(filter.to_string())),
                "+" => Ok(Level::Single),
                p if p.contains(['#', '+']) => {
                    Err(TopicError::PartialWildcard(filter.to_string()))
                }
                p => Ok(Level::Literal(p.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: filter.to_string(),
            levels,
        })
    }

    /// Check if a concrete topic matches this filter.
    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('/');

        for level in &self.levels {
            match level {
                Level::Multi => return true,
                Level::Single => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Level::Literal(lit) => match parts.next() {
                    Some(p) if p == lit => {}
                    _ => return false,
                },
            }
        }

        parts.next().is_none()
    }

    /// True when the filter has no wildcards.
    pub fn is_exact(&self) -> bool {
        self.levels.iter().all(|l| matches!(l, Level::Literal(_)))
    }

    /// Get the raw filter string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Errors that can occur when parsing a topic filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("Empty topic filter")]
    Empty,

    #[error("'#' must be the last level: {0}")]
    MisplacedMultiLevel(String),

    #[error("Wildcards must occupy a whole level: {0}")]
    PartialWildcard(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_filter() {
        let filter = TopicFilter::new("home/ble/whitelist").unwrap();
        assert!(filter.is_exact());
        assert!(filter.matches("home/ble/whitelist"));
        assert!(!filter.matches("home/ble/whitelist/extra"));
        assert!(!filter.matches("home/ble"));
        assert!(!filter.matches("home/wifi/whitelist"));
    }

    #[test]
    fn test_single_level_wildcard() {
        let filter = TopicFilter::new("home/+/whitelist").unwrap();
        assert!(!filter.is_exact());
        assert!(filter.matches("home/ble/whitelist"));
        assert!(filter.matches("home/wifi/whitelist"));
        assert!(!filter.matches("home/whitelist"));
        assert!(!filter.matches("home/a/b/whitelist"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        let filter = TopicFilter::new("home/#").unwrap();
        assert!(filter.matches("home"));
        assert!(filter.matches("home/ble"));
        assert!(filter.matches("home/ble/whitelist"));
        assert!(!filter.matches("office/ble"));
    }

    #[test]
    fn test_match_everything() {
        let filter = TopicFilter::new("#").unwrap();
        assert!(filter.matches("anything"));
        assert!(filter.matches("any/thing/at/all"));
    }

    #[test]
    fn test_invalid_filters() {
        assert_eq!(TopicFilter::new(""), Err(TopicError::Empty));
        assert!(matches!(
            TopicFilter::new("home/#/ble"),
            Err(TopicError::MisplacedMultiLevel(_))
        ));
        assert!(matches!(
            TopicFilter::new("home/ble+"),
            Err(TopicError::PartialWildcard(_))
        ));
        assert!(matches!(
            TopicFilter::new("home/wl#"),
            Err(TopicError::PartialWildcard(_))
        ));
    }
}
