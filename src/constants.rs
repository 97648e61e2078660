//! # Event Pattern Catalogue
//!
//! Patterns published by the menu-management domain, plus a structural
//! validator. Payloads are never inspected; patterns outside the catalogue
//! are still delivered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain events emitted by menu-management aggregates
pub mod events {
    // Menu lifecycle events
    pub const MENU_CREATED: &str = "menu.created";
    pub const MENU_UPDATED: &str = "menu.updated";
    pub const MENU_DELETED: &str = "menu.deleted";
    pub const MENU_PUBLISHED: &str = "menu.published";

    // Category events
    pub const CATEGORY_CREATED: &str = "category.created";
    pub const CATEGORY_UPDATED: &str = "category.updated";
    pub const CATEGORY_REMOVED: &str = "category.removed";

    // Item events
    pub const ITEM_ADDED: &str = "item.added";
    pub const ITEM_UPDATED: &str = "item.updated";
    pub const ITEM_REMOVED: &str = "item.removed";
    pub const ITEM_AVAILABILITY_CHANGED: &str = "item.availability_changed";

    // Restaurant events
    pub const RESTAURANT_CREATED: &str = "restaurant.created";
    pub const RESTAURANT_UPDATED: &str = "restaurant.updated";
    pub const RESTAURANT_DELETED: &str = "restaurant.deleted";

    // User events
    pub const USER_CREATED: &str = "user.created";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
}

/// Every catalogued pattern
pub const KNOWN_PATTERNS: &[&str] = &[
    events::MENU_CREATED,
    events::MENU_UPDATED,
    events::MENU_DELETED,
    events::MENU_PUBLISHED,
    events::CATEGORY_CREATED,
    events::CATEGORY_UPDATED,
    events::CATEGORY_REMOVED,
    events::ITEM_ADDED,
    events::ITEM_UPDATED,
    events::ITEM_REMOVED,
    events::ITEM_AVAILABILITY_CHANGED,
    events::RESTAURANT_CREATED,
    events::RESTAURANT_UPDATED,
    events::RESTAURANT_DELETED,
    events::USER_CREATED,
    events::USER_UPDATED,
    events::USER_DELETED,
];

/// Why a pattern string is malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternIssue {
    Empty,
    EmptySegment,
    InvalidCharacter(char),
}

impl fmt::Display for PatternIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternIssue::Empty => write!(f, "pattern is empty"),
            PatternIssue::EmptySegment => write!(f, "pattern has an empty segment"),
            PatternIssue::InvalidCharacter(c) => write!(f, "pattern contains invalid character '{c}'"),
        }
    }
}

/// A structurally valid, dot-separated event pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventPattern(String);

impl EventPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternIssue> {
        validate_pattern(pattern)?;
        Ok(Self(pattern.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading segment, e.g. `menu` for `menu.created`
    pub fn domain(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    pub fn is_known(&self) -> bool {
        KNOWN_PATTERNS.contains(&self.0.as_str())
    }
}

impl TryFrom<String> for EventPattern {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_pattern(&value).map_err(|issue| issue.to_string())?;
        Ok(Self(value))
    }
}

impl From<EventPattern> for String {
    fn from(pattern: EventPattern) -> Self {
        pattern.0
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that a pattern is non-empty, dot-separated and free of empty segments
pub fn validate_pattern(pattern: &str) -> Result<(), PatternIssue> {
    if pattern.is_empty() {
        return Err(PatternIssue::Empty);
    }
    if let Some(c) = pattern
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(PatternIssue::InvalidCharacter(c));
    }
    if pattern.split('.').any(str::is_empty) {
        return Err(PatternIssue::EmptySegment);
    }
    Ok(())
}

pub fn is_valid_pattern(pattern: &str) -> bool {
    validate_pattern(pattern).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_is_valid() {
        for pattern in KNOWN_PATTERNS {
            assert!(is_valid_pattern(pattern), "{pattern}");
        }
    }

    #[test]
    fn test_malformed_patterns() {
        assert_eq!(validate_pattern(""), Err(PatternIssue::Empty));
        assert_eq!(validate_pattern("menu..created"), Err(PatternIssue::EmptySegment));
        assert_eq!(validate_pattern(".menu"), Err(PatternIssue::EmptySegment));
        assert_eq!(
            validate_pattern("menu created"),
            Err(PatternIssue::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_event_pattern_accessors() {
        let pattern = EventPattern::parse(events::CATEGORY_REMOVED).unwrap();
        assert_eq!(pattern.domain(), "category");
        assert!(pattern.is_known());
        assert!(!EventPattern::parse("inventory.synced").unwrap().is_known());

        let decoded: Result<EventPattern, _> = serde_json::from_str("\"menu..x\"");
        assert!(decoded.is_err());
    }
}
