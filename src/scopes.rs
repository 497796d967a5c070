use std::collections::BTreeSet;
use std::fmt;

/// Catalog of permission units a client may request and a user may grant.
/// The consent page renders the descriptions; unknown scope tokens fall
/// back to their raw name.
pub const CALENDAR_READ: &str = "calendar:read";
pub const CALENDAR_WRITE: &str = "calendar:write";
pub const CALENDAR_DELETE: &str = "calendar:delete";
pub const USER_READ: &str = "user:read";

const CATALOG: &[(&str, &str)] = &[
    (CALENDAR_READ, "View your calendar events"),
    (CALENDAR_WRITE, "Create and edit your calendar events"),
    (CALENDAR_DELETE, "Delete your calendar events"),
    (USER_READ, "Read your basic profile information"),
];

pub fn describe(scope: &str) -> &str {
    CATALOG
        .iter()
        .find(|(name, _)| *name == scope)
        .map(|(_, desc)| *desc)
        .unwrap_or(scope)
}

/// Set of space-delimited scope tokens. Parsing deduplicates and sorts, so
/// the rendered form is canonical regardless of request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split_whitespace()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn descriptions(&self) -> Vec<&str> {
        self.iter().map(describe).collect()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for s in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(s)?;
            first = false;
        }
        Ok(())
    }
}
