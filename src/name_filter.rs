use regex::Regex;

use crate::constants::{DEFAULT_NAME_EXCLUDE, DEFAULT_NAME_FILTER};

/// Pair of regular expressions deciding if a Topic or Group name is of interest.
///
/// A name is accepted iff it matches the `allow` pattern, and does not match the `deny` pattern.
#[derive(Debug, Clone)]
pub struct NameFilter {
    allow: Regex,
    deny: Regex,
}

impl NameFilter {
    pub fn new(allow: Regex, deny: Regex) -> Self {
        Self {
            allow,
            deny,
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.allow.is_match(name) && !self.deny.is_match(name)
    }
}

impl Default for NameFilter {
    /// Accepts every name.
    fn default() -> Self {
        let allow = Regex::new(DEFAULT_NAME_FILTER)
            .unwrap_or_else(|e| panic!("Invalid regex '{DEFAULT_NAME_FILTER}': {e}"));
        let deny = Regex::new(DEFAULT_NAME_EXCLUDE)
            .unwrap_or_else(|e| panic!("Invalid regex '{DEFAULT_NAME_EXCLUDE}': {e}"));

        Self::new(allow, deny)
    }
}
