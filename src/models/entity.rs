use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one forecast unit: a single key column (a product) or a
/// composite of several (a flight and a product).
///
/// Two keys are equal only when every part matches in order. Ordering is
/// lexicographic over the parts, which is what forecast tables sort by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(Vec<String>);

impl EntityKey {
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn part(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// First part, which is the whole key for single-column entities.
    pub fn primary(&self) -> &str {
        self.part(0).unwrap_or_default()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}
