//! Slash-separated paths into the world tree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// A path from the world root to a node, e.g. `chunks/0,0/3,4/groups/g1`.
///
/// Ordering is segment-wise lexicographic, so an ancestor always sorts
/// before its descendants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Path(Vec<String>);

impl Path {
    /// The world root.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a `/`-separated path. Empty segments are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] if any segment contains a
    /// character that is not allowed in a store key (`.`, `#`, `$`, `[`, `]`).
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let mut segments = Vec::new();
        for segment in text.split('/').filter(|s| !s.is_empty()) {
            if segment.contains(['.', '#', '$', '[', ']']) {
                return Err(StoreError::InvalidPath {
                    path: text.to_owned(),
                    reason: "segment contains a forbidden character",
                });
            }
            segments.push(segment.to_owned());
        }
        Ok(Self(segments))
    }

    /// Build a path from segments. Segments containing `/` are split.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            segments
                .into_iter()
                .flat_map(|s| {
                    s.as_ref()
                        .split('/')
                        .filter(|p| !p.is_empty())
                        .map(str::to_owned)
                        .collect::<Vec<_>>()
                })
                .collect(),
        )
    }

    /// A child of this path.
    #[must_use]
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut next = self.clone();
        next.0.extend(
            segment
                .as_ref()
                .split('/')
                .filter(|p| !p.is_empty())
                .map(str::to_owned),
        );
        next
    }

    /// The path's segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_strict_descendant_of(&self, ancestor: &Self) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }

    /// Whether `self` equals or lies below `ancestor`.
    pub fn starts_with(&self, ancestor: &Self) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    /// The first `n` segments (or the whole path when shorter).
    #[must_use]
    pub fn prefix(&self, n: usize) -> Self {
        Self(self.0.iter().take(n).cloned().collect())
    }

    /// The segments after the first `n`.
    #[must_use]
    pub fn strip(&self, n: usize) -> Self {
        Self(self.0.iter().skip(n).cloned().collect())
    }
}

impl core::fmt::Display for Path {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_empty_segments() {
        let path = Path::parse("/chunks//0,0/3,4/").unwrap();
        assert_eq!(path.to_string(), "chunks/0,0/3,4");
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn parse_rejects_forbidden_characters() {
        assert!(Path::parse("players/a.b").is_err());
        assert!(Path::parse("players/$x").is_err());
    }

    #[test]
    fn descendant_checks() {
        let group = Path::parse("chunks/0,0/1,1/groups/g1").unwrap();
        let unit = group.child("units/u1");
        assert!(unit.is_strict_descendant_of(&group));
        assert!(!group.is_strict_descendant_of(&group));
        assert!(!group.is_strict_descendant_of(&unit));
        let sibling = Path::parse("chunks/0,0/1,1/groups/g10").unwrap();
        assert!(!sibling.is_strict_descendant_of(&group));
    }

    #[test]
    fn ancestors_sort_first() {
        let a = Path::parse("a/b").unwrap();
        let b = Path::parse("a/b/c").unwrap();
        let c = Path::parse("a/ba").unwrap();
        assert!(a < b);
        assert!(b < c);
    }
}
