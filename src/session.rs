//! Per-session identity tag.
//!
//! Generated once per process, attached to every outbound mutation (as the
//! `X-Session-ID` header) and compared against the `originTag` of every push
//! notification so the client can discard echoes of its own changes.
//!
//! Not a security token — collision across independent sessions only needs
//! to be negligibly likely, so a millisecond timestamp plus a random suffix
//! is enough.

use std::fmt;

use chrono::Utc;
use uuid::Uuid;

/// Identity tag for this client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTag(String);

impl SessionTag {
    /// Generate a fresh tag: `session-<unix-millis>-<9 random chars>`.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("session-{millis}-{}", &suffix[..9]))
    }

    /// True when an inbound `originTag` identifies this session.
    pub fn matches(&self, origin_tag: Option<&str>) -> bool {
        origin_tag == Some(self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique() {
        let a = SessionTag::generate();
        let b = SessionTag::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn tag_shape() {
        let tag = SessionTag::generate();
        assert!(tag.as_str().starts_with("session-"));
        assert_eq!(tag.as_str().split('-').count(), 3);
    }

    #[test]
    fn matches_own_tag_only() {
        let tag = SessionTag::generate();
        let own = tag.as_str().to_string();
        assert!(tag.matches(Some(&own)));
        assert!(!tag.matches(Some("session-0-aaaaaaaaa")));
        assert!(!tag.matches(None));
    }
}
