//! Node identity: `<domain>/<family>/<instance>` (spec §3).

use std::fmt;

/// A globally unique, stable-for-lifetime node name.
///
/// Cheap to clone (backed by an `Arc<str>`-free `String` today; the
/// type exists so call sites read `Fqdn` rather than bare `String`
/// and so the `<domain>/<family>/<instance>` shape is validated in
/// one place).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fqdn(String);

impl Fqdn {
    pub fn new(domain: &str, family: &str, instance: &str) -> Self {
        Self(format!("{domain}/{family}/{instance}"))
    }

    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.split('/').count() == 3 && !raw.starts_with('/') && !raw.ends_with('/') {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn domain(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    pub fn family(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or_default()
    }

    pub fn instance(&self) -> &str {
        self.0.split('/').nth(2).unwrap_or_default()
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Fqdn {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_joins_three_segments() {
        let fq = Fqdn::new("mid_csp_cbf", "vcc", "001");
        assert_eq!(fq.as_str(), "mid_csp_cbf/vcc/001");
        assert_eq!(fq.family(), "vcc");
        assert_eq!(fq.instance(), "001");
    }

    #[test]
    fn parse_rejects_wrong_segment_count() {
        assert!(Fqdn::parse("a/b").is_none());
        assert!(Fqdn::parse("a/b/c/d").is_none());
        assert!(Fqdn::parse("a/b/c").is_some());
    }
}
