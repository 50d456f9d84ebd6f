//! Key namespacing.
//!
//! A [`KeyNamespace`] maps the caller's *logical* key to the *physical* key
//! stored in the backend by prepending a configured prefix, so multiple
//! logical applications can share one physical store:
//!
//! ```
//! use strata::key::KeyNamespace;
//!
//! let ns = KeyNamespace::new(Some("billing"));
//! assert_eq!(ns.physical("user:42"), "billing:user:42");
//! assert_eq!(ns.logical("billing:user:42"), "user:42");
//!
//! // No prefix configured: physical == logical.
//! let ns = KeyNamespace::new(None::<&str>);
//! assert_eq!(ns.physical("user:42"), "user:42");
//! ```

use smol_str::SmolStr;

/// Separator between the namespace prefix and the logical key.
const SEPARATOR: char = ':';

/// Reversible prefix-based key namespace.
///
/// Cheap to clone; the prefix is stored inline for typical lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: Option<SmolStr>,
}

impl KeyNamespace {
    /// Create a namespace with an optional prefix.
    ///
    /// An empty prefix is treated the same as no prefix.
    pub fn new(prefix: Option<impl AsRef<str>>) -> Self {
        let prefix = prefix
            .map(|p| SmolStr::new(p.as_ref()))
            .filter(|p| !p.is_empty());
        Self { prefix }
    }

    /// The configured prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Compute the physical key for a logical key.
    pub fn physical(&self, logical: &str) -> String {
        match &self.prefix {
            Some(prefix) => {
                let mut key = String::with_capacity(prefix.len() + 1 + logical.len());
                key.push_str(prefix);
                key.push(SEPARATOR);
                key.push_str(logical);
                key
            }
            None => logical.to_owned(),
        }
    }

    /// Strip the namespace prefix from a physical key.
    ///
    /// Keys that do not carry the prefix are returned unchanged.
    pub fn logical<'a>(&self, physical: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => physical
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix(SEPARATOR))
                .unwrap_or(physical),
            None => physical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn physical_then_logical_round_trips() {
        let ns = KeyNamespace::new(Some("app"));
        for logical in ["user:1", "a", "with:colons:inside", "42"] {
            assert_eq!(ns.logical(&ns.physical(logical)), logical);
        }
    }

    #[test]
    fn empty_prefix_is_identity() {
        let ns = KeyNamespace::new(Some(""));
        assert_eq!(ns.prefix(), None);
        assert_eq!(ns.physical("key"), "key");
        assert_eq!(ns.logical("key"), "key");
    }

    #[test]
    fn foreign_physical_key_is_returned_unchanged() {
        let ns = KeyNamespace::new(Some("app"));
        assert_eq!(ns.logical("other:key"), "other:key");
    }
}
