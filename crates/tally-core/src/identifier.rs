//! Routing identifiers attached to interactive UI elements.
//!
//! An identifier is the only contract between a rendered component and the
//! dispatcher. It has four logical fields joined by `:`:
//!
//! ```text
//! module:feature:action[:extra]
//! ```
//!
//! The serialized form is limited to [`MAX_IDENTIFIER_LEN`] bytes.
//! `module`, `feature` and `action` may not contain the separator; `extra`
//! is the trailing field and is taken verbatim, separators included.
//!
//! # Example
//!
//! ```rust
//! use tally_core::Identifier;
//!
//! let id = Identifier::build("sales", "report", "open", Some("2024-q1")).unwrap();
//! assert_eq!(id, "sales:report:open:2024-q1");
//!
//! let parsed = Identifier::parse(&id);
//! assert_eq!(parsed.action, "open");
//! ```

use std::fmt;

use crate::error::{IdentifierError, IdentifierResult};

/// Field separator of the identifier grammar.
pub const SEPARATOR: char = ':';

/// Separator accepted after a module prefix for identifiers rendered before
/// the colon grammar existed.
pub const LEGACY_SEPARATOR: char = '_';

/// Platform hard limit for a component identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// A parsed routing identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub module: String,
    pub feature: String,
    pub action: String,
    /// Empty when the identifier carries no extra data.
    pub extra: String,
}

impl Identifier {
    /// Creates an identifier without extra data.
    pub fn new(
        module: impl Into<String>,
        feature: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            feature: feature.into(),
            action: action.into(),
            extra: String::new(),
        }
    }

    /// Sets the trailing extra field.
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Joins the fields into the wire form.
    ///
    /// Empty fields are accepted. An empty or absent `extra` is omitted.
    ///
    /// # Errors
    ///
    /// - [`IdentifierError::SeparatorInField`] if `module`, `feature` or
    ///   `action` contains `:`.
    /// - [`IdentifierError::TooLong`] if the result exceeds
    ///   [`MAX_IDENTIFIER_LEN`] bytes.
    pub fn build(
        module: &str,
        feature: &str,
        action: &str,
        extra: Option<&str>,
    ) -> IdentifierResult<String> {
        for (field, value) in [("module", module), ("feature", feature), ("action", action)] {
            if value.contains(SEPARATOR) {
                return Err(IdentifierError::SeparatorInField {
                    field,
                    value: value.to_string(),
                });
            }
        }

        let mut out = String::with_capacity(
            module.len() + feature.len() + action.len() + extra.map_or(0, |e| e.len() + 1) + 2,
        );
        out.push_str(module);
        out.push(SEPARATOR);
        out.push_str(feature);
        out.push(SEPARATOR);
        out.push_str(action);
        if let Some(extra) = extra.filter(|e| !e.is_empty()) {
            out.push(SEPARATOR);
            out.push_str(extra);
        }

        // The platform limit is on the encoded wire form.
        let len = out.len();
        if len > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong {
                len,
                max: MAX_IDENTIFIER_LEN,
            });
        }
        Ok(out)
    }

    /// Serializes this identifier; see [`build`](Self::build).
    pub fn encode(&self) -> IdentifierResult<String> {
        Self::build(
            &self.module,
            &self.feature,
            &self.action,
            Some(self.extra.as_str()),
        )
    }

    /// Splits a wire identifier into its fields.
    ///
    /// Never fails: missing trailing fields are empty, and everything after
    /// the third separator belongs to `extra`.
    pub fn parse(id: &str) -> Self {
        let mut parts = id.splitn(4, SEPARATOR);
        let mut next = || parts.next().unwrap_or_default().to_string();
        Self {
            module: next(),
            feature: next(),
            action: next(),
            extra: next(),
        }
    }

    /// Partial-match predicate for call sites that route by hand.
    ///
    /// `feature` and `action` are only compared when given.
    pub fn matches(id: &str, module: &str, feature: Option<&str>, action: Option<&str>) -> bool {
        let parsed = Self::parse(id);
        parsed.module == module
            && feature.is_none_or(|f| parsed.feature == f)
            && action.is_none_or(|a| parsed.action == a)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.feature, self.action)?;
        if !self.extra.is_empty() {
            write!(f, ":{}", self.extra)?;
        }
        Ok(())
    }
}

// =============================================================================
// Prefix claims
// =============================================================================

/// How a module prefix claimed an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMatch {
    /// The identifier is exactly the prefix.
    Exact,
    /// The identifier starts with `prefix:`.
    Canonical,
    /// The identifier starts with `prefix_` (pre-colon grammar).
    Legacy,
}

/// Resolves whether `prefix` claims `id`.
///
/// ```rust
/// use tally_core::identifier::{PrefixMatch, match_prefix};
///
/// assert_eq!(match_prefix("kpi:board:open", "kpi"), Some(PrefixMatch::Canonical));
/// assert_eq!(match_prefix("kpi_refresh", "kpi"), Some(PrefixMatch::Legacy));
/// assert_eq!(match_prefix("kpis:board", "kpi"), None);
/// ```
pub fn match_prefix(id: &str, prefix: &str) -> Option<PrefixMatch> {
    let rest = id.strip_prefix(prefix)?;
    let mut chars = rest.chars();
    match chars.next() {
        None => Some(PrefixMatch::Exact),
        Some(SEPARATOR) => Some(PrefixMatch::Canonical),
        Some(LEGACY_SEPARATOR) => Some(PrefixMatch::Legacy),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_joins_fields() {
        assert_eq!(Identifier::build("m", "f", "act", None).unwrap(), "m:f:act");
        assert_eq!(
            Identifier::build("m", "f", "act", Some("42")).unwrap(),
            "m:f:act:42"
        );
        assert_eq!(Identifier::build("m", "f", "act", Some("")).unwrap(), "m:f:act");
    }

    #[test]
    fn test_build_rejects_overlong_identifier() {
        let extra = "x".repeat(95);
        let err = Identifier::build("m", "f", "act", Some(&extra)).unwrap_err();
        assert_eq!(err, IdentifierError::TooLong { len: 103, max: 100 });
    }

    #[test]
    fn test_build_accepts_exact_limit() {
        // "m:f:a:" is 6 bytes.
        let extra = "x".repeat(94);
        let id = Identifier::build("m", "f", "a", Some(&extra)).unwrap();
        assert_eq!(id.len(), MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn test_build_counts_bytes_not_characters() {
        // 60 two-byte characters: 60 chars but 120 bytes of extra.
        let extra = "é".repeat(60);
        let err = Identifier::build("m", "f", "a", Some(&extra)).unwrap_err();
        assert_eq!(err, IdentifierError::TooLong { len: 126, max: 100 });

        let extra = "é".repeat(47);
        let id = Identifier::build("m", "f", "a", Some(&extra)).unwrap();
        assert_eq!(id.len(), 100);
    }

    #[test]
    fn test_build_rejects_separator_in_leading_field() {
        let err = Identifier::build("m", "f:g", "act", None).unwrap_err();
        assert!(matches!(
            err,
            IdentifierError::SeparatorInField { field: "feature", .. }
        ));
    }

    #[test]
    fn test_parse_defaults_missing_fields() {
        let id = Identifier::parse("m:f:act");
        assert_eq!(id, Identifier::new("m", "f", "act"));

        let id = Identifier::parse("m");
        assert_eq!(id.module, "m");
        assert_eq!(id.feature, "");
        assert_eq!(id.action, "");
        assert_eq!(id.extra, "");
    }

    #[test]
    fn test_extra_keeps_separators() {
        let wire = Identifier::build("exp", "entry", "edit", Some("2024:03:17")).unwrap();
        let id = Identifier::parse(&wire);
        assert_eq!(id.extra, "2024:03:17");
        assert_eq!(id.encode().unwrap(), wire);
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            ("sales", "report", "open", ""),
            ("kpi", "board", "refresh", "week-12"),
            ("", "", "", ""),
        ];
        for (m, f, a, e) in cases {
            let wire = Identifier::build(m, f, a, Some(e)).unwrap();
            assert_eq!(Identifier::parse(&wire), Identifier::new(m, f, a).with_extra(e));
        }
    }

    #[test]
    fn test_matches_partial() {
        assert!(Identifier::matches("att:clock:in", "att", None, None));
        assert!(Identifier::matches("att:clock:in", "att", Some("clock"), None));
        assert!(Identifier::matches("att:clock:in", "att", Some("clock"), Some("in")));
        assert!(!Identifier::matches("att:clock:in", "att", Some("clock"), Some("out")));
        assert!(!Identifier::matches("att:clock:in", "store", None, None));
    }

    #[test]
    fn test_match_prefix_variants() {
        assert_eq!(match_prefix("store", "store"), Some(PrefixMatch::Exact));
        assert_eq!(match_prefix("store:cfg:save", "store"), Some(PrefixMatch::Canonical));
        assert_eq!(match_prefix("store_cfg", "store"), Some(PrefixMatch::Legacy));
        assert_eq!(match_prefix("storefront:x", "store"), None);
        assert_eq!(match_prefix("st", "store"), None);
    }

    #[test]
    fn test_display_matches_encode() {
        let id = Identifier::new("a", "b", "c").with_extra("d");
        assert_eq!(id.to_string(), id.encode().unwrap());
    }
}
