//! Content identifiers: multi-part references to source content.
//!
//! A [`ContentIdentifier`] uniquely locates the content a request vectorizes:
//! the content source profile that knows how to reach it, an ordered list of
//! path segments (the multipart id), and a canonical id from which the
//! durable state key is derived.
//!
//! # Examples
//!
//! ```rust
//! use vectorline::identifier::ContentIdentifier;
//!
//! let id = ContentIdentifier::new(
//!     "docs-datalake",
//!     vec!["tenant".into(), "reports".into(), "q3.pdf".into()],
//!     "tenant/reports/q3.pdf",
//! );
//! assert_eq!(id.unique_id(), "tenant/reports/q3.pdf");
//! assert_eq!(id.file_name(), Some("q3.pdf"));
//! assert!(id.validate_multipart_id(3).is_ok());
//! assert!(id.validate_multipart_id(2).is_err());
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while validating or indexing a content identifier.
///
/// These are validation errors in the taxonomy of the engine: they are raised
/// before any step executes and reject the request while it is still `New`.
#[derive(Debug, Error, Diagnostic)]
pub enum ContentIdentifierError {
    /// The multipart id has the wrong arity or contains a blank part.
    #[error("invalid multipart identifier: expected {expected} non-blank parts, found {found}")]
    #[diagnostic(
        code(vectorline::identifier::invalid_multipart_id),
        help("Every part of the multipart id must be present and non-blank.")
    )]
    InvalidMultipartId {
        /// Number of parts the content source expects.
        expected: usize,
        /// Number of parts actually present.
        found: usize,
    },

    /// A part index outside the multipart id was requested.
    #[error("multipart identifier index {index} is out of range (parts: {parts})")]
    #[diagnostic(code(vectorline::identifier::index_out_of_range))]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of parts in the identifier.
        parts: usize,
    },

    /// The canonical id is blank, so no state key can be derived.
    #[error("the canonical identifier is blank")]
    #[diagnostic(
        code(vectorline::identifier::blank_canonical_id),
        help("Set a stable, non-blank canonical id before submitting the request.")
    )]
    BlankCanonicalId,
}

/// Multi-part reference uniquely locating the content being vectorized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentIdentifier {
    /// Name of the content source profile holding connection settings.
    pub content_source_profile_name: String,
    /// Ordered path segments identifying the content within its source.
    pub multipart_id: Vec<String>,
    /// Stable identifier used to derive the durable state key. Subsequent
    /// requests for the same content share the canonical id.
    pub canonical_id: String,
    /// Additional metadata carried alongside the content reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FxHashMap<String, Value>>,
}

impl ContentIdentifier {
    pub fn new(
        content_source_profile_name: impl Into<String>,
        multipart_id: Vec<String>,
        canonical_id: impl Into<String>,
    ) -> Self {
        Self {
            content_source_profile_name: content_source_profile_name.into(),
            multipart_id,
            canonical_id: canonical_id.into(),
            metadata: None,
        }
    }

    /// The unique id of the content: the multipart id joined with `/`.
    #[must_use]
    pub fn unique_id(&self) -> String {
        self.multipart_id.join("/")
    }

    /// The file name component (last multipart segment), if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.multipart_id.last().map(String::as_str)
    }

    /// Validates the multipart id against the arity a content source expects.
    ///
    /// Fails if the part count differs from `expected_parts_count` or any
    /// part is blank or whitespace-only. Called by step handlers before any
    /// I/O is attempted against the content source.
    pub fn validate_multipart_id(
        &self,
        expected_parts_count: usize,
    ) -> Result<(), ContentIdentifierError> {
        let blank_parts = self
            .multipart_id
            .iter()
            .filter(|p| p.trim().is_empty())
            .count();
        if self.multipart_id.len() != expected_parts_count || blank_parts > 0 {
            return Err(ContentIdentifierError::InvalidMultipartId {
                expected: expected_parts_count,
                found: self.multipart_id.len() - blank_parts,
            });
        }
        Ok(())
    }

    /// Access one component of the multipart id.
    pub fn part(&self, index: usize) -> Result<&str, ContentIdentifierError> {
        self.multipart_id
            .get(index)
            .map(String::as_str)
            .ok_or(ContentIdentifierError::IndexOutOfRange {
                index,
                parts: self.multipart_id.len(),
            })
    }

    /// The stable key addressing this content's durable vectorization state.
    ///
    /// Derived from the canonical id so that retried and resumed requests for
    /// the same content converge on one state record.
    pub fn state_key(&self) -> Result<String, ContentIdentifierError> {
        if self.canonical_id.trim().is_empty() {
            return Err(ContentIdentifierError::BlankCanonicalId);
        }
        let digest = Sha256::digest(self.canonical_id.as_bytes());
        Ok(hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(parts: &[&str]) -> ContentIdentifier {
        ContentIdentifier::new(
            "profile",
            parts.iter().map(|s| s.to_string()).collect(),
            parts.join("/"),
        )
    }

    #[test]
    fn validate_arity_and_blanks() {
        assert!(ident(&["a", "b", "c"]).validate_multipart_id(3).is_ok());
        assert!(ident(&["a", "b"]).validate_multipart_id(3).is_err());
        assert!(ident(&["a", "b", "c", "d"]).validate_multipart_id(3).is_err());
        assert!(ident(&["a", "  ", "c"]).validate_multipart_id(3).is_err());
    }

    #[test]
    fn state_key_is_stable_per_canonical_id() {
        let a = ident(&["x", "y"]).state_key().unwrap();
        let b = ident(&["x", "y"]).state_key().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ident(&["x", "z"]).state_key().unwrap());
    }

    #[test]
    fn blank_canonical_id_is_rejected() {
        let mut id = ident(&["x"]);
        id.canonical_id = "   ".into();
        assert!(id.state_key().is_err());
    }
}
