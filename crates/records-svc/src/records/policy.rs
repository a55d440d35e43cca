//! Which fields of each record kind are sensitive.
//!
//! A [`FieldPolicy`] maps every [`RecordKind`] to the set of dot-notation
//! paths whose string values must be encoded before persistence. The built-in
//! defaults cover identity numbers, phones, addresses and free-text notes; a
//! YAML file can replace the list for any kind:
//!
//! ```yaml
//! patient:
//!   - identity_number
//!   - phone
//!   - address
//!   - contacts[].phone
//! measurement:
//!   - notes
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use thiserror::Error;

use super::model::RecordKind;

/// A set of dot-notation field paths that hold sensitive data.
///
/// Example paths: `"phone"`, `"emergency_contact.phone"`, `"contacts[].phone"`.
pub type SensitivePaths = BTreeSet<String>;

/// Errors from loading a field policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read field policy file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse field policy: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid field path {path:?} for {kind}")]
    InvalidPath { kind: RecordKind, path: String },
}

/// Sensitive field paths per record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    paths: BTreeMap<RecordKind, SensitivePaths>,
}

impl FieldPolicy {
    /// Paths for `kind`; empty if the kind has no sensitive fields.
    pub fn paths(&self, kind: RecordKind) -> &SensitivePaths {
        static EMPTY: SensitivePaths = BTreeSet::new();
        self.paths.get(&kind).unwrap_or(&EMPTY)
    }

    /// Returns a copy with the paths for `kind` replaced.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPath`] for an empty path or empty segment.
    pub fn with_paths<I, S>(mut self, kind: RecordKind, paths: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = SensitivePaths::new();
        for path in paths {
            let path = path.into();
            validate_path(kind, &path)?;
            set.insert(path);
        }
        self.paths.insert(kind, set);
        Ok(self)
    }

    /// Parse a YAML policy and overlay it on the defaults.
    pub fn from_yaml(text: &str) -> Result<Self, PolicyError> {
        let overrides: HashMap<RecordKind, Vec<String>> = serde_yaml::from_str(text)?;
        overrides
            .into_iter()
            .try_fold(Self::default(), |policy, (kind, paths)| {
                policy.with_paths(kind, paths)
            })
    }

    /// Load a YAML policy file and overlay it on the defaults.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Total number of sensitive paths across all kinds.
    pub fn path_count(&self) -> usize {
        self.paths.values().map(BTreeSet::len).sum()
    }
}

impl Default for FieldPolicy {
    fn default() -> Self {
        let defaults: [(RecordKind, &[&str]); 4] = [
            (
                RecordKind::Patient,
                &["identity_number", "phone", "address", "emergency_contact.phone"],
            ),
            (RecordKind::Doctor, &["phone", "address"]),
            (RecordKind::Measurement, &["notes"]),
            (RecordKind::Prescription, &["notes"]),
        ];
        let paths = defaults
            .into_iter()
            .map(|(kind, paths)| {
                let set: SensitivePaths = paths.iter().map(|p| (*p).to_owned()).collect();
                (kind, set)
            })
            .collect();
        Self { paths }
    }
}

fn validate_path(kind: RecordKind, path: &str) -> Result<(), PolicyError> {
    let bad = path
        .split('.')
        .any(|seg| seg.is_empty() || seg == "[]" || seg.trim_end_matches("[]").contains("[]"));
    if path.trim().is_empty() || bad {
        return Err(PolicyError::InvalidPath {
            kind,
            path: path.to_owned(),
        });
    }
    Ok(())
}
