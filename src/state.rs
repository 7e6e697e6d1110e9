//! The published snapshot and the in-memory record of what was last published.
//!
//! On disk a snapshot is a YAML list of groups, each with a `targets` list:
//!
//! ```yaml
//! - targets:
//!   - 10.0.0.1:80
//!   - 10.0.0.2:80
//! ```
//!
//! Only one group is ever published, but a file with any number of groups is
//! accepted when loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::address::AddressSet;
use crate::error::StateError;

/// One group of published addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Addresses in `ip:port` form.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// The full published state: a list of address groups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedSnapshot(Vec<ServiceEndpoints>);

impl PublishedSnapshot {
    /// Builds the single-group snapshot for a cycle's addresses.
    #[must_use]
    pub fn single(addresses: &AddressSet) -> Self {
        Self(vec![ServiceEndpoints {
            targets: addresses.to_strings(),
        }])
    }

    /// Builds a snapshot from explicit groups.
    #[must_use]
    pub fn from_groups(groups: Vec<ServiceEndpoints>) -> Self {
        Self(groups)
    }

    /// The address groups.
    #[must_use]
    pub fn groups(&self) -> &[ServiceEndpoints] {
        &self.0
    }

    /// Whether the snapshot has no groups, i.e. nothing was published yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the file is missing, unreadable or malformed.
    pub fn read(path: &Path) -> Result<Self, StateError> {
        let data = std::fs::read_to_string(path).map_err(|source| StateError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_yaml::from_str(&data).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serializes the snapshot to YAML.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Whether two snapshots differ in shape or membership.
    ///
    /// Groups are compared by position; within a group, membership is compared
    /// regardless of order or repeats.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return true;
        }

        self.0.iter().zip(&other.0).any(|(a, b)| {
            let a: AddressSet = a.targets.iter().map(String::as_str).collect();
            let b: AddressSet = b.targets.iter().map(String::as_str).collect();
            a != b
        })
    }
}

/// Whether publishing `new` would change what `old` holds.
#[must_use]
pub fn has_changed(old: &PublishedSnapshot, new: &AddressSet) -> bool {
    old.differs_from(&PublishedSnapshot::single(new))
}

impl StateError {
    /// Whether the snapshot simply did not exist yet.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// The last snapshot successfully published and where it went.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    published: PublishedSnapshot,
    location: Option<PathBuf>,
}

impl StateStore {
    /// Creates a store that already holds `published`, found at `location`.
    #[must_use]
    pub fn new(published: PublishedSnapshot, location: impl Into<PathBuf>) -> Self {
        Self {
            published,
            location: Some(location.into()),
        }
    }

    /// Loads the prior snapshot from `path`, best effort.
    ///
    /// On failure the store starts empty and the error is handed back for
    /// reporting; it is never fatal.
    #[must_use]
    pub fn load(path: &Path) -> (Self, Option<StateError>) {
        match PublishedSnapshot::read(path) {
            Ok(snapshot) => (Self::new(snapshot, path), None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// The last published snapshot.
    #[must_use]
    pub fn published(&self) -> &PublishedSnapshot {
        &self.published
    }

    /// Whether `new` must be published to `location`.
    ///
    /// True when membership differs from the last publish, or when the last
    /// publish went to a different file.
    #[must_use]
    pub fn has_changed(&self, new: &AddressSet, location: &Path) -> bool {
        self.location.as_deref() != Some(location) || has_changed(&self.published, new)
    }

    /// Records a successful publish. Call only after the file is in place.
    pub fn commit(&mut self, snapshot: PublishedSnapshot, location: impl Into<PathBuf>) {
        self.published = snapshot;
        self.location = Some(location.into());
    }
}
