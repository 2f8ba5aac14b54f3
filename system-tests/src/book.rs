// system-tests/src/book.rs
// ============================================================================
// Module: Book Database Fixture
// Description: Typed fixture data served by the servicebook test binary.
// Purpose: Load the projects/users/groups document from a JSON file.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The spawned servicebook instance serves a small read-only database of
//! projects, the people working on them, and named project groups. The
//! document is plain JSON on disk so tests can guard and mutate it
//! through the fixture discipline.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned while loading the book database.
#[derive(Debug, Error)]
pub enum BookError {
    /// The database file could not be read.
    #[error("failed to read book database {path}: {source}")]
    Read {
        /// Path of the database file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The database file is not valid JSON for the expected schema.
    #[error("failed to parse book database {path}: {message}")]
    Parse {
        /// Path of the database file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// One project tracked by servicebook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    /// Stable numeric project id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Ids of the users on the project team.
    pub team: Vec<String>,
    /// Bug-tracker product the project files bugs under.
    pub bz_product: String,
}

/// One person tracked by servicebook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    /// Stable string user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ids of the projects this user works on.
    pub projects: Vec<u64>,
}

/// A named group of related projects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Group {
    /// Group name, used as its lookup key.
    pub name: String,
    /// Ids of the projects in the group.
    pub projects: Vec<u64>,
}

/// The whole fixture database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BookDatabase {
    /// All projects, in fixture order.
    pub projects: Vec<Project>,
    /// All users, in fixture order.
    pub users: Vec<User>,
    /// All groups, in fixture order.
    pub groups: Vec<Group>,
}

impl BookDatabase {
    /// Loads the database from a JSON file.
    ///
    /// # Errors
    /// Returns [`BookError`] when the file is unreadable or unparsable.
    pub fn load(path: &Path) -> Result<Self, BookError> {
        let raw = std::fs::read_to_string(path).map_err(|source| BookError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|err| BookError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Looks up a project by id.
    #[must_use]
    pub fn project(&self, id: u64) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == id)
    }

    /// Looks up a user by id.
    #[must_use]
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    /// Looks up a group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.name == name)
    }
}
