//! Template package values.
//!
//! This module provides the identifier of a template package and the
//! version ordering used to build and query version indexes.

mod identifier;
mod version;

pub use identifier::PackageIdentifier;
pub use version::{Version, VersionIndex};
