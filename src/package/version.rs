//! Version ordering and per-package version indexes.
//!
//! Versions are ordered by their numeric dot-separated segments first
//! (missing segments count as zero), then by qualifier: a version without a
//! qualifier ranks above the same numbers with one, and qualifiers compare
//! lexicographically. The raw text breaks remaining ties so the order is total.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A published template version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
    qualifier: Option<String>,
}

impl Version {
    /// Parse a version string. Parsing never fails: text that is not numeric
    /// becomes the qualifier.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let body = match trimmed.strip_prefix('v') {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
            _ => trimmed,
        };

        let (numeric, mut qualifier) = match body.split_once('-') {
            Some((numeric, qualifier)) => (numeric, Some(qualifier.to_string())),
            None => (body, None),
        };

        let mut segments = Vec::new();
        let parts: Vec<&str> = numeric.split('.').collect();
        for (i, part) in parts.iter().enumerate() {
            match part.parse::<u64>() {
                Ok(n) => segments.push(n),
                Err(_) => {
                    // "1.0.RELEASE" or "1.0.RC1-foo": the rest is qualifier text
                    let rest = parts[i..].join(".");
                    qualifier = Some(match qualifier {
                        Some(q) => format!("{}-{}", rest, q),
                        None => rest,
                    });
                    break;
                }
            }
        }

        Self {
            raw: raw.to_string(),
            segments,
            qualifier: qualifier.filter(|q| !q.is_empty()),
        }
    }

    /// Whether `raw` can name a file: non-empty, no path separators and no
    /// `..`.
    pub fn is_file_safe(raw: &str) -> bool {
        !raw.trim().is_empty() && !raw.contains(['/', '\\']) && !raw.contains("..")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    fn cmp_segments(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_segments(other)
            .then_with(|| match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Version::parse(raw)
    }
}

/// The ordered set of published versions of one package.
///
/// An empty index is meaningful: the package is registered but nothing has
/// been published yet.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionIndex {
    package_name: String,
    versions: BTreeSet<Version>,
}

impl VersionIndex {
    pub fn new<I, S>(package_name: impl Into<String>, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            package_name: package_name.into(),
            versions: versions
                .into_iter()
                .map(|v| Version::parse(v.as_ref()))
                .collect(),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// The maximum version under the version order.
    pub fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Find a version by its exact text.
    pub fn find(&self, version: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.as_str() == version)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.find(version).is_some()
    }

    /// Versions in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Version> {
        self.versions.iter()
    }

    /// Version strings in ascending order.
    pub fn to_strings(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.as_str().to_string()).collect()
    }
}
