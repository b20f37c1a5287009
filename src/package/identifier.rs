use std::fmt;
use std::str::FromStr;

/// Identifies a template package: a name plus an optional version.
///
/// An identifier without a version is unresolved and stands for "latest".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentifier {
    name: String,
    version: Option<String>,
}

impl PackageIdentifier {
    /// Create an unresolved identifier (no version).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Create an identifier for an exact version.
    pub fn with_version(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// Create an identifier from a name and an optional version.
    pub fn from_parts(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(String::from),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.version.is_some()
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Parses `name` or `name@version`.
impl FromStr for PackageIdentifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (s, None),
        };

        if name.is_empty() || name.chars().any(char::is_whitespace) || name.contains('/') {
            anyhow::bail!("Invalid template name '{}'.", name);
        }
        if let Some(version) = version
            && (version.is_empty() || version.chars().any(char::is_whitespace))
        {
            anyhow::bail!("Invalid version '{}' for template '{}'.", version, name);
        }

        Ok(Self::from_parts(name, version))
    }
}
