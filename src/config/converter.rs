//! Typed setting values and the converters that parse, format and validate them.

use std::fmt;

use url::Url;

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Text(String),
    Boolean(bool),
    Integer(i64),
    Url(Url),
    UrlList(Vec<Url>),
    Choice(String),
}

impl SettingValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) | SettingValue::Choice(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            SettingValue::Url(url) => Some(url),
            _ => None,
        }
    }

    pub fn as_url_list(&self) -> Option<&[Url]> {
        match self {
            SettingValue::UrlList(urls) => Some(urls),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Text(s) | SettingValue::Choice(s) => f.write_str(s),
            SettingValue::Boolean(b) => write!(f, "{}", b),
            SettingValue::Integer(n) => write!(f, "{}", n),
            SettingValue::Url(url) => f.write_str(url.as_str()),
            SettingValue::UrlList(urls) => {
                let joined: Vec<&str> = urls.iter().map(Url::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

/// Raised when raw text cannot represent a value of the converter's type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("'{raw}' is not a valid {expected}")]
pub struct ConversionError {
    pub raw: String,
    pub expected: &'static str,
}

impl ConversionError {
    fn new(raw: &str, expected: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            expected,
        }
    }
}

/// Parse/format/validate strategy for one setting type.
#[derive(Debug, Clone, PartialEq)]
pub enum Converter {
    /// Non-empty text without surrounding whitespace.
    Text,
    /// `true`/`false`, also accepting `yes`/`no`, `on`/`off` and `1`/`0`.
    Boolean,
    /// Signed integer no smaller than `min`.
    Integer { min: i64 },
    /// Absolute `http`, `https` or `file` URL.
    Url,
    /// Comma-separated list of URLs, each valid for [`Converter::Url`] and
    /// free of literal commas.
    UrlList,
    /// One of a fixed set of lowercase names.
    Choice(&'static [&'static str]),
}

impl Converter {
    /// Parse the external representation into a typed value.
    pub fn to_type(&self, raw: &str) -> Result<SettingValue, ConversionError> {
        let trimmed = raw.trim();
        match self {
            Converter::Text => {
                if trimmed.is_empty() {
                    return Err(ConversionError::new(raw, "non-empty string"));
                }
                Ok(SettingValue::Text(trimmed.to_string()))
            }
            Converter::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(SettingValue::Boolean(true)),
                "false" | "no" | "off" | "0" => Ok(SettingValue::Boolean(false)),
                _ => Err(ConversionError::new(raw, "boolean")),
            },
            Converter::Integer { .. } => trimmed
                .parse::<i64>()
                .map(SettingValue::Integer)
                .map_err(|_| ConversionError::new(raw, "integer")),
            Converter::Url => parse_url(trimmed)
                .map(SettingValue::Url)
                .ok_or_else(|| ConversionError::new(raw, "URL")),
            Converter::UrlList => trimmed
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| parse_url(part).ok_or_else(|| ConversionError::new(raw, "URL list")))
                .collect::<Result<Vec<_>, _>>()
                .map(SettingValue::UrlList),
            Converter::Choice(choices) => {
                let lowered = trimmed.to_ascii_lowercase();
                choices
                    .iter()
                    .find(|choice| **choice == lowered)
                    .map(|choice| SettingValue::Choice(choice.to_string()))
                    .ok_or_else(|| ConversionError::new(raw, "choice"))
            }
        }
    }

    /// Format a typed value for persistence. Inverse of [`Converter::to_type`].
    pub fn to_raw(&self, value: &SettingValue) -> String {
        value.to_string()
    }

    /// Check that a value has this converter's type and satisfies its domain
    /// constraints, however it was constructed.
    pub fn validate(&self, value: &SettingValue) -> bool {
        match (self, value) {
            (Converter::Text, SettingValue::Text(s)) => !s.is_empty() && s.trim() == s,
            (Converter::Boolean, SettingValue::Boolean(_)) => true,
            (Converter::Integer { min }, SettingValue::Integer(n)) => n >= min,
            (Converter::Url, SettingValue::Url(url)) => is_supported_url(url),
            // Items are joined on ',' when persisted
            (Converter::UrlList, SettingValue::UrlList(urls)) => urls
                .iter()
                .all(|url| is_supported_url(url) && !url.as_str().contains(',')),
            (Converter::Choice(choices), SettingValue::Choice(s)) => {
                choices.iter().any(|choice| *choice == s.as_str())
            }
            _ => false,
        }
    }

    /// Short type name shown by `config list`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Converter::Text => "string",
            Converter::Boolean => "boolean",
            Converter::Integer { .. } => "integer",
            Converter::Url => "url",
            Converter::UrlList => "url list",
            Converter::Choice(_) => "choice",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Converter::UrlList)
    }
}

fn parse_url(raw: &str) -> Option<Url> {
    Url::parse(raw).ok().filter(is_supported_url)
}

fn is_supported_url(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => url.host_str().is_some_and(|h| !h.is_empty()),
        "file" => true,
        _ => false,
    }
}
