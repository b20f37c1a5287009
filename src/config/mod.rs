//! Typed, validated configuration store.
//!
//! Settings are declared up front as [`SettingDescriptor`]s. Every write is
//! checked against the descriptor's converter, so the store only ever holds
//! valid values, and reading an unset setting yields its declared default.
//!
//! # Structure
//!
//! - `converter` - typed values and their parse/format/validate strategies
//! - `settings` - built-in descriptors and setting keys
//! - `loader` - layering of config file, managed overrides and environment

mod converter;
pub mod loader;
pub mod settings;

use std::collections::BTreeMap;

use url::Url;

use crate::error::Error;

pub use converter::{ConversionError, Converter, SettingValue};
pub use loader::ConfigLoader;
pub use settings::{SettingDescriptor, builtin_settings};

#[derive(Debug, Clone)]
pub struct Configuration {
    descriptors: Vec<SettingDescriptor>,
    values: BTreeMap<String, SettingValue>,
}

impl Configuration {
    /// Create an empty store over the given descriptors.
    pub fn new(descriptors: Vec<SettingDescriptor>) -> Self {
        Self {
            descriptors,
            values: BTreeMap::new(),
        }
    }

    pub fn descriptors(&self) -> &[SettingDescriptor] {
        &self.descriptors
    }

    /// Look up the descriptor covering `name`: exact names win over wildcards.
    pub fn descriptor(&self, name: &str) -> Result<&SettingDescriptor, Error> {
        self.descriptors
            .iter()
            .find(|d| !d.is_wildcard() && d.matches(name))
            .or_else(|| self.descriptors.iter().find(|d| d.matches(name)))
            .ok_or_else(|| Error::unknown_setting(name))
    }

    /// The explicitly set value, if any.
    pub fn get(&self, name: &str) -> Result<Option<&SettingValue>, Error> {
        self.descriptor(name)?;
        Ok(self.values.get(name))
    }

    /// The explicitly set value, falling back to the declared default.
    pub fn get_or_default(&self, name: &str) -> Result<Option<&SettingValue>, Error> {
        let descriptor = self.descriptor(name)?;
        Ok(self.values.get(name).or(descriptor.default.as_ref()))
    }

    /// Replace the value of a setting. Nothing is written unless the value
    /// validates.
    pub fn set(&mut self, name: &str, value: SettingValue) -> Result<(), Error> {
        let descriptor = self.descriptor(name)?;
        if !descriptor.converter.validate(&value) {
            return Err(Error::invalid_setting(name, &value));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Parse `raw` with the setting's converter, then [`Configuration::set`].
    pub fn set_raw(&mut self, name: &str, raw: &str) -> Result<(), Error> {
        let value = self.convert(name, raw)?;
        self.set(name, value)
    }

    /// Add one item to a list setting, starting from its current value.
    pub fn append(&mut self, name: &str, raw: &str) -> Result<(), Error> {
        let descriptor = self.descriptor(name)?;
        if !descriptor.converter.is_list() {
            return Err(Error::invalid_setting(name, raw));
        }

        let mut items: Vec<Url> = self
            .get_or_default(name)?
            .and_then(SettingValue::as_url_list)
            .map(<[Url]>::to_vec)
            .unwrap_or_default();

        let added = self.convert(name, raw)?;
        if let Some(new_items) = added.as_url_list() {
            items.extend(new_items.iter().cloned());
        }
        self.set(name, SettingValue::UrlList(items))
    }

    /// Drop the explicit value so the default applies again. Returns whether a
    /// value was removed.
    pub fn clear(&mut self, name: &str) -> Result<bool, Error> {
        self.descriptor(name)?;
        Ok(self.values.remove(name).is_some())
    }

    /// Apply a set of raw values. Either every entry is applied or, on the
    /// first unknown or invalid entry, none is.
    pub fn load<I, K, V>(&mut self, raw: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut staged = self.clone();
        for (name, value) in raw {
            staged.set_raw(name.as_ref(), value.as_ref())?;
        }
        self.values = staged.values;
        Ok(())
    }

    /// Explicit values under `prefix.`, keyed by the remainder of the name.
    pub fn sub_settings(&self, prefix: &str) -> BTreeMap<String, &SettingValue> {
        let prefix = format!("{}.", prefix.trim_end_matches('.'));
        self.values
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), value))
            })
            .collect()
    }

    /// All explicit values in their raw form.
    pub fn explicit_values(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect()
    }

    pub fn text(&self, name: &str) -> Result<Option<String>, Error> {
        self.typed(name, |v| v.as_text().map(String::from))
    }

    pub fn boolean(&self, name: &str) -> Result<bool, Error> {
        Ok(self.typed(name, SettingValue::as_bool)?.unwrap_or(false))
    }

    pub fn integer(&self, name: &str) -> Result<Option<i64>, Error> {
        self.typed(name, SettingValue::as_integer)
    }

    pub fn url(&self, name: &str) -> Result<Option<Url>, Error> {
        self.typed(name, |v| v.as_url().cloned())
    }

    pub fn urls(&self, name: &str) -> Result<Vec<Url>, Error> {
        Ok(self
            .typed(name, |v| v.as_url_list().map(<[Url]>::to_vec))?
            .unwrap_or_default())
    }

    fn convert(&self, name: &str, raw: &str) -> Result<SettingValue, Error> {
        self.descriptor(name)?
            .converter
            .to_type(raw)
            .map_err(|_| Error::invalid_setting(name, raw))
    }

    fn typed<T>(
        &self,
        name: &str,
        extract: impl FnOnce(&SettingValue) -> Option<T>,
    ) -> Result<Option<T>, Error> {
        match self.get_or_default(name)? {
            Some(value) => extract(value)
                .map(Some)
                .ok_or_else(|| Error::invalid_setting(name, value)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::*;
    use std::path::Path;

    fn store() -> Configuration {
        Configuration::new(builtin_settings(Path::new("/home/user/.skelly")))
    }

    #[test]
    fn test_get_unknown_setting() {
        let config = store();
        assert!(matches!(
            config.get("nope"),
            Err(Error::UnknownSetting { name }) if name == "nope"
        ));
        assert!(config.get_or_default("nope").is_err());
    }

    #[test]
    fn test_get_returns_explicit_only() {
        let mut config = store();
        assert_eq!(config.get(OFFLINE).unwrap(), None);
        assert_eq!(
            config.get_or_default(OFFLINE).unwrap(),
            Some(&SettingValue::Boolean(false))
        );

        config.set(OFFLINE, SettingValue::Boolean(true)).unwrap();
        assert_eq!(config.get(OFFLINE).unwrap(), Some(&SettingValue::Boolean(true)));
    }

    #[test]
    fn test_set_undeclared_key() {
        let mut config = store();
        let result = config.set_raw("logLevel", "verbose");
        assert!(matches!(result, Err(Error::UnknownSetting { name }) if name == "logLevel"));
    }

    #[test]
    fn test_set_invalid_url() {
        let mut config = store();
        let result = config.set_raw(PRIMARY_REPOSITORY, "not a url");
        assert!(matches!(
            result,
            Err(Error::InvalidSetting { name, value })
                if name == PRIMARY_REPOSITORY && value == "not a url"
        ));
        // The default is untouched
        assert_eq!(
            config.url(PRIMARY_REPOSITORY).unwrap().map(|u| u.to_string()),
            Some(format!("{}", Url::parse(DEFAULT_REPOSITORY_URL).unwrap()))
        );
    }

    #[test]
    fn test_set_rejects_programmatic_invalid_value() {
        let mut config = store();
        let result = config.set(HTTP_TIMEOUT, SettingValue::Integer(-1));
        assert!(matches!(result, Err(Error::InvalidSetting { .. })));
        assert_eq!(config.integer(HTTP_TIMEOUT).unwrap(), Some(DEFAULT_TIMEOUT_SECS));

        let result = config.set(OFFLINE, SettingValue::Text("true".into()));
        assert!(matches!(result, Err(Error::InvalidSetting { .. })));
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let mut config = store();
        config.set_raw(GIT_NAME, "Before").unwrap();

        let raw = vec![
            (GIT_NAME, "After"),
            (GIT_EMAIL, "after@example.com"),
            (OFFLINE, "true"),
            (HTTP_TIMEOUT, "not-a-number"),
            (LOG_LEVEL, "debug"),
        ];
        let result = config.load(raw);
        assert!(matches!(
            result,
            Err(Error::InvalidSetting { name, .. }) if name == HTTP_TIMEOUT
        ));

        assert_eq!(config.text(GIT_NAME).unwrap().as_deref(), Some("Before"));
        assert_eq!(config.get(GIT_EMAIL).unwrap(), None);
        assert!(!config.boolean(OFFLINE).unwrap());
        assert_eq!(config.text(LOG_LEVEL).unwrap().as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_unknown_key_aborts() {
        let mut config = store();
        let result = config.load([(OFFLINE, "true"), ("colour", "blue")]);
        assert!(matches!(result, Err(Error::UnknownSetting { .. })));
        assert!(!config.boolean(OFFLINE).unwrap());
    }

    #[test]
    fn test_load_applies_all_valid_entries() {
        let mut config = store();
        config
            .load([
                (OFFLINE, "yes"),
                (MIRROR_REPOSITORIES, "https://a.example.com/,https://b.example.com/"),
                (HTTP_TIMEOUT, "5"),
            ])
            .unwrap();
        assert!(config.boolean(OFFLINE).unwrap());
        assert_eq!(config.urls(MIRROR_REPOSITORIES).unwrap().len(), 2);
        assert_eq!(config.integer(HTTP_TIMEOUT).unwrap(), Some(5));
    }

    #[test]
    fn test_append_to_list() {
        let mut config = store();
        config
            .append(MIRROR_REPOSITORIES, "https://a.example.com/")
            .unwrap();
        config
            .append(MIRROR_REPOSITORIES, "https://b.example.com/")
            .unwrap();
        let urls: Vec<String> = config
            .urls(MIRROR_REPOSITORIES)
            .unwrap()
            .iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(urls, vec!["https://a.example.com/", "https://b.example.com/"]);
    }

    #[test]
    fn test_append_to_scalar_is_invalid() {
        let mut config = store();
        let result = config.append(GIT_NAME, "x");
        assert!(matches!(result, Err(Error::InvalidSetting { .. })));
    }

    #[test]
    fn test_clear_restores_default() {
        let mut config = store();
        config.set_raw(HTTP_TIMEOUT, "90").unwrap();
        assert!(config.clear(HTTP_TIMEOUT).unwrap());
        assert!(!config.clear(HTTP_TIMEOUT).unwrap());
        assert_eq!(config.integer(HTTP_TIMEOUT).unwrap(), Some(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_wildcard_settings() {
        let mut config = store();
        config
            .set_raw("templates.mappings.app", "https://example.com/app.zip")
            .unwrap();
        config
            .set_raw("templates.mappings.lib", "file:///srv/lib.zip")
            .unwrap();
        assert!(config.set_raw("templates.mappings.bad", "nope").is_err());

        let mappings = config.sub_settings(TEMPLATE_MAPPINGS);
        assert_eq!(mappings.len(), 2);
        assert!(mappings.contains_key("app"));
        assert!(mappings.contains_key("lib"));
    }

    #[test]
    fn test_unset_setting_without_default() {
        let config = store();
        assert_eq!(config.url(HTTP_PROXY).unwrap(), None);
        assert_eq!(config.text(GIT_EMAIL).unwrap(), None);
    }

    #[test]
    fn test_explicit_values_round_trip() {
        let mut config = store();
        config.set_raw(OFFLINE, "on").unwrap();
        config.set_raw(LOG_LEVEL, "DEBUG").unwrap();

        let raw = config.explicit_values();
        assert_eq!(raw.get(OFFLINE).map(String::as_str), Some("true"));
        assert_eq!(raw.get(LOG_LEVEL).map(String::as_str), Some("debug"));

        let mut copy = store();
        copy.load(raw.iter()).unwrap();
        assert_eq!(copy.explicit_values(), raw);
    }
}
