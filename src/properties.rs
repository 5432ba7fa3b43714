//! The property bag bindings are configured from.
//!
//! Properties come from Java-style `.properties` files and `key=value`
//! overrides. A binding picks the entries under its prefix (`redis.`,
//! `jcr.`) and deserializes them into its typed config with serde.

use serde::de::{self, Deserialize, DeserializeOwned, Deserializer};
use serde_json::{Map, Value};

use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::iter::FromIterator;
use std::path::Path;
use std::str::FromStr;

use crate::{Error, Result};

/// Flat mapping from option name to string value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    map: HashMap<String, String>,
}

impl Properties {
    /// An empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a properties file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut props = Self::new();
        props.load_file(path)?;
        Ok(props)
    }

    /// Read a properties file, overriding entries already present.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let text = fs::read_to_string(path)?;
        self.parse(&text);
        Ok(())
    }

    /// Parse `key=value` (or `key: value`) lines.
    /// Blank lines and lines starting with `#` or `!` are skipped,
    /// a line without separator sets its key to the empty string.
    pub fn parse(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            match line.find(|c| c == '=' || c == ':') {
                Some(at) => self.set(line[..at].trim(), line[at + 1..].trim()),
                None => self.set(line, ""),
            }
        }
    }

    /// Parse a single `key=value` override.
    pub fn set_pair(&mut self, pair: &str) -> Result<()> {
        match pair.find('=') {
            Some(at) if at > 0 => {
                self.set(pair[..at].trim(), &pair[at + 1..]);
                Ok(())
            }
            _ => Err(Error::Config(format!("expect key=value, found {:?}", pair)))?,
        }
    }

    /// Set a property.
    pub fn set(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_owned(), value.to_owned());
    }

    /// Get a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Deserialize the entries under `prefix`, with the prefix stripped.
    pub fn deserialize<T: DeserializeOwned>(&self, prefix: &str) -> Result<T> {
        let map: Map<String, Value> = self
            .map
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|k| (k.to_owned(), Value::String(v.clone())))
            })
            .collect();
        match serde_json::from_value(Value::Object(map)) {
            Ok(config) => Ok(config),
            Err(e) => Err(Error::Config(format!("{}*: {}", prefix, e)))?,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// `true`, `yes` and `1` are true, anything else is false.
pub fn flag<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<bool, D::Error> {
    let s = String::deserialize(de)?;
    Ok(s == "true" || s == "yes" || s == "1")
}

/// A number written as a string.
pub fn number<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let s = String::deserialize(de)?;
    s.trim().parse().map_err(de::Error::custom)
}
