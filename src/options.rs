//! Filter and post-processor options
//!
//! Stacks declare filters as a YAML mapping `name -> options`. The mapping's
//! document order is the execution order, so [`NamedOptions`] keeps entries
//! in a vector instead of a hash map.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::TransformError;

/// Free-form options of one filter or post-processor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and programmatic stacks
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed accessor that names `component` in its errors
    pub fn reader<'a>(&'a self, component: &'a str) -> OptionReader<'a> {
        OptionReader {
            component,
            options: self,
        }
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Typed view over [`Options`]
#[derive(Debug, Clone, Copy)]
pub struct OptionReader<'a> {
    component: &'a str,
    options: &'a Options,
}

impl<'a> OptionReader<'a> {
    fn invalid(&self, key: &str, message: impl Into<String>) -> TransformError {
        TransformError::invalid_option(self.component, key, message)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.options.get(key).is_some()
    }

    pub fn u32(&self, key: &str) -> Result<Option<u32>, TransformError> {
        match self.options.get(key) {
            None => Ok(None),
            Some(value) => value_to_u32(value)
                .map(Some)
                .ok_or_else(|| self.invalid(key, "expected a non-negative integer")),
        }
    }

    pub fn u32_in(&self, key: &str, min: u32, max: u32) -> Result<Option<u32>, TransformError> {
        match self.u32(key)? {
            Some(value) if value < min || value > max => Err(self.invalid(
                key,
                format!("must be an int between {} and {}", min, max),
            )),
            other => Ok(other),
        }
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>, TransformError> {
        match self.options.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| self.invalid(key, "expected a number")),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, TransformError> {
        match self.options.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.invalid(key, "expected a boolean")),
        }
    }

    pub fn str(&self, key: &str) -> Result<Option<&'a str>, TransformError> {
        match self.options.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    /// `[w, h]` where either side may be null
    pub fn dimensions(
        &self,
        key: &str,
    ) -> Result<Option<(Option<u32>, Option<u32>)>, TransformError> {
        let Some(value) = self.options.get(key) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .filter(|items| items.len() == 2)
            .ok_or_else(|| self.invalid(key, "expected a two element array"))?;
        let side = |item: &Value| -> Result<Option<u32>, TransformError> {
            if item.is_null() {
                Ok(None)
            } else {
                value_to_u32(item)
                    .map(Some)
                    .ok_or_else(|| self.invalid(key, "expected non-negative integers"))
            }
        };
        Ok(Some((side(&items[0])?, side(&items[1])?)))
    }

    /// `[a, b]` where both sides are required
    pub fn pair(&self, key: &str) -> Result<Option<(u32, u32)>, TransformError> {
        match self.dimensions(key)? {
            None => Ok(None),
            Some((Some(a), Some(b))) => Ok(Some((a, b))),
            Some(_) => Err(self.invalid(key, "both values are required")),
        }
    }

    pub fn required_pair(&self, key: &str) -> Result<(u32, u32), TransformError> {
        self.pair(key)?
            .ok_or_else(|| self.invalid(key, "option is required"))
    }
}

fn value_to_u32(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    // YAML authors write `90.0` or `"90"` more often than one would hope
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u32::MAX as f64)
            .map(|f| f as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Ordered `name -> options` list (filters or post-processors of a stack)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedOptions(Vec<(String, Options)>);

impl NamedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, options: Options) -> Self {
        self.push(name, options);
        self
    }

    /// Append an entry; a repeated name replaces the earlier options in place
    pub fn push(&mut self, name: impl Into<String>, options: Options) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = options,
            None => self.0.push((name, options)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Options)> {
        self.0.iter().map(|(name, options)| (name.as_str(), options))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for NamedOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, options) in &self.0 {
            map.serialize_entry(name, options)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NamedOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NamedOptionsVisitor;

        impl<'de> Visitor<'de> for NamedOptionsVisitor {
            type Value = NamedOptions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of names to option mappings")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(NamedOptions::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, Options)> = Vec::new();
                while let Some((name, options)) =
                    access.next_entry::<String, Option<Map<String, Value>>>()?
                {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(de::Error::custom(format!("duplicate entry '{}'", name)));
                    }
                    entries.push((name, Options(options.unwrap_or_default())));
                }
                Ok(NamedOptions(entries))
            }
        }

        deserializer.deserialize_any(NamedOptionsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_options_keep_document_order() {
        let yaml = "
zeta: { a: 1 }
alpha: ~
mid: {}
";
        let parsed: NamedOptions = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&str> = parsed.names().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(parsed.iter().nth(1).unwrap().1.is_empty());
    }

    #[test]
    fn test_named_options_reject_duplicates() {
        let yaml = "a: {}\na: {}\n";
        assert!(serde_yaml::from_str::<NamedOptions>(yaml).is_err());
    }

    #[test]
    fn test_push_replaces_existing_entry() {
        let mut list = NamedOptions::new()
            .with("thumbnail", Options::new().with("mode", "inset"))
            .with("strip", Options::new());
        list.push("thumbnail", Options::new().with("mode", "outbound"));
        assert_eq!(list.len(), 2);
        let (name, options) = list.iter().next().unwrap();
        assert_eq!(name, "thumbnail");
        assert_eq!(options.get("mode"), Some(&json!("outbound")));
    }

    #[test]
    fn test_reader_dimensions_allow_null_side() {
        let options = Options::new().with("size", json!([120, null]));
        let reader = options.reader("thumbnail");
        assert_eq!(reader.dimensions("size").unwrap(), Some((Some(120), None)));
        assert!(reader.pair("size").is_err());
    }

    #[test]
    fn test_reader_reports_component_and_key() {
        let options = Options::new().with("max", "lots");
        let err = options.reader("jpegoptim").u32("max").unwrap_err();
        match err {
            TransformError::InvalidOption {
                component, option, ..
            } => {
                assert_eq!(component, "jpegoptim");
                assert_eq!(option, "max");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reader_range_check() {
        let options = Options::new().with("max", 101);
        assert!(options.reader("jpegoptim").u32_in("max", 0, 100).is_err());
        let options = Options::new().with("max", 85);
        assert_eq!(
            options.reader("jpegoptim").u32_in("max", 0, 100).unwrap(),
            Some(85)
        );
    }

    #[test]
    fn test_reader_accepts_whole_floats() {
        let options = Options::new().with("angle", 90.0);
        assert_eq!(options.reader("rotate").u32("angle").unwrap(), Some(90));
    }
}
