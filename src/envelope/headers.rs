//! Case-insensitive header collection carried inside envelopes.

use std::collections::BTreeMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize};

/// Lower-cased header name to ordered values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderSet(BTreeMap<String, Vec<String>>);

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every value of every header, keeping value order per name.
    ///
    /// Values that are not visible ASCII are carried lossily.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut set = Self::new();
        for (name, value) in map.iter() {
            set.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        set
    }

    /// Convert back into an `http::HeaderMap`.
    ///
    /// Returns the offending `name: value` pair on failure.
    pub fn to_header_map(&self) -> Result<HeaderMap, String> {
        let mut map = HeaderMap::new();
        for (name, values) in &self.0 {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| name.clone())?;
            for value in values {
                let value = HeaderValue::from_str(value)
                    .map_err(|_| format!("{}: {}", name, value))?;
                map.append(header.clone(), value);
            }
        }
        Ok(map)
    }

    /// Append a value, wrapping single values into list form.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Replace all values of a header.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), vec![value.into()]);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Keep only headers whose lower-cased name satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|name, _| keep(name));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for HeaderSet {
    /// Accepts `{name: [values]}` or `{name: value}` with names in any case.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Values {
            One(String),
            Many(Vec<String>),
        }

        let raw = BTreeMap::<String, Values>::deserialize(deserializer)?;
        let mut set = HeaderSet::new();
        for (name, values) in raw {
            match values {
                Values::One(value) => set.append(&name, value),
                Values::Many(values) => {
                    for value in values {
                        set.append(&name, value);
                    }
                }
            }
        }
        Ok(set)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (name, value) in iter {
            set.append(name.as_ref(), value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive() {
        let mut set = HeaderSet::new();
        set.append("X-Custom", "a");
        set.append("x-custom", "b");

        assert_eq!(set.get_all("X-CUSTOM"), ["a", "b"]);
        assert!(set.contains("x-Custom"));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["x-custom"]);
    }

    #[test]
    fn test_header_map_conversion_keeps_order() {
        let mut map = HeaderMap::new();
        map.append("accept", HeaderValue::from_static("text/html"));
        map.append("accept", HeaderValue::from_static("application/json"));

        let set = HeaderSet::from_header_map(&map);
        assert_eq!(set.get_all("accept"), ["text/html", "application/json"]);

        let back = set.to_header_map().unwrap();
        let values: Vec<_> = back.get_all("accept").iter().collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], "application/json");
    }

    #[test]
    fn test_deserialize_single_and_list_values() {
        let set: HeaderSet =
            serde_json::from_str(r#"{"Location": "/next", "Set-Cookie": ["a=1", "b=2"]}"#).unwrap();
        assert_eq!(set.first("location"), Some("/next"));
        assert_eq!(set.get_all("set-cookie").len(), 2);
    }

    #[test]
    fn test_invalid_header_value_is_reported() {
        let mut set = HeaderSet::new();
        set.append("x-bad", "line\nbreak");
        let err = set.to_header_map().unwrap_err();
        assert!(err.starts_with("x-bad"));
    }
}
