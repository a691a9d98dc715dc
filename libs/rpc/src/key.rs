use std::fmt;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of one remotely callable function: a namespace path plus a
/// simple name.
///
/// Both peers supply the same key literally; nothing is derived from
/// runtime metadata. The canonical string form joins all segments with
/// `::` (for example `Demo::math::add`), and [`FromStr`] parses it back.
/// On the wire a key is the two-element sequence `[namespace, name]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionKey {
    namespace: Vec<String>,
    name: String,
}

impl FunctionKey {
    /// Create a key from a namespace path and a simple name.
    pub fn new<N, S>(namespace: N, name: impl Into<String>) -> Self
    where
        N: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            name: name.into(),
        }
    }

    /// Create a key with an empty namespace path.
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            namespace: Vec::new(),
            name: name.into(),
        }
    }

    /// The namespace path, outermost segment first.
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// The simple name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical `Namespace::name` string form.
    pub fn qualified(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.namespace {
            write!(f, "{segment}::")?;
        }
        write!(f, "{}", self.name)
    }
}

/// Failure to parse the canonical string form of a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid function key `{input}`: {reason}")]
pub struct KeyParseError {
    input: String,
    reason: &'static str,
}

impl FromStr for FunctionKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KeyParseError {
                input: s.to_string(),
                reason: "empty key",
            });
        }
        let mut segments: Vec<String> = s.split("::").map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(KeyParseError {
                input: s.to_string(),
                reason: "empty path segment",
            });
        }
        // split always yields at least one element for non-empty input
        let name = segments.pop().unwrap_or_default();
        Ok(Self {
            namespace: segments,
            name,
        })
    }
}

impl Serialize for FunctionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.namespace, &self.name).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FunctionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (namespace, name) = <(Vec<String>, String)>::deserialize(deserializer)?;
        Ok(Self { namespace, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_content() {
        let a = FunctionKey::new(["Demo"], "add");
        let b = FunctionKey::new(vec!["Demo".to_string()], "add");
        assert_eq!(a, b);
        assert_ne!(a, FunctionKey::new(["Demo"], "sub"));
        assert_ne!(a, FunctionKey::global("add"));
    }

    #[test]
    fn canonical_form_round_trips() {
        let key = FunctionKey::new(["Demo", "math"], "add");
        assert_eq!(key.to_string(), "Demo::math::add");
        assert_eq!("Demo::math::add".parse::<FunctionKey>().unwrap(), key);

        let bare: FunctionKey = "add".parse().unwrap();
        assert_eq!(bare, FunctionKey::global("add"));
    }

    #[test]
    fn parse_rejects_degenerate_input() {
        assert!("".parse::<FunctionKey>().is_err());
        assert!("Demo::".parse::<FunctionKey>().is_err());
        assert!("::add".parse::<FunctionKey>().is_err());
    }

    #[test]
    fn wire_form_is_a_pair() {
        let key = FunctionKey::new(["Demo"], "add");
        let value = serde_json::to_value(&key).unwrap();
        assert_eq!(value, serde_json::json!([["Demo"], "add"]));
        let back: FunctionKey = serde_json::from_value(value).unwrap();
        assert_eq!(back, key);
    }
}
