//! Generic attribute trees as returned by a management source.
//!
//! Management data is dynamically shaped: an attribute may be a scalar, a
//! composite (map), or tabular data (a sequence of rows). Rather than probing
//! types at every extraction site, values are a closed enum and all access
//! goes through fallible accessors that report what was expected.

use std::collections::BTreeMap;

use thiserror::Error;

/// Attributes of a single managed object, keyed by attribute name.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AttributeValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Sequence(Vec<AttributeValue>),
    Map(AttributeMap),
}

/// Failure to read a typed value out of an attribute tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttributeError {
    #[error("missing attribute '{0}'")]
    Missing(String),

    #[error("attribute '{name}' expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl AttributeValue {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Number(_) => "number",
            AttributeValue::String(_) => "string",
            AttributeValue::Sequence(_) => "sequence",
            AttributeValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integral numbers only; fractional values are rejected.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&AttributeMap> {
        match self {
            AttributeValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Like [`as_map`](Self::as_map), but reports a mismatch against `name`.
    pub fn expect_map(&self, name: &str) -> Result<&AttributeMap, AttributeError> {
        self.as_map().ok_or_else(|| mismatch(name, "map", self))
    }

    pub fn as_seq(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten tabular data into `(key, value)` rows.
    ///
    /// Tabular attributes arrive either as a plain map or as a sequence of
    /// `{ "key": ..., "value": ... }` rows; both shapes are accepted.
    pub fn tabular_rows(&self, name: &str) -> Result<Vec<(String, &AttributeValue)>, AttributeError> {
        match self {
            AttributeValue::Map(m) => Ok(m.iter().map(|(k, v)| (k.clone(), v)).collect()),
            AttributeValue::Sequence(rows) => rows
                .iter()
                .map(|row| -> Result<_, AttributeError> {
                    let row = row.expect_map(name)?;
                    Ok((row.str_attr("key")?.to_string(), row.attr("value")?))
                })
                .collect(),
            other => Err(mismatch(name, "tabular data", other)),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Number(n as f64)
    }
}

impl From<u64> for AttributeValue {
    fn from(n: u64) -> Self {
        AttributeValue::Number(n as f64)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<AttributeMap> for AttributeValue {
    fn from(m: AttributeMap) -> Self {
        AttributeValue::Map(m)
    }
}

fn mismatch(name: &str, expected: &'static str, found: &AttributeValue) -> AttributeError {
    AttributeError::TypeMismatch {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Typed, fallible lookups on an [`AttributeMap`].
pub trait AttributeMapExt {
    /// Look up an attribute, failing if it is absent.
    fn attr(&self, name: &str) -> Result<&AttributeValue, AttributeError>;

    fn i64_attr(&self, name: &str) -> Result<i64, AttributeError> {
        let value = self.attr(name)?;
        value.as_i64().ok_or_else(|| mismatch(name, "integer", value))
    }

    /// Non-negative integer; negative values (the JVM's "undefined") read as 0.
    fn u64_attr(&self, name: &str) -> Result<u64, AttributeError> {
        Ok(self.i64_attr(name)?.max(0) as u64)
    }

    fn f64_attr(&self, name: &str) -> Result<f64, AttributeError> {
        let value = self.attr(name)?;
        value.as_f64().ok_or_else(|| mismatch(name, "number", value))
    }

    fn str_attr(&self, name: &str) -> Result<&str, AttributeError> {
        let value = self.attr(name)?;
        value.as_str().ok_or_else(|| mismatch(name, "string", value))
    }

    fn map_attr(&self, name: &str) -> Result<&AttributeMap, AttributeError> {
        let value = self.attr(name)?;
        value.as_map().ok_or_else(|| mismatch(name, "map", value))
    }

    /// Absent or null reads as `None`; any other non-number is a mismatch.
    fn opt_f64_attr(&self, name: &str) -> Result<Option<f64>, AttributeError> {
        match self.attr(name) {
            Err(AttributeError::Missing(_)) => Ok(None),
            Err(e) => Err(e),
            Ok(AttributeValue::Null) => Ok(None),
            Ok(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| mismatch(name, "number", value)),
        }
    }

    fn opt_str_attr(&self, name: &str) -> Result<Option<&str>, AttributeError> {
        match self.attr(name) {
            Err(AttributeError::Missing(_)) => Ok(None),
            Err(e) => Err(e),
            Ok(AttributeValue::Null) => Ok(None),
            Ok(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| mismatch(name, "string", value)),
        }
    }

    fn opt_map_attr(&self, name: &str) -> Result<Option<&AttributeMap>, AttributeError> {
        match self.attr(name) {
            Err(AttributeError::Missing(_)) => Ok(None),
            Err(e) => Err(e),
            Ok(AttributeValue::Null) => Ok(None),
            Ok(value) => value
                .as_map()
                .map(Some)
                .ok_or_else(|| mismatch(name, "map", value)),
        }
    }
}

impl AttributeMapExt for AttributeMap {
    fn attr(&self, name: &str) -> Result<&AttributeValue, AttributeError> {
        self.get(name)
            .ok_or_else(|| AttributeError::Missing(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttributeMap {
        let mut usage = AttributeMap::new();
        usage.insert("used".into(), 512u64.into());
        usage.insert("max".into(), (-1i64).into());

        let mut m = AttributeMap::new();
        m.insert("Name".into(), "PS Eden Space".into());
        m.insert("Usage".into(), usage.into());
        m.insert("Load".into(), 0.25f64.into());
        m.insert("Nothing".into(), AttributeValue::Null);
        m
    }

    #[test]
    fn typed_accessors_read_expected_values() {
        let m = sample();
        assert_eq!(m.str_attr("Name").unwrap(), "PS Eden Space");
        assert_eq!(m.f64_attr("Load").unwrap(), 0.25);
        let usage = m.map_attr("Usage").unwrap();
        assert_eq!(usage.u64_attr("used").unwrap(), 512);
        assert_eq!(usage.i64_attr("max").unwrap(), -1);
        assert_eq!(usage.u64_attr("max").unwrap(), 0);
    }

    #[test]
    fn missing_attribute_is_reported_by_name() {
        let m = sample();
        assert_eq!(
            m.u64_attr("CollectionCount"),
            Err(AttributeError::Missing("CollectionCount".into()))
        );
    }

    #[test]
    fn type_mismatch_names_both_kinds() {
        let m = sample();
        let err = m.u64_attr("Name").unwrap_err();
        assert_eq!(
            err,
            AttributeError::TypeMismatch {
                name: "Name".into(),
                expected: "integer",
                found: "string",
            }
        );
        assert!(m.i64_attr("Load").is_err());
    }

    #[test]
    fn optional_accessors_treat_null_and_absent_as_none() {
        let m = sample();
        assert_eq!(m.opt_f64_attr("Nothing").unwrap(), None);
        assert_eq!(m.opt_f64_attr("Absent").unwrap(), None);
        assert_eq!(m.opt_f64_attr("Load").unwrap(), Some(0.25));
        assert!(m.opt_f64_attr("Name").is_err());
        assert!(m.opt_map_attr("Usage").unwrap().is_some());
    }

    #[test]
    fn tabular_rows_accept_map_and_row_sequences() {
        let as_map = sample().get("Usage").cloned().unwrap();
        assert_eq!(as_map.tabular_rows("t").unwrap().len(), 2);

        let mut row = AttributeMap::new();
        row.insert("key".into(), "G1 Eden Space".into());
        row.insert("value".into(), 42u64.into());
        let as_rows = AttributeValue::Sequence(vec![AttributeValue::Map(row)]);
        let rows = as_rows.tabular_rows("t").unwrap();
        assert_eq!(rows[0].0, "G1 Eden Space");
        assert_eq!(rows[0].1.as_i64(), Some(42));

        assert!(AttributeValue::from(1u64).tabular_rows("t").is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_from_json_tree() {
        let json = r#"{"HeapMemoryUsage":{"used":100,"max":-1},"Flags":[true,null,"x"]}"#;
        let m: AttributeMap = serde_json::from_str(json).unwrap();
        let heap = m.map_attr("HeapMemoryUsage").unwrap();
        assert_eq!(heap.u64_attr("used").unwrap(), 100);
        let flags = m.attr("Flags").unwrap().as_seq().unwrap();
        assert_eq!(flags[0], AttributeValue::Bool(true));
        assert!(flags[1].is_null());
    }
}
