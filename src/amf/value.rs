//! AMF value types
//!
//! Metadata travels as a small, closed set of dynamically typed values.
//! Objects keep their pairs in wire order; keys are not required to be unique.

/// Closed AMF0 value representation
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE 754 double-precision floating point (0x00)
    Number(f64),

    /// Boolean value (0x01)
    Boolean(bool),

    /// UTF-8 string (0x02, or 0x0C when longer than 0xFFFF bytes)
    String(String),

    /// Null value (0x05; undefined 0x06 decodes to this as well)
    Null,

    /// Key-value pairs in wire order (0x03; ECMA arrays 0x08 decode to this)
    Object(Vec<(String, AmfValue)>),

    /// Dense array (0x0A)
    Array(Vec<AmfValue>),
}

impl AmfValue {
    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as object pairs
    pub fn as_object(&self) -> Option<&[(String, AmfValue)]> {
        match self {
            AmfValue::Object(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Try to get this value as an array
    pub fn as_array(&self) -> Option<&[AmfValue]> {
        match self {
            AmfValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AmfValue::Null)
    }

    /// Get the first property with this key from an object value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Get a string property from an object value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a number property from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<i32> for AmfValue {
    fn from(v: i32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl<V: Into<AmfValue>> From<Vec<V>> for AmfValue {
    fn from(v: Vec<V>) -> Self {
        AmfValue::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = AmfValue::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let o = AmfValue::Object(vec![("key".into(), AmfValue::String("value".into()))]);
        assert_eq!(o.get_string("key"), Some("value"));
    }

    #[test]
    fn test_get_returns_first_duplicate_key() {
        let o = AmfValue::Object(vec![
            ("width".into(), AmfValue::Number(640.0)),
            ("width".into(), AmfValue::Number(1280.0)),
        ]);
        assert_eq!(o.get_number("width"), Some(640.0));
        assert_eq!(o.as_object().map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_from_conversions() {
        let v: AmfValue = "test".into();
        assert!(matches!(v, AmfValue::String(_)));

        let v: AmfValue = 42i32.into();
        assert_eq!(v, AmfValue::Number(42.0));

        let v: AmfValue = true.into();
        assert!(matches!(v, AmfValue::Boolean(true)));

        let v: AmfValue = vec![1.0f64, 2.0].into();
        assert_eq!(v.as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_get_on_non_object() {
        assert!(AmfValue::Null.get("key").is_none());
        assert!(AmfValue::Number(42.0).get("key").is_none());
        assert!(AmfValue::Array(vec![]).get("0").is_none());
    }

    #[test]
    fn test_default_value() {
        assert!(AmfValue::default().is_null());
    }
}
