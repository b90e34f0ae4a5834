use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::instance::Template;

/// Host objects exposed to templates. Properties are read with `obj.name`.
pub trait Model: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Member lookup for `obj.name`. `None` reports "no such property".
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Iterable objects return their elements; they then map, separate
    /// and test like lists.
    fn elements(&self) -> Option<Vec<Value>> {
        None
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn as_any(&self) -> &dyn Any;
}

/// A value on the operand stack or bound to an attribute.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Map(Arc<IndexMap<String, Value>>),
    Template(Arc<Template>),
    Object(Arc<dyn Model>),
}

/// Runtime kind of a [`Value`], used for renderer/adaptor dispatch and
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Template,
    Object,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Template => "template",
            ValueKind::Object => "object",
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Arc::new(entries))
    }

    pub fn object<M: Model>(model: M) -> Self {
        Value::Object(Arc::new(model))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Template(_) => ValueKind::Template,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Object(m) => m.type_name(),
            other => other.kind().name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truth value for `if`: null, false and empty strings, lists or maps
    /// are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Object(m) => m.elements().map_or(true, |items| !items.is_empty()),
            Value::Int(_) | Value::Float(_) | Value::Template(_) => true,
        }
    }

    /// Elements when the value is iterable: list items, map keys, or the
    /// elements of an iterable object. Scalars return `None`.
    pub fn iterate(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.as_ref().clone()),
            Value::Map(map) => Some(map.keys().map(|k| Value::str(k)).collect()),
            Value::Object(m) => m.elements(),
            _ => None,
        }
    }

    /// View of the value as a sequence, treating a lone scalar as a
    /// one-element sequence and null as empty.
    pub fn as_sequence(&self) -> Vec<Value> {
        match self.iterate() {
            Some(items) => items,
            None if self.is_null() => Vec::new(),
            None => vec![self.clone()],
        }
    }

    /// Default textual form used when no renderer applies.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => items.iter().try_for_each(|v| write!(f, "{v}")),
            Value::Map(map) => map.keys().try_for_each(|k| f.write_str(k)),
            Value::Template(t) => write!(f, "{}", t.name()),
            Value::Object(m) => write!(f, "{m}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── Conversions ────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Template> for Value {
    fn from(t: Template) -> Self {
        Value::Template(Arc::new(t))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::list(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(fields) => Value::map(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Point {
        x: i64,
    }

    impl fmt::Display for Point {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "({})", self.x)
        }
    }

    impl Model for Point {
        fn property(&self, name: &str) -> Option<Value> {
            (name == "x").then(|| Value::Int(self.x))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(!Value::map(IndexMap::new()).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::list(vec![Value::Null]).is_truthy());
        assert!(Value::object(Point { x: 1 }).is_truthy());
    }

    #[test]
    fn map_iterates_keys() {
        let mut m = IndexMap::new();
        m.insert("b".to_string(), Value::Int(1));
        m.insert("a".to_string(), Value::Int(2));
        let keys = Value::map(m).iterate().unwrap_or_default();
        assert_eq!(keys, vec![Value::str("b"), Value::str("a")]);
    }

    #[test]
    fn scalar_is_single_element_sequence() {
        assert_eq!(Value::Int(3).as_sequence(), vec![Value::Int(3)]);
        assert!(Value::Null.as_sequence().is_empty());
    }

    #[test]
    fn from_json() {
        let json = serde_json::json!({"name": "x", "n": [1, 2.5, null, true]});
        let v = Value::from(json);
        let Value::Map(map) = v else {
            unreachable!("object converts to map")
        };
        assert_eq!(map.get("name"), Some(&Value::str("x")));
        assert_eq!(
            map.get("n"),
            Some(&Value::list(vec![Value::Int(1), Value::Float(2.5), Value::Null, Value::Bool(true)]))
        );
    }

    #[test]
    fn object_display_and_type_name() {
        let v = Value::object(Point { x: 4 });
        assert_eq!(v.to_text(), "(4)");
        assert!(v.type_name().ends_with("Point"));
    }
}
