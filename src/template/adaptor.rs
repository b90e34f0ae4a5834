use std::any::TypeId;
use std::fmt::Write as _;
use std::sync::Arc;

use super::value::{Model, Value, ValueKind};

/// Which values a renderer or adaptor applies to. When several registrations
/// match, the most specific one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// One concrete host [`Model`] type.
    Exact(TypeId),
    Kind(ValueKind),
    /// Integers and floats.
    Number,
    Any,
}

impl TypeKey {
    pub fn of<M: Model>() -> Self {
        TypeKey::Exact(TypeId::of::<M>())
    }

    fn specificity(self) -> u8 {
        match self {
            TypeKey::Exact(_) => 3,
            TypeKey::Kind(_) => 2,
            TypeKey::Number => 1,
            TypeKey::Any => 0,
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            TypeKey::Exact(id) => match value {
                Value::Object(m) => m.as_any().type_id() == id,
                _ => false,
            },
            TypeKey::Kind(kind) => value.kind() == kind,
            TypeKey::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            TypeKey::Any => !value.is_null(),
        }
    }
}

/// Formats a value for output, optionally driven by the `format` option.
pub trait AttributeRenderer: Send + Sync {
    fn render(&self, value: &Value, format: Option<&str>, locale: &str) -> String;
}

/// Resolves `obj.name` for values the built-in property rules don't cover,
/// or overrides them. `None` reports "no such property".
pub trait ModelAdaptor: Send + Sync {
    fn get_property(&self, value: &Value, property: &Value, name: &str) -> Option<Value>;
}

/// Registrations keyed by [`TypeKey`], looked up by most specific match.
/// Registering a key again replaces the earlier entry.
pub struct TypeRegistry<T: ?Sized> {
    entries: Vec<(TypeKey, Arc<T>)>,
}

impl<T: ?Sized> Default for TypeRegistry<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T: ?Sized> TypeRegistry<T> {
    pub fn register(&mut self, key: TypeKey, item: Arc<T>) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, item));
    }

    pub fn lookup(&self, value: &Value) -> Option<Arc<T>> {
        self.entries
            .iter()
            .filter(|(k, _)| k.matches(value))
            .max_by_key(|(k, _)| k.specificity())
            .map(|(_, item)| Arc::clone(item))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Clone for TypeRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

// ── Stock renderers ────────────────────────────────────────────────

/// String formats: `upper`, `lower`, `cap`, `url-encode`, `xml-encode`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringRenderer;

impl AttributeRenderer for StringRenderer {
    fn render(&self, value: &Value, format: Option<&str>, _locale: &str) -> String {
        let text = value.to_text();
        match format {
            Some("upper") => text.to_uppercase(),
            Some("lower") => text.to_lowercase(),
            Some("cap") => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => text,
                }
            }
            Some("url-encode") => url_encode(&text),
            Some("xml-encode") => xml_encode(&text),
            _ => text,
        }
    }
}

fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => out.push(char::from(b)),
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

fn xml_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// printf-style number formats such as `%d`, `%5d`, `%05.2f`, `%x`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberRenderer;

impl AttributeRenderer for NumberRenderer {
    fn render(&self, value: &Value, format: Option<&str>, _locale: &str) -> String {
        let Some(spec) = format.and_then(NumberFormat::parse) else {
            return value.to_text();
        };
        let body = match (value, spec.conversion) {
            (Value::Int(i), 'd') => i.to_string(),
            (Value::Float(x), 'd') => format!("{x:.0}"),
            (Value::Int(i), 'f') => format!("{:.*}", spec.precision.unwrap_or(6), *i as f64),
            (Value::Float(x), 'f') => format!("{x:.*}", spec.precision.unwrap_or(6)),
            (Value::Int(i), 'x') => format!("{i:x}"),
            (Value::Int(i), 'X') => format!("{i:X}"),
            (other, _) => other.to_text(),
        };
        let len = body.chars().count();
        if len >= spec.width {
            return body;
        }
        let pad = spec.width - len;
        if spec.zero_pad {
            match body.strip_prefix('-') {
                Some(digits) => format!("-{}{digits}", "0".repeat(pad)),
                None => format!("{}{body}", "0".repeat(pad)),
            }
        } else if spec.left_align {
            format!("{body}{}", " ".repeat(pad))
        } else {
            format!("{}{body}", " ".repeat(pad))
        }
    }
}

struct NumberFormat {
    left_align: bool,
    zero_pad: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

impl NumberFormat {
    fn parse(spec: &str) -> Option<Self> {
        let mut rest = spec.strip_prefix('%')?;
        let left_align = rest.starts_with('-');
        if left_align {
            rest = rest.get(1..)?;
        }
        let zero_pad = rest.starts_with('0');
        let conversion = rest.chars().last()?;
        let numbers = rest.get(..rest.len() - conversion.len_utf8())?;
        let (width, precision) = match numbers.split_once('.') {
            Some((w, p)) => (w, Some(p.parse().ok()?)),
            None => (numbers, None),
        };
        let width = if width.is_empty() { 0 } else { width.parse().ok()? };
        matches!(conversion, 'd' | 'f' | 'x' | 'X').then_some(Self {
            left_align,
            zero_pad,
            width,
            precision,
            conversion,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct User;

    impl fmt::Display for User {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("user")
        }
    }

    impl Model for User {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Fixed(&'static str);

    impl AttributeRenderer for Fixed {
        fn render(&self, _: &Value, _: Option<&str>, _: &str) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn most_specific_registration_wins() {
        let mut reg: TypeRegistry<dyn AttributeRenderer> = TypeRegistry::default();
        reg.register(TypeKey::Any, Arc::new(Fixed("any")));
        reg.register(TypeKey::Number, Arc::new(Fixed("number")));
        reg.register(TypeKey::Kind(ValueKind::Int), Arc::new(Fixed("int")));
        reg.register(TypeKey::of::<User>(), Arc::new(Fixed("user")));

        let render = |v: &Value| reg.lookup(v).map(|r| r.render(v, None, "en"));
        assert_eq!(render(&Value::Int(1)).as_deref(), Some("int"));
        assert_eq!(render(&Value::Float(1.5)).as_deref(), Some("number"));
        assert_eq!(render(&Value::str("s")).as_deref(), Some("any"));
        assert_eq!(render(&Value::object(User)).as_deref(), Some("user"));
        assert!(reg.lookup(&Value::Null).is_none());
    }

    #[test]
    fn string_formats() {
        let r = StringRenderer;
        let v = Value::str("hello world <&>");
        assert_eq!(r.render(&v, Some("upper"), "en"), "HELLO WORLD <&>");
        assert_eq!(r.render(&Value::str("abc"), Some("cap"), "en"), "Abc");
        assert_eq!(r.render(&v, Some("xml-encode"), "en"), "hello world &lt;&amp;&gt;");
        assert_eq!(r.render(&Value::str("a b/c"), Some("url-encode"), "en"), "a+b%2Fc");
        assert_eq!(r.render(&v, None, "en"), "hello world <&>");
    }

    #[test]
    fn number_formats() {
        let r = NumberRenderer;
        assert_eq!(r.render(&Value::Int(42), Some("%5d"), "en"), "   42");
        assert_eq!(r.render(&Value::Int(-7), Some("%04d"), "en"), "-007");
        assert_eq!(r.render(&Value::Float(1.23456), Some("%.2f"), "en"), "1.23");
        assert_eq!(r.render(&Value::Int(255), Some("%x"), "en"), "ff");
        assert_eq!(r.render(&Value::Int(3), Some("%-3d"), "en"), "3  ");
        assert_eq!(r.render(&Value::Int(3), Some("bogus"), "en"), "3");
    }
}
