//! Session variable bag and template interpolation
//!
//! Variables are tagged scalars (string, number, bool, array, object) keyed
//! by identifier. Templates reference them as `{{name}}` or with a path,
//! `{{order.items[0].name}}`. A token whose path does not resolve renders as
//! itself, verbatim, so authors can see exactly which reference was wrong.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A variable value. Serialized untagged, so the bag round-trips as plain
/// JSON in the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<VarValue>),
    Object(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// Render for interpolation. Whole numbers drop the trailing `.0`.
    pub fn render(&self) -> String {
        match self {
            VarValue::Null => String::new(),
            VarValue::Bool(b) => b.to_string(),
            VarValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            VarValue::String(s) => s.clone(),
            VarValue::Array(items) => items
                .iter()
                .map(VarValue::render)
                .collect::<Vec<_>>()
                .join(", "),
            VarValue::Object(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    pub fn as_array(&self) -> Option<&[VarValue]> {
        match self {
            VarValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn from_json(value: &Value) -> VarValue {
        match value {
            Value::Null => VarValue::Null,
            Value::Bool(b) => VarValue::Bool(*b),
            Value::Number(n) => VarValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => VarValue::String(s.clone()),
            Value::Array(items) => VarValue::Array(items.iter().map(VarValue::from_json).collect()),
            Value::Object(map) => VarValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), VarValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::String(value.to_string())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        VarValue::String(value)
    }
}

/// One segment of a parsed variable path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse `a.b[0].c` into segments. Returns `None` for malformed paths
/// (empty keys, unterminated brackets, non-numeric indexes).
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let mut rest = part;
        // Leading key before any bracket.
        let bracket = rest.find('[').unwrap_or(rest.len());
        let key = &rest[..bracket];
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        } else if bracket != 0 {
            return None;
        }
        rest = &rest[bracket..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']')?;
            let index: usize = stripped[..close].parse().ok()?;
            segments.push(PathSegment::Index(index));
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Walk a JSON value by parsed path. Used by the api/sql/commerce nodes to
/// map response fields into variables.
pub fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path)?;
    let mut current = value;
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => current.get(key.as_str())?,
            PathSegment::Index(index) => current.get(index)?,
        };
    }
    Some(current)
}

/// The per-session variable bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableBag {
    values: BTreeMap<String, VarValue>,
}

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
static TOKEN: OnceLock<Regex> = OnceLock::new();

fn identifier_re() -> &'static Regex {
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

fn token_re() -> &'static Regex {
    TOKEN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\[\]]+)\s*\}\}").expect("valid regex")
    })
}

impl VariableBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable. Names that are not valid identifiers are refused;
    /// internal names (leading `_`) are reserved for the engine and pass.
    pub fn set(&mut self, name: &str, value: VarValue) -> bool {
        let accepted =
            identifier_re().is_match(name) || (name.starts_with('_') && name.len() > 1);
        if accepted {
            self.values.insert(name.to_string(), value);
        }
        accepted
    }

    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<VarValue> {
        self.values.remove(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Resolve a dotted/bracketed path against the bag.
    pub fn resolve_path(&self, path: &str) -> Option<VarValue> {
        let segments = parse_path(path)?;
        let mut iter = segments.into_iter();
        let PathSegment::Key(root) = iter.next()? else {
            return None;
        };
        let mut current = self.values.get(&root)?.clone();
        for segment in iter {
            current = match (&current, &segment) {
                (VarValue::Array(items), PathSegment::Index(index)) => {
                    items.get(*index)?.clone()
                }
                (VarValue::Object(map), PathSegment::Key(key)) => map.get(key)?.clone(),
                _ => return None,
            };
        }
        Some(current)
    }

    /// JSON form for the session store.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_json(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Interpolate `{{path}}` tokens against the bag. Unresolvable tokens stay
/// in place verbatim.
pub fn interpolate(template: &str, bag: &VariableBag) -> String {
    token_re()
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            match bag.resolve_path(path) {
                Some(value) => value.render(),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

/// Whether a template references `last_input` or its alias.
pub fn references_last_input(template: &str) -> bool {
    token_re()
        .captures_iter(template)
        .any(|caps| matches!(&caps[1], "last_input" | "last_response"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag() -> VariableBag {
        let mut bag = VariableBag::new();
        bag.set("name", VarValue::from("Maria"));
        bag.set("count", VarValue::Number(3.0));
        bag.set(
            "items",
            VarValue::Array(vec![VarValue::from("first"), VarValue::from("second")]),
        );
        let mut order = BTreeMap::new();
        order.insert("id".to_string(), VarValue::from("A-1"));
        order.insert(
            "lines".to_string(),
            VarValue::Array(vec![VarValue::from("pasta")]),
        );
        bag.set("order", VarValue::Object(order));
        bag
    }

    #[test]
    fn simple_interpolation() {
        assert_eq!(interpolate("Hi {{name}}!", &bag()), "Hi Maria!");
        assert_eq!(interpolate("{{count}} items", &bag()), "3 items");
    }

    #[test]
    fn path_interpolation() {
        assert_eq!(interpolate("{{items[1]}}", &bag()), "second");
        assert_eq!(interpolate("{{order.id}}", &bag()), "A-1");
        assert_eq!(interpolate("{{order.lines[0]}}", &bag()), "pasta");
    }

    #[test]
    fn missing_token_is_preserved_verbatim() {
        assert_eq!(
            interpolate("Hi {{nickname}}!", &bag()),
            "Hi {{nickname}}!"
        );
        assert_eq!(interpolate("{{items[9]}}", &bag()), "{{items[9]}}");
        assert_eq!(interpolate("{{order.missing}}", &bag()), "{{order.missing}}");
    }

    #[test]
    fn invalid_identifiers_are_refused() {
        let mut bag = VariableBag::new();
        assert!(!bag.set("9name", VarValue::from("x")));
        assert!(!bag.set("a b", VarValue::from("x")));
        assert!(bag.set("_pendingButtons", VarValue::from("x")));
        assert!(bag.set("valid_name", VarValue::from("x")));
    }

    #[test]
    fn parse_path_rejects_malformed() {
        assert!(parse_path("a..b").is_none());
        assert!(parse_path("a[x]").is_none());
        assert!(parse_path("a[1").is_none());
        assert!(parse_path("").is_none());
        assert_eq!(
            parse_path("a.b[2]").unwrap(),
            vec![
                PathSegment::Key("a".to_string()),
                PathSegment::Key("b".to_string()),
                PathSegment::Index(2)
            ]
        );
    }

    #[test]
    fn json_path_walks_values() {
        let value = serde_json::json!({ "data": { "rows": [{ "name": "x" }] } });
        assert_eq!(
            json_path(&value, "data.rows[0].name"),
            Some(&Value::String("x".to_string()))
        );
        assert!(json_path(&value, "data.rows[3]").is_none());
    }

    #[test]
    fn bag_round_trips_through_json() {
        let original = bag();
        let restored = VariableBag::from_json(&original.to_json());
        assert_eq!(original, restored);
    }

    #[test]
    fn last_input_reference_detection() {
        assert!(references_last_input("{{last_input}}"));
        assert!(references_last_input("Echo: {{ last_response }}"));
        assert!(!references_last_input("{{name}}"));
    }

    #[test]
    fn whole_numbers_render_without_decimal() {
        assert_eq!(VarValue::Number(42.0).render(), "42");
        assert_eq!(VarValue::Number(1.5).render(), "1.5");
    }
}
