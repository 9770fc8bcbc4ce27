//! Loggable values and their terminal rendering.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use colored::Color;

use crate::{color::paint, error::FormatError};

/// Shown in place of a structure that cannot be serialized.
pub const CIRCULAR_SENTINEL: &str = "[Circular Object]";

/// A node that can be referenced from several places, including itself.
pub type SharedValue = Arc<Mutex<Value>>;

/// Anything that can be passed to a log call.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// No value at all, as opposed to an explicit null.
    Absent,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Sequence(Vec<Value>),
    /// Ordered key/value pairs.
    Mapping(Vec<(String, Value)>),
    /// Textual form of a function or closure.
    Callable(String),
    Shared(SharedValue),
    Other(String),
}

impl Value {
    pub fn shared(value: Value) -> SharedValue {
        Arc::new(Mutex::new(value))
    }

    pub fn sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }

    pub fn mapping<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn callable(source: impl Into<String>) -> Self {
        Value::Callable(source.into())
    }

    /// Converts the value to JSON, failing on cycles through shared nodes.
    pub fn to_json(&self) -> Result<serde_json::Value, FormatError> {
        self.to_json_inner(&mut Vec::new())
    }

    fn to_json_inner(
        &self,
        visiting: &mut Vec<*const Mutex<Value>>,
    ) -> Result<serde_json::Value, FormatError> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::Null | Value::Absent | Value::Callable(_) => Json::Null,
            Value::Text(text) | Value::Other(text) => Json::String(text.clone()),
            Value::Integer(n) => Json::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Boolean(b) => Json::Bool(*b),
            Value::Sequence(items) => Json::Array(
                items
                    .iter()
                    .map(|item| item.to_json_inner(visiting))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(entries) => {
                let mut map = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    // absent members and functions are dropped from objects
                    if matches!(value, Value::Absent | Value::Callable(_)) {
                        continue;
                    }
                    map.insert(key.clone(), value.to_json_inner(visiting)?);
                }
                Json::Object(map)
            }
            Value::Shared(node) => {
                let ptr = Arc::as_ptr(node);
                if visiting.contains(&ptr) {
                    return Err(FormatError::SerializationFailure(
                        "circular structure".into(),
                    ));
                }
                // no node lock is held while descending
                let inner = node
                    .lock()
                    .map(|guard| Value::clone(&guard))
                    .map_err(|_| FormatError::SerializationFailure("poisoned node".into()))?;
                visiting.push(ptr);
                let json = inner.to_json_inner(visiting);
                visiting.pop();
                json?
            }
        })
    }

    /// Plain, uncolored text form used for files and for joining arguments.
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Absent => "undefined".into(),
            Value::Text(text) | Value::Other(text) | Value::Callable(text) => text.clone(),
            Value::Integer(n) => n.to_string(),
            Value::Float(n) => format_float(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Sequence(_) | Value::Mapping(_) | Value::Shared(_) => pretty_json(self)
                .unwrap_or_else(|_| CIRCULAR_SENTINEL.to_string()),
        }
    }
}

fn pretty_json(value: &Value) -> Result<String, FormatError> {
    let json = value.to_json()?;
    Ok(serde_json::to_string_pretty(&json)?)
}

fn format_float(n: f64) -> String {
    if n.is_infinite() && n > 0.0 {
        "Infinity".to_string()
    } else if n.is_infinite() {
        "-Infinity".to_string()
    } else {
        n.to_string()
    }
}

/// Renders a value for the screen, colored by kind.
pub fn render(value: &Value, colors: bool) -> String {
    match value {
        Value::Null => paint("null", Color::Red, colors),
        Value::Absent => paint("undefined", Color::BrightBlack, colors),
        Value::Text(text) | Value::Other(text) => text.clone(),
        Value::Integer(n) => paint(&n.to_string(), Color::Blue, colors),
        Value::Float(n) => paint(&format_float(*n), Color::Blue, colors),
        Value::Boolean(true) => paint("true", Color::Green, colors),
        Value::Boolean(false) => paint("false", Color::Red, colors),
        Value::Sequence(_) => render_structure(value, Color::Yellow, colors),
        Value::Mapping(_) => render_structure(value, Color::Magenta, colors),
        Value::Callable(source) => {
            let first_line = source.lines().next().unwrap_or_default();
            paint(&format!("{first_line}..."), Color::Cyan, colors)
        }
        Value::Shared(node) => {
            let Some(inner) = resolve_shared(node) else {
                return paint(CIRCULAR_SENTINEL, Color::Red, colors);
            };
            match inner {
                Value::Sequence(_) => render_structure(value, Color::Yellow, colors),
                Value::Mapping(_) => render_structure(value, Color::Magenta, colors),
                scalar => render(&scalar, colors),
            }
        }
    }
}

/// Follows a chain of shared nodes to the first non-shared value. `None` when
/// the chain loops or a node is poisoned.
fn resolve_shared(node: &SharedValue) -> Option<Value> {
    let mut visited = vec![Arc::as_ptr(node)];
    let mut inner = node.lock().ok().map(|guard| Value::clone(&guard))?;
    while let Value::Shared(next) = &inner {
        let ptr = Arc::as_ptr(next);
        if visited.contains(&ptr) {
            return None;
        }
        visited.push(ptr);
        let resolved = next.lock().ok().map(|guard| Value::clone(&guard))?;
        inner = resolved;
    }
    Some(inner)
}

fn render_structure(value: &Value, color: Color, colors: bool) -> String {
    match pretty_json(value) {
        Ok(json) => paint(&json, color, colors),
        Err(_) => paint(CIRCULAR_SENTINEL, Color::Red, colors),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<&String> for Value {
    fn from(text: &String) -> Self {
        Value::Text(text.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Integer(i64::from(n))
            }
        })*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        i64::try_from(n)
            .map(Value::Integer)
            .unwrap_or(Value::Float(n as f64))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::from(n as u64)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(f64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<SharedValue> for Value {
    fn from(node: SharedValue) -> Self {
        Value::Shared(node)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(b),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::sequence(items),
            Json::Object(map) => Value::mapping(map),
        }
    }
}

/// Arguments of a single log call.
///
/// One argument keeps its kind; several are joined into text.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn joined(&self, join: &str) -> String {
        self.0
            .iter()
            .map(Value::stringify)
            .collect::<Vec<_>>()
            .join(join)
    }

    pub fn into_payload(mut self, join: &str) -> Value {
        if self.0.len() == 1 {
            if let Some(value) = self.0.pop() {
                return value;
            }
        }
        Value::Text(self.joined(join))
    }
}

macro_rules! impl_args_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Args {
            fn from(value: $t) -> Self {
                Args(vec![Value::from(value)])
            }
        })*
    };
}

impl_args_from!(
    &str, String, &String, bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64,
    SharedValue, serde_json::Value
);

impl From<Value> for Args {
    fn from(value: Value) -> Self {
        Args(vec![value])
    }
}

impl<T: Into<Value>> From<Option<T>> for Args {
    fn from(value: Option<T>) -> Self {
        Args(vec![Value::from(value)])
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Args(values)
    }
}
