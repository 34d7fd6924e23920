//! Editable view of a settings document.
//!
//! A loaded document is classified once into [`SettingValue`]s; the form
//! fields, their widgets and the coercion of edited text back into JSON all
//! follow from that classification, so the first load acts as the schema.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

use serde_json::{Number, Value};
use tracing::warn;

use crate::settings::SettingsDocument;

pub const MAX_THREADS: i64 = 4;
pub const MAX_PROFILES_CREATE: i64 = 10;
pub const MAX_THREADS_CONSISTENCY: i64 = 10;

/// Inclusive bounds for the integer settings the backend can only run in a
/// small range.
pub fn integer_bounds(key: &str) -> Option<RangeInclusive<i64>> {
  match key {
    "threads" => Some(1..=MAX_THREADS),
    "num_profiles" => Some(1..=MAX_PROFILES_CREATE),
    "score_check_threads" => Some(1..=MAX_THREADS_CONSISTENCY),
    _ => None,
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
  StringList(Vec<String>),
  Nested(Vec<(String, SettingValue)>),
  Unsupported(Value),
}

impl SettingValue {
  pub fn classify(value: &Value) -> Self {
    match value {
      Value::Bool(b) => SettingValue::Bool(*b),
      Value::Number(n) => {
        if let Some(i) = n.as_i64() {
          SettingValue::Int(i)
        } else if n.is_f64() {
          n.as_f64().map(SettingValue::Float).unwrap_or_else(|| SettingValue::Unsupported(value.clone()))
        } else {
          SettingValue::Unsupported(value.clone())
        }
      }
      Value::String(s) => SettingValue::Text(s.clone()),
      Value::Array(items) => match line_safe_strings(items) {
        Some(lines) => SettingValue::StringList(lines),
        None => SettingValue::Unsupported(value.clone()),
      },
      Value::Object(map) => SettingValue::Nested(
        map
          .iter()
          .map(|(key, value)| (key.clone(), SettingValue::classify(value)))
          .collect(),
      ),
      Value::Null => SettingValue::Unsupported(Value::Null),
    }
  }
}

/// A list survives one-entry-per-line editing only if every entry is a
/// trimmed, non-empty, single-line string.
fn line_safe_strings(items: &[Value]) -> Option<Vec<String>> {
  items
    .iter()
    .map(|item| {
      item
        .as_str()
        .filter(|s| !s.is_empty() && s.trim() == *s && !s.contains(['\n', '\r']))
        .map(str::to_owned)
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
  pub fn root() -> Self {
    Self::default()
  }

  pub fn new<I, S>(segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(segments.into_iter().map(Into::into).collect())
  }

  pub fn child(&self, key: &str) -> Self {
    let mut segments = self.0.clone();
    segments.push(key.to_string());
    Self(segments)
  }

  pub fn key(&self) -> &str {
    self.0.last().map(String::as_str).unwrap_or("")
  }

  pub fn depth(&self) -> usize {
    self.0.len().saturating_sub(1)
  }

  /// `"score_check_threads"` becomes `"Score Check Threads"`.
  pub fn label(&self) -> String {
    self
      .key()
      .split('_')
      .filter(|word| !word.is_empty())
      .map(|word| {
        let mut chars = word.chars();
        match chars.next() {
          Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
          None => String::new(),
        }
      })
      .collect::<Vec<_>>()
      .join(" ")
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0.join("."))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
  Toggle,
  Integer { bounds: Option<RangeInclusive<i64>> },
  Decimal,
  TextLine,
  MultiLine,
  ReadOnly,
}

/// What the user typed or toggled for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
  Toggle(bool),
  Text(String),
}

impl FieldInput {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      FieldInput::Text(text) => Some(text),
      FieldInput::Toggle(_) => None,
    }
  }
}

pub type FieldValues = HashMap<FieldPath, FieldInput>;

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
  pub path: FieldPath,
  pub label: String,
  pub widget: Widget,
  pub initial: FieldInput,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormItem {
  Section { path: FieldPath, label: String },
  Field(FormField),
}

impl FormItem {
  pub fn path(&self) -> &FieldPath {
    match self {
      FormItem::Section { path, .. } => path,
      FormItem::Field(field) => &field.path,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
  pub path: FieldPath,
  pub reason: String,
}

impl fmt::Display for ValidationWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Error processing field '{}': {}. Keeping original.", self.path, self.reason)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
  pub document: SettingsDocument,
  pub warnings: Vec<ValidationWarning>,
}

/// Renders a document into form items and rebuilds it from edited values.
/// `only` limits which top-level keys are rendered; the rest pass through
/// `collect` untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormBinder {
  only: Option<Vec<String>>,
}

impl FormBinder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn only(keys: &[&str]) -> Self {
    Self {
      only: Some(keys.iter().map(|k| k.to_string()).collect()),
    }
  }

  fn renders(&self, key: &str) -> bool {
    match &self.only {
      Some(keys) => keys.iter().any(|k| k == key),
      None => true,
    }
  }

  pub fn render(&self, document: &SettingsDocument) -> Vec<FormItem> {
    let mut items = Vec::new();
    let root = FieldPath::root();
    for (key, value) in document {
      if self.renders(key) {
        render_value(root.child(key), &SettingValue::classify(value), &mut items);
      }
    }
    items
  }

  pub fn collect(&self, original: &SettingsDocument, edits: &FieldValues) -> Collected {
    let mut warnings = Vec::new();
    let document = collect_map(original, &FieldPath::root(), edits, &mut warnings);
    Collected { document, warnings }
  }
}

/// The values a freshly rendered form starts with.
pub fn initial_values(items: &[FormItem]) -> FieldValues {
  items
    .iter()
    .filter_map(|item| match item {
      FormItem::Field(field) => Some((field.path.clone(), field.initial.clone())),
      FormItem::Section { .. } => None,
    })
    .collect()
}

fn render_value(path: FieldPath, value: &SettingValue, items: &mut Vec<FormItem>) {
  let (widget, initial) = match value {
    SettingValue::Nested(children) => {
      items.push(FormItem::Section { label: path.label(), path: path.clone() });
      for (key, child) in children {
        render_value(path.child(key), child, items);
      }
      return;
    }
    SettingValue::Bool(b) => (Widget::Toggle, FieldInput::Toggle(*b)),
    SettingValue::Int(i) => (Widget::Integer { bounds: integer_bounds(path.key()) }, FieldInput::Text(i.to_string())),
    SettingValue::Float(f) => (Widget::Decimal, FieldInput::Text(f.to_string())),
    SettingValue::Text(s) => (Widget::TextLine, FieldInput::Text(s.clone())),
    SettingValue::StringList(lines) => (Widget::MultiLine, FieldInput::Text(lines.join("\n"))),
    SettingValue::Unsupported(raw) => (Widget::ReadOnly, FieldInput::Text(raw.to_string())),
  };
  items.push(FormItem::Field(FormField {
    label: path.label(),
    path,
    widget,
    initial,
  }));
}

fn collect_map(
  original: &SettingsDocument,
  parent: &FieldPath,
  edits: &FieldValues,
  warnings: &mut Vec<ValidationWarning>,
) -> SettingsDocument {
  original
    .iter()
    .map(|(key, value)| {
      let path = parent.child(key);
      let rebuilt = match value {
        Value::Object(inner) => Value::Object(collect_map(inner, &path, edits, warnings)),
        leaf => match edits.get(&path) {
          None => leaf.clone(),
          Some(input) => coerce(&path, leaf, input).unwrap_or_else(|reason| {
            warn!(field = %path, %reason, "keeping original value");
            warnings.push(ValidationWarning { path: path.clone(), reason });
            leaf.clone()
          }),
        },
      };
      (key.clone(), rebuilt)
    })
    .collect()
}

/// Converts an edited value back to the original leaf's type.
fn coerce(path: &FieldPath, original: &Value, input: &FieldInput) -> Result<Value, String> {
  let text = || input.as_text().ok_or_else(|| "expected text input".to_string());
  match SettingValue::classify(original) {
    SettingValue::Bool(_) => match input {
      FieldInput::Toggle(b) => Ok(Value::Bool(*b)),
      FieldInput::Text(t) => parse_bool(t).map(Value::Bool).ok_or_else(|| format!("{:?} is not a boolean", t)),
    },
    SettingValue::Int(_) => {
      let raw = text()?.trim();
      let n: i64 = raw.parse().map_err(|_| format!("{:?} is not an integer", raw))?;
      // A value the backend already holds is kept even when out of bounds.
      if original.as_i64() == Some(n) {
        return Ok(original.clone());
      }
      if let Some(bounds) = integer_bounds(path.key()) {
        if !bounds.contains(&n) {
          return Err(format!("{} is outside {}..={}", n, bounds.start(), bounds.end()));
        }
      }
      Ok(Value::from(n))
    }
    SettingValue::Float(_) => {
      let raw = text()?.trim();
      let f: f64 = raw.parse().map_err(|_| format!("{:?} is not a number", raw))?;
      Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("{} is not a finite number", f))
    }
    SettingValue::Text(_) => Ok(Value::String(text()?.to_string())),
    SettingValue::StringList(_) => Ok(Value::Array(
      text()?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Value::String(line.to_string()))
        .collect(),
    )),
    SettingValue::Nested(_) | SettingValue::Unsupported(_) => Ok(original.clone()),
  }
}

fn parse_bool(text: &str) -> Option<bool> {
  match text.trim().to_ascii_lowercase().as_str() {
    "true" | "yes" | "1" | "on" => Some(true),
    "false" | "no" | "0" | "off" => Some(false),
    _ => None,
  }
}
