use crate::host::object::ObjectRef;
use std::sync::Arc;

/// A script value.
///
/// Objects are shared handles; two `Value::Object`s are equal only when they refer to the same
/// object.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  /// The `undefined` value.
  Undefined,
  /// The `null` value.
  Null,
  /// A boolean.
  Bool(bool),
  /// A number (IEEE-754 double).
  Number(f64),
  /// An immutable string.
  String(Arc<str>),
  /// An object; callable objects are functions.
  Object(ObjectRef),
}

impl Value {
  pub fn string(value: impl Into<Arc<str>>) -> Self {
    Value::String(value.into())
  }

  pub fn as_object(&self) -> Option<&ObjectRef> {
    match self {
      Value::Object(obj) => Some(obj),
      _ => None,
    }
  }

  pub fn is_callable(&self) -> bool {
    matches!(self, Value::Object(obj) if obj.is_callable())
  }

  /// The result of the `typeof` operator.
  pub fn type_of(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null => "object",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Object(obj) if obj.is_callable() => "function",
      Value::Object(_) => "object",
    }
  }

  /// `SameValue(x, y)`.
  ///
  /// This differs from `===` for Numbers:
  /// - `NaN` is the same as `NaN`
  /// - `+0` and `-0` are distinct
  pub fn same_value(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Number(a), Value::Number(b)) => {
        if a.is_nan() && b.is_nan() {
          return true;
        }
        if *a == 0.0 && *b == 0.0 {
          return a.to_bits() == b.to_bits();
        }
        a == b
      }
      _ => self == other,
    }
  }

  /// `IsStrictlyEqual(x, y)` (`===`). `NaN` is never strictly equal to itself.
  pub fn strict_equals(&self, other: &Value) -> bool {
    self == other
  }

  /// `ToBoolean`.
  pub fn is_truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0 && !n.is_nan(),
      Value::String(s) => !s.is_empty(),
      Value::Object(_) => true,
    }
  }

  /// `ToNumber`. Objects convert to `NaN` (there is no `ToPrimitive` hook).
  pub fn to_number(&self) -> f64 {
    match self {
      Value::Undefined => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(b) => f64::from(u8::from(*b)),
      Value::Number(n) => *n,
      Value::String(s) => string_to_number(s),
      Value::Object(_) => f64::NAN,
    }
  }

  /// `ToString`.
  pub fn to_js_string(&self) -> Arc<str> {
    match self {
      Value::Undefined => "undefined".into(),
      Value::Null => "null".into(),
      Value::Bool(true) => "true".into(),
      Value::Bool(false) => "false".into(),
      Value::Number(n) => number_to_string(*n).into(),
      Value::String(s) => s.clone(),
      Value::Object(obj) if obj.is_callable() => {
        let name = obj.name();
        format!(
          "function {name}() {{ [native code] }}",
          name = name.as_deref().unwrap_or("")
        )
        .into()
      }
      Value::Object(_) => "[object Object]".into(),
    }
  }
}

impl From<ObjectRef> for Value {
  fn from(value: ObjectRef) -> Self {
    Value::Object(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.into())
  }
}

fn string_to_number(s: &str) -> f64 {
  let s = s.trim();
  if s.is_empty() {
    return 0.0;
  }
  match s {
    "Infinity" | "+Infinity" => return f64::INFINITY,
    "-Infinity" => return f64::NEG_INFINITY,
    _ => {}
  }
  if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
    return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
  }
  // Rust accepts spellings such as `inf` and `nan` that ECMAScript does not.
  if !s
    .bytes()
    .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
  {
    return f64::NAN;
  }
  s.parse::<f64>().unwrap_or(f64::NAN)
}

fn number_to_string(n: f64) -> String {
  if n.is_nan() {
    return "NaN".to_string();
  }
  if n.is_infinite() {
    return if n.is_sign_negative() {
      "-Infinity".to_string()
    } else {
      "Infinity".to_string()
    };
  }
  if n == 0.0 {
    // `ToString(-0)` is `"0"`.
    return "0".to_string();
  }
  let abs = n.abs();
  if abs >= 1e21 || abs < 1e-6 {
    let formatted = format!("{n:e}");
    return match formatted.split_once('e') {
      Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
      _ => formatted,
    };
  }
  format!("{n}")
}
