//! Host view of simulator values and the language's conversions.

use std::cmp::Ordering;
use std::fmt;

use plinth_core::layout::{is_smi, oddball, oddball_kind, smi_to_int};
use plinth_core::module::FunctionId;

use crate::heap::Heap;

/// A decoded simulator word.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Smi(i32),
    /// A boxed number.
    Number(f64),
    String(String),
    /// Raw tagged word of a plain object.
    Object(u32),
    /// Raw tagged word of an array.
    Array(u32),
    Function(FunctionId),
    Hole,
}

impl Value {
    /// Numeric value regardless of boxing.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Smi(v) => Some(f64::from(v)),
            Value::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Smi(v) => write!(f, "{v}"),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{s}"),
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Array(_) => write!(f, "[object Array]"),
            Value::Function(id) => write!(f, "function#{id}"),
            Value::Hole => write!(f, "<hole>"),
        }
    }
}

/// Number formatting as `String(n)` produces it.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n == 0.0 {
        return "0".into();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{n}");
    }
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

/// `Number(s)`: surrounding whitespace ignored, empty is zero.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Array index named by a property key, if any.
pub fn array_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    name.parse().ok()
}

impl Heap {
    pub fn oddball_kind(&self, word: u32) -> Option<u32> {
        if self.instance_type(word) != Some(plinth_core::layout::instance_type::ODDBALL) {
            return None;
        }
        self.read_field(word, oddball::KIND_OFFSET).ok()
    }

    pub fn is_nullish(&self, word: u32) -> bool {
        matches!(
            self.oddball_kind(word),
            Some(oddball_kind::UNDEFINED | oddball_kind::NULL)
        )
    }

    pub fn describe(&self, word: u32) -> Value {
        if is_smi(word) {
            return Value::Smi(smi_to_int(word));
        }
        if let Some(kind) = self.oddball_kind(word) {
            return match kind {
                oddball_kind::UNDEFINED => Value::Undefined,
                oddball_kind::NULL => Value::Null,
                oddball_kind::TRUE => Value::Bool(true),
                oddball_kind::FALSE => Value::Bool(false),
                _ => Value::Hole,
            };
        }
        if let Some(n) = self.number_value(word) {
            return Value::Number(n);
        }
        if let Ok(s) = self.string_value(word) {
            return Value::String(s.to_string());
        }
        if self.is_function(word) {
            if let Ok(id) = self.function_id(word) {
                return Value::Function(id);
            }
        }
        if self.is_array(word) {
            return Value::Array(word);
        }
        Value::Object(word)
    }

    pub fn to_boolean(&self, word: u32) -> bool {
        if is_smi(word) {
            return smi_to_int(word) != 0;
        }
        if let Some(kind) = self.oddball_kind(word) {
            return kind == oddball_kind::TRUE;
        }
        if let Some(n) = self.number_value(word) {
            return !(n == 0.0 || n.is_nan());
        }
        if let Ok(s) = self.string_value(word) {
            return !s.is_empty();
        }
        !self.is_undetectable(word)
    }

    pub fn to_number(&self, word: u32) -> f64 {
        if let Some(n) = self.number_value(word) {
            return n;
        }
        match self.oddball_kind(word) {
            Some(oddball_kind::NULL | oddball_kind::FALSE) => 0.0,
            Some(oddball_kind::TRUE) => 1.0,
            Some(_) => f64::NAN,
            None => string_to_number(&self.to_display_string(word)),
        }
    }

    /// `String(value)` for values that need no user code to convert.
    pub fn to_display_string(&self, word: u32) -> String {
        self.to_display_string_at(word, 0)
    }

    fn to_display_string_at(&self, word: u32, depth: usize) -> String {
        if let Ok(s) = self.string_value(word) {
            return s.to_string();
        }
        if self.is_array(word) {
            if depth > 8 {
                return String::new();
            }
            let length = self.array_length(word).unwrap_or(0);
            return (0..length)
                .map(|i| match self.array_get(word, i) {
                    Ok(Some(element))
                        if !self.is_nullish(element)
                            && self.oddball_kind(element) != Some(oddball_kind::THE_HOLE) =>
                    {
                        self.to_display_string_at(element, depth + 1)
                    }
                    _ => String::new(),
                })
                .collect::<Vec<_>>()
                .join(",");
        }
        if self.is_function(word) {
            return "function () { [compiled code] }".into();
        }
        match self.describe(word) {
            Value::Undefined | Value::Hole => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Smi(v) => v.to_string(),
            Value::Number(n) => number_to_string(n),
            _ => "[object Object]".into(),
        }
    }

    /// The `typeof` string.
    pub fn typeof_name(&self, word: u32) -> &'static str {
        if is_smi(word) || self.is_heap_number(word) {
            return "number";
        }
        if self.is_string(word) {
            return "string";
        }
        match self.oddball_kind(word) {
            Some(oddball_kind::NULL) => return "object",
            Some(oddball_kind::TRUE | oddball_kind::FALSE) => return "boolean",
            Some(_) => return "undefined",
            None => {}
        }
        if self.is_function(word) {
            "function"
        } else if self.is_undetectable(word) {
            "undefined"
        } else {
            "object"
        }
    }

    pub fn is_number(&self, word: u32) -> bool {
        is_smi(word) || self.is_heap_number(word)
    }

    /// `===`.
    pub fn strict_equals(&self, a: u32, b: u32) -> bool {
        if self.is_number(a) && self.is_number(b) {
            return self.to_number(a) == self.to_number(b);
        }
        if let (Ok(x), Ok(y)) = (self.string_value(a), self.string_value(b)) {
            return x == y;
        }
        a == b
    }

    fn is_null_like(&self, word: u32) -> bool {
        self.is_nullish(word) || (self.is_js_object(word) && self.is_undetectable(word))
    }

    fn is_boolean(&self, word: u32) -> bool {
        matches!(
            self.oddball_kind(word),
            Some(oddball_kind::TRUE | oddball_kind::FALSE)
        )
    }

    /// `==`. Objects convert to primitives through their string form.
    pub fn loose_equals(&self, a: u32, b: u32) -> bool {
        if self.is_null_like(a) || self.is_null_like(b) {
            return self.is_null_like(a) && self.is_null_like(b);
        }
        if self.is_js_object(a) && self.is_js_object(b) {
            return a == b;
        }
        if self.is_string(a) && self.is_string(b) {
            return self.strict_equals(a, b);
        }
        let primitive_string = |w: u32| self.is_js_object(w) || self.is_string(w);
        if primitive_string(a) && primitive_string(b) {
            return self.to_display_string(a) == self.to_display_string(b);
        }
        if self.is_boolean(a) || self.is_boolean(b) || self.is_number(a) || self.is_number(b) {
            return self.to_number(a) == self.to_number(b);
        }
        a == b
    }

    /// Relational comparison; `None` when either side is NaN.
    pub fn compare(&self, a: u32, b: u32) -> Option<Ordering> {
        let as_string = |w: u32| self.is_string(w) || self.is_js_object(w);
        if as_string(a) && as_string(b) {
            return Some(self.to_display_string(a).cmp(&self.to_display_string(b)));
        }
        self.to_number(a).partial_cmp(&self.to_number(b))
    }

    /// Internal class name, or `None` for non-objects.
    pub fn class_of(&self, word: u32) -> Option<&'static str> {
        if self.is_function(word) {
            Some("Function")
        } else if self.is_array(word) {
            Some("Array")
        } else if self.is_js_object(word) {
            Some("Object")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(64 << 10, 4 << 10).expect("heap")
    }

    #[test]
    fn numbers_print_like_the_language() {
        assert_eq!(number_to_string(5.0), "5");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(1073741824.0), "1073741824");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }

    #[test]
    fn strings_convert_to_numbers() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("abc").is_nan());
        assert!(string_to_number("inf").is_nan());
    }

    #[test]
    fn int32_wraps_modulo_two_to_the_32() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_uint32(-1.0), u32::MAX);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn undetectable_objects_are_loosely_null() {
        let mut heap = heap();
        let u = heap.alloc_undetectable().unwrap();
        let null = heap.null();
        let undefined = heap.undefined();
        assert!(heap.loose_equals(u, null));
        assert!(heap.loose_equals(undefined, u));
        assert!(!heap.strict_equals(u, null));
        assert_eq!(heap.typeof_name(u), "undefined");
        assert!(!heap.to_boolean(u));
    }

    #[test]
    fn loose_equality_converts_numbers_and_strings() {
        let mut heap = heap();
        let one = plinth_core::layout::smi_from_int(1);
        let s = heap.alloc_string("1").unwrap();
        let t = heap.boolean(true);
        assert!(heap.loose_equals(one, s));
        assert!(heap.loose_equals(t, one));
        assert!(!heap.strict_equals(one, s));
        let boxed = heap.alloc_heap_number(1.0).unwrap();
        assert!(heap.strict_equals(one, boxed));
    }

    #[test]
    fn array_indices_reject_leading_zeros() {
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("012"), None);
        assert_eq!(array_index("x"), None);
    }
}
