//! Type coercion kernel (ES5 §9)
//!
//! Every coercion except ToBoolean may call user code through
//! `valueOf`/`toString` and therefore re-enter the executor. Callers keep
//! operand values on the value stack across these calls.

use super::Vm;
use crate::error::{ErrorKind, OpResult};
use crate::value::Value;

use std::rc::Rc;

const TWO_POW_32: f64 = 4294967296.0;

/// ToPrimitive hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveHint {
    None,
    Number,
    String,
}

impl Vm {
    /// ToBoolean. Pure; never calls user code.
    pub(crate) fn to_boolean(&self, value: &Value) -> bool {
        match value {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(x) => *x != 0.0 && !x.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Buffer(_) | Value::LightFunc(_) => true,
        }
    }

    /// ToNumber.
    pub(crate) fn to_number(&mut self, value: &Value) -> OpResult<f64> {
        match value {
            Value::Undefined => Ok(f64::NAN),
            Value::Null => Ok(0.0),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Number(x) => Ok(*x),
            Value::String(s) => Ok(number_from_str(s)),
            Value::Buffer(b) => Ok(number_from_str(&String::from_utf8_lossy(b))),
            Value::LightFunc(_) => Ok(f64::NAN),
            Value::Object(_) => {
                let prim = self.to_primitive(value, PrimitiveHint::Number)?;
                debug_assert!(!prim.is_object());
                self.to_number(&prim)
            }
        }
    }

    /// ToInt32 (ES5 §9.5): ToNumber, discard non-finite, truncate, reduce
    /// mod 2^32, map into the signed range.
    pub(crate) fn to_int32(&mut self, value: &Value) -> OpResult<i32> {
        Ok(self.to_uint32(value)? as i32)
    }

    /// ToUint32 (ES5 §9.6).
    pub(crate) fn to_uint32(&mut self, value: &Value) -> OpResult<u32> {
        let x = self.to_number(value)?;
        if x.is_nan() || x.is_infinite() {
            return Ok(0);
        }
        let mut m = x.trunc() % TWO_POW_32;
        if m < 0.0 {
            m += TWO_POW_32;
        }
        // m is now an exact integer in [0, 2^32); the cast cannot saturate
        // except at exactly 2^32, which the modulo excludes.
        Ok(m as u32)
    }

    /// ToString.
    pub(crate) fn to_string_value(&mut self, value: &Value) -> OpResult<Rc<str>> {
        match value {
            Value::Object(_) => {
                let prim = self.to_primitive(value, PrimitiveHint::String)?;
                Ok(prim.primitive_string())
            }
            other => Ok(other.primitive_string()),
        }
    }

    /// ToPrimitive. Objects consult `valueOf`/`toString` in hint order and
    /// may run arbitrary user code.
    pub(crate) fn to_primitive(&mut self, value: &Value, hint: PrimitiveHint) -> OpResult<Value> {
        let id = match value {
            Value::Object(id) => *id,
            other => return Ok(other.clone()),
        };

        let methods: [&str; 2] = match hint {
            PrimitiveHint::String => ["toString", "valueOf"],
            // NONE behaves like NUMBER for every object class here (no
            // Date exotic ordering).
            PrimitiveHint::None | PrimitiveHint::Number => ["valueOf", "toString"],
        };

        for name in methods {
            let method = self.get_prop(&Value::Object(id), &Value::string(name))?;
            if self.is_callable_value(&method) {
                let result = self.call_value(method, value.clone(), &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }

        Err(self.throw(ErrorKind::Type, "cannot coerce object to primitive"))
    }

    /// ToObject. Nullish values throw; other primitives get an empty
    /// wrapper without exotic behavior.
    pub(crate) fn to_object(&mut self, value: &Value) -> OpResult<crate::object::ObjectId> {
        match value {
            Value::Object(id) => Ok(*id),
            Value::Undefined | Value::Null => {
                Err(self.throw(ErrorKind::Type, "cannot convert undefined or null to object"))
            }
            _ => Ok(self.new_object()),
        }
    }
}

/// String-to-number per ES5 §9.3.1: optional whitespace, then a decimal
/// literal, `Infinity`, or an unsigned hex literal. Anything else is NaN;
/// an empty or all-whitespace string is +0.
pub(crate) fn number_from_str(s: &str) -> f64 {
    let t = s.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if t.is_empty() {
        return 0.0;
    }

    // Hex form admits no sign and no exponent.
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return f64::NAN;
        }
        return hex
            .bytes()
            .fold(0.0f64, |acc, b| acc * 16.0 + (b as char).to_digit(16).unwrap() as f64);
    }

    let (sign, rest) = match t.as_bytes()[0] {
        b'+' => (1.0, &t[1..]),
        b'-' => (-1.0, &t[1..]),
        _ => (1.0, t),
    };

    if rest == "Infinity" {
        return sign * f64::INFINITY;
    }

    // Validate against the StrDecimalLiteral grammar before delegating to
    // the float parser; Rust's parser accepts forms JS does not ("inf",
    // "nan", underscores are already excluded by the digit checks).
    if !is_decimal_literal(rest) {
        return f64::NAN;
    }

    match rest.parse::<f64>() {
        Ok(x) => sign * x,
        Err(_) => f64::NAN,
    }
}

fn is_decimal_literal(s: &str) -> bool {
    let b = s.as_bytes();
    let mut i = 0;

    let digits = |i: &mut usize| {
        let start = *i;
        while *i < b.len() && b[*i].is_ascii_digit() {
            *i += 1;
        }
        *i > start
    };

    let int_digits = digits(&mut i);
    let mut frac_digits = false;
    if i < b.len() && b[i] == b'.' {
        i += 1;
        frac_digits = digits(&mut i);
    }
    if !int_digits && !frac_digits {
        return false;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        i += 1;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }
        if !digits(&mut i) {
            return false;
        }
    }
    i == b.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", 0.0; "empty string is plus zero")]
    #[test_case("  \t\n ", 0.0; "whitespace only")]
    #[test_case("42", 42.0; "plain integer")]
    #[test_case("-1.5", -1.5; "negative fraction")]
    #[test_case(".5", 0.5; "leading dot")]
    #[test_case("1.", 1.0; "trailing dot")]
    #[test_case("1e3", 1000.0; "exponent")]
    #[test_case("0x10", 16.0; "hex")]
    #[test_case("  0xff  ", 255.0; "hex with whitespace")]
    fn string_to_number(input: &str, expected: f64) {
        assert_eq!(number_from_str(input), expected);
    }

    #[test_case("-0x10"; "signed hex")]
    #[test_case("0x"; "bare hex prefix")]
    #[test_case("1px"; "trailing garbage")]
    #[test_case("e5"; "bare exponent")]
    #[test_case("inf"; "rust infinity spelling")]
    #[test_case("NaN"; "nan spelling is not numeric")]
    #[test_case("1 2"; "interior whitespace")]
    fn string_to_number_rejects(input: &str) {
        assert!(number_from_str(input).is_nan());
    }

    #[test]
    fn infinity_spelling() {
        assert_eq!(number_from_str("Infinity"), f64::INFINITY);
        assert_eq!(number_from_str("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(number_from_str("+Infinity"), f64::INFINITY);
    }

    #[test]
    fn uint32_reduction() {
        let mut vm = Vm::new();
        assert_eq!(vm.to_uint32(&Value::number(-1.0)).unwrap(), u32::MAX);
        assert_eq!(vm.to_uint32(&Value::number(TWO_POW_32 + 5.0)).unwrap(), 5);
        assert_eq!(vm.to_uint32(&Value::number(f64::INFINITY)).unwrap(), 0);
        assert_eq!(vm.to_int32(&Value::number(2147483648.0)).unwrap(), i32::MIN);
    }
}
