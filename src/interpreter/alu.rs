//! Arithmetic, bitwise, and comparison contracts (ES5 §11)

use super::coercion::PrimitiveHint;
use super::Vm;
use crate::error::OpResult;
use crate::value::Value;

impl Vm {
    /// The additive operator. Numeric fast path first; otherwise both
    /// operands go through ToPrimitive (left first), and a string-or-buffer
    /// on either side forces concatenation. Buffers coerce to strings in
    /// additive context.
    pub(crate) fn add_values(&mut self, lhs: &Value, rhs: &Value) -> OpResult<Value> {
        if let (Value::Number(x), Value::Number(y)) = (lhs, rhs) {
            return Ok(Value::number(x + y));
        }

        let lp = self.to_primitive(lhs, PrimitiveHint::None)?;
        let rp = self.to_primitive(rhs, PrimitiveHint::None)?;

        if lp.is_string_or_buffer() || rp.is_string_or_buffer() {
            let ls = self.to_string_value(&lp)?;
            let rs = self.to_string_value(&rp)?;
            let mut out = String::with_capacity(ls.len() + rs.len());
            out.push_str(&ls);
            out.push_str(&rs);
            Ok(Value::string(out))
        } else {
            let x = self.to_number(&lp)?;
            let y = self.to_number(&rp)?;
            Ok(Value::number(x + y))
        }
    }

    /// `-`, `*`, `/`, `%`: ToNumber both (left first), then combine. `%`
    /// callers pass C `fmod` semantics, not IEEE remainder.
    pub(crate) fn arith_values<F>(&mut self, lhs: &Value, rhs: &Value, f: F) -> OpResult<Value>
    where
        F: FnOnce(f64, f64) -> f64,
    {
        let x = self.to_number(lhs)?;
        let y = self.to_number(rhs)?;
        Ok(Value::number(f(x, y)))
    }

    /// `&`, `|`, `^`: ToInt32 both; the result re-expressed as a double is
    /// never NaN.
    pub(crate) fn bitwise_values<F>(&mut self, lhs: &Value, rhs: &Value, f: F) -> OpResult<Value>
    where
        F: FnOnce(i32, i32) -> i32,
    {
        let x = self.to_int32(lhs)?;
        let y = self.to_int32(rhs)?;
        Ok(Value::number(f(x, y) as f64))
    }

    /// `<<`: signed 32-bit shift, count masked to five bits, result
    /// re-masked to 32 bits.
    pub(crate) fn shift_left(&mut self, lhs: &Value, rhs: &Value) -> OpResult<Value> {
        let x = self.to_int32(lhs)?;
        let shift = self.to_uint32(rhs)? & 0x1f;
        Ok(Value::number(x.wrapping_shl(shift) as f64))
    }

    /// `>>`: sign-propagating right shift.
    pub(crate) fn shift_right(&mut self, lhs: &Value, rhs: &Value) -> OpResult<Value> {
        let x = self.to_int32(lhs)?;
        let shift = self.to_uint32(rhs)? & 0x1f;
        Ok(Value::number((x >> shift) as f64))
    }

    /// `>>>`: zero-filling right shift on the unsigned interpretation.
    pub(crate) fn shift_right_logical(&mut self, lhs: &Value, rhs: &Value) -> OpResult<Value> {
        let x = self.to_uint32(lhs)?;
        let shift = self.to_uint32(rhs)? & 0x1f;
        Ok(Value::number((x >> shift) as f64))
    }

    /// Unary minus: ToNumber then negate.
    pub(crate) fn negate_value(&mut self, v: &Value) -> OpResult<Value> {
        let x = self.to_number(v)?;
        Ok(Value::number(-x))
    }

    /// Unary plus: ToNumber.
    pub(crate) fn plus_value(&mut self, v: &Value) -> OpResult<Value> {
        let x = self.to_number(v)?;
        Ok(Value::number(x))
    }

    /// `~`: ToInt32 then invert.
    pub(crate) fn bitwise_not_value(&mut self, v: &Value) -> OpResult<Value> {
        let x = self.to_int32(v)?;
        Ok(Value::number(!x as f64))
    }

    /// The Abstract Relational Comparison (ES5 §11.8.5). `left_first`
    /// selects which operand is coerced first; `None` is the undefined
    /// result NaN produces. The four relational operators map onto this
    /// with operand swaps and a negate applied only to defined results,
    /// because `x >= y` is not `!(x < y)` once NaN is involved.
    pub(crate) fn abstract_lt(
        &mut self,
        lhs: &Value,
        rhs: &Value,
        left_first: bool,
    ) -> OpResult<Option<bool>> {
        let (lp, rp) = if left_first {
            let lp = self.to_primitive(lhs, PrimitiveHint::Number)?;
            let rp = self.to_primitive(rhs, PrimitiveHint::Number)?;
            (lp, rp)
        } else {
            let rp = self.to_primitive(rhs, PrimitiveHint::Number)?;
            let lp = self.to_primitive(lhs, PrimitiveHint::Number)?;
            (lp, rp)
        };

        if let (Value::String(a), Value::String(b)) = (&lp, &rp) {
            return Ok(Some(a.as_ref() < b.as_ref()));
        }

        let x = self.to_number(&lp)?;
        let y = self.to_number(&rp)?;
        if x.is_nan() || y.is_nan() {
            Ok(None)
        } else {
            Ok(Some(x < y))
        }
    }

    pub(crate) fn compare_lt(&mut self, lhs: &Value, rhs: &Value) -> OpResult<bool> {
        Ok(self.abstract_lt(lhs, rhs, true)? == Some(true))
    }

    pub(crate) fn compare_gt(&mut self, lhs: &Value, rhs: &Value) -> OpResult<bool> {
        Ok(self.abstract_lt(rhs, lhs, false)? == Some(true))
    }

    pub(crate) fn compare_le(&mut self, lhs: &Value, rhs: &Value) -> OpResult<bool> {
        Ok(self.abstract_lt(rhs, lhs, false)? == Some(false))
    }

    pub(crate) fn compare_ge(&mut self, lhs: &Value, rhs: &Value) -> OpResult<bool> {
        Ok(self.abstract_lt(lhs, rhs, true)? == Some(false))
    }

    /// Strict equality (ES5 §11.9.6). Pure.
    pub(crate) fn strict_equals(&self, lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            // Buffers compare by identity, like the host type they model.
            (Value::Buffer(a), Value::Buffer(b)) => std::rc::Rc::ptr_eq(a, b),
            (Value::LightFunc(a), Value::LightFunc(b)) => a == b,
            _ => false,
        }
    }

    /// Abstract equality (ES5 §11.9.3). May run user code through the
    /// object-to-primitive legs. Buffers take the string legs in mixed
    /// comparisons.
    pub(crate) fn abstract_equals(&mut self, lhs: &Value, rhs: &Value) -> OpResult<bool> {
        use Value::*;
        match (lhs, rhs) {
            (Undefined | Null, Undefined | Null) => Ok(true),

            (Number(_), Number(_))
            | (String(_), String(_))
            | (Boolean(_), Boolean(_))
            | (Object(_), Object(_))
            | (Buffer(_), Buffer(_))
            | (LightFunc(_), LightFunc(_)) => Ok(self.strict_equals(lhs, rhs)),

            (Number(x), String(_) | Buffer(_)) => {
                let y = self.to_number(rhs)?;
                Ok(*x == y)
            }
            (String(_) | Buffer(_), Number(y)) => {
                let x = self.to_number(lhs)?;
                Ok(x == *y)
            }
            (String(a), Buffer(b)) | (Buffer(b), String(a)) => {
                Ok(a.as_bytes() == &**b)
            }

            (Boolean(_), _) => {
                let x = Value::number(self.to_number(lhs)?);
                self.abstract_equals(&x, rhs)
            }
            (_, Boolean(_)) => {
                let y = Value::number(self.to_number(rhs)?);
                self.abstract_equals(lhs, &y)
            }

            (Number(_) | String(_) | Buffer(_), Object(_)) => {
                let rp = self.to_primitive(rhs, PrimitiveHint::None)?;
                self.abstract_equals(lhs, &rp)
            }
            (Object(_), Number(_) | String(_) | Buffer(_)) => {
                let lp = self.to_primitive(lhs, PrimitiveHint::None)?;
                self.abstract_equals(&lp, rhs)
            }

            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmod_semantics_for_modulus() {
        let mut vm = Vm::new();

        let r = vm
            .arith_values(&Value::number(-0.0), &Value::number(1.0), |x, y| x % y)
            .unwrap();
        match r {
            Value::Number(x) => assert!(x == 0.0 && x.is_sign_negative()),
            other => panic!("expected -0, got {other:?}"),
        }

        let r = vm
            .arith_values(&Value::number(1.0), &Value::number(0.0), |x, y| x % y)
            .unwrap();
        assert!(r.as_number().unwrap().is_nan());

        let r = vm
            .arith_values(&Value::number(5.5), &Value::number(-2.0), |x, y| x % y)
            .unwrap();
        assert_eq!(r.as_number(), Some(1.5));
    }

    #[test]
    fn shift_boundaries() {
        let mut vm = Vm::new();

        let r = vm
            .shift_left(&Value::number(1.0), &Value::number(31.0))
            .unwrap();
        assert_eq!(r.as_number(), Some(-2147483648.0));

        let r = vm
            .shift_left(&Value::number(4294967295.0), &Value::number(1.0))
            .unwrap();
        assert_eq!(r.as_number(), Some(-2.0));

        let r = vm
            .shift_right_logical(&Value::number(-1.0), &Value::number(0.0))
            .unwrap();
        assert_eq!(r.as_number(), Some(4294967295.0));

        // Shift counts wrap at 32.
        let r = vm
            .shift_left(&Value::number(1.0), &Value::number(33.0))
            .unwrap();
        assert_eq!(r.as_number(), Some(2.0));
    }

    #[test]
    fn nan_relationals_are_all_false() {
        let mut vm = Vm::new();
        let nan = Value::number(f64::NAN);
        let one = Value::number(1.0);

        assert!(!vm.compare_lt(&nan, &one).unwrap());
        assert!(!vm.compare_ge(&nan, &one).unwrap());
        assert!(!vm.compare_lt(&one, &nan).unwrap());
        assert!(!vm.compare_ge(&one, &nan).unwrap());
        assert!(!vm.compare_gt(&nan, &one).unwrap());
        assert!(!vm.compare_le(&nan, &one).unwrap());
    }

    #[test]
    fn string_relational_uses_code_unit_order() {
        let mut vm = Vm::new();
        assert!(vm
            .compare_lt(&Value::string("a"), &Value::string("b"))
            .unwrap());
        assert!(vm
            .compare_ge(&Value::string("b"), &Value::string("b"))
            .unwrap());
        // "10" < "9" lexicographically.
        assert!(vm
            .compare_lt(&Value::string("10"), &Value::string("9"))
            .unwrap());
    }

    #[test]
    fn abstract_equality_legs() {
        let mut vm = Vm::new();

        assert!(vm
            .abstract_equals(&Value::Null, &Value::Undefined)
            .unwrap());
        assert!(vm
            .abstract_equals(&Value::number(1.0), &Value::string("1"))
            .unwrap());
        assert!(vm
            .abstract_equals(&Value::Boolean(true), &Value::string("1"))
            .unwrap());
        assert!(!vm
            .abstract_equals(&Value::Null, &Value::number(0.0))
            .unwrap());
        assert!(!vm
            .abstract_equals(&Value::number(f64::NAN), &Value::number(f64::NAN))
            .unwrap());
    }

    #[test]
    fn addition_concatenates_on_either_string() {
        let mut vm = Vm::new();
        let r = vm
            .add_values(&Value::number(1.0), &Value::string("2"))
            .unwrap();
        assert_eq!(r.as_string().map(|s| &**s), Some("12"));

        let r = vm
            .add_values(&Value::buffer(&b"ab"[..]), &Value::number(3.0))
            .unwrap();
        assert_eq!(r.as_string().map(|s| &**s), Some("ab3"));
    }
}
