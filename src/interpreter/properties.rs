//! Property access, enumeration, and the object-operation surface the
//! dispatcher consumes
//!
//! Accessor invocation re-enters the executor through `call_value`; every
//! path through here treats arena handles as the only state that survives
//! such a call.

use super::Vm;
use crate::error::{ErrorKind, OpResult};
use crate::object::{array_index, FunctionKind, Object, ObjectKind, PropFlags, Property, PropSlot};
use crate::object::ObjectId;
use crate::value::Value;

use std::collections::HashSet;
use std::rc::Rc;

impl Vm {
    /// Property read with the full prototype walk and accessor dispatch.
    pub(crate) fn get_prop(&mut self, base: &Value, key: &Value) -> OpResult<Value> {
        let key = self.to_string_value(key)?;

        match base {
            Value::Object(id) => self.get_prop_object(*id, base, &key),
            Value::String(s) => Ok(string_own_prop(s, &key)),
            Value::Buffer(b) => Ok(buffer_own_prop(b, &key)),
            Value::Undefined | Value::Null => Err(self.throw(
                ErrorKind::Type,
                &format!("cannot read property '{key}' of {base}"),
            )),
            // Primitive wrappers carry no own properties here.
            _ => Ok(Value::Undefined),
        }
    }

    fn get_prop_object(&mut self, id: ObjectId, this: &Value, key: &str) -> OpResult<Value> {
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let obj = self.object(cur);

            if let ObjectKind::Array { length } = obj.kind {
                if key == "length" {
                    return Ok(Value::number(length as f64));
                }
            }

            match obj.own_property(key) {
                Some(prop) => {
                    return match &prop.slot {
                        PropSlot::Data(v) => Ok(v.clone()),
                        PropSlot::Accessor { get, .. } => {
                            let get = get.clone();
                            if get.is_undefined() {
                                Ok(Value::Undefined)
                            } else {
                                // Re-enters the executor; `cur` and friends
                                // are dead after this call.
                                self.call_value(get, this.clone(), &[])
                            }
                        }
                    };
                }
                None => cursor = obj.prototype,
            }
        }
        Ok(Value::Undefined)
    }

    /// Property write. In strict mode a failed write throws TypeError;
    /// otherwise it is silently dropped.
    pub(crate) fn put_prop(
        &mut self,
        base: &Value,
        key: &Value,
        value: Value,
        strict: bool,
    ) -> OpResult<()> {
        let key = self.to_string_value(key)?;

        let id = match base {
            Value::Object(id) => *id,
            Value::Undefined | Value::Null => {
                return Err(self.throw(
                    ErrorKind::Type,
                    &format!("cannot set property '{key}' of {base}"),
                ));
            }
            _ => {
                return if strict {
                    Err(self.throw(
                        ErrorKind::Type,
                        &format!("cannot set property '{key}' on a primitive"),
                    ))
                } else {
                    Ok(())
                };
            }
        };

        if self.object(id).is_array() && &*key == "length" {
            let new_len = self.to_uint32(&value)?;
            self.set_array_length(id, new_len);
            return Ok(());
        }

        // Find the property along the chain to honor setters and readonly
        // data properties of prototypes.
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let obj = self.object(cur);
            match obj.own_property(&key) {
                Some(prop) => match &prop.slot {
                    PropSlot::Accessor { set, .. } => {
                        let set = set.clone();
                        return if set.is_undefined() {
                            if strict {
                                Err(self.throw(
                                    ErrorKind::Type,
                                    &format!("property '{key}' has no setter"),
                                ))
                            } else {
                                Ok(())
                            }
                        } else {
                            self.call_value(set, base.clone(), &[value])?;
                            Ok(())
                        };
                    }
                    PropSlot::Data(_) => {
                        let writable = prop.flags.contains(PropFlags::WRITABLE);
                        if cur == id {
                            return if writable {
                                let prop = self
                                    .object_mut(cur)
                                    .own_property_mut(&key)
                                    .expect("property located above");
                                prop.slot = PropSlot::Data(value);
                                Ok(())
                            } else if strict {
                                Err(self.throw(
                                    ErrorKind::Type,
                                    &format!("property '{key}' is read-only"),
                                ))
                            } else {
                                Ok(())
                            };
                        }
                        if !writable {
                            return if strict {
                                Err(self.throw(
                                    ErrorKind::Type,
                                    &format!("property '{key}' is read-only"),
                                ))
                            } else {
                                Ok(())
                            };
                        }
                        // Writable data property on a prototype: shadow it.
                        break;
                    }
                },
                None => cursor = obj.prototype,
            }
        }

        if !self.object(id).extensible {
            return if strict {
                Err(self.throw(ErrorKind::Type, "object is not extensible"))
            } else {
                Ok(())
            };
        }

        self.define_index_aware(id, key, Property::data(value));
        Ok(())
    }

    /// Property delete. Strict mode throws on a failed delete.
    pub(crate) fn del_prop(
        &mut self,
        base: &Value,
        key: &Value,
        strict: bool,
    ) -> OpResult<bool> {
        let key = self.to_string_value(key)?;

        match base {
            Value::Object(id) => {
                if self.object(*id).is_array() && &*key == "length" {
                    return if strict {
                        Err(self.throw(ErrorKind::Type, "cannot delete array length"))
                    } else {
                        Ok(false)
                    };
                }
                let deleted = self.object_mut(*id).delete_own_property(&key);
                if !deleted && strict {
                    return Err(self.throw(
                        ErrorKind::Type,
                        &format!("cannot delete property '{key}'"),
                    ));
                }
                Ok(deleted)
            }
            Value::Undefined | Value::Null => Err(self.throw(
                ErrorKind::Type,
                &format!("cannot delete property '{key}' of {base}"),
            )),
            _ => Ok(true),
        }
    }

    /// `in` operator: the right operand must be an object.
    pub(crate) fn has_prop_value(&mut self, lhs: &Value, rhs: &Value) -> OpResult<bool> {
        let key = self.to_string_value(lhs)?;
        let id = match rhs {
            Value::Object(id) => *id,
            _ => {
                return Err(
                    self.throw(ErrorKind::Type, "'in' operator needs an object operand")
                )
            }
        };
        Ok(self.has_prop_chain(id, &key))
    }

    pub(crate) fn has_prop_chain(&self, id: ObjectId, key: &str) -> bool {
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let obj = self.object(cur);
            if obj.is_array() && key == "length" {
                return true;
            }
            if obj.has_own_property(key) {
                return true;
            }
            cursor = obj.prototype;
        }
        false
    }

    /// `instanceof`: walk the left operand's prototype chain looking for
    /// the right operand's `prototype` object.
    pub(crate) fn instanceof_values(&mut self, lhs: &Value, rhs: &Value) -> OpResult<bool> {
        let mut callee = rhs.clone();
        // Bound functions delegate to their target.
        loop {
            let next = match &callee {
                Value::Object(id) => match &self.object(*id).kind {
                    ObjectKind::Function(FunctionKind::Bound { target, .. }) => {
                        Some((**target).clone())
                    }
                    ObjectKind::Function(_) => None,
                    _ => {
                        return Err(self.throw(
                            ErrorKind::Type,
                            "right-hand side of 'instanceof' is not callable",
                        ))
                    }
                },
                _ => {
                    return Err(self.throw(
                        ErrorKind::Type,
                        "right-hand side of 'instanceof' is not callable",
                    ))
                }
            };
            match next {
                Some(target) => callee = target,
                None => break,
            }
        }

        let proto = self.get_prop(&callee, &Value::string("prototype"))?;
        let proto_id = match proto {
            Value::Object(id) => id,
            _ => {
                return Err(self.throw(
                    ErrorKind::Type,
                    "function prototype is not an object",
                ))
            }
        };

        let mut cursor = match lhs {
            Value::Object(id) => self.object(*id).prototype,
            _ => return Ok(false),
        };
        while let Some(cur) = cursor {
            if cur == proto_id {
                return Ok(true);
            }
            cursor = self.object(cur).prototype;
        }
        Ok(false)
    }

    /// `typeof`, including the host buffer class.
    pub(crate) fn typeof_value(&self, v: &Value) -> &'static str {
        match v {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Buffer(_) => "buffer",
            Value::LightFunc(_) => "function",
            Value::Object(id) => {
                if self.object(*id).is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Array length write: deletes configurable index properties at or
    /// above the new length, then stores it.
    pub(crate) fn set_array_length(&mut self, id: ObjectId, new_len: u32) {
        let doomed: Vec<Rc<str>> = self
            .object(id)
            .own_keys()
            .filter(|k| matches!(array_index(k), Some(i) if i >= new_len))
            .cloned()
            .collect();
        let obj = self.object_mut(id);
        for key in doomed {
            obj.delete_own_property(&key);
        }
        if let ObjectKind::Array { length } = &mut obj.kind {
            *length = new_len;
        }
    }

    /// Define an own property, growing an array's length when the key is a
    /// canonical index.
    pub(crate) fn define_index_aware(&mut self, id: ObjectId, key: Rc<str>, prop: Property) {
        let grow = match (&self.object(id).kind, array_index(&key)) {
            (ObjectKind::Array { length }, Some(idx)) if idx >= *length => Some(idx + 1),
            _ => None,
        };
        let obj = self.object_mut(id);
        obj.define_own_property(key, prop);
        if let (ObjectKind::Array { length }, Some(new_len)) = (&mut obj.kind, grow) {
            *length = new_len;
        }
    }

    /// Install one half of an accessor, keeping any existing counterpart.
    pub(crate) fn define_accessor(
        &mut self,
        id: ObjectId,
        key: Rc<str>,
        get: Option<Value>,
        set: Option<Value>,
    ) {
        let (mut cur_get, mut cur_set) = match self.object(id).own_property(&key) {
            Some(Property {
                slot: PropSlot::Accessor { get, set },
                ..
            }) => (get.clone(), set.clone()),
            _ => (Value::Undefined, Value::Undefined),
        };
        if let Some(g) = get {
            cur_get = g;
        }
        if let Some(s) = set {
            cur_set = s;
        }
        self.object_mut(id).define_own_property(
            key,
            Property {
                slot: PropSlot::Accessor {
                    get: cur_get,
                    set: cur_set,
                },
                flags: PropFlags::ENUMERABLE.union(PropFlags::CONFIGURABLE),
            },
        );
    }

    /// Snapshot the for-in key sequence: enumerable keys along the
    /// prototype chain in insertion order, shadowed names visited once.
    pub(crate) fn enumerate_keys(&self, id: ObjectId) -> Vec<Rc<str>> {
        let mut seen: HashSet<Rc<str>> = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let obj = self.object(cur);
            for key in obj.own_keys() {
                if !seen.insert(key.clone()) {
                    continue;
                }
                let enumerable = obj
                    .own_property(key)
                    .map(|p| p.flags.contains(PropFlags::ENUMERABLE))
                    .unwrap_or(false);
                if enumerable {
                    keys.push(key.clone());
                }
            }
            cursor = obj.prototype;
        }
        keys
    }

    /// Create the enumerator object `INITENUM` yields for object targets.
    pub(crate) fn create_enumerator(&mut self, target: ObjectId) -> Value {
        let keys: Rc<[Rc<str>]> = self.enumerate_keys(target).into();
        let obj = Object::new(ObjectKind::Enumerator {
            target,
            keys,
            index: 0,
        });
        Value::Object(self.alloc_object(obj))
    }

    /// Advance an enumerator, skipping keys deleted since the snapshot.
    pub(crate) fn enum_next(&mut self, enum_id: ObjectId) -> Option<Rc<str>> {
        loop {
            let (target, key) = {
                let obj = self.object(enum_id);
                let (target, keys, index) = match &obj.kind {
                    ObjectKind::Enumerator {
                        target,
                        keys,
                        index,
                    } => (*target, keys.clone(), *index),
                    _ => return None,
                };
                if index >= keys.len() {
                    return None;
                }
                (target, keys[index].clone())
            };

            if let ObjectKind::Enumerator { index, .. } = &mut self.object_mut(enum_id).kind {
                *index += 1;
            }

            if self.has_prop_chain(target, &key) {
                return Some(key);
            }
        }
    }

    /// Materialize an inert regexp instance; no engine is attached.
    pub(crate) fn create_regexp_instance(&mut self, source: Rc<str>, flags: Rc<str>) -> Value {
        let mut obj = Object::new(ObjectKind::Regexp {
            source: source.clone(),
            flags: flags.clone(),
        });
        obj.define_own_property(
            "source".into(),
            Property {
                slot: PropSlot::Data(Value::String(source)),
                flags: PropFlags::empty(),
            },
        );
        obj.define_own_property(
            "lastIndex".into(),
            Property {
                slot: PropSlot::Data(Value::number(0.0)),
                flags: PropFlags::WRITABLE,
            },
        );
        Value::Object(self.alloc_object(obj))
    }
}

/// String virtual properties: `length` and code-unit indexing.
fn string_own_prop(s: &str, key: &str) -> Value {
    if key == "length" {
        return Value::number(s.encode_utf16().count() as f64);
    }
    if let Some(idx) = array_index(key) {
        let mut units = s.encode_utf16().skip(idx as usize);
        if let Some(unit) = units.next() {
            return Value::string(String::from_utf16_lossy(&[unit]));
        }
    }
    Value::Undefined
}

/// Buffer virtual properties: `length` and byte indexing.
fn buffer_own_prop(b: &[u8], key: &str) -> Value {
    if key == "length" {
        return Value::number(b.len() as f64);
    }
    if let Some(idx) = array_index(key) {
        if let Some(byte) = b.get(idx as usize) {
            return Value::number(*byte as f64);
        }
    }
    Value::Undefined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prototype_chain_lookup() {
        let mut vm = Vm::new();
        let proto = vm.new_object();
        vm.define_data_property(proto, "x", Value::number(7.0));

        let child = vm.new_object();
        vm.object_mut(child).prototype = Some(proto);

        let v = vm
            .get_prop(&Value::Object(child), &Value::string("x"))
            .unwrap();
        assert_eq!(v.as_number(), Some(7.0));
    }

    #[test]
    fn assignment_shadows_prototype_data() {
        let mut vm = Vm::new();
        let proto = vm.new_object();
        vm.define_data_property(proto, "x", Value::number(1.0));
        let child = vm.new_object();
        vm.object_mut(child).prototype = Some(proto);

        vm.put_prop(
            &Value::Object(child),
            &Value::string("x"),
            Value::number(2.0),
            false,
        )
        .unwrap();

        assert!(vm.object(child).has_own_property("x"));
        let v = vm
            .get_prop(&Value::Object(proto), &Value::string("x"))
            .unwrap();
        assert_eq!(v.as_number(), Some(1.0));
    }

    #[test]
    fn array_length_tracks_index_defines() {
        let mut vm = Vm::new();
        let arr = vm.new_array();
        vm.define_index_aware(arr, "0".into(), Property::data(Value::number(1.0)));
        vm.define_index_aware(arr, "4".into(), Property::data(Value::number(2.0)));

        let len = vm
            .get_prop(&Value::Object(arr), &Value::string("length"))
            .unwrap();
        assert_eq!(len.as_number(), Some(5.0));

        vm.set_array_length(arr, 1);
        assert!(vm.object(arr).has_own_property("0"));
        assert!(!vm.object(arr).has_own_property("4"));
    }

    #[test]
    fn enumeration_skips_shadowed_and_non_enumerable_keys() {
        let mut vm = Vm::new();
        let proto = vm.new_object();
        vm.define_data_property(proto, "a", Value::number(1.0));
        vm.define_data_property(proto, "b", Value::number(2.0));

        let child = vm.new_object();
        vm.object_mut(child).prototype = Some(proto);
        vm.define_data_property(child, "a", Value::number(3.0));
        vm.object_mut(child).define_own_property(
            "hidden".into(),
            Property {
                slot: PropSlot::Data(Value::Null),
                flags: PropFlags::WRITABLE,
            },
        );

        let keys: Vec<String> = vm
            .enumerate_keys(child)
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn string_virtual_properties() {
        let mut vm = Vm::new();
        let s = Value::string("hi");
        let len = vm.get_prop(&s, &Value::string("length")).unwrap();
        assert_eq!(len.as_number(), Some(2.0));

        let c = vm.get_prop(&s, &Value::string("1")).unwrap();
        assert_eq!(c.as_string().map(|s| &**s), Some("i"));

        let missing = vm.get_prop(&s, &Value::string("9")).unwrap();
        assert!(missing.is_undefined());
    }
}
