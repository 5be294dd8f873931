//! Heap object representation
//!
//! Objects live in the VM's arena and are addressed by [`ObjectId`]. The
//! structural operations here are side-effect free; everything that can run
//! user code (accessor invocation, coercing lookups) lives on the
//! interpreter in `interpreter/properties.rs`.

use crate::function::{CompiledFunction, NativeFn};
use crate::thread::ThreadId;
use crate::value::Value;

use bitflags::bitflags;
use std::rc::Rc;

/// Arena handle of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    /// Arena slot index.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Property attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropFlags: u8 {
        const WRITABLE = 0x01;
        const ENUMERABLE = 0x02;
        const CONFIGURABLE = 0x04;
    }
}

impl PropFlags {
    /// The default attributes of literal-initialized and assigned
    /// properties.
    pub const fn wec() -> Self {
        Self::WRITABLE.union(Self::ENUMERABLE).union(Self::CONFIGURABLE)
    }
}

/// Data or accessor payload of a property.
#[derive(Debug, Clone)]
pub enum PropSlot {
    /// Plain data property.
    Data(Value),
    /// Accessor property; absent halves are `undefined`.
    Accessor { get: Value, set: Value },
}

/// One own property.
#[derive(Debug, Clone)]
pub struct Property {
    pub slot: PropSlot,
    pub flags: PropFlags,
}

impl Property {
    /// A writable-enumerable-configurable data property.
    pub fn data(value: Value) -> Self {
        Self {
            slot: PropSlot::Data(value),
            flags: PropFlags::wec(),
        }
    }
}

/// Function payload of a function-classed object.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    /// Closure: a compiled template plus its captured scope.
    Compiled {
        template: Rc<CompiledFunction>,
        env: Option<crate::env::EnvId>,
    },
    /// Native function object.
    Native { func: NativeFn, name: Rc<str> },
    /// Bound function: flattened by call setup.
    Bound {
        target: Box<Value>,
        this: Value,
        args: Box<[Value]>,
    },
}

/// Internal class of an object.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// Ordinary object.
    Plain,
    /// Array exotic object; `length` is virtual and maintained here.
    Array { length: u32 },
    /// Callable object.
    Function(FunctionKind),
    /// Error object.
    Error,
    /// Inert regexp instance (the pattern is not compiled; no engine is
    /// attached).
    Regexp { source: Rc<str>, flags: Rc<str> },
    /// Coroutine thread handle.
    Thread(ThreadId),
    /// Enumerator produced by `INITENUM`; keys are snapshot at creation.
    Enumerator {
        target: ObjectId,
        keys: Rc<[Rc<str>]>,
        index: usize,
    },
}

/// A heap object: class, prototype link, and ordered own properties.
/// Property order is insertion order, which is also enumeration order.
#[derive(Debug, Clone)]
pub struct Object {
    pub kind: ObjectKind,
    pub prototype: Option<ObjectId>,
    pub extensible: bool,
    props: Vec<(Rc<str>, Property)>,
}

impl Object {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            prototype: None,
            extensible: true,
            props: Vec::new(),
        }
    }

    pub fn with_prototype(mut self, proto: Option<ObjectId>) -> Self {
        self.prototype = proto;
        self
    }

    pub const fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub const fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array { .. })
    }

    /// Own property by key.
    pub fn own_property(&self, key: &str) -> Option<&Property> {
        self.props.iter().find(|(k, _)| &**k == key).map(|(_, p)| p)
    }

    pub fn own_property_mut(&mut self, key: &str) -> Option<&mut Property> {
        self.props
            .iter_mut()
            .find(|(k, _)| &**k == key)
            .map(|(_, p)| p)
    }

    pub fn has_own_property(&self, key: &str) -> bool {
        self.own_property(key).is_some()
    }

    /// Define or overwrite an own property, ignoring attribute checks (the
    /// defineProperty-style path). Insertion order is kept for existing
    /// keys.
    pub fn define_own_property(&mut self, key: Rc<str>, prop: Property) {
        match self.own_property_mut(&key) {
            Some(existing) => *existing = prop,
            None => self.props.push((key, prop)),
        }
    }

    /// Remove an own property. Returns false when the property exists but
    /// is non-configurable.
    pub fn delete_own_property(&mut self, key: &str) -> bool {
        match self.props.iter().position(|(k, _)| &**k == key) {
            Some(i) => {
                if !self.props[i].1.flags.contains(PropFlags::CONFIGURABLE) {
                    return false;
                }
                self.props.remove(i);
                true
            }
            None => true,
        }
    }

    /// All own keys in insertion order.
    pub fn own_keys(&self) -> impl Iterator<Item = &Rc<str>> {
        self.props.iter().map(|(k, _)| k)
    }
}

/// Parse a property key as a canonical array index (`"0"`, `"42"`, but not
/// `"042"` or `"4294967295"`).
pub fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let idx: u64 = key.parse().ok()?;
    // 2^32 - 1 is the maximum length, not a valid index.
    if idx < u32::MAX as u64 {
        Some(idx as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_order_is_insertion_order() {
        let mut o = Object::new(ObjectKind::Plain);
        o.define_own_property("b".into(), Property::data(Value::number(1.0)));
        o.define_own_property("a".into(), Property::data(Value::number(2.0)));
        o.define_own_property("b".into(), Property::data(Value::number(3.0)));

        let keys: Vec<_> = o.own_keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn non_configurable_properties_resist_delete() {
        let mut o = Object::new(ObjectKind::Plain);
        o.define_own_property(
            "x".into(),
            Property {
                slot: PropSlot::Data(Value::Null),
                flags: PropFlags::WRITABLE,
            },
        );

        assert!(!o.delete_own_property("x"));
        assert!(o.has_own_property("x"));
        assert!(o.delete_own_property("missing"));
    }

    #[test]
    fn array_index_rejects_non_canonical_keys() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("042"), None);
        assert_eq!(array_index(""), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("4294967295"), None);
        assert_eq!(array_index("4294967294"), Some(4294967294));
    }
}
