//! Environment records
//!
//! Identifier resolution walks a parent chain of declarative records
//! (function scopes, catch bindings) and object records (the global object,
//! `with` targets). Records live in the VM arena and are addressed by
//! [`EnvId`]; lookups that may run user code are on the interpreter.

use crate::object::ObjectId;
use crate::value::Value;

use std::rc::Rc;

/// Arena handle of an environment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub(crate) u32);

impl EnvId {
    /// Arena slot index.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One declarative binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
    pub deletable: bool,
}

impl Binding {
    /// A mutable, non-deletable binding (function declarations, catch
    /// bindings).
    pub fn mutable(value: Value) -> Self {
        Self {
            value,
            mutable: true,
            deletable: false,
        }
    }
}

/// An environment record.
#[derive(Debug, Clone)]
pub enum EnvRecord {
    /// Declarative record: named bindings in insertion order.
    Declarative {
        bindings: Vec<(Rc<str>, Binding)>,
        parent: Option<EnvId>,
    },
    /// Object record: bindings are the properties of `object`. When
    /// `provide_this` is set (the `with` statement), the object is also the
    /// implicit `this` for calls resolved through this record.
    Object {
        object: ObjectId,
        provide_this: bool,
        parent: Option<EnvId>,
    },
}

impl EnvRecord {
    /// New empty declarative record.
    pub fn declarative(parent: Option<EnvId>) -> Self {
        Self::Declarative {
            bindings: Vec::new(),
            parent,
        }
    }

    /// New object record.
    pub fn object(object: ObjectId, provide_this: bool, parent: Option<EnvId>) -> Self {
        Self::Object {
            object,
            provide_this,
            parent,
        }
    }

    /// Parent record in the chain.
    pub const fn parent(&self) -> Option<EnvId> {
        match self {
            Self::Declarative { parent, .. } | Self::Object { parent, .. } => *parent,
        }
    }

    /// Declarative binding by name.
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        match self {
            Self::Declarative { bindings, .. } => {
                bindings.iter().find(|(n, _)| &**n == name).map(|(_, b)| b)
            }
            Self::Object { .. } => None,
        }
    }

    /// Mutable declarative binding by name.
    pub fn binding_mut(&mut self, name: &str) -> Option<&mut Binding> {
        match self {
            Self::Declarative { bindings, .. } => bindings
                .iter_mut()
                .find(|(n, _)| &**n == name)
                .map(|(_, b)| b),
            Self::Object { .. } => None,
        }
    }

    /// Insert or overwrite a declarative binding. Panics on object records;
    /// the interpreter routes those through property writes.
    pub fn insert_binding(&mut self, name: Rc<str>, binding: Binding) {
        match self {
            Self::Declarative { bindings, .. } => {
                match bindings.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, b)) => *b = binding,
                    None => bindings.push((name, binding)),
                }
            }
            Self::Object { .. } => unreachable!("declarative insert on object record"),
        }
    }

    /// Remove a declarative binding; false when present but non-deletable.
    pub fn remove_binding(&mut self, name: &str) -> bool {
        match self {
            Self::Declarative { bindings, .. } => {
                match bindings.iter().position(|(n, _)| &**n == name) {
                    Some(i) => {
                        if !bindings[i].1.deletable {
                            return false;
                        }
                        bindings.remove(i);
                        true
                    }
                    None => true,
                }
            }
            Self::Object { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_overwrite_in_place() {
        let mut env = EnvRecord::declarative(None);
        env.insert_binding("x".into(), Binding::mutable(Value::number(1.0)));
        env.insert_binding("x".into(), Binding::mutable(Value::number(2.0)));

        assert_eq!(
            env.binding("x").unwrap().value.as_number(),
            Some(2.0),
        );
    }

    #[test]
    fn non_deletable_bindings_resist_removal() {
        let mut env = EnvRecord::declarative(None);
        env.insert_binding("f".into(), Binding::mutable(Value::Undefined));

        assert!(!env.remove_binding("f"));
        assert!(env.binding("f").is_some());
        assert!(env.remove_binding("missing"));
    }
}
