//! Register-window helpers, identifier resolution, and interrupt plumbing

use super::Vm;
use crate::env::{Binding, EnvId, EnvRecord};
use crate::error::{ErrorKind, OpResult};
use crate::function::CompiledFunction;
use crate::instruction::{
    DECL_FLAG_CONFIGURABLE, DECL_FLAG_ENUMERABLE, DECL_FLAG_FUNC_DECL, DECL_FLAG_UNDEF_VALUE,
    DECL_FLAG_WRITABLE,
};
use crate::object::{FunctionKind, ObjectKind, PropFlags, Property, PropSlot};
use crate::thread::ThreadId;
use crate::value::Value;

use std::rc::Rc;
use tracing::debug;

/// Hot per-instruction context, re-derived every loop iteration instead of
/// cached across side effects.
#[derive(Clone)]
pub(crate) struct ExecCtx {
    pub thread: ThreadId,
    /// Index of the running activation on the thread's call stack.
    pub act: usize,
    /// Absolute value-stack index of register 0.
    pub bottom: usize,
    pub tmpl: Rc<CompiledFunction>,
}

impl Vm {
    /* register window */

    /// Read register `r` of the current window.
    pub(crate) fn load_reg(&mut self, ctx: &ExecCtx, r: usize) -> OpResult<Value> {
        if r >= ctx.tmpl.nregs as usize {
            return Err(self.internal_error("register operand out of window"));
        }
        Ok(self.thread(ctx.thread).get_slot(ctx.bottom + r))
    }

    /// Write register `r` of the current window.
    pub(crate) fn store_reg(&mut self, ctx: &ExecCtx, r: usize, value: Value) -> OpResult<()> {
        if r >= ctx.tmpl.nregs as usize {
            return Err(self.internal_error("register target out of window"));
        }
        self.thread_mut(ctx.thread).put_slot(ctx.bottom + r, value);
        Ok(())
    }

    /// Resolve a 9-bit register-or-constant operand.
    pub(crate) fn load_rk(&mut self, ctx: &ExecCtx, field: u16) -> OpResult<Value> {
        if field & crate::consts::CONST_BIT as u16 != 0 {
            self.load_const(ctx, (field & 0xff) as u32)
        } else {
            self.load_reg(ctx, field as usize)
        }
    }

    /// Constant pool entry.
    pub(crate) fn load_const(&mut self, ctx: &ExecCtx, idx: u32) -> OpResult<Value> {
        match ctx.tmpl.consts.get(idx as usize) {
            Some(v) => Ok(v.clone()),
            None => Err(self.internal_error("constant index out of pool")),
        }
    }

    /// Constant pool entry that must be a string (identifier names).
    pub(crate) fn load_const_str(&mut self, ctx: &ExecCtx, idx: u32) -> OpResult<Rc<str>> {
        match self.load_const(ctx, idx)? {
            Value::String(s) => Ok(s),
            _ => Err(self.internal_error("identifier constant is not a string")),
        }
    }

    /// Read the real base index out of the register named by an indirect
    /// operand.
    pub(crate) fn indirect_base(&mut self, ctx: &ExecCtx, r: usize) -> OpResult<usize> {
        let v = self.load_reg(ctx, r)?;
        match v.as_number() {
            Some(x) if x.fract() == 0.0 && x >= 0.0 && (x as usize) < ctx.tmpl.nregs as usize => {
                Ok(x as usize)
            }
            _ => Err(self.internal_error("malformed indirect target")),
        }
    }

    /* function classification */

    /// Compiled template and captured scope of a function value.
    pub(crate) fn as_compiled(
        &self,
        v: &Value,
    ) -> Option<(Rc<CompiledFunction>, Option<EnvId>)> {
        match v {
            Value::Object(id) => match &self.object(*id).kind {
                ObjectKind::Function(FunctionKind::Compiled { template, env }) => {
                    Some((template.clone(), *env))
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn is_callable_value(&self, v: &Value) -> bool {
        match v {
            Value::LightFunc(_) => true,
            Value::Object(id) => self.object(*id).is_callable(),
            _ => false,
        }
    }

    /* identifier resolution */

    /// The innermost lexical environment of an activation: a spliced
    /// record (catch binding, `with`) when present, otherwise the callee's
    /// captured scope, bottoming out at the global environment.
    pub(crate) fn current_lex_env(&self, ctx: &ExecCtx) -> EnvId {
        self.lex_env_of(ctx.thread, ctx.act)
    }

    pub(crate) fn lex_env_of(&self, thread: ThreadId, act_idx: usize) -> EnvId {
        let act = &self.thread(thread).callstack[act_idx];
        if let Some(env) = act.lex_env {
            return env;
        }
        if let Some((_, Some(env))) = self.as_compiled(&act.func) {
            return env;
        }
        self.global_env
    }

    /// Create the activation's own environment record on first demand
    /// (closure capture, declarations into function scope).
    pub(crate) fn ensure_activation_env(&mut self, ctx: &ExecCtx) -> EnvId {
        let act = &self.thread(ctx.thread).callstack[ctx.act];
        if let Some(env) = act.var_env {
            return env;
        }

        let parent = self.current_lex_env(ctx);
        let env = self.alloc_env(EnvRecord::declarative(Some(parent)));

        let act = &mut self.thread_mut(ctx.thread).callstack[ctx.act];
        act.var_env = Some(env);
        if act.lex_env.is_none() {
            act.lex_env = Some(env);
        }
        env
    }

    /// Resolve an identifier. `Ok(None)` is only produced with
    /// `throw_on_unresolved` false. The second tuple slot is the implicit
    /// `this` a call through this binding receives: the binding object for
    /// `with` records, `undefined` otherwise.
    pub(crate) fn get_var(
        &mut self,
        ctx: &ExecCtx,
        name: &str,
        throw_on_unresolved: bool,
    ) -> OpResult<Option<(Value, Value)>> {
        let mut cursor = Some(self.current_lex_env(ctx));
        while let Some(cur) = cursor {
            match self.env(cur) {
                EnvRecord::Declarative { parent, .. } => {
                    let parent = *parent;
                    if let Some(b) = self.env(cur).binding(name) {
                        return Ok(Some((b.value.clone(), Value::Undefined)));
                    }
                    cursor = parent;
                }
                EnvRecord::Object {
                    object,
                    provide_this,
                    parent,
                } => {
                    let (object, provide_this, parent) = (*object, *provide_this, *parent);
                    if self.has_prop_chain(object, name) {
                        let base = Value::Object(object);
                        let v = self.get_prop(&base, &Value::string(name))?;
                        let this = if provide_this { base } else { Value::Undefined };
                        return Ok(Some((v, this)));
                    }
                    cursor = parent;
                }
            }
        }

        if throw_on_unresolved {
            Err(self.throw(
                ErrorKind::Reference,
                &format!("identifier '{name}' is not defined"),
            ))
        } else {
            Ok(None)
        }
    }

    /// Assign an identifier. Unresolved names become global properties in
    /// sloppy mode and throw ReferenceError in strict mode.
    pub(crate) fn put_var(
        &mut self,
        ctx: &ExecCtx,
        name: &str,
        value: Value,
        strict: bool,
    ) -> OpResult<()> {
        let mut cursor = Some(self.current_lex_env(ctx));
        while let Some(cur) = cursor {
            match self.env(cur) {
                EnvRecord::Declarative { parent, .. } => {
                    let parent = *parent;
                    if let Some(b) = self.env_mut(cur).binding_mut(name) {
                        if b.mutable {
                            b.value = value;
                        } else if strict {
                            return Err(self.throw(
                                ErrorKind::Type,
                                &format!("assignment to constant binding '{name}'"),
                            ));
                        }
                        return Ok(());
                    }
                    cursor = parent;
                }
                EnvRecord::Object {
                    object, parent, ..
                } => {
                    let (object, parent) = (*object, *parent);
                    if self.has_prop_chain(object, name) {
                        return self.put_prop(
                            &Value::Object(object),
                            &Value::string(name),
                            value,
                            strict,
                        );
                    }
                    cursor = parent;
                }
            }
        }

        if strict {
            Err(self.throw(
                ErrorKind::Reference,
                &format!("identifier '{name}' is not defined"),
            ))
        } else {
            let global = self.global_object;
            self.define_index_aware(global, name.into(), Property::data(value));
            Ok(())
        }
    }

    /// Declare an identifier in the variable environment. Returns whether
    /// the name was already declared there.
    pub(crate) fn decl_var(
        &mut self,
        ctx: &ExecCtx,
        name: Rc<str>,
        value: Value,
        flags: u8,
    ) -> OpResult<bool> {
        let func_decl = flags & DECL_FLAG_FUNC_DECL != 0;
        let undef_init = flags & DECL_FLAG_UNDEF_VALUE != 0;
        let value = if undef_init { Value::Undefined } else { value };

        let has_own = {
            let act = &self.thread(ctx.thread).callstack[ctx.act];
            act.var_env.is_some() || ctx.tmpl.own_env
        };
        if has_own {
            let env = self.ensure_activation_env(ctx);
            let already = self.env(env).binding(&name).is_some();
            if !already || func_decl || !undef_init {
                self.env_mut(env).insert_binding(
                    name,
                    Binding {
                        value,
                        mutable: flags & DECL_FLAG_WRITABLE != 0,
                        deletable: flags & DECL_FLAG_CONFIGURABLE != 0,
                    },
                );
            }
            return Ok(already);
        }

        // No activation record: declarations target the global object, the
        // variable environment of global code.
        let global = self.global_object;
        let already = self.object(global).has_own_property(&name);
        if !already {
            let mut prop_flags = PropFlags::empty();
            if flags & DECL_FLAG_WRITABLE != 0 {
                prop_flags |= PropFlags::WRITABLE;
            }
            if flags & DECL_FLAG_ENUMERABLE != 0 {
                prop_flags |= PropFlags::ENUMERABLE;
            }
            if flags & DECL_FLAG_CONFIGURABLE != 0 {
                prop_flags |= PropFlags::CONFIGURABLE;
            }
            self.define_index_aware(
                global,
                name,
                Property {
                    slot: PropSlot::Data(value),
                    flags: prop_flags,
                },
            );
        } else if func_decl || !undef_init {
            self.put_prop(
                &Value::Object(global),
                &Value::String(name),
                value,
                false,
            )?;
        }
        Ok(already)
    }

    /// Delete an identifier binding; true when the name is absent or was
    /// removed.
    pub(crate) fn del_var(&mut self, ctx: &ExecCtx, name: &str) -> OpResult<bool> {
        let mut cursor = Some(self.current_lex_env(ctx));
        while let Some(cur) = cursor {
            match self.env(cur) {
                EnvRecord::Declarative { parent, .. } => {
                    let parent = *parent;
                    if self.env(cur).binding(name).is_some() {
                        return Ok(self.env_mut(cur).remove_binding(name));
                    }
                    cursor = parent;
                }
                EnvRecord::Object {
                    object, parent, ..
                } => {
                    let (object, parent) = (*object, *parent);
                    if self.object(object).has_own_property(name) {
                        return self.del_prop(
                            &Value::Object(object),
                            &Value::string(name),
                            false,
                        );
                    }
                    cursor = parent;
                }
            }
        }
        Ok(true)
    }

    /* interrupt */

    /// Fire the interrupt hook and reset the countdown. A hook error
    /// becomes a Range throw at the current instruction boundary.
    pub(crate) fn run_interrupt_hook(&mut self) -> OpResult<()> {
        self.interrupt_counter = self.params.interrupt_interval as i64;

        let Some(mut hook) = self.interrupt_hook.take() else {
            return Ok(());
        };
        debug!("interrupt hook firing");
        let result = hook();
        self.interrupt_hook = Some(hook);

        match result {
            Ok(()) => Ok(()),
            Err(msg) => Err(self.throw(ErrorKind::Range, &msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{ActFlags, Activation};

    fn ctx_for_entry(vm: &mut Vm, tmpl: Rc<CompiledFunction>) -> ExecCtx {
        let func = vm.new_function(tmpl.clone());
        let current = vm.current;
        let thr = vm.thread_mut(current);
        thr.valstack = vec![func.clone(), Value::Undefined];
        thr.resize_valstack(2 + tmpl.nregs as usize);
        thr.push_activation(Activation {
            func,
            pc: 0,
            idx_bottom: 2,
            idx_retval: 0,
            lex_env: None,
            var_env: None,
            flags: ActFlags::empty(),
        });
        ExecCtx {
            thread: vm.current,
            act: 0,
            bottom: 2,
            tmpl,
        }
    }

    #[test]
    fn unresolved_identifier_reports_through_option() {
        let mut vm = Vm::new();
        let tmpl = Rc::new(CompiledFunction::new(vec![], 4));
        let ctx = ctx_for_entry(&mut vm, tmpl);

        assert!(vm.get_var(&ctx, "missing", false).unwrap().is_none());
        assert!(vm.get_var(&ctx, "missing", true).is_err());
        assert_eq!(vm.lj.kind, crate::state::LjKind::Throw);
    }

    #[test]
    fn sloppy_put_var_creates_global_property() {
        let mut vm = Vm::new();
        let tmpl = Rc::new(CompiledFunction::new(vec![], 4));
        let ctx = ctx_for_entry(&mut vm, tmpl);

        vm.put_var(&ctx, "leak", Value::number(9.0), false).unwrap();
        let (v, this) = vm.get_var(&ctx, "leak", true).unwrap().unwrap();
        assert_eq!(v.as_number(), Some(9.0));
        assert!(this.is_undefined());
    }

    #[test]
    fn declarations_reach_the_global_object_without_an_activation_env() {
        let mut vm = Vm::new();
        let tmpl = Rc::new(CompiledFunction::new(vec![], 4));
        let ctx = ctx_for_entry(&mut vm, tmpl);

        let already = vm
            .decl_var(
                &ctx,
                "counter".into(),
                Value::number(1.0),
                DECL_FLAG_WRITABLE | DECL_FLAG_ENUMERABLE,
            )
            .unwrap();
        assert!(!already);

        let global = vm.global_object();
        assert!(vm.object(global).has_own_property("counter"));

        let again = vm
            .decl_var(
                &ctx,
                "counter".into(),
                Value::Undefined,
                DECL_FLAG_WRITABLE | DECL_FLAG_UNDEF_VALUE,
            )
            .unwrap();
        assert!(again);

        let (v, _) = vm.get_var(&ctx, "counter", true).unwrap().unwrap();
        assert_eq!(v.as_number(), Some(1.0));
    }
}
