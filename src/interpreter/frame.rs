//! Call setup: the Ecma-to-Ecma fast path, tail-call folding,
//! bound-function flattening, the native slow path, and coroutine switching

use super::internal::ExecCtx;
use super::Vm;
use crate::error::{ErrorKind, OpResult, Trap};
use crate::function::NativeCall;
use crate::object::{FunctionKind, Object, ObjectKind};
use crate::thread::{ActFlags, Activation, ThreadId, ThreadState};
use crate::value::Value;

use bitflags::bitflags;
use tracing::debug;

/// Bound chains longer than this are treated as runaway.
const BOUND_CHAIN_SANITY: usize = 10_000;

bitflags! {
    /// Flags steering one call setup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CallFlags: u8 {
        /// Reuse the current activation when eligible.
        const TAILCALL = 0x01;
        /// Direct eval call.
        const EVALCALL = 0x02;
        /// Constructor invocation.
        const CONSTRUCT = 0x04;
    }
}

impl Vm {
    /// Generic call entry used by the host API, accessors, and coercion
    /// methods. Host-recursive: each nesting level consumes one unit of
    /// the call-recursion budget.
    pub(crate) fn call_value(
        &mut self,
        func: Value,
        this: Value,
        args: &[Value],
    ) -> OpResult<Value> {
        if self.recursion_depth >= self.params.max_call_recursion {
            return Err(self.throw(ErrorKind::Range, "call recursion limit reached"));
        }
        self.recursion_depth += 1;
        let result = self.do_call_value(func, this, args);
        self.recursion_depth -= 1;
        result
    }

    fn do_call_value(&mut self, func: Value, this: Value, args: &[Value]) -> OpResult<Value> {
        let thr_id = self.current;
        let (val_mark, call_mark, catch_mark) = {
            let thr = self.thread(thr_id);
            (
                thr.valstack.len(),
                thr.callstack.len(),
                thr.catchstack.len(),
            )
        };

        // Arguments go onto the value stack before anything that can
        // reenter, so they stay reachable throughout the call.
        {
            let thr = self.thread_mut(thr_id);
            thr.valstack.push(func);
            thr.valstack.push(this);
            thr.valstack.extend(args.iter().cloned());
        }

        let base = val_mark;
        if self.ecma_call_setup(base, args.len(), CallFlags::empty())? {
            match self.execute(thr_id, call_mark) {
                Ok(value) => {
                    let thr = self.thread_mut(thr_id);
                    debug_assert_eq!(thr.valstack.len(), base + 1);
                    thr.valstack.truncate(val_mark);
                    Ok(value)
                }
                Err(Trap) => {
                    self.cleanup_call(thr_id, val_mark, call_mark, catch_mark);
                    Err(Trap)
                }
            }
        } else {
            match self.handle_native_call(base, args.len(), false) {
                Ok(()) => {
                    let thr = self.thread_mut(thr_id);
                    let value = thr.get_slot(base);
                    thr.valstack.truncate(val_mark);
                    Ok(value)
                }
                Err(Trap) => {
                    // A coroutine transfer cannot cross a host-level call
                    // boundary; only throws continue outward.
                    if self.lj.kind != crate::state::LjKind::Throw {
                        self.lj.clear();
                        let _ = self.throw(
                            ErrorKind::Type,
                            "coroutine transfer across a host call boundary",
                        );
                    }
                    self.cleanup_call(thr_id, val_mark, call_mark, catch_mark);
                    Err(Trap)
                }
            }
        }
    }

    fn cleanup_call(
        &mut self,
        thr_id: ThreadId,
        val_mark: usize,
        call_mark: usize,
        catch_mark: usize,
    ) {
        let thr = self.thread_mut(thr_id);
        thr.unwind_catchstack(catch_mark);
        thr.unwind_callstack(call_mark);
        thr.valstack.truncate(val_mark);
    }

    /// Set up an Ecma-to-Ecma call for the `[func, this, args..]` window at
    /// absolute value-stack index `base`. Returns false when the resolved
    /// callee is not compiled; the caller then takes the host-recursive
    /// native path. On success the executor loop picks the new frame up by
    /// re-deriving its hot state.
    pub(crate) fn ecma_call_setup(
        &mut self,
        base: usize,
        nargs: usize,
        flags: CallFlags,
    ) -> OpResult<bool> {
        let thr_id = self.current;
        let (func, this, mut args) = {
            let thr = self.thread(thr_id);
            let func = thr.get_slot(base);
            let this = thr.get_slot(base + 1);
            let args: Vec<Value> = (0..nargs).map(|i| thr.get_slot(base + 2 + i)).collect();
            (func, this, args)
        };

        let (func, this) = {
            let (func, bound_this) = self.resolve_bound_chain(func, this, &mut args)?;
            if !self.is_callable_value(&func) {
                return Err(self.throw(ErrorKind::Type, "call target is not callable"));
            }
            (func, bound_this)
        };

        // The constructor `this` is a fresh object wired to the resolved
        // callee's prototype, for compiled and native constructors alike.
        let this = if flags.contains(CallFlags::CONSTRUCT) {
            let proto = self.get_prop(&func, &Value::string("prototype"))?;
            let obj = Object::new(ObjectKind::Plain).with_prototype(proto.as_object());
            Value::Object(self.alloc_object(obj))
        } else {
            this
        };

        let Some((tmpl, _env)) = self.as_compiled(&func) else {
            let thr = self.thread_mut(thr_id);
            thr.valstack.truncate(base);
            thr.valstack.push(func);
            thr.valstack.push(this);
            thr.valstack.append(&mut args);
            return Ok(false);
        };

        let this = if !tmpl.strict && this.is_nullish() {
            Value::Object(self.global_object)
        } else {
            this
        };

        let nregs = tmpl.nregs as usize;
        let tail_eligible = flags.contains(CallFlags::TAILCALL)
            && !flags.contains(CallFlags::CONSTRUCT)
            && {
                let thr = self.thread(thr_id);
                match thr.callstack.last() {
                    Some(act) => {
                        thr.catchers_in_top_activation() == 0
                            && !act.flags.intersects(
                                ActFlags::CONSTRUCT
                                    | ActFlags::PREVENT_YIELD
                                    | ActFlags::DIRECT_EVAL,
                            )
                    }
                    None => false,
                }
            };

        if tail_eligible {
            let thr = self.thread_mut(thr_id);
            let top = thr.top_index();
            let act = &thr.callstack[top];
            let bottom = act.idx_bottom;

            if bottom + nregs > self.params.valstack_limit {
                return Err(self.throw(ErrorKind::Range, "value stack limit reached"));
            }

            let thr = self.thread_mut(thr_id);
            thr.put_slot(bottom - 2, func.clone());
            thr.put_slot(bottom - 1, this);
            thr.valstack.truncate(bottom);
            for i in 0..nregs {
                let v = if i < tmpl.nargs as usize {
                    args.get(i).cloned().unwrap_or(Value::Undefined)
                } else {
                    Value::Undefined
                };
                thr.valstack.push(v);
            }

            let act = &mut thr.callstack[top];
            act.func = func;
            act.pc = 0;
            act.lex_env = None;
            act.var_env = None;
            act.flags |= ActFlags::TAIL_CALLED;

            debug!(name = ?tmpl.name, "tail call reused activation");
            return Ok(true);
        }

        {
            let thr = self.thread(thr_id);
            if thr.callstack.len() >= self.params.callstack_limit {
                return Err(self.throw(ErrorKind::Range, "call stack limit reached"));
            }
        }

        let bottom = base + 2;
        if bottom + nregs > self.params.valstack_limit {
            return Err(self.throw(ErrorKind::Range, "value stack limit reached"));
        }

        let mut act_flags = ActFlags::empty();
        if flags.contains(CallFlags::CONSTRUCT) {
            act_flags |= ActFlags::CONSTRUCT | ActFlags::PREVENT_YIELD;
        }
        if flags.contains(CallFlags::EVALCALL) {
            act_flags |= ActFlags::DIRECT_EVAL;
        }

        let thr = self.thread_mut(thr_id);
        thr.put_slot(base, func.clone());
        thr.put_slot(base + 1, this);
        thr.valstack.truncate(bottom);
        for i in 0..nregs {
            let v = if i < tmpl.nargs as usize {
                args.get(i).cloned().unwrap_or(Value::Undefined)
            } else {
                Value::Undefined
            };
            thr.valstack.push(v);
        }

        thr.push_activation(Activation {
            func,
            pc: 0,
            idx_bottom: bottom,
            idx_retval: base,
            lex_env: None,
            var_env: None,
            flags: act_flags,
        });

        debug!(name = ?tmpl.name, depth = self.thread(thr_id).callstack.len(), "ecma call setup");
        Ok(true)
    }

    /// Flatten a bound-function chain, prepending each link's bound
    /// arguments. Returns the resolved callee and the effective `this`.
    fn resolve_bound_chain(
        &mut self,
        mut func: Value,
        mut this: Value,
        args: &mut Vec<Value>,
    ) -> OpResult<(Value, Value)> {
        for _ in 0..BOUND_CHAIN_SANITY {
            let bound = match &func {
                Value::Object(id) => match &self.object(*id).kind {
                    ObjectKind::Function(FunctionKind::Bound {
                        target,
                        this: bound_this,
                        args: bound_args,
                    }) => Some(((**target).clone(), bound_this.clone(), bound_args.to_vec())),
                    _ => None,
                },
                _ => None,
            };
            match bound {
                Some((target, bound_this, mut bound_args)) => {
                    this = bound_this;
                    bound_args.append(args);
                    *args = bound_args;
                    func = target;
                }
                None => return Ok((func, this)),
            }
        }
        Err(self.throw(ErrorKind::Range, "bound function chain too long"))
    }

    /// Host-recursive call path for native functions and lightfuncs. The
    /// native activation carries PREVENT_YIELD; on a trap the frame is left
    /// in place for the unwinder.
    pub(crate) fn handle_native_call(
        &mut self,
        base: usize,
        nargs: usize,
        construct: bool,
    ) -> OpResult<()> {
        let thr_id = self.current;
        let (func, this, args) = {
            let thr = self.thread(thr_id);
            let func = thr.get_slot(base);
            let this = thr.get_slot(base + 1);
            let args: Vec<Value> = (0..nargs).map(|i| thr.get_slot(base + 2 + i)).collect();
            (func, this, args)
        };

        let native = match &func {
            Value::LightFunc(lf) => lf.func,
            Value::Object(id) => match &self.object(*id).kind {
                ObjectKind::Function(FunctionKind::Native { func, .. }) => *func,
                _ => return Err(self.internal_error("native call on non-native target")),
            },
            _ => return Err(self.internal_error("native call on non-function value")),
        };

        if self.recursion_depth >= self.params.max_call_recursion {
            return Err(self.throw(ErrorKind::Range, "call recursion limit reached"));
        }

        let mut act_flags = ActFlags::PREVENT_YIELD;
        if construct {
            act_flags |= ActFlags::CONSTRUCT;
        }
        self.thread_mut(thr_id).push_activation(Activation {
            func,
            pc: 0,
            idx_bottom: base + 2,
            idx_retval: base,
            lex_env: None,
            var_env: None,
            flags: act_flags,
        });

        let call = NativeCall {
            this: this.clone(),
            args,
        };
        self.recursion_depth += 1;
        let result = native(self, &call);
        self.recursion_depth -= 1;

        match result {
            Ok(value) => {
                let value = if construct && !value.is_object() {
                    this
                } else {
                    value
                };

                let thr = self.thread_mut(thr_id);
                let act = thr.pop_activation().expect("native activation pushed above");
                debug_assert_eq!(act.idx_retval, base);
                thr.put_slot(base, value);
                let caller = thr.callstack.last().map(|c| (c.idx_bottom, c.func.clone()));

                match caller {
                    Some((caller_bottom, caller_func)) => {
                        match self.as_compiled(&caller_func) {
                            Some((caller_tmpl, _)) => self.thread_mut(thr_id).reconfig_valstack(
                                caller_bottom,
                                base,
                                1,
                                caller_tmpl.nregs as usize,
                            ),
                            None => self.thread_mut(thr_id).valstack.truncate(base + 1),
                        }
                    }
                    None => self.thread_mut(thr_id).valstack.truncate(base + 1),
                }
                Ok(())
            }
            Err(Trap) => Err(Trap),
        }
    }

    /// Cooperative thread switch: state transitions first, then the
    /// current-thread handle.
    pub(crate) fn switch_thread(
        &mut self,
        from: ThreadId,
        from_state: ThreadState,
        to: ThreadId,
    ) {
        self.thread_mut(from).state = from_state;
        self.thread_mut(to).state = ThreadState::Running;
        self.current = to;
        debug!(?from, ?from_state, ?to, "thread switch");
    }

    /// Terminate a thread, releasing its stacks and clearing the resumer
    /// back-reference.
    pub(crate) fn terminate_thread(&mut self, id: ThreadId) {
        let thr = self.thread_mut(id);
        thr.state = ThreadState::Terminated;
        thr.resumer = None;
        thr.initial_func = None;
        thr.unwind_catchstack(0);
        thr.unwind_callstack(0);
        thr.valstack.clear();
        debug!(?id, "thread terminated");
    }

    /// Thread handle carried by a thread object value.
    pub(crate) fn thread_of_value(&self, v: &Value) -> Option<ThreadId> {
        match v {
            Value::Object(id) => match self.object(*id).kind {
                ObjectKind::Thread(tid) => Some(tid),
                _ => None,
            },
            _ => None,
        }
    }

    /// Used by the dispatcher's CALL family once operand registers are
    /// resolved.
    pub(crate) fn op_call(
        &mut self,
        ctx: &ExecCtx,
        base_reg: usize,
        nargs: usize,
        flags: CallFlags,
    ) -> OpResult<()> {
        if base_reg + 2 + nargs > ctx.tmpl.nregs as usize {
            return Err(self.internal_error("call window out of register range"));
        }
        let abs_base = ctx.bottom + base_reg;
        if !self.ecma_call_setup(abs_base, nargs, flags)? {
            self.handle_native_call(abs_base, nargs, flags.contains(CallFlags::CONSTRUCT))?;
        }
        Ok(())
    }
}
