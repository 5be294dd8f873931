//! Cooperative threads and their three parallel stacks
//!
//! Every thread owns a value stack, a call stack of activations, and a
//! catch stack of catchers. All three are plain growable vectors addressed
//! by index; nothing in the executor holds a reference into them across an
//! operation that might push, pop, or reenter.

use crate::env::EnvId;
use crate::value::Value;

use bitflags::bitflags;
use std::mem;
use std::rc::Rc;

/// Arena handle of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub(crate) u32);

impl ThreadId {
    /// Arena slot index.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Lifecycle state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Never resumed; holds only its initial function.
    Inactive,
    /// Currently executing.
    Running,
    /// Suspended inside a resume call, waiting for the resumee.
    Resumed,
    /// Suspended inside a yield call, waiting to be resumed.
    Yielded,
    /// Finished; cannot be resumed again.
    Terminated,
}

bitflags! {
    /// Per-activation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActFlags: u8 {
        /// Constructor invocation.
        const CONSTRUCT = 0x01;
        /// Yielding through this frame is not allowed (native frames,
        /// constructor calls).
        const PREVENT_YIELD = 0x02;
        /// Direct eval call.
        const DIRECT_EVAL = 0x04;
        /// The frame has been reused by a tail call.
        const TAIL_CALLED = 0x08;
    }
}

/// One in-flight function invocation.
#[derive(Debug, Clone)]
pub struct Activation {
    /// The callee: compiled function object, native function object, or
    /// lightfunc.
    pub func: Value,
    /// Next instruction index; meaningful for compiled callees only.
    pub pc: usize,
    /// Absolute value-stack index of register 0.
    pub idx_bottom: usize,
    /// Absolute value-stack index where the caller expects the return
    /// value.
    pub idx_retval: usize,
    /// Lexical environment; lazily initialized.
    pub lex_env: Option<EnvId>,
    /// Variable environment; lazily initialized.
    pub var_env: Option<EnvId>,
    pub flags: ActFlags,
}

/// Catcher classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatcherKind {
    /// try/catch/finally region (also carries `with` bindings).
    Tcf,
    /// Labeled break/continue site.
    Label,
}

bitflags! {
    /// Catcher state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CatcherFlags: u8 {
        /// A throw can still land in the catch clause.
        const CATCH_ENABLED = 0x01;
        /// The finally clause has not run yet.
        const FINALLY_ENABLED = 0x02;
        /// The catch clause binds the caught value to a name.
        const CATCH_BINDING = 0x04;
        /// The catcher spliced an environment over `lex_env` that must be
        /// restored when the catcher is dropped.
        const LEX_ENV_ACTIVE = 0x08;
    }
}

/// A try/catch/finally region, a labeled site, or a `with`-binding
/// lifetime.
#[derive(Debug, Clone)]
pub struct Catcher {
    pub kind: CatcherKind,
    pub flags: CatcherFlags,
    /// Owning activation index.
    pub callstack_index: usize,
    /// Instruction index of the first of the two contiguous jump slots.
    pub pc_base: usize,
    /// Absolute value-stack index of the two reserved registers
    /// (completion value, completion-kind code).
    pub idx_base: usize,
    /// Label id for Label catchers.
    pub label_id: u32,
    /// Catch-binding variable name.
    pub varname: Option<Rc<str>>,
    /// `lex_env` to restore when LEX_ENV_ACTIVE.
    pub saved_lex_env: Option<EnvId>,
}

/// One cooperative thread.
#[derive(Debug, Default)]
pub struct Thread {
    pub valstack: Vec<Value>,
    pub callstack: Vec<Activation>,
    pub catchstack: Vec<Catcher>,
    pub state: ThreadState,
    /// The thread that most recently resumed this one; cleared at
    /// termination.
    pub resumer: Option<ThreadId>,
    /// Count of PREVENT_YIELD activations on the call stack.
    pub prevent_count: u32,
    /// Initial function of an Inactive coroutine.
    pub initial_func: Option<Value>,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self::Inactive
    }
}

impl Thread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value-stack slot read (clone; values are cheap handles).
    pub fn get_slot(&self, idx: usize) -> Value {
        self.valstack[idx].clone()
    }

    /// Value-stack slot write. The old value is fully replaced before it is
    /// released, preserving the original save-old/overwrite ordering at
    /// sites where a release could reenter.
    pub fn put_slot(&mut self, idx: usize, value: Value) {
        let old = mem::replace(&mut self.valstack[idx], value);
        drop(old);
    }

    /// Grow or shrink the value stack to `new_len`, filling new slots with
    /// `undefined`.
    pub fn resize_valstack(&mut self, new_len: usize) {
        self.valstack.resize(new_len, Value::Undefined);
    }

    /// Push an activation, maintaining the prevent-yield aggregate.
    pub fn push_activation(&mut self, act: Activation) {
        if act.flags.contains(ActFlags::PREVENT_YIELD) {
            self.prevent_count += 1;
        }
        self.callstack.push(act);
    }

    /// Pop the top activation, maintaining the prevent-yield aggregate.
    pub fn pop_activation(&mut self) -> Option<Activation> {
        let act = self.callstack.pop()?;
        if act.flags.contains(ActFlags::PREVENT_YIELD) {
            self.prevent_count -= 1;
        }
        Some(act)
    }

    /// Pop activations until the call stack is `target_len` deep. The
    /// length is re-read every iteration; releasing an activation's
    /// resources may push or pop behind our back.
    pub fn unwind_callstack(&mut self, target_len: usize) {
        while self.callstack.len() > target_len {
            self.pop_activation();
        }
    }

    /// Pop catchers until the catch stack is `target_len` deep, restoring
    /// any spliced lexical environments on the way out.
    pub fn unwind_catchstack(&mut self, target_len: usize) {
        while self.catchstack.len() > target_len {
            let cat = self.catchstack.pop().expect("catchstack re-read above");
            if cat.flags.contains(CatcherFlags::LEX_ENV_ACTIVE) {
                if let Some(act) = self.callstack.get_mut(cat.callstack_index) {
                    act.lex_env = cat.saved_lex_env;
                }
            }
        }
    }

    /// Rewire the value stack after a callee returned into
    /// `idx_retval`. `retval_count` is 1 for a normal return, 0 for a
    /// finally continuation. The window is restored to the caller's
    /// `nregs`-sized view.
    pub fn reconfig_valstack(
        &mut self,
        caller_bottom: usize,
        idx_retval: usize,
        retval_count: usize,
        caller_nregs: usize,
    ) {
        self.valstack.truncate(idx_retval + retval_count);
        self.resize_valstack(caller_bottom + caller_nregs);
    }

    /// Index of the topmost activation.
    pub fn top_index(&self) -> usize {
        debug_assert!(!self.callstack.is_empty());
        self.callstack.len() - 1
    }

    /// Number of catchers owned by the topmost activation.
    pub fn catchers_in_top_activation(&self) -> usize {
        let top = self.callstack.len() - 1;
        self.catchstack
            .iter()
            .rev()
            .take_while(|c| c.callstack_index == top)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(bottom: usize, flags: ActFlags) -> Activation {
        Activation {
            func: Value::Undefined,
            pc: 0,
            idx_bottom: bottom,
            idx_retval: bottom.saturating_sub(2),
            lex_env: None,
            var_env: None,
            flags,
        }
    }

    #[test]
    fn prevent_count_tracks_native_frames() {
        let mut thr = Thread::new();
        thr.push_activation(act(2, ActFlags::empty()));
        thr.push_activation(act(8, ActFlags::PREVENT_YIELD));
        thr.push_activation(act(12, ActFlags::PREVENT_YIELD));
        assert_eq!(thr.prevent_count, 2);

        thr.unwind_callstack(1);
        assert_eq!(thr.prevent_count, 0);
        assert_eq!(thr.callstack.len(), 1);
    }

    #[test]
    fn catchstack_unwind_restores_spliced_environments() {
        let mut thr = Thread::new();
        thr.push_activation(act(2, ActFlags::empty()));
        thr.callstack[0].lex_env = Some(EnvId(7));

        thr.catchstack.push(Catcher {
            kind: CatcherKind::Tcf,
            flags: CatcherFlags::LEX_ENV_ACTIVE,
            callstack_index: 0,
            pc_base: 0,
            idx_base: 0,
            label_id: 0,
            varname: None,
            saved_lex_env: Some(EnvId(3)),
        });

        thr.unwind_catchstack(0);
        assert_eq!(thr.callstack[0].lex_env, Some(EnvId(3)));
    }

    #[test]
    fn reconfig_restores_caller_window() {
        let mut thr = Thread::new();
        // Caller frame: bottom 2, nregs 4; callee occupied 6..=9 with its
        // retval slot at 4.
        thr.valstack = vec![Value::Undefined; 10];
        thr.put_slot(4, Value::number(42.0));

        thr.reconfig_valstack(2, 4, 1, 4);
        assert_eq!(thr.valstack.len(), 6);
        assert_eq!(thr.get_slot(4).as_number(), Some(42.0));
    }
}
