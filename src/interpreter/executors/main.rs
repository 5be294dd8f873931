//! The executor main loop
//!
//! There is no host-level unwinding catchpoint; every non-local transfer
//! surfaces as the `Trap` sentinel with the longjmp state armed, and the
//! loop hands it to the unwinder. Hot state (thread, activation, function,
//! code) is re-derived on every iteration instead of being cached, so a
//! restart after an Ecma-to-Ecma call, a catch landing, or a coroutine
//! switch needs no special casing.

use crate::error::{OpResult, Trap};
use crate::state::UnwindAction;
use crate::thread::ThreadId;
use crate::value::Value;

use super::super::Vm;

impl Vm {
    /// Run the executor until the entry activation (the one at call-stack
    /// depth `entry_call_depth` of `entry_thread`) returns. An uncaught
    /// error leaves the longjmp state armed and surfaces as `Trap`.
    pub(crate) fn execute(
        &mut self,
        entry_thread: ThreadId,
        entry_call_depth: usize,
    ) -> OpResult<Value> {
        debug_assert_eq!(self.current, entry_thread);
        debug_assert!(self.thread(entry_thread).callstack.len() > entry_call_depth);

        loop {
            match self.step() {
                Ok(()) => continue,
                Err(Trap) => match self.handle_longjmp(entry_thread, entry_call_depth)? {
                    UnwindAction::Restart => continue,
                    UnwindAction::Finished(value) => return Ok(value),
                },
            }
        }
    }
}
