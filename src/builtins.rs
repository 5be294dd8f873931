//! Coroutine built-ins
//!
//! `resume` and `yield` are ordinary native functions; instead of
//! returning, they arm the longjmp state and trap into the unwinder, which
//! performs the actual thread switch. Embedders expose them to scripts as
//! lightfuncs or native function objects.

use crate::error::{ErrorKind, OpResult, Trap};
use crate::function::NativeCall;
use crate::interpreter::Vm;
use crate::state::LjKind;
use crate::thread::ThreadState;
use crate::value::Value;

/// `resume(thread, value, isError)`: start an inactive thread or wake a
/// yielded one, handing it `value` (or throwing it there when `isError`).
pub fn thread_resume(vm: &mut Vm, call: &NativeCall) -> OpResult<Value> {
    let target = call.arg(0);
    let payload = call.arg(1);
    let is_error = vm.to_boolean(&call.arg(2));

    let Some(tid) = vm.thread_of_value(&target) else {
        return Err(vm.throw(ErrorKind::Type, "resume target is not a thread"));
    };

    match vm.thread(tid).state {
        ThreadState::Yielded => {}
        ThreadState::Inactive => {
            if is_error {
                return Err(vm.throw(
                    ErrorKind::Type,
                    "cannot inject an error into a thread that has not started",
                ));
            }
        }
        _ => {
            return Err(
                vm.throw(ErrorKind::Type, "thread is not resumable in its current state")
            )
        }
    }

    vm.lj.arm(LjKind::Resume, payload, target, is_error);
    Err(Trap)
}

/// `yield(value, isError)`: suspend the current thread, delivering `value`
/// to the resumer (or throwing it there when `isError`). Legality — not
/// the entry thread, no native or constructor frame in between — is
/// enforced by the unwinder.
pub fn thread_yield(vm: &mut Vm, call: &NativeCall) -> OpResult<Value> {
    let payload = call.arg(0);
    let is_error = vm.to_boolean(&call.arg(1));

    vm.lj.arm(LjKind::Yield, payload, Value::Undefined, is_error);
    Err(Trap)
}
