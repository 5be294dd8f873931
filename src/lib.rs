//! Register-based ECMAScript 5 bytecode interpreter core.
//!
//! The crate executes compiled functions — register-machine instruction
//! bodies with attached constant pools and inner-function tables — on
//! cooperative threads. A single unwinding protocol carries `throw`,
//! `return`, labeled `break`/`continue`, and coroutine `yield`/`resume`
//! through nested try/catch/finally regions; Ecma-to-Ecma calls reuse the
//! executor loop so script recursion never grows the host stack.
//!
//! There is no parser here: programs are assembled from
//! [`instruction::Opcode`] and wrapped in [`function::CompiledFunction`]
//! bodies, then run with [`interpreter::Vm::call`].

#![deny(unsafe_code)]

pub mod builtins;
pub mod consts;
pub mod env;
pub mod error;
pub mod function;
pub mod instruction;
pub mod interpreter;
pub mod object;
pub mod state;
pub mod thread;
pub mod value;

pub mod prelude {
    pub use crate::builtins::{thread_resume, thread_yield};
    pub use crate::consts::VmParams;
    pub use crate::error::{ErrorKind, VmError};
    pub use crate::function::{CompiledFunction, NativeCall, NativeFn};
    pub use crate::instruction::{
        rk_const, rk_reg, Opcode, CALL_FLAG_TAILCALL, DECL_FLAG_CONFIGURABLE,
        DECL_FLAG_ENUMERABLE, DECL_FLAG_WRITABLE, RETURN_FLAG_HAVE_VALUE, TRY_FLAG_CATCH_BINDING,
        TRY_FLAG_HAVE_CATCH, TRY_FLAG_HAVE_FINALLY, TRY_FLAG_WITH_BINDING,
    };
    pub use crate::interpreter::{ErrorAugmentHook, InterruptHook, Vm};
    pub use crate::object::{ObjectId, PropFlags};
    pub use crate::state::LjKind;
    pub use crate::thread::ThreadState;
    pub use crate::value::Value;
}
