//! Compiled and native function representations

use crate::error::OpResult;
use crate::interpreter::Vm;
use crate::value::Value;

use std::rc::Rc;

/// Arguments handed to a native function. Argument values are also kept
/// alive on the caller's value stack for the duration of the call.
#[derive(Debug, Clone)]
pub struct NativeCall {
    /// The `this` binding.
    pub this: Value,
    /// Call arguments.
    pub args: Vec<Value>,
}

impl NativeCall {
    /// Argument `i`, or `undefined` when absent.
    pub fn arg(&self, i: usize) -> Value {
        self.args.get(i).cloned().unwrap_or(Value::Undefined)
    }
}

/// Native function entry point. A `Trap` return means the longjmp state has
/// been armed (throw, yield, resume).
pub type NativeFn = fn(&mut Vm, &NativeCall) -> OpResult<Value>;

/// A compiled function body. Immutable after construction; the instruction
/// array and constant pool keep stable addresses for the function's
/// lifetime.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    /// Diagnostic name; also used for self-reference in named function
    /// expressions.
    pub name: Option<Rc<str>>,
    /// Instruction words.
    pub code: Rc<[u32]>,
    /// Constant pool.
    pub consts: Rc<[Value]>,
    /// Inner function templates, instantiated by `CLOSURE`.
    pub inner: Rc<[Rc<CompiledFunction>]>,
    /// Register count; the value-stack window size for every activation of
    /// this function.
    pub nregs: u16,
    /// Declared formal parameter count. Arguments land in registers
    /// `0..nargs`; extras are clipped, missing ones read `undefined`.
    pub nargs: u16,
    /// Strict-mode body.
    pub strict: bool,
    /// The body declares bindings of its own (closures over locals, local
    /// `var`s); activations get their environment record created on first
    /// demand instead of at call time.
    pub own_env: bool,
}

impl CompiledFunction {
    /// Create a function body from instruction words. Register count must
    /// cover every register the body addresses.
    pub fn new(code: Vec<u32>, nregs: u16) -> Self {
        Self {
            name: None,
            code: code.into(),
            consts: Rc::from([]),
            inner: Rc::from([]),
            nregs,
            nargs: 0,
            strict: false,
            own_env: false,
        }
    }

    /// Attach a constant pool.
    pub fn with_consts(mut self, consts: Vec<Value>) -> Self {
        self.consts = consts.into();
        self
    }

    /// Attach inner function templates.
    pub fn with_inner(mut self, inner: Vec<Rc<CompiledFunction>>) -> Self {
        self.inner = inner.into();
        self
    }

    /// Set the declared formal count.
    pub fn with_nargs(mut self, nargs: u16) -> Self {
        self.nargs = nargs;
        self
    }

    /// Set the diagnostic/self-reference name.
    pub fn with_name(mut self, name: impl Into<Rc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the body strict.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Mark the body as declaring its own bindings; see `own_env`.
    pub fn with_own_env(mut self) -> Self {
        self.own_env = true;
        self
    }
}
