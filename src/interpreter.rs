//! [`Vm`] implementation
//!
//! The VM owns the heap arenas (objects, environments, threads), the shared
//! longjmp state, and the interrupt bookkeeping. Submodules carry the
//! execution machinery: the coercion and arithmetic kernels, property and
//! variable access, call setup, the unwinder, and the opcode dispatcher.

use crate::consts::VmParams;
use crate::env::EnvRecord;
use crate::error::{ErrorKind, Trap, VmError};
use crate::function::{CompiledFunction, NativeFn};
use crate::object::{
    FunctionKind, Object, ObjectId, ObjectKind, PropFlags, Property, PropSlot,
};
use crate::state::{LjKind, LongjmpState};
use crate::thread::{Thread, ThreadId, ThreadState};
use crate::value::Value;

use std::rc::Rc;

mod alu;
mod coercion;
mod executors;
mod flow;
mod frame;
mod internal;
mod properties;

pub use frame::CallFlags;

/// Interrupt hook callback. Returning an error message makes the executor
/// throw a Range error at the next instruction boundary, which unwinds like
/// any other throw.
pub type InterruptHook = Box<dyn FnMut() -> Result<(), String>>;

/// Error augmentation hook: observes every thrown value before it enters
/// the unwinding machinery and may replace it (attach traceback data, wrap
/// primitives). A plain function pointer so augmentation can allocate
/// through the VM it is handed.
pub type ErrorAugmentHook = fn(&mut Vm, Value) -> Value;

/// The interpreter heap and execution entry points.
///
/// A `Vm` is single-threaded from the host's point of view; its coroutine
/// threads are cooperative and at most one is running at any time.
pub struct Vm {
    pub(crate) params: VmParams,
    pub(crate) objects: Vec<Object>,
    pub(crate) envs: Vec<EnvRecord>,
    pub(crate) threads: Vec<Thread>,
    /// The currently running thread.
    pub(crate) current: ThreadId,
    pub(crate) global_object: ObjectId,
    pub(crate) global_env: crate::env::EnvId,
    /// Shared non-local transfer slot; see [`LongjmpState`].
    pub(crate) lj: LongjmpState,
    /// Executor's hot countdown to the next interrupt-hook firing.
    pub(crate) interrupt_counter: i64,
    /// Host-recursion depth of native frames re-entering the executor.
    pub(crate) recursion_depth: usize,
    interrupt_hook: Option<InterruptHook>,
    error_augment_hook: Option<ErrorAugmentHook>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("objects", &self.objects.len())
            .field("envs", &self.envs.len())
            .field("threads", &self.threads.len())
            .field("current", &self.current)
            .field("lj", &self.lj.kind)
            .finish()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a VM with default parameters.
    pub fn new() -> Self {
        Self::with_params(VmParams::default())
    }

    /// Create a VM with the provided parameters.
    pub fn with_params(params: VmParams) -> Self {
        let mut vm = Self {
            interrupt_counter: params.interrupt_interval as i64,
            params,
            objects: Vec::new(),
            envs: Vec::new(),
            threads: Vec::new(),
            current: ThreadId(0),
            global_object: ObjectId(0),
            global_env: crate::env::EnvId(0),
            lj: LongjmpState::default(),
            recursion_depth: 0,
            interrupt_hook: None,
            error_augment_hook: None,
        };

        vm.global_object = vm.alloc_object(Object::new(ObjectKind::Plain));
        vm.global_env = vm.alloc_env(EnvRecord::object(vm.global_object, false, None));

        let mut main = Thread::new();
        main.state = ThreadState::Running;
        vm.current = vm.alloc_thread(main);

        vm
    }

    /// Configured execution limits.
    pub const fn params(&self) -> &VmParams {
        &self.params
    }

    /// The global object handle.
    pub const fn global_object(&self) -> ObjectId {
        self.global_object
    }

    /// Install the interrupt hook.
    pub fn set_interrupt_hook(&mut self, hook: InterruptHook) {
        self.interrupt_hook = Some(hook);
    }

    /// Install the error augmentation hook.
    pub fn set_error_augment_hook(&mut self, hook: ErrorAugmentHook) {
        self.error_augment_hook = Some(hook);
    }

    /* arena access */

    pub(crate) fn alloc_object(&mut self, obj: Object) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(obj);
        id
    }

    pub(crate) fn alloc_env(&mut self, env: EnvRecord) -> crate::env::EnvId {
        let id = crate::env::EnvId(self.envs.len() as u32);
        self.envs.push(env);
        id
    }

    pub(crate) fn alloc_thread(&mut self, thr: Thread) -> ThreadId {
        let id = ThreadId(self.threads.len() as u32);
        self.threads.push(thr);
        id
    }

    /// Object by handle.
    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.index()]
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.index()]
    }

    pub(crate) fn env(&self, id: crate::env::EnvId) -> &EnvRecord {
        &self.envs[id.index()]
    }

    pub(crate) fn env_mut(&mut self, id: crate::env::EnvId) -> &mut EnvRecord {
        &mut self.envs[id.index()]
    }

    pub(crate) fn thread(&self, id: ThreadId) -> &Thread {
        &self.threads[id.index()]
    }

    pub(crate) fn thread_mut(&mut self, id: ThreadId) -> &mut Thread {
        &mut self.threads[id.index()]
    }

    /* value builders */

    /// Create an empty plain object.
    pub fn new_object(&mut self) -> ObjectId {
        self.alloc_object(Object::new(ObjectKind::Plain))
    }

    /// Create an empty array.
    pub fn new_array(&mut self) -> ObjectId {
        self.alloc_object(Object::new(ObjectKind::Array { length: 0 }))
    }

    /// Instantiate a compiled function template into a callable closure
    /// value. The closure's scope chain bottoms out at the global
    /// environment.
    pub fn new_function(&mut self, template: Rc<CompiledFunction>) -> Value {
        self.instantiate_closure(template, None)
    }

    pub(crate) fn instantiate_closure(
        &mut self,
        template: Rc<CompiledFunction>,
        env: Option<crate::env::EnvId>,
    ) -> Value {
        let proto = self.new_object();
        let mut obj = Object::new(ObjectKind::Function(FunctionKind::Compiled {
            template,
            env,
        }));
        obj.define_own_property(
            "prototype".into(),
            Property {
                slot: PropSlot::Data(Value::Object(proto)),
                flags: PropFlags::WRITABLE,
            },
        );
        Value::Object(self.alloc_object(obj))
    }

    /// Create a native function object.
    pub fn new_native_function(&mut self, name: impl Into<Rc<str>>, func: NativeFn) -> Value {
        let obj = Object::new(ObjectKind::Function(FunctionKind::Native {
            func,
            name: name.into(),
        }));
        Value::Object(self.alloc_object(obj))
    }

    /// Create a bound function over `target`.
    pub fn new_bound_function(&mut self, target: Value, this: Value, args: Vec<Value>) -> Value {
        let obj = Object::new(ObjectKind::Function(FunctionKind::Bound {
            target: Box::new(target),
            this,
            args: args.into(),
        }));
        Value::Object(self.alloc_object(obj))
    }

    /// Create an error object of the given kind.
    pub fn new_error(&mut self, kind: ErrorKind, message: impl Into<Rc<str>>) -> Value {
        let mut obj = Object::new(ObjectKind::Error);
        obj.define_own_property(
            "name".into(),
            Property {
                slot: PropSlot::Data(Value::string(kind.name())),
                flags: PropFlags::WRITABLE.union(PropFlags::CONFIGURABLE),
            },
        );
        obj.define_own_property(
            "message".into(),
            Property {
                slot: PropSlot::Data(Value::String(message.into())),
                flags: PropFlags::WRITABLE.union(PropFlags::CONFIGURABLE),
            },
        );
        Value::Object(self.alloc_object(obj))
    }

    /// Define a data property with default attributes.
    pub fn define_data_property(&mut self, obj: ObjectId, key: impl Into<Rc<str>>, value: Value) {
        self.object_mut(obj)
            .define_own_property(key.into(), Property::data(value));
    }

    /// Define or extend an accessor property; `None` halves keep any
    /// existing counterpart.
    pub fn define_accessor_property(
        &mut self,
        obj: ObjectId,
        key: impl Into<Rc<str>>,
        get: Option<Value>,
        set: Option<Value>,
    ) {
        self.define_accessor(obj, key.into(), get, set);
    }

    /* throw plumbing */

    /// Arm the longjmp state with a thrown value, giving the augmentation
    /// hook a chance to replace it first.
    pub(crate) fn throw_value(&mut self, value: Value) -> Trap {
        let value = match self.error_augment_hook {
            Some(hook) => hook(self, value),
            None => value,
        };
        self.lj.arm(LjKind::Throw, value, Value::Undefined, false);
        Trap
    }

    /// Construct an error object of `kind` and throw it.
    pub(crate) fn throw(&mut self, kind: ErrorKind, message: &str) -> Trap {
        let err = self.new_error(kind, message);
        self.throw_value(err)
    }

    /// Internal-error shorthand for executor invariant violations.
    pub(crate) fn internal_error(&mut self, message: &str) -> Trap {
        self.throw(ErrorKind::Internal, message)
    }

    /// Convert an armed longjmp state into the embedder-visible error,
    /// clearing the state.
    pub(crate) fn consume_uncaught(&mut self) -> VmError {
        debug_assert_eq!(self.lj.kind, LjKind::Throw, "rethrow without armed throw");
        let (value, _) = self.lj.take_values();
        self.lj.clear();
        VmError::Uncaught(value)
    }

    /* entry points */

    /// Call a function value with an explicit `this` binding and argument
    /// list, running the executor to completion.
    ///
    /// On normal completion exactly one result value is produced. An
    /// uncaught script error is returned as [`VmError::Uncaught`] with the
    /// thrown value.
    pub fn call(&mut self, func: Value, this: Value, args: &[Value]) -> Result<Value, VmError> {
        if !self.is_callable_value(&func) {
            return Err(VmError::NotCallable);
        }
        match self.call_value(func, this, args) {
            Ok(v) => Ok(v),
            Err(Trap) => Err(self.consume_uncaught()),
        }
    }

    /// Create an inactive coroutine thread whose body is `func`, returned
    /// as a thread object value. The thread starts when it is first
    /// resumed.
    pub fn spawn_thread(&mut self, func: Value) -> Result<Value, VmError> {
        if self.as_compiled(&func).is_none() {
            return Err(VmError::NotThreadable);
        }

        let mut thr = Thread::new();
        thr.initial_func = Some(func);
        let tid = self.alloc_thread(thr);

        let obj = Object::new(ObjectKind::Thread(tid));
        Ok(Value::Object(self.alloc_object(obj)))
    }
}
