//! VM parameters and instruction-encoding constants

/* INSTRUCTION FIELDS */

/// Width of the primary opcode field, in bits.
pub const OP_BITS: u32 = 6;

/// Width of the `a` field, in bits.
pub const A_BITS: u32 = 8;

/// Width of the `b` and `c` fields, in bits.
pub const BC_FIELD_BITS: u32 = 9;

/// Mask for the `a` field.
pub const A_MASK: u32 = (1 << A_BITS) - 1;

/// Mask for the `b` and `c` fields.
pub const BC_FIELD_MASK: u32 = (1 << BC_FIELD_BITS) - 1;

/// Mask for the combined 18-bit `bc` field.
pub const BC_MASK: u32 = (1 << 18) - 1;

/// Mask for the combined 26-bit `abc` field.
pub const ABC_MASK: u32 = (1 << 26) - 1;

/// Bit marking a 9-bit operand as a constant-pool reference instead of a
/// register.
pub const CONST_BIT: u32 = 0x100;

/// Bias applied to the signed 18-bit immediate of `LDINT`.
pub const LDINT_BIAS: i64 = 1 << 17;

/// Number of bits shifted in by one `LDINTX`.
pub const LDINTX_SHIFT: u32 = 18;

/// Bias applied to the signed 26-bit displacement of `JUMP`.
pub const JUMP_BIAS: i64 = 1 << 25;

/// Largest register addressable through the `a` field.
pub const MAX_A_REG: usize = A_MASK as usize;

/// Largest register addressable through a 9-bit register-or-constant field.
pub const MAX_RK_REG: usize = 0xff;

/* RUNTIME LIMITS */

/// Default value-stack entry limit per thread.
pub const DEFAULT_VALSTACK_LIMIT: usize = 256 * 1024;

/// Default activation count limit per thread.
pub const DEFAULT_CALLSTACK_LIMIT: usize = 10_000;

/// Default host-recursion limit for native re-entry into the executor.
pub const DEFAULT_MAX_CALL_RECURSION: usize = 250;

/// Default instruction count between interrupt-hook firings.
pub const DEFAULT_INTERRUPT_INTERVAL: u64 = 200_000;

/// Slots below an activation's register window holding the function and
/// `this` values.
pub const CALL_SETUP_SLOTS: usize = 2;

/// Canonical quiet-NaN bit pattern every NaN result is normalized to.
pub const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// Tunable execution limits, grouped so embedders can override them in one
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmParams {
    /// Maximum value-stack entries per thread.
    pub valstack_limit: usize,
    /// Maximum activations per thread.
    pub callstack_limit: usize,
    /// Maximum host-recursion depth (native frames re-entering the executor).
    pub max_call_recursion: usize,
    /// Instructions executed between interrupt-hook firings.
    pub interrupt_interval: u64,
}

impl Default for VmParams {
    fn default() -> Self {
        Self {
            valstack_limit: DEFAULT_VALSTACK_LIMIT,
            callstack_limit: DEFAULT_CALLSTACK_LIMIT,
            max_call_recursion: DEFAULT_MAX_CALL_RECURSION,
            interrupt_interval: DEFAULT_INTERRUPT_INTERVAL,
        }
    }
}
