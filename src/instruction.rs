//! Bytecode instruction set
//!
//! Instructions are 32-bit words with fields `op:6`, `a:8`, `b:9`, `c:9`,
//! plus the combined views `bc:18` and `abc:26`. The 9-bit `b`/`c` fields
//! are register-or-constant where noted: bit 8 set selects constant-pool
//! entry `field & 0xff`, clear selects a register. Opcodes that run out of
//! the 6-bit primary space live in the `EXTRA` group with the sub-opcode in
//! the `a` field.

use crate::consts::*;

/// Register index carried in the 8-bit `a` field.
pub type RegId = u8;

/// A 9-bit register-or-constant operand.
pub type Rk = u16;

/// Wrap a register index as a register-or-constant operand.
pub const fn rk_reg(r: u8) -> Rk {
    r as Rk
}

/// Wrap a constant-pool index as a register-or-constant operand.
pub const fn rk_const(idx: u8) -> Rk {
    idx as Rk | CONST_BIT as Rk
}

/// Primary opcode representation; the full 6-bit space is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum OpcodeRepr {
    /// Compiler-emitted unreachable marker; executing it is an internal
    /// error.
    INVALID = 0x00,
    /// No operation.
    NOP = 0x01,
    /// `a` ← register `bc`.
    LDREG = 0x02,
    /// Register `bc` ← `a`.
    STREG = 0x03,
    /// `a` ← constant `bc`.
    LDCONST = 0x04,
    /// `a` ← biased signed 18-bit integer.
    LDINT = 0x05,
    /// Shift 18 more bits into the number in `a`.
    LDINTX = 0x06,
    /// `a` ← `undefined`.
    LDUNDEF = 0x07,
    /// `a` ← `null`.
    LDNULL = 0x08,
    /// `a` ← `true`.
    LDTRUE = 0x09,
    /// `a` ← `false`.
    LDFALSE = 0x0a,
    /// `a` ← closure of inner function template `bc`.
    CLOSURE = 0x0b,
    /// `a` ← value of identifier named by constant `bc`.
    GETVAR = 0x0c,
    /// Identifier named by constant `bc` ← register `a`.
    PUTVAR = 0x0d,
    /// Declare identifier `b` with value register `c`; flags in `a`.
    DECLVAR = 0x0e,
    /// `a` ← `b[c]`.
    GETPROP = 0x0f,
    /// `a[b]` ← `c`.
    PUTPROP = 0x10,
    /// `a` ← `delete b[c]`.
    DELPROP = 0x11,
    /// Call setup from register: `[a]` ← func in register `b`, `[a+1]` ←
    /// `undefined`.
    CSREG = 0x12,
    /// Call setup from identifier named by constant `b`.
    CSVAR = 0x13,
    /// Call setup from property `b[c]`; `this` is the base.
    CSPROP = 0x14,
    /// Bulk own-property define on object `a` from `c` registers at `b`.
    MPUTOBJ = 0x15,
    /// Bulk dense-index define on array `a` from `c` registers at `b`.
    MPUTARR = 0x16,
    ADD = 0x17,
    SUB = 0x18,
    MUL = 0x19,
    DIV = 0x1a,
    MOD = 0x1b,
    /// Bitwise and.
    BAND = 0x1c,
    /// Bitwise or.
    BOR = 0x1d,
    /// Bitwise xor.
    BXOR = 0x1e,
    /// Arithmetic shift left (`<<`).
    BASL = 0x1f,
    /// Arithmetic shift right (`>>`).
    BASR = 0x20,
    /// Logical shift right (`>>>`).
    BLSR = 0x21,
    /// Abstract equality.
    EQ = 0x22,
    NEQ = 0x23,
    /// Strict equality.
    SEQ = 0x24,
    SNEQ = 0x25,
    LT = 0x26,
    LE = 0x27,
    GT = 0x28,
    GE = 0x29,
    IN = 0x2a,
    /// `instanceof`.
    INSTOF = 0x2b,
    /// Skip the next instruction when `ToBoolean(b)` equals the `a` bit.
    IF = 0x2c,
    /// Unconditional jump, biased signed 26-bit displacement.
    JUMP = 0x2d,
    /// Raise a Break transfer carrying label id `bc`.
    BREAK = 0x2e,
    /// Raise a Continue transfer carrying label id `bc`.
    CONTINUE = 0x2f,
    /// Call `[b]` with `c` args; flags in `a`.
    CALL = 0x30,
    /// `CALL` with the base index held in register `b`.
    CALLI = 0x31,
    /// Constructor call, base `b`, `c` args.
    NEW = 0x32,
    /// Raise a Return transfer; flags in `a`, value operand `b`.
    RETURN = 0x33,
    /// Open a label catcher for label id `bc`.
    LABEL = 0x34,
    /// Close the innermost label catcher.
    ENDLABEL = 0x35,
    /// Open a try/catch/finally catcher; flags `a`, reserved base `b`,
    /// binding name or `with` target `c`.
    TRYCATCH = 0x36,
    /// Close the try phase.
    ENDTRY = 0x37,
    /// Close the catch phase.
    ENDCATCH = 0x38,
    /// Close the finally phase, re-raising the stored completion.
    ENDFIN = 0x39,
    /// `b` ← enumerator over `c` (null sentinel for nullish targets).
    INITENUM = 0x3a,
    /// Advance enumerator `c`; on a key write it to `b` and skip the next
    /// instruction, on exhaustion fall through.
    NEXTENUM = 0x3b,
    /// Raise a Throw transfer with value `b`.
    THROW = 0x3c,
    /// Escape group; sub-opcode in `a`.
    EXTRA = 0x3d,
    /// `MPUTOBJ` with the start register held in register `b`.
    MPUTOBJI = 0x3e,
    /// `MPUTARR` with the start register held in register `b`.
    MPUTARRI = 0x3f,
}

impl OpcodeRepr {
    /// Map a 6-bit primary field to its opcode. Total; the full space is
    /// assigned.
    pub const fn from_u6(op: u8) -> Self {
        use OpcodeRepr::*;
        match op & 0x3f {
            0x00 => INVALID,
            0x01 => NOP,
            0x02 => LDREG,
            0x03 => STREG,
            0x04 => LDCONST,
            0x05 => LDINT,
            0x06 => LDINTX,
            0x07 => LDUNDEF,
            0x08 => LDNULL,
            0x09 => LDTRUE,
            0x0a => LDFALSE,
            0x0b => CLOSURE,
            0x0c => GETVAR,
            0x0d => PUTVAR,
            0x0e => DECLVAR,
            0x0f => GETPROP,
            0x10 => PUTPROP,
            0x11 => DELPROP,
            0x12 => CSREG,
            0x13 => CSVAR,
            0x14 => CSPROP,
            0x15 => MPUTOBJ,
            0x16 => MPUTARR,
            0x17 => ADD,
            0x18 => SUB,
            0x19 => MUL,
            0x1a => DIV,
            0x1b => MOD,
            0x1c => BAND,
            0x1d => BOR,
            0x1e => BXOR,
            0x1f => BASL,
            0x20 => BASR,
            0x21 => BLSR,
            0x22 => EQ,
            0x23 => NEQ,
            0x24 => SEQ,
            0x25 => SNEQ,
            0x26 => LT,
            0x27 => LE,
            0x28 => GT,
            0x29 => GE,
            0x2a => IN,
            0x2b => INSTOF,
            0x2c => IF,
            0x2d => JUMP,
            0x2e => BREAK,
            0x2f => CONTINUE,
            0x30 => CALL,
            0x31 => CALLI,
            0x32 => NEW,
            0x33 => RETURN,
            0x34 => LABEL,
            0x35 => ENDLABEL,
            0x36 => TRYCATCH,
            0x37 => ENDTRY,
            0x38 => ENDCATCH,
            0x39 => ENDFIN,
            0x3a => INITENUM,
            0x3b => NEXTENUM,
            0x3c => THROW,
            0x3d => EXTRA,
            0x3e => MPUTOBJI,
            _ => MPUTARRI,
        }
    }
}

/// Sub-opcodes of the `EXTRA` group, carried in the `a` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum ExtraOp {
    /// `b` ← the activation's `this` binding.
    LDTHIS = 0x00,
    /// Unary minus.
    UNM = 0x01,
    /// Unary plus (ToNumber).
    UNP = 0x02,
    /// Bitwise not.
    BNOT = 0x03,
    /// Logical not.
    LNOT = 0x04,
    /// `b` ← typeof `c`.
    TYPEOF = 0x05,
    /// `b` ← typeof of the identifier named by constant `c`; unresolved
    /// yields `"undefined"` without throwing.
    TYPEOFID = 0x06,
    /// `b` ← `delete` of the identifier named by constant `c`.
    DELVAR = 0x07,
    /// `b` ← new empty object.
    NEWOBJ = 0x08,
    /// `b` ← new empty array.
    NEWARR = 0x09,
    /// Set array `b` length from `c`.
    SETALEN = 0x0a,
    /// Install a setter on object `b`; `[key, func]` at register pair `c`.
    INITSET = 0x0b,
    /// Install a getter on object `b`; `[key, func]` at register pair `c`.
    INITGET = 0x0c,
    /// `b` ← regexp instance from `[pattern, flags]` at register pair `c`.
    REGEXP = 0x0d,
    /// Throw ReferenceError for an invalid left-hand side.
    INVLHS = 0x0e,
    /// `NEW` with the base index held in register `b`.
    NEWI = 0x0f,
    /// `CSREG` with the base index held in register `b`, func in `c`.
    CSREGI = 0x10,
    /// `CSVAR` with the base index held in register `b`, name constant `c`.
    CSVARI = 0x11,
    /// `CSPROP` with the base index held in register `b`; `[obj, key]` at
    /// register pair `c`.
    CSPROPI = 0x12,
}

impl ExtraOp {
    /// Map an `a`-field value to a sub-opcode, or `None` for unassigned
    /// values (an internal error at execution time).
    pub const fn from_u8(a: u8) -> Option<Self> {
        use ExtraOp::*;
        Some(match a {
            0x00 => LDTHIS,
            0x01 => UNM,
            0x02 => UNP,
            0x03 => BNOT,
            0x04 => LNOT,
            0x05 => TYPEOF,
            0x06 => TYPEOFID,
            0x07 => DELVAR,
            0x08 => NEWOBJ,
            0x09 => NEWARR,
            0x0a => SETALEN,
            0x0b => INITSET,
            0x0c => INITGET,
            0x0d => REGEXP,
            0x0e => INVLHS,
            0x0f => NEWI,
            0x10 => CSREGI,
            0x11 => CSVARI,
            0x12 => CSPROPI,
            _ => return None,
        })
    }
}

/// A decoded instruction word with every field view precomputed, so the
/// dispatcher never branches on encoding shape.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    op: u8,
    a: u8,
    b: u16,
    c: u16,
    bc: u32,
    abc: u32,
}

impl Instruction {
    /// Extract all fields from a raw word.
    pub const fn new(word: u32) -> Self {
        Self {
            op: (word >> 26) as u8,
            a: ((word >> 18) & A_MASK) as u8,
            b: ((word >> 9) & BC_FIELD_MASK) as u16,
            c: (word & BC_FIELD_MASK) as u16,
            bc: word & BC_MASK,
            abc: word & ABC_MASK,
        }
    }

    /// Primary opcode.
    pub const fn op(&self) -> OpcodeRepr {
        OpcodeRepr::from_u6(self.op)
    }

    /// The `a` field.
    pub const fn a(&self) -> u8 {
        self.a
    }

    /// The `b` field.
    pub const fn b(&self) -> u16 {
        self.b
    }

    /// The `c` field.
    pub const fn c(&self) -> u16 {
        self.c
    }

    /// The combined 18-bit `bc` field.
    pub const fn bc(&self) -> u32 {
        self.bc
    }

    /// The combined 26-bit `abc` field.
    pub const fn abc(&self) -> u32 {
        self.abc
    }

    /// `bc` as the biased signed integer used by `LDINT`.
    pub const fn bc_biased(&self) -> i64 {
        self.bc as i64 - LDINT_BIAS
    }

    /// `abc` as the biased signed displacement used by `JUMP`.
    pub const fn abc_biased(&self) -> i64 {
        self.abc as i64 - JUMP_BIAS
    }
}

impl From<u32> for Instruction {
    fn from(word: u32) -> Self {
        Self::new(word)
    }
}

impl From<Opcode> for Instruction {
    fn from(op: Opcode) -> Self {
        Self::new(u32::from(op))
    }
}

/// Assembler-level opcode builder. Tests and embedders construct programs
/// from these and collect them into `Vec<u32>` bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Opcode {
    INVALID,
    NOP,
    /// dst ← register src (18-bit source index).
    LDREG(RegId, u32),
    /// register dst (18-bit index) ← src.
    STREG(RegId, u32),
    /// dst ← constant pool entry.
    LDCONST(RegId, u32),
    /// dst ← small integer.
    LDINT(RegId, i32),
    /// dst ← dst * 2^18 + bits.
    LDINTX(RegId, u32),
    LDUNDEF(RegId),
    LDNULL(RegId),
    LDTRUE(RegId),
    LDFALSE(RegId),
    /// dst ← closure over inner template.
    CLOSURE(RegId, u32),
    /// dst ← identifier value; name constant index.
    GETVAR(RegId, u32),
    /// identifier ← register; (src, name constant index).
    PUTVAR(RegId, u32),
    /// (flags, name, value register).
    DECLVAR(u8, Rk, u16),
    /// (dst, obj, key).
    GETPROP(RegId, Rk, Rk),
    /// (obj, key, value).
    PUTPROP(RegId, Rk, Rk),
    /// (dst, obj, key).
    DELPROP(RegId, Rk, Rk),
    /// (base, func register).
    CSREG(RegId, u16),
    /// (base, name constant).
    CSVAR(RegId, Rk),
    /// (base, obj, key).
    CSPROP(RegId, Rk, Rk),
    /// (obj, start register, count).
    MPUTOBJ(RegId, u16, u16),
    /// (array, start register, count).
    MPUTARR(RegId, u16, u16),
    ADD(RegId, Rk, Rk),
    SUB(RegId, Rk, Rk),
    MUL(RegId, Rk, Rk),
    DIV(RegId, Rk, Rk),
    MOD(RegId, Rk, Rk),
    BAND(RegId, Rk, Rk),
    BOR(RegId, Rk, Rk),
    BXOR(RegId, Rk, Rk),
    BASL(RegId, Rk, Rk),
    BASR(RegId, Rk, Rk),
    BLSR(RegId, Rk, Rk),
    EQ(RegId, Rk, Rk),
    NEQ(RegId, Rk, Rk),
    SEQ(RegId, Rk, Rk),
    SNEQ(RegId, Rk, Rk),
    LT(RegId, Rk, Rk),
    LE(RegId, Rk, Rk),
    GT(RegId, Rk, Rk),
    GE(RegId, Rk, Rk),
    IN(RegId, Rk, Rk),
    INSTOF(RegId, Rk, Rk),
    /// (expected truthiness, condition).
    IF(u8, Rk),
    /// Signed displacement relative to the next instruction.
    JUMP(i32),
    BREAK(u32),
    CONTINUE(u32),
    /// (flags, base register, nargs).
    CALL(u8, u16, u16),
    /// (flags, register holding base, nargs).
    CALLI(u8, u16, u16),
    /// (base register, nargs).
    NEW(u16, u16),
    /// (flags, value operand).
    RETURN(u8, Rk),
    LABEL(u32),
    ENDLABEL,
    /// (flags, reserved base register, name constant or target register).
    TRYCATCH(u8, u16, u16),
    ENDTRY,
    ENDCATCH,
    ENDFIN,
    /// (dst, target).
    INITENUM(u16, u16),
    /// (key dst, enumerator register).
    NEXTENUM(u16, u16),
    THROW(Rk),
    /// (obj, register holding start, count).
    MPUTOBJI(RegId, u16, u16),
    /// (array, register holding start, count).
    MPUTARRI(RegId, u16, u16),

    // EXTRA group
    LDTHIS(u16),
    UNM(u16, Rk),
    UNP(u16, Rk),
    BNOT(u16, Rk),
    LNOT(u16, Rk),
    TYPEOF(u16, Rk),
    TYPEOFID(u16, u16),
    DELVAR(u16, u16),
    NEWOBJ(u16),
    NEWARR(u16),
    SETALEN(u16, Rk),
    INITSET(u16, u16),
    INITGET(u16, u16),
    REGEXP(u16, u16),
    INVLHS,
    NEWI(u16, u16),
    CSREGI(u16, u16),
    CSVARI(u16, u16),
    CSPROPI(u16, u16),
}

const fn pack_abc(op: OpcodeRepr, a: u8, b: u16, c: u16) -> u32 {
    ((op as u32) << 26)
        | ((a as u32 & A_MASK) << 18)
        | ((b as u32 & BC_FIELD_MASK) << 9)
        | (c as u32 & BC_FIELD_MASK)
}

const fn pack_a_bc(op: OpcodeRepr, a: u8, bc: u32) -> u32 {
    ((op as u32) << 26) | ((a as u32 & A_MASK) << 18) | (bc & BC_MASK)
}

const fn pack_extra(sub: ExtraOp, b: u16, c: u16) -> u32 {
    pack_abc(OpcodeRepr::EXTRA, sub as u8, b, c)
}

impl From<Opcode> for u32 {
    fn from(op: Opcode) -> u32 {
        use Opcode as O;
        use OpcodeRepr as R;
        match op {
            O::INVALID => pack_abc(R::INVALID, 0, 0, 0),
            O::NOP => pack_abc(R::NOP, 0, 0, 0),
            O::LDREG(a, src) => pack_a_bc(R::LDREG, a, src),
            O::STREG(a, dst) => pack_a_bc(R::STREG, a, dst),
            O::LDCONST(a, idx) => pack_a_bc(R::LDCONST, a, idx),
            O::LDINT(a, v) => pack_a_bc(R::LDINT, a, (v as i64 + LDINT_BIAS) as u32),
            O::LDINTX(a, bits) => pack_a_bc(R::LDINTX, a, bits),
            O::LDUNDEF(a) => pack_abc(R::LDUNDEF, a, 0, 0),
            O::LDNULL(a) => pack_abc(R::LDNULL, a, 0, 0),
            O::LDTRUE(a) => pack_abc(R::LDTRUE, a, 0, 0),
            O::LDFALSE(a) => pack_abc(R::LDFALSE, a, 0, 0),
            O::CLOSURE(a, idx) => pack_a_bc(R::CLOSURE, a, idx),
            O::GETVAR(a, name) => pack_a_bc(R::GETVAR, a, name),
            O::PUTVAR(a, name) => pack_a_bc(R::PUTVAR, a, name),
            O::DECLVAR(flags, name, value) => pack_abc(R::DECLVAR, flags, name, value),
            O::GETPROP(a, obj, key) => pack_abc(R::GETPROP, a, obj, key),
            O::PUTPROP(a, key, value) => pack_abc(R::PUTPROP, a, key, value),
            O::DELPROP(a, obj, key) => pack_abc(R::DELPROP, a, obj, key),
            O::CSREG(a, func) => pack_abc(R::CSREG, a, func, 0),
            O::CSVAR(a, name) => pack_abc(R::CSVAR, a, name, 0),
            O::CSPROP(a, obj, key) => pack_abc(R::CSPROP, a, obj, key),
            O::MPUTOBJ(a, start, count) => pack_abc(R::MPUTOBJ, a, start, count),
            O::MPUTARR(a, start, count) => pack_abc(R::MPUTARR, a, start, count),
            O::ADD(a, b, c) => pack_abc(R::ADD, a, b, c),
            O::SUB(a, b, c) => pack_abc(R::SUB, a, b, c),
            O::MUL(a, b, c) => pack_abc(R::MUL, a, b, c),
            O::DIV(a, b, c) => pack_abc(R::DIV, a, b, c),
            O::MOD(a, b, c) => pack_abc(R::MOD, a, b, c),
            O::BAND(a, b, c) => pack_abc(R::BAND, a, b, c),
            O::BOR(a, b, c) => pack_abc(R::BOR, a, b, c),
            O::BXOR(a, b, c) => pack_abc(R::BXOR, a, b, c),
            O::BASL(a, b, c) => pack_abc(R::BASL, a, b, c),
            O::BASR(a, b, c) => pack_abc(R::BASR, a, b, c),
            O::BLSR(a, b, c) => pack_abc(R::BLSR, a, b, c),
            O::EQ(a, b, c) => pack_abc(R::EQ, a, b, c),
            O::NEQ(a, b, c) => pack_abc(R::NEQ, a, b, c),
            O::SEQ(a, b, c) => pack_abc(R::SEQ, a, b, c),
            O::SNEQ(a, b, c) => pack_abc(R::SNEQ, a, b, c),
            O::LT(a, b, c) => pack_abc(R::LT, a, b, c),
            O::LE(a, b, c) => pack_abc(R::LE, a, b, c),
            O::GT(a, b, c) => pack_abc(R::GT, a, b, c),
            O::GE(a, b, c) => pack_abc(R::GE, a, b, c),
            O::IN(a, b, c) => pack_abc(R::IN, a, b, c),
            O::INSTOF(a, b, c) => pack_abc(R::INSTOF, a, b, c),
            O::IF(expect, cond) => pack_abc(R::IF, expect, cond, 0),
            O::JUMP(disp) => {
                ((R::JUMP as u32) << 26) | (((disp as i64 + JUMP_BIAS) as u32) & ABC_MASK)
            }
            O::BREAK(label) => pack_a_bc(R::BREAK, 0, label),
            O::CONTINUE(label) => pack_a_bc(R::CONTINUE, 0, label),
            O::CALL(flags, base, nargs) => pack_abc(R::CALL, flags, base, nargs),
            O::CALLI(flags, base, nargs) => pack_abc(R::CALLI, flags, base, nargs),
            O::NEW(base, nargs) => pack_abc(R::NEW, 0, base, nargs),
            O::RETURN(flags, src) => pack_abc(R::RETURN, flags, src, 0),
            O::LABEL(label) => pack_a_bc(R::LABEL, 0, label),
            O::ENDLABEL => pack_abc(R::ENDLABEL, 0, 0, 0),
            O::TRYCATCH(flags, reserve, extra) => pack_abc(R::TRYCATCH, flags, reserve, extra),
            O::ENDTRY => pack_abc(R::ENDTRY, 0, 0, 0),
            O::ENDCATCH => pack_abc(R::ENDCATCH, 0, 0, 0),
            O::ENDFIN => pack_abc(R::ENDFIN, 0, 0, 0),
            O::INITENUM(dst, src) => pack_abc(R::INITENUM, 0, dst, src),
            O::NEXTENUM(dst, en) => pack_abc(R::NEXTENUM, 0, dst, en),
            O::THROW(src) => pack_abc(R::THROW, 0, src, 0),
            O::MPUTOBJI(a, start, count) => pack_abc(R::MPUTOBJI, a, start, count),
            O::MPUTARRI(a, start, count) => pack_abc(R::MPUTARRI, a, start, count),

            O::LDTHIS(dst) => pack_extra(ExtraOp::LDTHIS, dst, 0),
            O::UNM(dst, src) => pack_extra(ExtraOp::UNM, dst, src),
            O::UNP(dst, src) => pack_extra(ExtraOp::UNP, dst, src),
            O::BNOT(dst, src) => pack_extra(ExtraOp::BNOT, dst, src),
            O::LNOT(dst, src) => pack_extra(ExtraOp::LNOT, dst, src),
            O::TYPEOF(dst, src) => pack_extra(ExtraOp::TYPEOF, dst, src),
            O::TYPEOFID(dst, name) => pack_extra(ExtraOp::TYPEOFID, dst, name),
            O::DELVAR(dst, name) => pack_extra(ExtraOp::DELVAR, dst, name),
            O::NEWOBJ(dst) => pack_extra(ExtraOp::NEWOBJ, dst, 0),
            O::NEWARR(dst) => pack_extra(ExtraOp::NEWARR, dst, 0),
            O::SETALEN(arr, len) => pack_extra(ExtraOp::SETALEN, arr, len),
            O::INITSET(obj, base) => pack_extra(ExtraOp::INITSET, obj, base),
            O::INITGET(obj, base) => pack_extra(ExtraOp::INITGET, obj, base),
            O::REGEXP(dst, base) => pack_extra(ExtraOp::REGEXP, dst, base),
            O::INVLHS => pack_extra(ExtraOp::INVLHS, 0, 0),
            O::NEWI(base, nargs) => pack_extra(ExtraOp::NEWI, base, nargs),
            O::CSREGI(base, func) => pack_extra(ExtraOp::CSREGI, base, func),
            O::CSVARI(base, name) => pack_extra(ExtraOp::CSVARI, base, name),
            O::CSPROPI(base, pair) => pack_extra(ExtraOp::CSPROPI, base, pair),
        }
    }
}

impl FromIterator<Opcode> for Vec<u32> {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Opcode>,
    {
        iter.into_iter().map(u32::from).collect()
    }
}

/// Call-instruction flag: reuse the current activation instead of pushing.
pub const CALL_FLAG_TAILCALL: u8 = 0x01;

/// Call-instruction flag: direct eval call.
pub const CALL_FLAG_EVALCALL: u8 = 0x02;

/// Return-instruction flag: a return value operand is present.
pub const RETURN_FLAG_HAVE_VALUE: u8 = 0x01;

/// TRYCATCH flag: a catch clause is present.
pub const TRY_FLAG_HAVE_CATCH: u8 = 0x01;

/// TRYCATCH flag: a finally clause is present.
pub const TRY_FLAG_HAVE_FINALLY: u8 = 0x02;

/// TRYCATCH flag: bind the caught value to the name in the `c` constant.
pub const TRY_FLAG_CATCH_BINDING: u8 = 0x04;

/// TRYCATCH flag: splice an object environment over the target in register
/// `c` (the `with` statement).
pub const TRY_FLAG_WITH_BINDING: u8 = 0x08;

/// DECLVAR flag: binding is writable.
pub const DECL_FLAG_WRITABLE: u8 = 0x01;

/// DECLVAR flag: binding is enumerable.
pub const DECL_FLAG_ENUMERABLE: u8 = 0x02;

/// DECLVAR flag: binding is configurable (deletable).
pub const DECL_FLAG_CONFIGURABLE: u8 = 0x04;

/// DECLVAR flag: declaration has no initializer; keep an existing binding's
/// value.
pub const DECL_FLAG_UNDEF_VALUE: u8 = 0x08;

/// DECLVAR flag: function declaration; always overwrites.
pub const DECL_FLAG_FUNC_DECL: u8 = 0x10;
