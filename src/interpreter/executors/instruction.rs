//! Instruction fetch and the primary opcode dispatch

use crate::error::{ErrorKind, OpResult, Trap};
use crate::instruction::{
    ExtraOp, Instruction, OpcodeRepr, CALL_FLAG_EVALCALL, CALL_FLAG_TAILCALL,
    DECL_FLAG_UNDEF_VALUE, RETURN_FLAG_HAVE_VALUE, TRY_FLAG_CATCH_BINDING, TRY_FLAG_HAVE_CATCH,
    TRY_FLAG_HAVE_FINALLY, TRY_FLAG_WITH_BINDING,
};
use crate::state::LjKind;
use crate::thread::{Catcher, CatcherFlags, CatcherKind};
use crate::value::Value;

use super::super::frame::CallFlags;
use super::super::internal::ExecCtx;
use super::super::Vm;

impl Vm {
    /// Execute one instruction of the current thread's topmost activation.
    /// `Err(Trap)` means the longjmp state is armed.
    pub(crate) fn step(&mut self) -> OpResult<()> {
        self.interrupt_counter -= 1;
        if self.interrupt_counter <= 0 {
            self.run_interrupt_hook()?;
        }

        // Re-derive every piece of hot state; the previous instruction may
        // have pushed frames, switched threads, or grown the stacks.
        let thr_id = self.current;
        let (act_idx, func) = {
            let thr = self.thread(thr_id);
            let idx = thr.top_index();
            (idx, thr.callstack[idx].func.clone())
        };
        let Some((tmpl, _)) = self.as_compiled(&func) else {
            return Err(self.internal_error("running activation is not compiled"));
        };

        let (bottom, pc) = {
            let act = &self.thread(thr_id).callstack[act_idx];
            (act.idx_bottom, act.pc)
        };
        debug_assert_eq!(
            self.thread(thr_id).valstack.len(),
            bottom + tmpl.nregs as usize,
            "register window invariant broken at instruction boundary"
        );

        let Some(word) = tmpl.code.get(pc).copied() else {
            return Err(self.internal_error("program counter ran past the code end"));
        };
        self.thread_mut(thr_id).callstack[act_idx].pc = pc + 1;

        let ctx = ExecCtx {
            thread: thr_id,
            act: act_idx,
            bottom,
            tmpl,
        };
        self.dispatch(&ctx, Instruction::new(word))
    }

    fn bump_pc(&mut self, ctx: &ExecCtx, delta: usize) {
        self.thread_mut(ctx.thread).callstack[ctx.act].pc += delta;
    }

    fn dispatch(&mut self, ctx: &ExecCtx, ins: Instruction) -> OpResult<()> {
        let a = ins.a() as usize;

        match ins.op() {
            OpcodeRepr::INVALID => {
                return Err(self.internal_error("INVALID opcode executed"));
            }

            OpcodeRepr::NOP => {}

            /* loads */
            OpcodeRepr::LDREG => {
                let v = self.load_reg(ctx, ins.bc() as usize)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::STREG => {
                let v = self.load_reg(ctx, a)?;
                let dst = ins.bc() as usize;
                if dst >= ctx.tmpl.nregs as usize {
                    return Err(self.internal_error("register target out of window"));
                }
                self.store_reg(ctx, dst, v)?;
            }

            OpcodeRepr::LDCONST => {
                let v = self.load_const(ctx, ins.bc())?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::LDINT => {
                self.store_reg(ctx, a, Value::number(ins.bc_biased() as f64))?;
            }

            OpcodeRepr::LDINTX => {
                let cur = self.load_reg(ctx, a)?;
                let Some(x) = cur.as_number() else {
                    return Err(self.internal_error("LDINTX target is not a number"));
                };
                let v = x * (1u64 << crate::consts::LDINTX_SHIFT) as f64 + ins.bc() as f64;
                self.store_reg(ctx, a, Value::number(v))?;
            }

            OpcodeRepr::LDUNDEF => self.store_reg(ctx, a, Value::Undefined)?,
            OpcodeRepr::LDNULL => self.store_reg(ctx, a, Value::Null)?,
            OpcodeRepr::LDTRUE => self.store_reg(ctx, a, Value::Boolean(true))?,
            OpcodeRepr::LDFALSE => self.store_reg(ctx, a, Value::Boolean(false))?,

            OpcodeRepr::CLOSURE => {
                let Some(template) = ctx.tmpl.inner.get(ins.bc() as usize).cloned() else {
                    return Err(self.internal_error("inner function index out of table"));
                };
                let env = self.current_lex_env(ctx);
                let closure = self.instantiate_closure(template, Some(env));
                self.store_reg(ctx, a, closure)?;
            }

            /* variables */
            OpcodeRepr::GETVAR => {
                let name = self.load_const_str(ctx, ins.bc())?;
                let (v, _) = self
                    .get_var(ctx, &name, true)?
                    .expect("resolved or thrown above");
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::PUTVAR => {
                let name = self.load_const_str(ctx, ins.bc())?;
                let v = self.load_reg(ctx, a)?;
                let strict = ctx.tmpl.strict;
                self.put_var(ctx, &name, v, strict)?;
            }

            OpcodeRepr::DECLVAR => {
                let name = match self.load_rk(ctx, ins.b())? {
                    Value::String(s) => s,
                    _ => return Err(self.internal_error("DECLVAR name is not a string")),
                };
                let flags = ins.a();
                let value = if flags & DECL_FLAG_UNDEF_VALUE != 0 {
                    Value::Undefined
                } else {
                    self.load_reg(ctx, ins.c() as usize)?
                };
                self.decl_var(ctx, name, value, flags)?;
            }

            /* properties */
            OpcodeRepr::GETPROP => {
                let obj = self.load_rk(ctx, ins.b())?;
                let key = self.load_rk(ctx, ins.c())?;
                let v = self.get_prop(&obj, &key)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::PUTPROP => {
                let obj = self.load_reg(ctx, a)?;
                let key = self.load_rk(ctx, ins.b())?;
                let v = self.load_rk(ctx, ins.c())?;
                let strict = ctx.tmpl.strict;
                self.put_prop(&obj, &key, v, strict)?;
            }

            OpcodeRepr::DELPROP => {
                let obj = self.load_rk(ctx, ins.b())?;
                let key = self.load_rk(ctx, ins.c())?;
                let strict = ctx.tmpl.strict;
                let deleted = self.del_prop(&obj, &key, strict)?;
                self.store_reg(ctx, a, Value::Boolean(deleted))?;
            }

            /* call setup */
            OpcodeRepr::CSREG => {
                let func = self.load_reg(ctx, ins.b() as usize)?;
                self.store_reg(ctx, a, func)?;
                self.store_reg(ctx, a + 1, Value::Undefined)?;
            }

            OpcodeRepr::CSVAR => {
                let name = match self.load_rk(ctx, ins.b())? {
                    Value::String(s) => s,
                    _ => return Err(self.internal_error("CSVAR name is not a string")),
                };
                let (v, this) = self
                    .get_var(ctx, &name, true)?
                    .expect("resolved or thrown above");
                self.store_reg(ctx, a, v)?;
                self.store_reg(ctx, a + 1, this)?;
            }

            OpcodeRepr::CSPROP => {
                let obj = self.load_rk(ctx, ins.b())?;
                let key = self.load_rk(ctx, ins.c())?;
                let v = self.get_prop(&obj, &key)?;
                self.store_reg(ctx, a, v)?;
                self.store_reg(ctx, a + 1, obj)?;
            }

            /* literals */
            OpcodeRepr::MPUTOBJ => {
                self.op_mput_obj(ctx, a, ins.b() as usize, ins.c() as usize)?;
            }

            OpcodeRepr::MPUTOBJI => {
                let start = self.indirect_base(ctx, ins.b() as usize)?;
                self.op_mput_obj(ctx, a, start, ins.c() as usize)?;
            }

            OpcodeRepr::MPUTARR => {
                self.op_mput_arr(ctx, a, ins.b() as usize, ins.c() as usize)?;
            }

            OpcodeRepr::MPUTARRI => {
                let start = self.indirect_base(ctx, ins.b() as usize)?;
                self.op_mput_arr(ctx, a, start, ins.c() as usize)?;
            }

            /* arithmetic */
            OpcodeRepr::ADD => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.add_values(&l, &r)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::SUB => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.arith_values(&l, &r, |x, y| x - y)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::MUL => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.arith_values(&l, &r, |x, y| x * y)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::DIV => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.arith_values(&l, &r, |x, y| x / y)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::MOD => {
                // f64's rem operator carries C fmod semantics.
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.arith_values(&l, &r, |x, y| x % y)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::BAND => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.bitwise_values(&l, &r, |x, y| x & y)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::BOR => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.bitwise_values(&l, &r, |x, y| x | y)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::BXOR => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.bitwise_values(&l, &r, |x, y| x ^ y)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::BASL => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.shift_left(&l, &r)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::BASR => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.shift_right(&l, &r)?;
                self.store_reg(ctx, a, v)?;
            }

            OpcodeRepr::BLSR => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.shift_right_logical(&l, &r)?;
                self.store_reg(ctx, a, v)?;
            }

            /* comparisons */
            OpcodeRepr::EQ => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.abstract_equals(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            OpcodeRepr::NEQ => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.abstract_equals(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(!v))?;
            }

            OpcodeRepr::SEQ => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.strict_equals(&l, &r);
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            OpcodeRepr::SNEQ => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.strict_equals(&l, &r);
                self.store_reg(ctx, a, Value::Boolean(!v))?;
            }

            OpcodeRepr::LT => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.compare_lt(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            OpcodeRepr::LE => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.compare_le(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            OpcodeRepr::GT => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.compare_gt(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            OpcodeRepr::GE => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.compare_ge(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            OpcodeRepr::IN => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.has_prop_value(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            OpcodeRepr::INSTOF => {
                let (l, r) = self.load_operands(ctx, &ins)?;
                let v = self.instanceof_values(&l, &r)?;
                self.store_reg(ctx, a, Value::Boolean(v))?;
            }

            /* branches */
            OpcodeRepr::IF => {
                let cond = self.load_rk(ctx, ins.b())?;
                if self.to_boolean(&cond) == (ins.a() != 0) {
                    self.bump_pc(ctx, 1);
                }
            }

            OpcodeRepr::JUMP => {
                let pc = self.thread(ctx.thread).callstack[ctx.act].pc;
                let target = pc as i64 + ins.abc_biased();
                if target < 0 || target as usize > ctx.tmpl.code.len() {
                    return Err(self.internal_error("jump displacement out of code"));
                }
                self.thread_mut(ctx.thread).callstack[ctx.act].pc = target as usize;
            }

            OpcodeRepr::BREAK => {
                self.lj.arm(
                    LjKind::Break,
                    Value::number(ins.bc() as f64),
                    Value::Undefined,
                    false,
                );
                return Err(Trap);
            }

            OpcodeRepr::CONTINUE => {
                self.lj.arm(
                    LjKind::Continue,
                    Value::number(ins.bc() as f64),
                    Value::Undefined,
                    false,
                );
                return Err(Trap);
            }

            /* function control */
            OpcodeRepr::CALL => {
                let flags = call_flags(ins.a());
                self.op_call(ctx, ins.b() as usize, ins.c() as usize, flags)?;
            }

            OpcodeRepr::CALLI => {
                let flags = call_flags(ins.a());
                let base = self.indirect_base(ctx, ins.b() as usize)?;
                self.op_call(ctx, base, ins.c() as usize, flags)?;
            }

            OpcodeRepr::NEW => {
                self.op_call(
                    ctx,
                    ins.b() as usize,
                    ins.c() as usize,
                    CallFlags::CONSTRUCT,
                )?;
            }

            OpcodeRepr::RETURN => {
                let value = if ins.a() & RETURN_FLAG_HAVE_VALUE != 0 {
                    self.load_rk(ctx, ins.b())?
                } else {
                    Value::Undefined
                };
                self.lj.arm(LjKind::Return, value, Value::Undefined, false);
                return Err(Trap);
            }

            /* try/catch/finally and labels */
            OpcodeRepr::LABEL => {
                let pc_base = self.thread(ctx.thread).callstack[ctx.act].pc;
                self.thread_mut(ctx.thread).catchstack.push(Catcher {
                    kind: CatcherKind::Label,
                    flags: CatcherFlags::empty(),
                    callstack_index: ctx.act,
                    pc_base,
                    idx_base: 0,
                    label_id: ins.bc(),
                    varname: None,
                    saved_lex_env: None,
                });
                self.bump_pc(ctx, 2);
            }

            OpcodeRepr::ENDLABEL => {
                let ok = matches!(
                    self.thread(ctx.thread).catchstack.last(),
                    Some(cat) if cat.kind == CatcherKind::Label && cat.callstack_index == ctx.act
                );
                if !ok {
                    return Err(self.internal_error("ENDLABEL without an open label catcher"));
                }
                let keep = self.thread(ctx.thread).catchstack.len() - 1;
                self.thread_mut(ctx.thread).unwind_catchstack(keep);
            }

            OpcodeRepr::TRYCATCH => self.op_trycatch(ctx, &ins)?,
            OpcodeRepr::ENDTRY => self.op_endtry(ctx)?,
            OpcodeRepr::ENDCATCH => self.op_endcatch(ctx)?,
            OpcodeRepr::ENDFIN => return self.op_endfin(ctx),

            /* iteration */
            OpcodeRepr::INITENUM => {
                let target = self.load_reg(ctx, ins.c() as usize)?;
                let v = if target.is_nullish() {
                    // Null sentinel enumerator: NEXTENUM falls through
                    // immediately.
                    Value::Null
                } else {
                    let id = self.to_object(&target)?;
                    self.create_enumerator(id)
                };
                self.store_reg(ctx, ins.b() as usize, v)?;
            }

            OpcodeRepr::NEXTENUM => {
                let enum_v = self.load_reg(ctx, ins.c() as usize)?;
                match enum_v {
                    Value::Null => {}
                    Value::Object(id) => match self.enum_next(id) {
                        Some(key) => {
                            self.store_reg(ctx, ins.b() as usize, Value::String(key))?;
                            self.bump_pc(ctx, 1);
                        }
                        None => {}
                    },
                    _ => return Err(self.internal_error("NEXTENUM operand is not an enumerator")),
                }
            }

            /* misc */
            OpcodeRepr::THROW => {
                let value = self.load_rk(ctx, ins.b())?;
                return Err(self.throw_value(value));
            }

            OpcodeRepr::EXTRA => return self.dispatch_extra(ctx, &ins),
        }

        Ok(())
    }

    fn dispatch_extra(&mut self, ctx: &ExecCtx, ins: &Instruction) -> OpResult<()> {
        let b = ins.b() as usize;

        let Some(sub) = ExtraOp::from_u8(ins.a()) else {
            return Err(self.internal_error("unassigned EXTRA sub-opcode"));
        };

        match sub {
            ExtraOp::LDTHIS => {
                let this = self.thread(ctx.thread).get_slot(ctx.bottom - 1);
                self.store_reg(ctx, b, this)?;
            }

            ExtraOp::UNM => {
                let v = self.load_rk(ctx, ins.c())?;
                let v = self.negate_value(&v)?;
                self.store_reg(ctx, b, v)?;
            }

            ExtraOp::UNP => {
                let v = self.load_rk(ctx, ins.c())?;
                let v = self.plus_value(&v)?;
                self.store_reg(ctx, b, v)?;
            }

            ExtraOp::BNOT => {
                let v = self.load_rk(ctx, ins.c())?;
                let v = self.bitwise_not_value(&v)?;
                self.store_reg(ctx, b, v)?;
            }

            ExtraOp::LNOT => {
                let v = self.load_rk(ctx, ins.c())?;
                let v = Value::Boolean(!self.to_boolean(&v));
                self.store_reg(ctx, b, v)?;
            }

            ExtraOp::TYPEOF => {
                let v = self.load_rk(ctx, ins.c())?;
                let name = self.typeof_value(&v);
                self.store_reg(ctx, b, Value::string(name))?;
            }

            ExtraOp::TYPEOFID => {
                let name = self.load_const_str(ctx, ins.c() as u32)?;
                let v = match self.get_var(ctx, &name, false)? {
                    Some((v, _)) => Value::string(self.typeof_value(&v)),
                    None => Value::string("undefined"),
                };
                self.store_reg(ctx, b, v)?;
            }

            ExtraOp::DELVAR => {
                let name = self.load_const_str(ctx, ins.c() as u32)?;
                let deleted = self.del_var(ctx, &name)?;
                self.store_reg(ctx, b, Value::Boolean(deleted))?;
            }

            ExtraOp::NEWOBJ => {
                let id = self.new_object();
                self.store_reg(ctx, b, Value::Object(id))?;
            }

            ExtraOp::NEWARR => {
                let id = self.new_array();
                self.store_reg(ctx, b, Value::Object(id))?;
            }

            ExtraOp::SETALEN => {
                let arr = self.load_reg(ctx, b)?;
                let Some(id) = arr.as_object().filter(|id| self.object(*id).is_array()) else {
                    return Err(self.internal_error("SETALEN target is not an array"));
                };
                let len_v = self.load_rk(ctx, ins.c())?;
                let len = self.to_uint32(&len_v)?;
                self.set_array_length(id, len);
            }

            ExtraOp::INITGET | ExtraOp::INITSET => {
                let obj = self.load_reg(ctx, b)?;
                let Some(id) = obj.as_object() else {
                    return Err(self.internal_error("accessor target is not an object"));
                };
                let pair = ins.c() as usize;
                let key_v = self.load_reg(ctx, pair)?;
                let func = self.load_reg(ctx, pair + 1)?;
                let key = self.to_string_value(&key_v)?;
                if sub == ExtraOp::INITGET {
                    self.define_accessor(id, key, Some(func), None);
                } else {
                    self.define_accessor(id, key, None, Some(func));
                }
            }

            ExtraOp::REGEXP => {
                let pair = ins.c() as usize;
                let pattern_v = self.load_reg(ctx, pair)?;
                let flags_v = self.load_reg(ctx, pair + 1)?;
                let pattern = self.to_string_value(&pattern_v)?;
                let flags = self.to_string_value(&flags_v)?;
                let v = self.create_regexp_instance(pattern, flags);
                self.store_reg(ctx, b, v)?;
            }

            ExtraOp::INVLHS => {
                return Err(self.throw(
                    ErrorKind::Reference,
                    "invalid left-hand side in assignment",
                ));
            }

            ExtraOp::NEWI => {
                let base = self.indirect_base(ctx, b)?;
                self.op_call(ctx, base, ins.c() as usize, CallFlags::CONSTRUCT)?;
            }

            ExtraOp::CSREGI => {
                let base = self.indirect_base(ctx, b)?;
                let func = self.load_reg(ctx, ins.c() as usize)?;
                self.store_reg(ctx, base, func)?;
                self.store_reg(ctx, base + 1, Value::Undefined)?;
            }

            ExtraOp::CSVARI => {
                let base = self.indirect_base(ctx, b)?;
                let name = self.load_const_str(ctx, ins.c() as u32)?;
                let (v, this) = self
                    .get_var(ctx, &name, true)?
                    .expect("resolved or thrown above");
                self.store_reg(ctx, base, v)?;
                self.store_reg(ctx, base + 1, this)?;
            }

            ExtraOp::CSPROPI => {
                let base = self.indirect_base(ctx, b)?;
                let pair = ins.c() as usize;
                let obj = self.load_reg(ctx, pair)?;
                let key = self.load_reg(ctx, pair + 1)?;
                let v = self.get_prop(&obj, &key)?;
                self.store_reg(ctx, base, v)?;
                self.store_reg(ctx, base + 1, obj)?;
            }
        }

        Ok(())
    }

    fn load_operands(&mut self, ctx: &ExecCtx, ins: &Instruction) -> OpResult<(Value, Value)> {
        let l = self.load_rk(ctx, ins.b())?;
        let r = self.load_rk(ctx, ins.c())?;
        Ok((l, r))
    }

    fn op_mput_obj(
        &mut self,
        ctx: &ExecCtx,
        obj_reg: usize,
        start: usize,
        count: usize,
    ) -> OpResult<()> {
        let obj = self.load_reg(ctx, obj_reg)?;
        let Some(id) = obj.as_object() else {
            return Err(self.internal_error("MPUTOBJ target is not an object"));
        };
        if count % 2 != 0 {
            return Err(self.internal_error("MPUTOBJ needs key/value pairs"));
        }
        for i in (0..count).step_by(2) {
            let key_v = self.load_reg(ctx, start + i)?;
            let value = self.load_reg(ctx, start + i + 1)?;
            let key = self.to_string_value(&key_v)?;
            self.define_index_aware(id, key, crate::object::Property::data(value));
        }
        Ok(())
    }

    fn op_mput_arr(
        &mut self,
        ctx: &ExecCtx,
        arr_reg: usize,
        start: usize,
        count: usize,
    ) -> OpResult<()> {
        let arr = self.load_reg(ctx, arr_reg)?;
        let Some(id) = arr.as_object().filter(|id| self.object(*id).is_array()) else {
            return Err(self.internal_error("MPUTARR target is not an array"));
        };
        let base_v = self.load_reg(ctx, start)?;
        let base = self.to_uint32(&base_v)?;
        for i in 0..count {
            let value = self.load_reg(ctx, start + 1 + i)?;
            let key: std::rc::Rc<str> = (base + i as u32).to_string().into();
            self.define_index_aware(id, key, crate::object::Property::data(value));
        }
        // Explicit length set closes the bulk write.
        let end = base + count as u32;
        let cur = match self.object(id).kind {
            crate::object::ObjectKind::Array { length } => length,
            _ => 0,
        };
        self.set_array_length(id, cur.max(end));
        Ok(())
    }

    fn op_trycatch(&mut self, ctx: &ExecCtx, ins: &Instruction) -> OpResult<()> {
        let flags = ins.a();
        let reserve = ins.b() as usize;
        if reserve + 1 >= ctx.tmpl.nregs as usize {
            return Err(self.internal_error("TRYCATCH reserved registers out of window"));
        }

        let mut cflags = CatcherFlags::empty();
        let mut varname = None;
        if flags & TRY_FLAG_HAVE_CATCH != 0 {
            cflags |= CatcherFlags::CATCH_ENABLED;
        }
        if flags & TRY_FLAG_HAVE_FINALLY != 0 {
            cflags |= CatcherFlags::FINALLY_ENABLED;
        }
        if flags & TRY_FLAG_CATCH_BINDING != 0 {
            cflags |= CatcherFlags::CATCH_BINDING;
            varname = Some(self.load_const_str(ctx, ins.c() as u32)?);
        }

        let mut saved_lex_env = None;
        if flags & TRY_FLAG_WITH_BINDING != 0 {
            // The with target coerces before the catcher exists; a throw
            // here unwinds the plain way.
            let target = self.load_reg(ctx, ins.c() as usize)?;
            let obj = self.to_object(&target)?;
            let parent = self.current_lex_env(ctx);
            let env = self.alloc_env(crate::env::EnvRecord::object(obj, true, Some(parent)));
            let act = &mut self.thread_mut(ctx.thread).callstack[ctx.act];
            saved_lex_env = act.lex_env;
            act.lex_env = Some(env);
            cflags |= CatcherFlags::LEX_ENV_ACTIVE;
        }

        let pc_base = self.thread(ctx.thread).callstack[ctx.act].pc;
        self.thread_mut(ctx.thread).catchstack.push(Catcher {
            kind: CatcherKind::Tcf,
            flags: cflags,
            callstack_index: ctx.act,
            pc_base,
            idx_base: ctx.bottom + reserve,
            label_id: 0,
            varname,
            saved_lex_env,
        });
        self.bump_pc(ctx, 2);
        Ok(())
    }

    /// The innermost TCF catcher, which the END* opcodes operate on. The
    /// compiler closes regions strictly LIFO.
    fn top_tcf(&mut self, ctx: &ExecCtx) -> OpResult<usize> {
        match self.thread(ctx.thread).catchstack.last() {
            Some(cat) if cat.kind == CatcherKind::Tcf && cat.callstack_index == ctx.act => {
                Ok(self.thread(ctx.thread).catchstack.len() - 1)
            }
            _ => Err(self.internal_error("try/catch close without an open TCF catcher")),
        }
    }

    fn op_endtry(&mut self, ctx: &ExecCtx) -> OpResult<()> {
        let idx = self.top_tcf(ctx)?;
        let thr = self.thread_mut(ctx.thread);
        let cat = &mut thr.catchstack[idx];

        // The try body completed; the catch clause is out of reach either
        // way. A spliced `with` environment ends with the body.
        cat.flags.remove(CatcherFlags::CATCH_ENABLED);
        if cat.flags.contains(CatcherFlags::LEX_ENV_ACTIVE) {
            let saved = cat.saved_lex_env;
            cat.flags.remove(CatcherFlags::LEX_ENV_ACTIVE);
            thr.callstack[ctx.act].lex_env = saved;
        }

        let cat = &mut thr.catchstack[idx];
        if cat.flags.contains(CatcherFlags::FINALLY_ENABLED) {
            cat.flags.remove(CatcherFlags::FINALLY_ENABLED);
            let (pc_base, idx_base) = (cat.pc_base, cat.idx_base);
            thr.put_slot(idx_base, Value::Undefined);
            thr.put_slot(idx_base + 1, Value::number(LjKind::Normal as u8 as f64));
            thr.callstack[ctx.act].pc = pc_base + 1;
        } else {
            thr.unwind_catchstack(idx);
        }
        Ok(())
    }

    fn op_endcatch(&mut self, ctx: &ExecCtx) -> OpResult<()> {
        let idx = self.top_tcf(ctx)?;
        let thr = self.thread_mut(ctx.thread);
        let cat = &mut thr.catchstack[idx];

        if cat.flags.contains(CatcherFlags::LEX_ENV_ACTIVE) {
            let saved = cat.saved_lex_env;
            cat.flags.remove(CatcherFlags::LEX_ENV_ACTIVE);
            thr.callstack[ctx.act].lex_env = saved;
        }

        let cat = &mut thr.catchstack[idx];
        if cat.flags.contains(CatcherFlags::FINALLY_ENABLED) {
            cat.flags.remove(CatcherFlags::FINALLY_ENABLED);
            let (pc_base, idx_base) = (cat.pc_base, cat.idx_base);
            thr.put_slot(idx_base, Value::Undefined);
            thr.put_slot(idx_base + 1, Value::number(LjKind::Normal as u8 as f64));
            thr.callstack[ctx.act].pc = pc_base + 1;
        } else {
            thr.unwind_catchstack(idx);
        }
        Ok(())
    }

    /// Close the finally phase: re-raise the stored completion or fall
    /// through on Normal.
    fn op_endfin(&mut self, ctx: &ExecCtx) -> OpResult<()> {
        let idx = self.top_tcf(ctx)?;
        let (value, code) = {
            let thr = self.thread(ctx.thread);
            let cat = &thr.catchstack[idx];
            let value = thr.get_slot(cat.idx_base);
            let code = thr.get_slot(cat.idx_base + 1);
            (value, code)
        };

        let code = code
            .as_number()
            .filter(|x| x.fract() == 0.0 && *x >= 0.0 && *x <= u8::MAX as f64)
            .and_then(|x| LjKind::from_code(x as u8));

        self.thread_mut(ctx.thread).unwind_catchstack(idx);

        match code {
            Some(LjKind::Normal) => Ok(()),
            Some(LjKind::Throw) => Err(self.throw_value(value)),
            Some(kind @ (LjKind::Return | LjKind::Break | LjKind::Continue)) => {
                self.lj.arm(kind, value, Value::Undefined, false);
                Err(Trap)
            }
            _ => Err(self.internal_error("ENDFIN read a malformed completion code")),
        }
    }
}

const fn call_flags(a: u8) -> CallFlags {
    let mut flags = CallFlags::empty();
    if a & CALL_FLAG_TAILCALL != 0 {
        flags = flags.union(CallFlags::TAILCALL);
    }
    if a & CALL_FLAG_EVALCALL != 0 {
        flags = flags.union(CallFlags::EVALCALL);
    }
    flags
}
