//! The unwinder: one dispatcher for every non-local transfer
//!
//! Entered by the executor loop whenever the longjmp state is armed.
//! Decides between restarting the loop (control landed somewhere in this
//! executor invocation), finishing (the entry activation returned), and
//! rethrowing to the caller of `execute` (uncaught at entry level, the
//! longjmp state left armed).

use super::Vm;
use crate::error::{ErrorKind, OpResult, Trap};
use crate::state::{LjKind, UnwindAction};
use crate::thread::{CatcherFlags, CatcherKind, ThreadId, ThreadState};
use crate::value::Value;

use tracing::debug;

impl Vm {
    pub(crate) fn handle_longjmp(
        &mut self,
        entry_thread: ThreadId,
        entry_call_depth: usize,
    ) -> OpResult<UnwindAction> {
        loop {
            debug!(kind = ?self.lj.kind, thread = ?self.current, "unwinder dispatch");
            match self.lj.kind {
                LjKind::Throw => match self.unwind_throw(entry_thread, entry_call_depth)? {
                    Some(action) => return Ok(action),
                    None => continue,
                },
                LjKind::Return => {
                    match self.unwind_return(entry_thread, entry_call_depth)? {
                        Some(action) => return Ok(action),
                        None => continue,
                    }
                }
                LjKind::Break | LjKind::Continue => match self.unwind_break_continue()? {
                    Some(action) => return Ok(action),
                    None => continue,
                },
                LjKind::Yield => match self.unwind_yield(entry_thread)? {
                    Some(action) => return Ok(action),
                    None => continue,
                },
                LjKind::Resume => match self.unwind_resume()? {
                    Some(action) => return Ok(action),
                    None => continue,
                },
                LjKind::Normal | LjKind::Unknown => {
                    self.lj.clear();
                    let _ = self.internal_error("unwinder entered without a live transfer");
                    continue;
                }
            }
        }
    }

    /// Throw dispatch: find a catch- or finally-enabled TCF catcher on the
    /// current thread within this executor invocation; cross the thread
    /// boundary to the resumer when the thread was resumed; rethrow at
    /// entry level.
    fn unwind_throw(
        &mut self,
        entry_thread: ThreadId,
        entry_call_depth: usize,
    ) -> OpResult<Option<UnwindAction>> {
        let thr_id = self.current;
        let threshold = if thr_id == entry_thread {
            entry_call_depth
        } else {
            0
        };

        let found = {
            let thr = self.thread(thr_id);
            let mut found = None;
            for i in (0..thr.catchstack.len()).rev() {
                let cat = &thr.catchstack[i];
                if cat.callstack_index < threshold {
                    break;
                }
                if cat.kind == CatcherKind::Tcf
                    && cat.flags.contains(CatcherFlags::CATCH_ENABLED)
                {
                    found = Some((i, false));
                    break;
                }
                if cat.flags.contains(CatcherFlags::FINALLY_ENABLED) {
                    found = Some((i, true));
                    break;
                }
            }
            found
        };

        if let Some((cat_idx, to_finally)) = found {
            let (value, _) = self.lj.take_values();
            self.lj.clear();
            self.land_in_catcher(thr_id, cat_idx, value, LjKind::Throw, to_finally)?;
            return Ok(Some(UnwindAction::Restart));
        }

        if thr_id == entry_thread {
            // Uncaught at entry level; the armed state travels to the
            // outer catchpoint.
            debug!("uncaught at entry level, rethrowing");
            return Err(Trap);
        }

        // Uncaught on a resumed thread: terminate it and re-dispatch the
        // throw in the resumer.
        let Some(resumer) = self.thread(thr_id).resumer else {
            return Err(Trap);
        };
        self.terminate_thread(thr_id);
        self.switch_thread(thr_id, ThreadState::Terminated, resumer);
        Ok(None)
    }

    /// Return dispatch: finally catchers of the current activation come
    /// first; then entry-level finish, caller handoff, or coroutine
    /// termination.
    fn unwind_return(
        &mut self,
        entry_thread: ThreadId,
        entry_call_depth: usize,
    ) -> OpResult<Option<UnwindAction>> {
        let thr_id = self.current;
        let top = self.thread(thr_id).top_index();

        if let Some(cat_idx) = self.finally_in_activation(thr_id, top) {
            let (value, _) = self.lj.take_values();
            self.lj.clear();
            self.land_in_catcher(thr_id, cat_idx, value, LjKind::Return, true)?;
            return Ok(Some(UnwindAction::Restart));
        }

        let (mut value, _) = self.lj.take_values();
        self.lj.clear();

        {
            let thr = self.thread(thr_id);
            let act = &thr.callstack[top];
            // A constructor replaces a primitive return value with the
            // fresh `this`.
            if act.flags.contains(crate::thread::ActFlags::CONSTRUCT) && !value.is_object() {
                value = thr.get_slot(act.idx_bottom - 1);
            }
        }

        // Catchers of the returning activation are done.
        {
            let thr = self.thread_mut(thr_id);
            let keep = thr.catchstack.len() - thr.catchers_in_top_activation();
            thr.unwind_catchstack(keep);
        }

        if thr_id == entry_thread && top == entry_call_depth {
            let thr = self.thread_mut(thr_id);
            let act = thr.pop_activation().expect("entry activation present");
            thr.valstack.truncate(act.idx_retval);
            thr.valstack.push(value.clone());
            debug!("entry activation returned");
            return Ok(Some(UnwindAction::Finished(value)));
        }

        if thr_id == entry_thread && top < entry_call_depth {
            return Err(self.internal_error("return below executor entry frame"));
        }

        if top > 0 {
            let thr = self.thread_mut(thr_id);
            let act = thr.pop_activation().expect("non-empty callstack");
            let caller = thr
                .callstack
                .last()
                .map(|c| (c.idx_bottom, c.func.clone()))
                .expect("caller activation present");
            thr.put_slot(act.idx_retval, value);

            let (caller_bottom, caller_func) = caller;
            let Some((caller_tmpl, _)) = self.as_compiled(&caller_func) else {
                return Err(self.internal_error("ecma frame returned into a native caller"));
            };
            self.thread_mut(thr_id).reconfig_valstack(
                caller_bottom,
                act.idx_retval,
                1,
                caller_tmpl.nregs as usize,
            );
            return Ok(Some(UnwindAction::Restart));
        }

        // The initial function of a coroutine returned: behave like a
        // final yield and terminate the thread.
        let Some(resumer) = self.thread(thr_id).resumer else {
            return Err(self.internal_error("thread without resumer returned at depth zero"));
        };
        self.terminate_thread(thr_id);
        self.switch_thread(thr_id, ThreadState::Terminated, resumer);
        self.deliver_pending(resumer, value)?;
        Ok(Some(UnwindAction::Restart))
    }

    /// Break/continue dispatch within the current activation. The compiler
    /// guarantees a matching label catcher; a miss is an internal error.
    fn unwind_break_continue(&mut self) -> OpResult<Option<UnwindAction>> {
        let is_continue = self.lj.kind == LjKind::Continue;
        let thr_id = self.current;
        let top = self.thread(thr_id).top_index();

        let label = match self.lj.value1.as_number() {
            Some(x) if x.fract() == 0.0 && x >= 0.0 => x as u32,
            _ => {
                self.lj.clear();
                let _ = self.internal_error("break/continue without a label id");
                return Ok(None);
            }
        };

        enum Landing {
            Finally(usize),
            Label(usize, usize),
        }

        let landing = {
            let thr = self.thread(thr_id);
            let mut landing = None;
            for i in (0..thr.catchstack.len()).rev() {
                let cat = &thr.catchstack[i];
                if cat.callstack_index != top {
                    break;
                }
                if cat.flags.contains(CatcherFlags::FINALLY_ENABLED) {
                    landing = Some(Landing::Finally(i));
                    break;
                }
                if cat.kind == CatcherKind::Label && cat.label_id == label {
                    landing = Some(Landing::Label(i, cat.pc_base));
                    break;
                }
            }
            landing
        };

        match landing {
            Some(Landing::Finally(i)) => {
                let code = if is_continue {
                    LjKind::Continue
                } else {
                    LjKind::Break
                };
                let (value, _) = self.lj.take_values();
                self.lj.clear();
                self.land_in_catcher(thr_id, i, value, code, true)?;
                Ok(Some(UnwindAction::Restart))
            }
            Some(Landing::Label(i, pc_base)) => {
                self.lj.clear();
                let thr = self.thread_mut(thr_id);
                thr.callstack[top].pc = pc_base + usize::from(is_continue);
                // Entries above the label catcher are done; the catcher
                // itself stays until ENDLABEL.
                thr.unwind_catchstack(i + 1);
                Ok(Some(UnwindAction::Restart))
            }
            None => {
                self.lj.clear();
                let _ = self.internal_error("unmatched break/continue label");
                Ok(None)
            }
        }
    }

    /// Yield dispatch: suspend the current thread and hand the payload (or
    /// error) to the resumer.
    fn unwind_yield(&mut self, entry_thread: ThreadId) -> OpResult<Option<UnwindAction>> {
        let thr_id = self.current;

        // The yield native's own frame accounts for one prevent-yield
        // unit; anything more means a native or constructor frame is in
        // the way. The entry thread of this executor has no resumer to
        // yield to.
        if thr_id == entry_thread || self.thread(thr_id).prevent_count != 1 {
            self.lj.clear();
            let _ = self.throw(
                ErrorKind::Type,
                "thread cannot yield from its current call state",
            );
            return Ok(None);
        }

        let Some(resumer) = self.thread(thr_id).resumer else {
            self.lj.clear();
            let _ = self.internal_error("yielding thread has no resumer");
            return Ok(None);
        };

        let is_error = self.lj.is_error;
        let (value, _) = self.lj.take_values();
        self.lj.clear();

        self.switch_thread(thr_id, ThreadState::Yielded, resumer);

        if is_error {
            let _ = self.throw_value(value);
            return Ok(None);
        }

        self.deliver_pending(resumer, value)?;
        Ok(Some(UnwindAction::Restart))
    }

    /// Resume dispatch: wake a yielded thread or start an inactive one.
    fn unwind_resume(&mut self) -> OpResult<Option<UnwindAction>> {
        let thr_id = self.current;
        let is_error = self.lj.is_error;
        let (payload, target) = self.lj.take_values();
        self.lj.clear();

        let Some(target_id) = self.thread_of_value(&target) else {
            let _ = self.internal_error("resume target is not a thread");
            return Ok(None);
        };

        match self.thread(target_id).state {
            ThreadState::Yielded => {
                self.thread_mut(target_id).resumer = Some(thr_id);
                self.switch_thread(thr_id, ThreadState::Resumed, target_id);

                if is_error {
                    // Thrown at the suspended yield point; the yield
                    // native's frame unwinds with the throw.
                    let _ = self.throw_value(payload);
                    return Ok(None);
                }
                self.deliver_pending(target_id, payload)?;
                Ok(Some(UnwindAction::Restart))
            }
            ThreadState::Inactive => {
                let Some(func) = self.thread_mut(target_id).initial_func.take() else {
                    let _ = self.internal_error("inactive thread has no initial function");
                    return Ok(None);
                };

                self.thread_mut(target_id).resumer = Some(thr_id);
                self.switch_thread(thr_id, ThreadState::Resumed, target_id);

                {
                    let thr = self.thread_mut(target_id);
                    thr.valstack.push(func);
                    thr.valstack.push(Value::Undefined);
                    thr.valstack.push(payload);
                }
                match self.ecma_call_setup(0, 1, super::frame::CallFlags::empty()) {
                    Ok(true) => Ok(Some(UnwindAction::Restart)),
                    Ok(false) => {
                        let _ =
                            self.internal_error("coroutine initial function is not compiled");
                        Ok(None)
                    }
                    // Setup threw (stack limits); dispatch it in the
                    // freshly started thread.
                    Err(Trap) => Ok(None),
                }
            }
            _ => {
                let _ = self.internal_error("resume target in unresumable state");
                Ok(None)
            }
        }
    }

    /// Topmost finally-enabled catcher owned by `act_idx`, if any.
    fn finally_in_activation(&self, thr_id: ThreadId, act_idx: usize) -> Option<usize> {
        let thr = self.thread(thr_id);
        for i in (0..thr.catchstack.len()).rev() {
            let cat = &thr.catchstack[i];
            if cat.callstack_index != act_idx {
                break;
            }
            if cat.flags.contains(CatcherFlags::FINALLY_ENABLED) {
                return Some(i);
            }
        }
        None
    }

    /// Land a completion in a catcher: unwind to its activation, store the
    /// completion value and code into the reserved registers, aim the pc
    /// at the catch or finally jump slot, and update the catcher flags
    /// (including the catch-binding environment splice).
    pub(crate) fn land_in_catcher(
        &mut self,
        thr_id: ThreadId,
        cat_idx: usize,
        value: Value,
        code: LjKind,
        to_finally: bool,
    ) -> OpResult<()> {
        let (callstack_index, pc_base, idx_base) = {
            let cat = &self.thread(thr_id).catchstack[cat_idx];
            (cat.callstack_index, cat.pc_base, cat.idx_base)
        };

        {
            let thr = self.thread_mut(thr_id);
            thr.unwind_catchstack(cat_idx + 1);
            thr.unwind_callstack(callstack_index + 1);

            // A still-spliced environment (the `with` target, or a catch
            // binding whose clause the completion is leaving) ends before
            // control lands in the catch or finally slot.
            let cat = &mut thr.catchstack[cat_idx];
            if cat.flags.contains(CatcherFlags::LEX_ENV_ACTIVE) {
                let saved = cat.saved_lex_env;
                cat.flags.remove(CatcherFlags::LEX_ENV_ACTIVE);
                thr.callstack[callstack_index].lex_env = saved;
            }
        }

        let act_func = self.thread(thr_id).callstack[callstack_index].func.clone();
        let Some((tmpl, _)) = self.as_compiled(&act_func) else {
            return Err(self.internal_error("catcher owned by a non-compiled activation"));
        };

        {
            let thr = self.thread_mut(thr_id);
            let bottom = thr.callstack[callstack_index].idx_bottom;
            thr.resize_valstack(bottom + tmpl.nregs as usize);
            thr.put_slot(idx_base, value.clone());
            thr.put_slot(idx_base + 1, Value::number(code as u8 as f64));
            thr.callstack[callstack_index].pc = pc_base + usize::from(to_finally);
        }

        if to_finally {
            self.thread_mut(thr_id).catchstack[cat_idx]
                .flags
                .remove(CatcherFlags::FINALLY_ENABLED);
        } else {
            let needs_binding = {
                let cat = &mut self.thread_mut(thr_id).catchstack[cat_idx];
                cat.flags.remove(CatcherFlags::CATCH_ENABLED);
                cat.flags.contains(CatcherFlags::CATCH_BINDING)
            };
            if needs_binding {
                self.splice_catch_binding(thr_id, cat_idx, callstack_index, value)?;
            }
        }

        debug!(?code, to_finally, "completion landed in catcher");
        Ok(())
    }

    /// Create the declarative record binding the caught value and splice
    /// it over the activation's lexical environment.
    fn splice_catch_binding(
        &mut self,
        thr_id: ThreadId,
        cat_idx: usize,
        act_idx: usize,
        value: Value,
    ) -> OpResult<()> {
        let Some(varname) = self.thread(thr_id).catchstack[cat_idx].varname.clone() else {
            return Err(self.internal_error("catch binding without a variable name"));
        };

        let saved = self.thread(thr_id).callstack[act_idx].lex_env;
        let parent = self.lex_env_of(thr_id, act_idx);
        let mut record = crate::env::EnvRecord::declarative(Some(parent));
        record.insert_binding(varname, crate::env::Binding::mutable(value));
        let env = self.alloc_env(record);

        let thr = self.thread_mut(thr_id);
        thr.callstack[act_idx].lex_env = Some(env);
        let cat = &mut thr.catchstack[cat_idx];
        cat.saved_lex_env = saved;
        cat.flags.insert(CatcherFlags::LEX_ENV_ACTIVE);
        Ok(())
    }

    /// Complete a suspended resume/yield native call on `thr_id`: pop its
    /// native activation and hand `value` to the register that was waiting
    /// for it.
    fn deliver_pending(&mut self, thr_id: ThreadId, value: Value) -> OpResult<()> {
        let thr = self.thread_mut(thr_id);
        let Some(act) = thr.pop_activation() else {
            return Err(self.internal_error("suspended thread has no pending activation"));
        };
        let base = act.idx_retval;
        thr.put_slot(base, value);

        let Some((caller_bottom, caller_func)) = thr
            .callstack
            .last()
            .map(|c| (c.idx_bottom, c.func.clone()))
        else {
            return Err(self.internal_error("suspended call has no compiled caller"));
        };
        let Some((caller_tmpl, _)) = self.as_compiled(&caller_func) else {
            return Err(self.internal_error("suspended call caller is not compiled"));
        };
        self.thread_mut(thr_id)
            .reconfig_valstack(caller_bottom, base, 1, caller_tmpl.nregs as usize);
        Ok(())
    }
}
