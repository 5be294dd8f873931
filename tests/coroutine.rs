use ecma_vm::object::PropSlot;
use ecma_vm::prelude::*;

use std::rc::Rc;

/// Coroutine body: yield 1, yield 2, return 3.
fn counting_body() -> Rc<CompiledFunction> {
    Rc::new(
        CompiledFunction::new(
            vec![
                Opcode::LDCONST(1, 0),
                Opcode::LDUNDEF(2),
                Opcode::LDINT(3, 1),
                Opcode::CALL(0, 1, 1), // yield(1)
                Opcode::LDCONST(1, 0),
                Opcode::LDUNDEF(2),
                Opcode::LDINT(3, 2),
                Opcode::CALL(0, 1, 1), // yield(2)
                Opcode::LDINT(1, 3),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(1)),
            ]
            .into_iter()
            .collect(),
            4,
        )
        .with_consts(vec![Value::light_func(thread_yield, 1)])
        .with_nargs(1),
    )
}

fn error_name(vm: &Vm, err: &VmError) -> Option<String> {
    let value = err.thrown_value()?;
    let obj = vm.object(value.as_object()?);
    match &obj.own_property("name")?.slot {
        PropSlot::Data(Value::String(s)) => Some(s.to_string()),
        _ => None,
    }
}

#[test]
fn resumer_sums_yields_and_final_return() {
    // The driver resumes the coroutine three times and sums what it gets:
    // 1 + 2 + 3 === 6.
    let driver = Rc::new(
        CompiledFunction::new(
            vec![
                Opcode::LDINT(1, 0), // sum
                Opcode::LDCONST(3, 0),
                Opcode::LDUNDEF(4),
                Opcode::LDREG(5, 0),
                Opcode::LDUNDEF(6),
                Opcode::CALL(0, 3, 2),
                Opcode::ADD(1, rk_reg(1), rk_reg(3)),
                Opcode::LDCONST(3, 0),
                Opcode::LDUNDEF(4),
                Opcode::LDREG(5, 0),
                Opcode::LDUNDEF(6),
                Opcode::CALL(0, 3, 2),
                Opcode::ADD(1, rk_reg(1), rk_reg(3)),
                Opcode::LDCONST(3, 0),
                Opcode::LDUNDEF(4),
                Opcode::LDREG(5, 0),
                Opcode::LDUNDEF(6),
                Opcode::CALL(0, 3, 2),
                Opcode::ADD(1, rk_reg(1), rk_reg(3)),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(1)),
            ]
            .into_iter()
            .collect(),
            7,
        )
        .with_consts(vec![Value::light_func(thread_resume, 3)])
        .with_nargs(1),
    );

    let mut vm = Vm::new();
    let body = vm.new_function(counting_body());
    let thread = vm.spawn_thread(body).unwrap();
    let driver = vm.new_function(driver);
    let r = vm.call(driver, Value::Undefined, &[thread]).unwrap();
    assert_eq!(r, Value::number(6.0));
}

#[test]
fn resume_error_injection_throws_at_the_yield_point() {
    // Body: try { yield(1); } catch (e) { return e + 100; } return 0;
    let body = Rc::new(
        CompiledFunction::new(
            vec![
                Opcode::TRYCATCH(TRY_FLAG_HAVE_CATCH, 5, 0), // reserved r5, r6
                Opcode::JUMP(7), // catch slot -> pc 9
                Opcode::NOP,
                Opcode::LDCONST(2, 0),
                Opcode::LDUNDEF(3),
                Opcode::LDINT(4, 1),
                Opcode::CALL(0, 2, 1), // yield(1); the injected error lands here
                Opcode::ENDTRY,
                Opcode::JUMP(3), // -> pc 12
                Opcode::LDREG(2, 5),
                Opcode::ADD(2, rk_reg(2), rk_const(1)),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(2)),
                Opcode::LDINT(2, 0),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(2)),
            ]
            .into_iter()
            .collect(),
            7,
        )
        .with_consts(vec![Value::light_func(thread_yield, 1), Value::number(100.0)])
        .with_nargs(1),
    );

    // Driver: resume(t) -> 1; resume(t, 5, true) -> 105 (thread result).
    let driver = Rc::new(
        CompiledFunction::new(
            vec![
                Opcode::LDCONST(1, 0),
                Opcode::LDUNDEF(2),
                Opcode::LDREG(3, 0),
                Opcode::LDUNDEF(4),
                Opcode::CALL(0, 1, 2),
                Opcode::LDCONST(1, 0),
                Opcode::LDUNDEF(2),
                Opcode::LDREG(3, 0),
                Opcode::LDINT(4, 5),
                Opcode::LDTRUE(5),
                Opcode::CALL(0, 1, 3),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(1)),
            ]
            .into_iter()
            .collect(),
            6,
        )
        .with_consts(vec![Value::light_func(thread_resume, 3)])
        .with_nargs(1),
    );

    let mut vm = Vm::new();
    let body = vm.new_function(body);
    let thread = vm.spawn_thread(body).unwrap();
    let driver = vm.new_function(driver);
    let r = vm.call(driver, Value::Undefined, &[thread]).unwrap();
    assert_eq!(r, Value::number(105.0));
}

#[test]
fn uncaught_coroutine_error_reaches_the_resumer() {
    // Body throws without catching; the resumer's resume() call throws.
    let body = Rc::new(
        CompiledFunction::new(
            vec![Opcode::LDCONST(1, 0), Opcode::THROW(rk_reg(1))]
                .into_iter()
                .collect(),
            2,
        )
        .with_consts(vec![Value::string("kaboom")])
        .with_nargs(1),
    );

    let driver = Rc::new(
        CompiledFunction::new(
            vec![
                Opcode::LDCONST(1, 0),
                Opcode::LDUNDEF(2),
                Opcode::LDREG(3, 0),
                Opcode::LDUNDEF(4),
                Opcode::CALL(0, 1, 2),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(1)),
            ]
            .into_iter()
            .collect(),
            5,
        )
        .with_consts(vec![Value::light_func(thread_resume, 3)])
        .with_nargs(1),
    );

    let mut vm = Vm::new();
    let body = vm.new_function(body);
    let thread = vm.spawn_thread(body).unwrap();
    let driver = vm.new_function(driver);
    let err = vm.call(driver, Value::Undefined, &[thread]).unwrap_err();
    assert_eq!(err.thrown_value(), Some(&Value::string("kaboom")));
}

#[test]
fn yield_outside_a_coroutine_is_a_type_error() {
    let tmpl = Rc::new(
        CompiledFunction::new(
            vec![
                Opcode::LDCONST(0, 0),
                Opcode::LDUNDEF(1),
                Opcode::LDINT(2, 1),
                Opcode::CALL(0, 0, 1),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(0)),
            ]
            .into_iter()
            .collect(),
            3,
        )
        .with_consts(vec![Value::light_func(thread_yield, 1)]),
    );

    let mut vm = Vm::new();
    let func = vm.new_function(tmpl);
    let err = vm.call(func, Value::Undefined, &[]).unwrap_err();
    assert_eq!(error_name(&vm, &err).as_deref(), Some("TypeError"));
}

#[test]
fn resuming_a_terminated_thread_is_a_type_error() {
    // Body returns immediately; the second resume must fail.
    let body = Rc::new(
        CompiledFunction::new(
            vec![Opcode::LDINT(1, 3), Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(1))]
                .into_iter()
                .collect(),
            2,
        )
        .with_nargs(1),
    );

    let driver = Rc::new(
        CompiledFunction::new(
            vec![
                Opcode::LDCONST(1, 0),
                Opcode::LDUNDEF(2),
                Opcode::LDREG(3, 0),
                Opcode::LDUNDEF(4),
                Opcode::CALL(0, 1, 2),
                Opcode::LDCONST(1, 0),
                Opcode::LDUNDEF(2),
                Opcode::LDREG(3, 0),
                Opcode::LDUNDEF(4),
                Opcode::CALL(0, 1, 2),
                Opcode::RETURN(RETURN_FLAG_HAVE_VALUE, rk_reg(1)),
            ]
            .into_iter()
            .collect(),
            5,
        )
        .with_consts(vec![Value::light_func(thread_resume, 3)])
        .with_nargs(1),
    );

    let mut vm = Vm::new();
    let body = vm.new_function(body);
    let thread = vm.spawn_thread(body).unwrap();
    let driver = vm.new_function(driver);
    let err = vm.call(driver, Value::Undefined, &[thread]).unwrap_err();
    assert_eq!(error_name(&vm, &err).as_deref(), Some("TypeError"));
}

#[test]
fn only_compiled_functions_can_back_a_thread() {
    let mut vm = Vm::new();
    let native = vm.new_native_function("nope", thread_yield);
    assert!(matches!(
        vm.spawn_thread(native),
        Err(VmError::NotThreadable)
    ));
    assert!(matches!(
        vm.spawn_thread(Value::number(1.0)),
        Err(VmError::NotThreadable)
    ));
}
