//! Inline expansions: each one is run on the simulator and compared with
//! what the real call would have produced.

use invoke_codegen::lir::{BarrierKind, Opcode};
use invoke_codegen::test_harness::simulator::{
    Exception, Machine, Outcome, compare_utf16, string_char_at, string_compare_to,
};
use invoke_codegen::test_harness::*;
use invoke_codegen::{
    CallInfo, CodeEmitter, CompilerOptions, EmittedCode, Instruction, InstructionSet, Intrinsic,
    InvokeOutcome, InvokeType, MethodContext, PromotionMap, VReg, ValueLocation, gen_invoke,
};

const ISAS: [InstructionSet; 3] = [
    InstructionSet::Thumb2,
    InstructionSet::X86,
    InstructionSet::Mips,
];
const INLINING_ISAS: [InstructionSet; 2] = [InstructionSet::Thumb2, InstructionSet::X86];

const CHAR_AT_METHOD: u32 = 20;
const COMPARE_TO_METHOD: u32 = 21;
const RESULT: VReg = VReg(10);

fn ctx() -> MethodContext {
    method_context(PromotionMap::new())
}

fn lower(isa: InstructionSet, inline: bool, info: &CallInfo) -> EmittedCode {
    let options = CompilerOptions {
        inline_intrinsics: inline,
        ..options(isa)
    };
    lower_call_with(options, PromotionMap::new(), info).unwrap()
}

fn outcome(isa: InstructionSet, info: &CallInfo) -> InvokeOutcome {
    let mut e = CodeEmitter::new(options(isa), ctx());
    gen_invoke(&mut e, info).unwrap()
}

/// A class whose vtable has `method` at index `slot`.
fn class_with(m: &mut Machine, slot: u32, method: u32) -> u32 {
    let vtable: Vec<u32> = (0..=slot)
        .map(|i| if i == slot { method } else { 0 })
        .collect();
    m.new_class(&vtable, &[])
}

// ── charAt ──

#[derive(Debug, Clone, Copy)]
enum Index {
    Reg(u32),
    Const(i32),
}

fn char_at_call(index: Index) -> CallInfo {
    let builder = CallSiteBuilder::new(InvokeType::Virtual, CHAR_AT_METHOD)
        .vtable_index(2)
        .arg(ValueLocation::frame(VReg(0)));
    let builder = match index {
        Index::Reg(_) => builder.arg(ValueLocation::frame(VReg(1))),
        Index::Const(value) => builder.arg(ValueLocation::constant(VReg(1), value)),
    };
    builder
        .result(ValueLocation::frame(RESULT))
        .intrinsic(Intrinsic::StringCharAt)
        .build()
}

/// Run charAt on `text` (stored `offset` chars into its array), or on null.
fn run_char_at(
    isa: InstructionSet,
    inline: bool,
    text: Option<(&str, u32)>,
    index: Index,
) -> (Option<Exception>, Option<u32>, usize) {
    let code = lower(isa, inline, &char_at_call(index));
    let mut m = Machine::new(isa, TEST_NUM_METHOD_IDS);
    let receiver = match text {
        Some((text, offset)) => {
            let s = m.new_string_at(text, offset);
            let class = class_with(&mut m, 2, CHAR_AT_METHOD);
            m.set_class(s, class);
            s
        }
        None => 0,
    };
    m.define_method(CHAR_AT_METHOD, string_char_at);
    m.set_vreg(&ctx(), VReg(0), receiver);
    if let Index::Reg(value) = index {
        m.set_vreg(&ctx(), VReg(1), value);
    }
    let out = m.run(&code);
    let result = out
        .exception
        .is_none()
        .then(|| m.vreg(&ctx(), RESULT));
    (out.exception, result, out.retries)
}

#[test]
fn char_at_matches_the_real_call() {
    for isa in ISAS {
        for offset in [0, 2] {
            for i in 0..5u32 {
                for index in [Index::Reg(i), Index::Const(i as i32)] {
                    let text = Some(("hey", offset));
                    let (inl_exc, inl_res, retries) = run_char_at(isa, true, text, index);
                    let (call_exc, call_res, _) = run_char_at(isa, false, text, index);
                    assert_eq!(
                        (inl_exc, inl_res),
                        (call_exc, call_res),
                        "{isa:?} {index:?} offset {offset}"
                    );
                    if i < 3 {
                        assert_eq!(inl_res, Some(u32::from(b"hey"[i as usize])));
                        assert_eq!(retries, 0);
                    } else {
                        assert_eq!(inl_exc, Some(Exception::IndexOutOfBounds));
                    }
                }
            }
        }
    }
}

#[test]
fn char_at_out_of_range_goes_through_the_launchpad() {
    for isa in INLINING_ISAS {
        let (exc, _, retries) = run_char_at(isa, true, Some(("hey", 0)), Index::Reg(3));
        assert_eq!(exc, Some(Exception::IndexOutOfBounds));
        assert_eq!(retries, 1, "{isa:?}");
    }
}

#[test]
fn char_at_null_receiver_throws_either_way() {
    for isa in ISAS {
        for inline in [true, false] {
            let (exc, _, retries) = run_char_at(isa, inline, None, Index::Reg(0));
            assert_eq!(exc, Some(Exception::NullPointer), "{isa:?} inline={inline}");
            assert_eq!(retries, 0);
        }
    }
}

#[test]
fn char_at_without_range_check_has_no_launchpad() {
    let info = CallSiteBuilder::new(InvokeType::Virtual, CHAR_AT_METHOD)
        .vtable_index(2)
        .frame_args(0, 2)
        .result(ValueLocation::frame(RESULT))
        .intrinsic(Intrinsic::StringCharAt)
        .in_range()
        .build();
    for isa in INLINING_ISAS {
        let code = lower(isa, true, &info);
        assert!(!code.instructions.contains(&Instruction::IntrinsicRetry));
        assert!(!has_opcode(&code.instructions, Opcode::BranchCmp));
        assert!(!has_opcode(&code.instructions, Opcode::BranchCmpMem));
    }
}

#[test]
fn x86_char_at_compares_against_the_count_in_memory() {
    let code = lower(InstructionSet::X86, true, &char_at_call(Index::Reg(0)));
    assert!(has_opcode(main_body(&code), Opcode::BranchCmpMem));
    let code = lower(InstructionSet::X86, true, &char_at_call(Index::Const(1)));
    assert!(has_opcode(main_body(&code), Opcode::BranchMemImm));
    // The constant index stays an immediate.
    assert_eq!(count_opcode(main_body(&code), Opcode::LoadConst), 0);
}

// ── compareTo ──

fn run_compare_to(isa: InstructionSet, this: &str, other: Option<&str>) -> (Option<Exception>, u32, usize) {
    let info = CallSiteBuilder::new(InvokeType::Virtual, COMPARE_TO_METHOD)
        .vtable_index(1)
        .frame_args(0, 2)
        .result(ValueLocation::frame(RESULT))
        .intrinsic(Intrinsic::StringCompareTo)
        .build();
    let code = lower(isa, true, &info);
    let mut m = Machine::new(isa, TEST_NUM_METHOD_IDS);
    let class = class_with(&mut m, 1, COMPARE_TO_METHOD);
    let a = m.new_string(this);
    m.set_class(a, class);
    let b = match other {
        Some(text) => m.new_string(text),
        None => 0,
    };
    m.define_method(COMPARE_TO_METHOD, string_compare_to);
    m.set_vreg(&ctx(), VReg(0), a);
    m.set_vreg(&ctx(), VReg(1), b);
    let out = m.run(&code);
    (out.exception, m.vreg(&ctx(), RESULT), out.retries)
}

#[test]
fn compare_to_uses_the_runtime_helper() {
    for isa in INLINING_ISAS {
        let (exc, result, retries) = run_compare_to(isa, "apple", Some("banana"));
        assert_eq!(exc, None);
        assert_eq!(retries, 0);
        let expected = compare_utf16(
            &"apple".encode_utf16().collect::<Vec<_>>(),
            &"banana".encode_utf16().collect::<Vec<_>>(),
        );
        assert_eq!(result as i32, expected, "{isa:?}");

        let (_, result, _) = run_compare_to(isa, "same", Some("same"));
        assert_eq!(result, 0);
    }
}

#[test]
fn compare_to_null_argument_reaches_the_real_method() {
    for isa in INLINING_ISAS {
        let (exc, _, retries) = run_compare_to(isa, "apple", None);
        assert_eq!(exc, Some(Exception::NullPointer), "{isa:?}");
        assert_eq!(retries, 1);
    }
}

// ── Simple expansions ──

fn inline_call(
    intrinsic: Intrinsic,
    args: Vec<ValueLocation>,
    result: Option<ValueLocation>,
) -> CallInfo {
    let mut builder = CallSiteBuilder::new(InvokeType::Static, 3).intrinsic(intrinsic);
    for arg in args {
        builder = builder.arg(arg);
    }
    if let Some(result) = result {
        builder = builder.result(result);
    }
    builder.build()
}

/// Lower `intrinsic`, check it expanded without a call in the main body,
/// and run it on a machine prepared by `setup`.
fn run_inline(
    isa: InstructionSet,
    intrinsic: Intrinsic,
    args: Vec<ValueLocation>,
    result: Option<ValueLocation>,
    setup: impl FnOnce(&mut Machine),
) -> (Machine, Outcome) {
    let info = inline_call(intrinsic, args, result);
    assert!(
        matches!(outcome(isa, &info), InvokeOutcome::Inlined(i) if i == intrinsic),
        "{intrinsic:?} not inlined on {isa:?}"
    );
    let code = lower(isa, true, &info);
    assert!(
        !main_body(&code).iter().any(|i| i.opcode().is_call()),
        "{intrinsic:?} made a call"
    );
    let mut m = Machine::new(isa, TEST_NUM_METHOD_IDS);
    setup(&mut m);
    let out = m.run(&code);
    (m, out)
}

fn narrow_result() -> Option<ValueLocation> {
    Some(ValueLocation::frame(RESULT))
}

fn wide_result() -> Option<ValueLocation> {
    Some(ValueLocation::frame_wide(RESULT)[0])
}

fn read_wide(m: &Machine) -> u64 {
    u64::from(m.vreg(&ctx(), RESULT)) | (u64::from(m.vreg(&ctx(), RESULT.next())) << 32)
}

fn write_wide(m: &mut Machine, vreg: VReg, value: u64) {
    m.set_vreg(&ctx(), vreg, value as u32);
    m.set_vreg(&ctx(), vreg.next(), (value >> 32) as u32);
}

#[test]
fn length_and_is_empty_read_the_count() {
    for isa in INLINING_ISAS {
        for (text, len) in [("", 0), ("abc", 3)] {
            for (intrinsic, expected) in [
                (Intrinsic::StringLength, len),
                (Intrinsic::StringIsEmpty, u32::from(len == 0)),
            ] {
                let (m, out) = run_inline(
                    isa,
                    intrinsic,
                    vec![ValueLocation::frame(VReg(0))],
                    narrow_result(),
                    |m| {
                        let s = m.new_string(text);
                        m.set_vreg(&ctx(), VReg(0), s);
                    },
                );
                assert_eq!(out.exception, None);
                assert_eq!(m.vreg(&ctx(), RESULT), expected, "{intrinsic:?} {text:?}");
            }
        }
    }
}

#[test]
fn length_of_null_throws() {
    let (_, out) = run_inline(
        InstructionSet::Thumb2,
        Intrinsic::StringLength,
        vec![ValueLocation::frame(VReg(0))],
        narrow_result(),
        |_| {},
    );
    assert_eq!(out.exception, Some(Exception::NullPointer));
}

#[test]
fn abs_int_wraps_at_min() {
    for isa in INLINING_ISAS {
        for value in [-5, 7, 0, i32::MIN, i32::MAX] {
            let (m, _) = run_inline(
                isa,
                Intrinsic::AbsInt,
                vec![ValueLocation::frame(VReg(0))],
                narrow_result(),
                |m| m.set_vreg(&ctx(), VReg(0), value as u32),
            );
            assert_eq!(m.vreg(&ctx(), RESULT) as i32, value.wrapping_abs(), "{value}");
        }
    }
}

#[test]
fn abs_long_carries_between_halves() {
    for isa in INLINING_ISAS {
        for value in [-1i64, -(1 << 32), 12_345, i64::MIN + 1, 1 << 40] {
            let (m, _) = run_inline(
                isa,
                Intrinsic::AbsLong,
                ValueLocation::frame_wide(VReg(0)).to_vec(),
                wide_result(),
                |m| write_wide(m, VReg(0), value as u64),
            );
            assert_eq!(read_wide(&m) as i64, value.wrapping_abs(), "{isa:?} {value}");
        }
    }
}

#[test]
fn abs_float_and_double_clear_the_sign_bit() {
    let (m, _) = run_inline(
        InstructionSet::Thumb2,
        Intrinsic::AbsFloat,
        vec![ValueLocation::frame(VReg(0)).with_fp()],
        narrow_result(),
        |m| m.set_vreg(&ctx(), VReg(0), (-2.5f32).to_bits()),
    );
    assert_eq!(m.vreg(&ctx(), RESULT), 2.5f32.to_bits());

    let (m, _) = run_inline(
        InstructionSet::X86,
        Intrinsic::AbsDouble,
        ValueLocation::frame_wide(VReg(0))
            .map(ValueLocation::with_fp)
            .to_vec(),
        wide_result(),
        |m| write_wide(m, VReg(0), (-0.75f64).to_bits()),
    );
    assert_eq!(read_wide(&m), 0.75f64.to_bits());
}

#[test]
fn reverse_bytes_expansions() {
    for isa in INLINING_ISAS {
        let (m, _) = run_inline(
            isa,
            Intrinsic::ReverseBytesInt,
            vec![ValueLocation::frame(VReg(0))],
            narrow_result(),
            |m| m.set_vreg(&ctx(), VReg(0), 0x1234_5678),
        );
        assert_eq!(m.vreg(&ctx(), RESULT), 0x7856_3412);

        let (m, _) = run_inline(
            isa,
            Intrinsic::ReverseBytesShort,
            vec![ValueLocation::frame(VReg(0))],
            narrow_result(),
            |m| m.set_vreg(&ctx(), VReg(0), 0x80FF),
        );
        assert_eq!(m.vreg(&ctx(), RESULT) as i32, -128);

        let (m, _) = run_inline(
            isa,
            Intrinsic::ReverseBytesLong,
            ValueLocation::frame_wide(VReg(0)).to_vec(),
            wide_result(),
            |m| write_wide(m, VReg(0), 0x0102_0304_0506_0708),
        );
        assert_eq!(read_wide(&m), 0x0807_0605_0403_0201, "{isa:?}");
    }
}

#[test]
fn current_thread_loads_the_peer_everywhere() {
    for isa in ISAS {
        let (m, out) = run_inline(isa, Intrinsic::CurrentThread, vec![], narrow_result(), |_| {});
        assert_eq!(out.exception, None);
        assert_eq!(m.vreg(&ctx(), RESULT), Machine::peer_object(), "{isa:?}");
    }
}

// ── Unsafe ──

const FIELD_OFFSET: u32 = 8;

/// `Unsafe` receiver, object, long offset and (for puts) the value at v4.
fn unsafe_args(value: Option<bool>) -> Vec<ValueLocation> {
    let mut args = vec![ValueLocation::frame(VReg(0)), ValueLocation::frame(VReg(1))];
    args.extend(ValueLocation::frame_wide(VReg(2)));
    match value {
        Some(true) => args.extend(ValueLocation::frame_wide(VReg(4))),
        Some(false) => args.push(ValueLocation::frame(VReg(4))),
        None => {}
    }
    args
}

fn unsafe_setup(m: &mut Machine) -> u32 {
    let obj = m.new_object(0);
    m.set_vreg(&ctx(), VReg(0), 0x7000);
    m.set_vreg(&ctx(), VReg(1), obj);
    write_wide(m, VReg(2), u64::from(FIELD_OFFSET));
    obj
}

#[test]
fn unsafe_get_volatile_fences_before_the_load() {
    for isa in INLINING_ISAS {
        let intrinsic = Intrinsic::UnsafeGet {
            long: false,
            volatile: true,
        };
        let (m, out) = run_inline(isa, intrinsic, unsafe_args(None), narrow_result(), |m| {
            let obj = unsafe_setup(m);
            m.write_word(obj + FIELD_OFFSET, 0xCAFE);
        });
        assert_eq!(out.barriers, vec![BarrierKind::LoadLoad]);
        assert_eq!(m.vreg(&ctx(), RESULT), 0xCAFE);

        let code = lower(isa, true, &inline_call(intrinsic, unsafe_args(None), narrow_result()));
        let barrier = code
            .instructions
            .iter()
            .position(|i| i.opcode() == Opcode::Barrier)
            .unwrap();
        let load = code
            .instructions
            .iter()
            .position(|i| i.opcode() == Opcode::LoadIndexed)
            .unwrap();
        assert!(barrier < load);
    }
}

#[test]
fn unsafe_get_long_reads_both_words() {
    let intrinsic = Intrinsic::UnsafeGet {
        long: true,
        volatile: false,
    };
    for isa in INLINING_ISAS {
        let (m, out) = run_inline(isa, intrinsic, unsafe_args(None), wide_result(), |m| {
            let obj = unsafe_setup(m);
            m.write_word(obj + FIELD_OFFSET, 0x0506_0708);
            m.write_word(obj + FIELD_OFFSET + 4, 0x0102_0304);
        });
        assert!(out.barriers.is_empty());
        assert_eq!(read_wide(&m), 0x0102_0304_0506_0708);
    }
}

#[test]
fn unsafe_put_object_volatile_marks_the_card() {
    let intrinsic = Intrinsic::UnsafePut {
        long: false,
        object: true,
        volatile: true,
        ordered: false,
    };
    for isa in INLINING_ISAS {
        let mut obj = 0;
        let (m, out) = run_inline(isa, intrinsic, unsafe_args(Some(false)), None, |m| {
            obj = unsafe_setup(m);
            m.set_vreg(&ctx(), VReg(4), 0x0060_1230);
        });
        assert_eq!(out.barriers, vec![BarrierKind::StoreStore, BarrierKind::StoreLoad]);
        assert_eq!(out.gc_cards, vec![(0x0060_1230, obj)]);
        assert_eq!(m.read_word(obj + FIELD_OFFSET), 0x0060_1230, "{isa:?}");

        let code = lower(isa, true, &inline_call(intrinsic, unsafe_args(Some(false)), None));
        let opcodes: Vec<Opcode> = main_body(&code)
            .iter()
            .map(Instruction::opcode)
            .filter(|op| {
                matches!(
                    op,
                    Opcode::StoreIndexed | Opcode::Barrier | Opcode::MarkGcCard
                )
            })
            .collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::Barrier,
                Opcode::StoreIndexed,
                Opcode::Barrier,
                Opcode::MarkGcCard,
            ],
            "{isa:?}"
        );
    }
}

#[test]
fn unsafe_put_long_ordered_fences_once() {
    let intrinsic = Intrinsic::UnsafePut {
        long: true,
        object: false,
        volatile: false,
        ordered: true,
    };
    for isa in INLINING_ISAS {
        let mut obj = 0;
        let (m, out) = run_inline(isa, intrinsic, unsafe_args(Some(true)), None, |m| {
            obj = unsafe_setup(m);
            write_wide(m, VReg(4), 0x1111_2222_3333_4444);
        });
        assert_eq!(out.barriers, vec![BarrierKind::StoreStore]);
        assert!(out.gc_cards.is_empty());
        assert_eq!(m.read_word(obj + FIELD_OFFSET), 0x3333_4444);
        assert_eq!(m.read_word(obj + FIELD_OFFSET + 4), 0x1111_2222);
    }
}

// ── Declining ──

#[test]
fn mips_only_inlines_current_thread() {
    let char_at = char_at_call(Index::Reg(0));
    assert!(matches!(
        outcome(InstructionSet::Mips, &char_at),
        InvokeOutcome::Call(_)
    ));
    let thread = CallSiteBuilder::new(InvokeType::Static, 3)
        .intrinsic(Intrinsic::CurrentThread)
        .result(ValueLocation::frame(RESULT))
        .build();
    assert!(matches!(
        outcome(InstructionSet::Mips, &thread),
        InvokeOutcome::Inlined(Intrinsic::CurrentThread)
    ));
}

#[test]
fn disabled_inlining_always_calls() {
    for isa in INLINING_ISAS {
        let code = lower(isa, false, &char_at_call(Index::Reg(0)));
        assert!(!code.safepoints.is_empty());
        assert!(!code.instructions.contains(&Instruction::IntrinsicRetry));
    }
}
