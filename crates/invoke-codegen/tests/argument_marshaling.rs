//! Argument placement: the image the callee sees for small-form and
//! range-form calls, promoted values, wide values across the
//! register/stack boundary and the per-target bulk copies.

use invoke_codegen::abi::{RuntimeEntryPoint, WORD_SIZE, out_arg_offset};
use invoke_codegen::lir::VecMove;
use invoke_codegen::test_harness::simulator::{CallTarget, Machine, Outcome, SP_BASE};
use invoke_codegen::test_harness::*;
use invoke_codegen::{
    CallInfo, CodeEmitter, EmittedCode, Error, FrameLayout, Instruction, InstructionSet,
    InvokeType, MethodContext, Opcode, PromotionMap, Reg, VReg, ValueLocation, gen_invoke,
};

const ISAS: [InstructionSet; 3] = [
    InstructionSet::Thumb2,
    InstructionSet::X86,
    InstructionSet::Mips,
];
const RECEIVER: u32 = 0x0070_0000;
/// Home slots of promoted values hold this (xor the value) so reading them
/// instead of the register shows up in the image.
const STALE: u32 = 0x5A5A_5A5A;
const BIG_FRAME: FrameLayout = FrameLayout {
    num_outs: 24,
    num_vregs: 48,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Frame,
    Const,
    Promoted,
}

#[derive(Debug, Clone, Copy)]
struct Arg {
    wide: bool,
    source: Source,
    value: u64,
}

impl Arg {
    const fn narrow(source: Source, value: u32) -> Self {
        Self {
            wide: false,
            source,
            value: value as u64,
        }
    }

    const fn wide(source: Source, value: u64) -> Self {
        Self {
            wide: true,
            source,
            value,
        }
    }

    fn words(self) -> Vec<u32> {
        if self.wide {
            vec![self.value as u32, (self.value >> 32) as u32]
        } else {
            vec![self.value as u32]
        }
    }
}

/// Call-site arguments laid out at v0.. together with the machine state
/// that backs them.
#[derive(Debug, Default)]
struct Site {
    args: Vec<ValueLocation>,
    promotion: PromotionMap,
    homes: Vec<(VReg, u32)>,
    regs: Vec<(Reg, u32)>,
    expected: Vec<u32>,
}

fn promotable(isa: InstructionSet) -> &'static [Reg] {
    match isa {
        InstructionSet::Thumb2 => &[
            Reg::Core(5),
            Reg::Core(6),
            Reg::Core(7),
            Reg::Core(8),
            Reg::Core(10),
            Reg::Core(11),
        ],
        InstructionSet::X86 => &[Reg::Core(5), Reg::Core(6), Reg::Core(7)],
        InstructionSet::Mips => &[
            Reg::Core(16),
            Reg::Core(18),
            Reg::Core(19),
            Reg::Core(20),
            Reg::Core(21),
            Reg::Core(22),
        ],
    }
}

/// Promoted arguments fall back to the frame once the target runs out of
/// callee-save registers.
fn lay_out(isa: InstructionSet, args: &[Arg]) -> Site {
    let pool = promotable(isa);
    let mut site = Site::default();
    let mut next_reg = 0;
    let mut v = 0;
    for arg in args {
        let words = arg.words();
        let vreg = VReg(v);
        let source = if arg.source == Source::Promoted && next_reg + words.len() > pool.len() {
            Source::Frame
        } else {
            arg.source
        };
        match (source, arg.wide) {
            (Source::Const, false) => site
                .args
                .push(ValueLocation::constant(vreg, arg.value as u32 as i32)),
            (Source::Const, true) => site
                .args
                .extend(ValueLocation::constant_wide(vreg, arg.value as i64)),
            (_, false) => site.args.push(ValueLocation::frame(vreg)),
            (_, true) => site.args.extend(ValueLocation::frame_wide(vreg)),
        }
        for (i, word) in words.iter().enumerate() {
            let vreg = VReg(v + i as u32);
            match source {
                Source::Frame => site.homes.push((vreg, *word)),
                Source::Const => {}
                Source::Promoted => {
                    let reg = pool[next_reg];
                    next_reg += 1;
                    site.promotion.promote_core(vreg, reg);
                    site.regs.push((reg, *word));
                    site.homes.push((vreg, STALE ^ *word));
                }
            }
        }
        site.expected.extend(&words);
        v += words.len() as u32;
    }
    site
}

fn call_info(kind: InvokeType, site: &Site, range: bool) -> CallInfo {
    let mut builder = CallSiteBuilder::new(kind, 7);
    for arg in &site.args {
        builder = builder.arg(*arg);
    }
    if range {
        builder = builder.range();
    }
    builder.build()
}

fn context(frame: FrameLayout, promotion: PromotionMap) -> MethodContext {
    MethodContext {
        frame,
        ..method_context(promotion)
    }
}

fn lower_in(
    isa: InstructionSet,
    frame: FrameLayout,
    site: &Site,
    info: &CallInfo,
) -> invoke_codegen::Result<EmittedCode> {
    let mut e = CodeEmitter::new(options(isa), context(frame, site.promotion.clone()));
    gen_invoke(&mut e, info)?;
    e.finish()
}

fn run_in(isa: InstructionSet, frame: FrameLayout, site: &Site, code: &EmittedCode) -> Outcome {
    let ctx = context(frame, PromotionMap::new());
    let mut m = Machine::new(isa, TEST_NUM_METHOD_IDS);
    for (vreg, value) in &site.homes {
        m.set_vreg(&ctx, *vreg, *value);
    }
    for (reg, value) in &site.regs {
        m.set_reg(*reg, *value);
    }
    let out = m.run(code);
    assert_eq!(out.exception, None, "{isa:?}");
    out
}

/// Argument words seen by the (single) managed callee.
fn image(isa: InstructionSet, kind: InvokeType, site: &Site, range: bool, frame: FrameLayout) -> Vec<u32> {
    let info = call_info(kind, site, range);
    let code = lower_in(isa, frame, site, &info).unwrap();
    let out = run_in(isa, frame, site, &code);
    let calls = out.method_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, CallTarget::Method(7));
    calls[0].arg_words(site.expected.len())
}

fn narrow_value(k: u32) -> u32 {
    0x1000_0000 + 0x0101 * (k + 1)
}

fn wide_value(k: u32) -> u64 {
    0x0A0B_0C0D_0000_0000 | u64::from(narrow_value(k))
}

/// Receiver followed by `shape` (true for wide), all from `source`.
fn shaped(source: Source, shape: &[bool]) -> Vec<Arg> {
    let mut args = vec![Arg::narrow(source, RECEIVER)];
    for (k, wide) in shape.iter().enumerate() {
        args.push(if *wide {
            Arg::wide(source, wide_value(k as u32))
        } else {
            Arg::narrow(source, narrow_value(k as u32))
        });
    }
    args
}

const SHAPES: [&[bool]; 6] = [
    &[],
    &[false, false, false, false],
    &[true, false],
    &[false, true, false],
    &[true, true],
    &[false, true],
];

// ── Small form ──

#[test]
fn small_form_image_matches_every_shape() {
    for isa in ISAS {
        for shape in SHAPES {
            for source in [Source::Frame, Source::Const, Source::Promoted] {
                for kind in [InvokeType::Static, InvokeType::Direct] {
                    let site = lay_out(isa, &shaped(source, shape));
                    assert_eq!(
                        image(isa, kind, &site, false, TEST_FRAME),
                        site.expected,
                        "{isa:?} {kind:?} {source:?} {shape:?}"
                    );
                }
            }
        }
    }
}

#[test]
fn small_form_mixes_sources() {
    let args = [
        Arg::narrow(Source::Promoted, RECEIVER),
        Arg::narrow(Source::Const, 0xFFFF_FFFE),
        Arg::wide(Source::Promoted, 0x1122_3344_5566_7788),
        Arg::narrow(Source::Frame, 99),
    ];
    for isa in ISAS {
        let site = lay_out(isa, &args);
        assert_eq!(site.expected.len(), 5);
        assert_eq!(image(isa, InvokeType::Static, &site, false, TEST_FRAME), site.expected);
    }
}

#[test]
fn stack_words_are_placed_before_argument_registers() {
    let isa = InstructionSet::Thumb2;
    let site = lay_out(isa, &shaped(Source::Frame, &[false, false, false, false]));
    let code = lower_in(isa, TEST_FRAME, &site, &call_info(InvokeType::Static, &site, false))
        .unwrap();
    let insns = main_body(&code);
    let sp = Reg::Core(13);
    let store = |word| {
        find_pattern(insns, &[InstructionPattern::Store {
            base: Pat::Exact(sp),
            disp: Pat::Exact(out_arg_offset(word)),
            src: Pat::Any,
        }])
        .expect("outgoing store")
    };
    let first_reg_load = find_pattern(insns, &[InstructionPattern::Load {
        dst: Pat::Exact(Reg::Core(1)),
        base: Pat::Exact(sp),
        disp: Pat::Any,
    }])
    .expect("register load");
    assert!(store(3) < store(4));
    assert!(store(4) < first_reg_load);
}

#[test]
fn wide_at_word_two_sends_its_high_half_to_the_stack() {
    let isa = InstructionSet::Thumb2;
    let sp = Reg::Core(13);
    let r3 = Reg::Core(3);
    let ctx = method_context(PromotionMap::new());

    let site = lay_out(isa, &shaped(Source::Frame, &[false, true]));
    let code = lower_in(isa, TEST_FRAME, &site, &call_info(InvokeType::Static, &site, false))
        .unwrap();
    assert_has_pattern(main_body(&code), &[
        InstructionPattern::Load {
            dst: Pat::Exact(r3),
            base: Pat::Exact(sp),
            disp: Pat::Exact(ctx.frame.vreg_offset(VReg(3))),
        },
        InstructionPattern::Any,
        InstructionPattern::Store {
            base: Pat::Exact(sp),
            disp: Pat::Exact(out_arg_offset(3)),
            src: Pat::Exact(r3),
        },
    ]);
    // The low half travels alone in the last argument register.
    assert_has_pattern(main_body(&code), &[InstructionPattern::Load {
        dst: Pat::Exact(r3),
        base: Pat::Exact(sp),
        disp: Pat::Exact(ctx.frame.vreg_offset(VReg(2))),
    }]);

    let site = lay_out(isa, &shaped(Source::Promoted, &[false, true]));
    let code = lower_in(isa, TEST_FRAME, &site, &call_info(InvokeType::Static, &site, false))
        .unwrap();
    let (high_reg, _) = site.regs[3];
    assert_has_pattern(main_body(&code), &[InstructionPattern::Store {
        base: Pat::Exact(sp),
        disp: Pat::Exact(out_arg_offset(3)),
        src: Pat::Exact(high_reg),
    }]);
}

#[test]
fn promoted_receiver_is_copied_for_virtual_dispatch() {
    for isa in ISAS {
        let site = lay_out(isa, &shaped(Source::Promoted, &[false]));
        let info = CallSiteBuilder::new(InvokeType::Virtual, 7)
            .vtable_index(1)
            .arg(site.args[0])
            .arg(site.args[1])
            .build();
        let code = lower_in(isa, TEST_FRAME, &site, &info).unwrap();
        let (receiver_reg, _) = site.regs[0];
        assert_has_pattern(&code.instructions, &[InstructionPattern::Copy {
            dst: Pat::Exact(isa.abi().arg_regs()[1]),
            src: Pat::Exact(receiver_reg),
        }]);

        let ctx = method_context(PromotionMap::new());
        let mut m = Machine::new(isa, TEST_NUM_METHOD_IDS);
        let class = m.new_class(&[0, 12], &[]);
        let obj = m.new_object(class);
        m.set_vreg(&ctx, VReg(0), 0);
        m.set_reg(receiver_reg, obj);
        m.set_reg(site.regs[1].0, 5);
        let out = m.run(&code);
        assert_eq!(out.exception, None);
        assert_eq!(out.calls[0].target, CallTarget::Method(12));
        assert_eq!(out.calls[0].arg_words(2), vec![obj, 5]);
    }
}

#[test]
fn non_range_call_with_six_words_is_rejected() {
    let site = lay_out(
        InstructionSet::Thumb2,
        &shaped(Source::Frame, &[false, false, false, false, false]),
    );
    let info = call_info(InvokeType::Static, &site, false);
    assert!(matches!(
        lower_in(InstructionSet::Thumb2, TEST_FRAME, &site, &info),
        Err(Error::Invariant(_))
    ));
}

#[test]
fn arguments_outside_the_frame_are_rejected() {
    for vreg in [TEST_FRAME.num_vregs, 1000, u32::MAX - 2] {
        let info = CallSiteBuilder::new(InvokeType::Static, 7)
            .frame_args(0, 1)
            .arg(ValueLocation::frame(VReg(vreg)))
            .build();
        for isa in ISAS {
            assert!(
                matches!(lower_call(isa, &info), Err(Error::Invariant(_))),
                "{isa:?} v{vreg}"
            );
        }
    }
    let info = CallSiteBuilder::new(InvokeType::Static, 7)
        .frame_args(0, 1)
        .result(ValueLocation::frame(VReg(TEST_FRAME.num_vregs)))
        .build();
    assert!(matches!(
        lower_call(InstructionSet::Thumb2, &info),
        Err(Error::Invariant(_))
    ));
}

#[test]
fn zero_argument_call_moves_nothing() {
    let info = CallSiteBuilder::new(InvokeType::Static, 7).slow().build();
    for isa in ISAS {
        let code = lower_call(isa, &info).unwrap();
        let sp = isa.abi().stack_pointer();
        assert!(!has_opcode(&code.instructions, Opcode::Store));
        assert!(!code.instructions.iter().any(|i| matches!(
            i,
            Instruction::Load { base, .. } if *base == sp
        )));
    }
}

// ── Range form ──

fn frame_run(count: u32) -> Vec<Arg> {
    (0..count)
        .map(|k| {
            if k == 0 {
                Arg::narrow(Source::Frame, RECEIVER)
            } else {
                Arg::narrow(Source::Frame, narrow_value(k))
            }
        })
        .collect()
}

#[test]
fn range_form_copies_home_slots() {
    for isa in ISAS {
        for count in 6..=8 {
            let site = lay_out(isa, &frame_run(count));
            for kind in [InvokeType::Static, InvokeType::Direct] {
                assert_eq!(
                    image(isa, kind, &site, true, TEST_FRAME),
                    site.expected,
                    "{isa:?} {count} words"
                );
            }
        }
    }
}

#[test]
fn range_form_flushes_promoted_words_once() {
    for isa in ISAS {
        let mut args = frame_run(7);
        args[1] = Arg::narrow(Source::Promoted, 0x0BAD_F00D);
        args[4] = Arg::narrow(Source::Promoted, 0x0DEC_0DED);
        let site = lay_out(isa, &args);
        let info = call_info(InvokeType::Static, &site, true);
        let code = lower_in(isa, TEST_FRAME, &site, &info).unwrap();

        let ctx = method_context(PromotionMap::new());
        let home = |v| ctx.frame.vreg_offset(VReg(v));
        let sp = isa.abi().stack_pointer();
        let flushes = |v| {
            code.instructions
                .iter()
                .filter(|i| matches!(i, Instruction::Store { base, disp, .. } if *base == sp && *disp == home(v)))
                .count()
        };
        // Only words copied from the frame need their home slot current.
        assert_eq!(flushes(4), 1, "{isa:?}");
        assert_eq!(flushes(1), 0, "{isa:?}");

        let out = run_in(isa, TEST_FRAME, &site, &code);
        assert_eq!(out.method_calls()[0].arg_words(7), site.expected);
    }
}

#[test]
fn range_form_homes_constant_words() {
    for isa in ISAS {
        let args = [
            Arg::narrow(Source::Frame, RECEIVER),
            Arg::narrow(Source::Const, 0x11),
            Arg::wide(Source::Const, 0x0000_0022_FFFF_FF33),
            Arg::narrow(Source::Frame, 4),
            Arg::narrow(Source::Const, 0x8000_0005),
            Arg::narrow(Source::Frame, 6),
            Arg::narrow(Source::Const, 7),
        ];
        let site = lay_out(isa, &args);
        for kind in [InvokeType::Static, InvokeType::Direct] {
            assert_eq!(
                image(isa, kind, &site, true, TEST_FRAME),
                site.expected,
                "{isa:?} {kind:?}"
            );
        }
    }
}

#[test]
fn range_form_with_wide_at_word_two() {
    for isa in ISAS {
        for source in [Source::Frame, Source::Promoted] {
            let args = [
                Arg::narrow(Source::Frame, RECEIVER),
                Arg::narrow(Source::Frame, 1),
                Arg::wide(source, 0x0000_0022_0000_0033),
                Arg::narrow(Source::Frame, 4),
                Arg::narrow(Source::Frame, 5),
                Arg::narrow(Source::Frame, 6),
            ];
            let site = lay_out(isa, &args);
            assert_eq!(
                image(isa, InvokeType::Static, &site, true, TEST_FRAME),
                site.expected,
                "{isa:?} {source:?}"
            );
        }
    }
}

#[test]
fn range_form_rejects_scattered_registers() {
    let info = CallSiteBuilder::new(InvokeType::Static, 7)
        .frame_args(0, 4)
        .arg(ValueLocation::frame(VReg(9)))
        .arg(ValueLocation::frame(VReg(5)))
        .range()
        .build();
    assert!(matches!(
        lower_call(InstructionSet::Thumb2, &info),
        Err(Error::Invariant(_))
    ));
}

#[test]
fn thumb2_switches_to_memcpy_past_sixteen_stack_words() {
    let isa = InstructionSet::Thumb2;
    for (count, memcpy) in [(19, false), (20, true)] {
        let site = lay_out(isa, &frame_run(count));
        let info = call_info(InvokeType::Static, &site, true);
        let code = lower_in(isa, BIG_FRAME, &site, &info).unwrap();
        assert_eq!(has_opcode(&code.instructions, Opcode::BlockLoad), !memcpy);

        let out = run_in(isa, BIG_FRAME, &site, &code);
        let helper = out
            .calls
            .iter()
            .find(|c| c.target == CallTarget::Helper(RuntimeEntryPoint::Memcpy));
        assert_eq!(helper.is_some(), memcpy);
        assert_eq!(out.method_calls()[0].arg_words(count as usize), site.expected);
    }
}

#[test]
fn mips_copies_through_memcpy() {
    let isa = InstructionSet::Mips;
    let site = lay_out(isa, &frame_run(8));
    let info = call_info(InvokeType::Static, &site, true);
    let code = lower_in(isa, TEST_FRAME, &site, &info).unwrap();
    let out = run_in(isa, TEST_FRAME, &site, &code);
    let memcpy = &out.calls[0];
    assert_eq!(memcpy.target, CallTarget::Helper(RuntimeEntryPoint::Memcpy));
    assert_eq!(memcpy.args[1], 5 * WORD_SIZE as u32);
    assert_eq!(memcpy.method_arg, SP_BASE + out_arg_offset(3) as u32);
    assert_eq!(out.method_calls()[0].arg_words(8), site.expected);
}

#[test]
fn x86_vector_copy_respects_alignment() {
    let isa = InstructionSet::X86;
    for first in 0..4 {
        for count in 7..=14 {
            let mut args = vec![Arg::narrow(Source::Frame, 0); first as usize];
            args.extend(frame_run(count));
            let full = lay_out(isa, &args);
            let site = Site {
                args: full.args[first as usize..].to_vec(),
                expected: full.expected[first as usize..].to_vec(),
                ..full
            };
            let info = call_info(InvokeType::Static, &site, true);
            let code = lower_in(isa, BIG_FRAME, &site, &info).unwrap();
            // The outgoing area starts 16-byte aligned.
            assert_has_pattern(&code.instructions, &[InstructionPattern::VecStore {
                disp: Pat::Exact(out_arg_offset(3)),
                kind: Pat::Exact(VecMove::Aligned),
            }]);
            let out = run_in(isa, BIG_FRAME, &site, &code);
            assert_eq!(
                out.method_calls()[0].arg_words(count as usize),
                site.expected,
                "first v{first}, {count} words"
            );
        }
    }
}

#[test]
fn block_copy_stores_from_the_same_registers_it_loaded() {
    let isa = InstructionSet::Thumb2;
    let site = lay_out(isa, &frame_run(8));
    let code = lower_in(isa, TEST_FRAME, &site, &call_info(InvokeType::Static, &site, true))
        .unwrap();
    let sp = Reg::Core(13);
    let r3 = Reg::Core(3);
    let ctx = method_context(PromotionMap::new());
    assert_has_pattern(main_body(&code), &[
        InstructionPattern::AluRegImm {
            op: Pat::Any,
            dst: Pat::Exact(r3),
            src: Pat::Exact(sp),
            imm: Pat::Exact(ctx.frame.vreg_offset(VReg(3))),
        },
        InstructionPattern::BlockLoad {
            base: Pat::Exact(r3),
            count: Pat::Exact(5),
        },
    ]);
    assert!(code.instructions.contains(&Instruction::BlockStore {
        base: r3,
        first: Reg::Fp(0),
        count: 5,
    }));
}
