//! Test harness for invoke-codegen tests
//!
//! Builders for call sites and method contexts, instruction pattern
//! matching, and (in [`simulator`]) an interpreter that runs emitted code
//! against a modelled runtime. Available in unit tests and, through the
//! `test-harness` feature, to integration tests.
//!
//! # Example
//!
//! ```rust
//! use invoke_codegen::test_harness::*;
//! use invoke_codegen::{InstructionSet, InvokeType, Reg, VReg, ValueLocation};
//!
//! let info = CallSiteBuilder::new(InvokeType::Static, 3)
//!     .arg(ValueLocation::constant(VReg(0), 7))
//!     .build();
//! let code = lower_call(InstructionSet::Thumb2, &info).unwrap();
//!
//! // The constant lands in the first argument register.
//! assert_has_pattern(&code.instructions, &[InstructionPattern::LoadConst {
//!     dst: Pat::Exact(Reg::Core(1)),
//!     value: Pat::Exact(7),
//! }]);
//! ```

#![allow(
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::manual_assert,
    clippy::missing_panics_doc,
    clippy::uninlined_format_args
)]

pub mod simulator;

use crate::codegen::{
    CallInfo, CodeEmitter, CompilerOptions, DexFileId, DirectTarget, EmittedCode, FrameLayout,
    Intrinsic, InvokeType, MethodContext, MethodLoweringInfo, MethodRef, OptFlags, PromotionMap,
    ValueLocation, VReg, gen_invoke,
};
use crate::lir::{AluOp, BarrierKind, Cond, Instruction, Opcode, VecMove};
use crate::target::{InstructionSet, Reg};
use crate::Result;

/// Dex file every harness method and call site belongs to.
pub const TEST_DEX: DexFileId = DexFileId(0);
/// Method ids in [`TEST_DEX`].
pub const TEST_NUM_METHOD_IDS: u32 = 64;

/// Frame used by [`method_context`]: room for eight outgoing words and 32
/// virtual registers.
pub const TEST_FRAME: FrameLayout = FrameLayout {
    num_outs: 8,
    num_vregs: 32,
};

/// Method context for a method in [`TEST_DEX`] with [`TEST_FRAME`].
pub fn method_context(promotion: PromotionMap) -> MethodContext {
    MethodContext {
        dex_file: TEST_DEX,
        num_method_ids: TEST_NUM_METHOD_IDS,
        frame: TEST_FRAME,
        promotion,
    }
}

pub fn options(isa: InstructionSet) -> CompilerOptions {
    CompilerOptions {
        instruction_set: isa,
        ..CompilerOptions::default()
    }
}

/// Emitter with default options for `isa` and no promoted registers.
pub fn new_emitter(isa: InstructionSet) -> CodeEmitter {
    CodeEmitter::new(options(isa), method_context(PromotionMap::new()))
}

/// Lower one call site into a fresh method and finish it.
pub fn lower_call(isa: InstructionSet, info: &CallInfo) -> Result<EmittedCode> {
    lower_call_with(options(isa), PromotionMap::new(), info)
}

pub fn lower_call_with(
    options: CompilerOptions,
    promotion: PromotionMap,
    info: &CallInfo,
) -> Result<EmittedCode> {
    let mut e = CodeEmitter::new(options, method_context(promotion));
    gen_invoke(&mut e, info)?;
    e.finish()
}

/// Builder for [`CallInfo`]. Starts as a fast-path call with nothing known
/// about the callee's addresses.
#[derive(Debug, Clone)]
pub struct CallSiteBuilder {
    info: CallInfo,
}

impl CallSiteBuilder {
    pub fn new(kind: InvokeType, method_index: u32) -> Self {
        Self {
            info: CallInfo {
                dex_pc: 0x10,
                args: Vec::new(),
                result: None,
                is_range: false,
                opt_flags: OptFlags::default(),
                method: MethodLoweringInfo {
                    invoke_type: kind,
                    sharp_type: kind,
                    fast_path: true,
                    target: MethodRef {
                        dex_file: TEST_DEX,
                        method_index,
                    },
                    vtable_index: 0,
                    direct_code: DirectTarget::Unknown,
                    direct_method: DirectTarget::Unknown,
                },
                intrinsic: None,
            },
        }
    }

    /// Unresolved call through the runtime trampoline.
    pub fn slow(mut self) -> Self {
        self.info.method.fast_path = false;
        self
    }

    /// Devirtualized to `kind`.
    pub fn sharpened(mut self, kind: InvokeType) -> Self {
        self.info.method.sharp_type = kind;
        self
    }

    pub fn vtable_index(mut self, index: u32) -> Self {
        self.info.method.vtable_index = index;
        self
    }

    pub fn direct(mut self, code: DirectTarget, method: DirectTarget) -> Self {
        self.info.method.direct_code = code;
        self.info.method.direct_method = method;
        self
    }

    pub fn target_dex(mut self, dex: DexFileId) -> Self {
        self.info.method.target.dex_file = dex;
        self
    }

    pub fn arg(mut self, loc: ValueLocation) -> Self {
        self.info.args.push(loc);
        self
    }

    pub fn wide_arg(mut self, words: [ValueLocation; 2]) -> Self {
        self.info.args.extend(words);
        self
    }

    /// `count` narrow words homed at consecutive registers from `first`.
    pub fn frame_args(mut self, first: u32, count: u32) -> Self {
        self.info
            .args
            .extend((first..first + count).map(|v| ValueLocation::frame(VReg(v))));
        self
    }

    pub fn range(mut self) -> Self {
        self.info.is_range = true;
        self
    }

    pub fn result(mut self, loc: ValueLocation) -> Self {
        self.info.result = Some(loc);
        self
    }

    pub fn intrinsic(mut self, intrinsic: Intrinsic) -> Self {
        self.info.intrinsic = Some(intrinsic);
        self
    }

    /// The receiver is known non-null.
    pub fn non_null(mut self) -> Self {
        self.info.opt_flags.ignore_null_check = true;
        self
    }

    pub fn in_range(mut self) -> Self {
        self.info.opt_flags.ignore_range_check = true;
        self
    }

    pub fn dex_pc(mut self, pc: u32) -> Self {
        self.info.dex_pc = pc;
        self
    }

    pub fn build(self) -> CallInfo {
        self.info
    }
}

/// Pattern matching for instruction fields
#[derive(Debug, Clone)]
pub enum Pat<T> {
    /// Match any value
    Any,
    /// Match exact value
    Exact(T),
    /// Match if value satisfies predicate
    Predicate(fn(&T) -> bool),
}

impl<T: PartialEq> Pat<T> {
    /// Check if a value matches this pattern
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Pat::Any => true,
            Pat::Exact(expected) => value == expected,
            Pat::Predicate(pred) => pred(value),
        }
    }
}

/// Pattern for matching instructions in tests
///
/// Labels and branch targets are never matched; use
/// [`EmittedCode::label_position`] when the target matters.
#[derive(Debug, Clone)]
pub enum InstructionPattern {
    /// Match any instruction
    Any,
    Label,
    IntrinsicRetry,
    LoadConst {
        dst: Pat<Reg>,
        value: Pat<i32>,
    },
    Copy {
        dst: Pat<Reg>,
        src: Pat<Reg>,
    },
    Load {
        dst: Pat<Reg>,
        base: Pat<Reg>,
        disp: Pat<i32>,
    },
    Store {
        base: Pat<Reg>,
        disp: Pat<i32>,
        src: Pat<Reg>,
    },
    LoadWide {
        lo: Pat<Reg>,
        hi: Pat<Reg>,
        base: Pat<Reg>,
        disp: Pat<i32>,
    },
    StoreWide {
        base: Pat<Reg>,
        disp: Pat<i32>,
        lo: Pat<Reg>,
        hi: Pat<Reg>,
    },
    LoadIndexed {
        dst: Pat<Reg>,
        base: Pat<Reg>,
        index: Pat<Reg>,
    },
    LoadThread {
        dst: Pat<Reg>,
        offset: Pat<i32>,
    },
    LoadCodeAddress {
        dst: Pat<Reg>,
    },
    LoadMethodAddress {
        dst: Pat<Reg>,
    },
    /// Any ALU form with the given operation and destination.
    Alu {
        op: Pat<AluOp>,
        dst: Pat<Reg>,
    },
    AluRegImm {
        op: Pat<AluOp>,
        dst: Pat<Reg>,
        src: Pat<Reg>,
        imm: Pat<i32>,
    },
    BranchCmp {
        cond: Pat<Cond>,
        lhs: Pat<Reg>,
        rhs: Pat<Reg>,
    },
    BranchCmpImm {
        cond: Pat<Cond>,
        reg: Pat<Reg>,
        imm: Pat<i32>,
    },
    Jump,
    BlockLoad {
        base: Pat<Reg>,
        count: Pat<u8>,
    },
    BlockStore {
        base: Pat<Reg>,
        count: Pat<u8>,
    },
    VecLoad {
        disp: Pat<i32>,
        kind: Pat<VecMove>,
    },
    VecStore {
        disp: Pat<i32>,
        kind: Pat<VecMove>,
    },
    CallReg {
        target: Pat<Reg>,
    },
    CallMem {
        base: Pat<Reg>,
        disp: Pat<i32>,
    },
    CallThreadMem {
        offset: Pat<i32>,
    },
    CallRelative,
    Barrier(Pat<BarrierKind>),
    MarkGcCard,
}

impl InstructionPattern {
    /// Check if an instruction matches this pattern
    pub fn matches(&self, instr: &Instruction) -> bool {
        match (self, instr) {
            (InstructionPattern::Any, _) => true,
            (InstructionPattern::Label, Instruction::Label(_)) => true,
            (InstructionPattern::IntrinsicRetry, Instruction::IntrinsicRetry) => true,
            (
                InstructionPattern::LoadConst { dst, value },
                Instruction::LoadConst {
                    dst: d,
                    value: v,
                },
            ) => dst.matches(d) && value.matches(v),
            (InstructionPattern::Copy { dst, src }, Instruction::Copy { dst: d, src: s }) => {
                dst.matches(d) && src.matches(s)
            }
            (
                InstructionPattern::Load { dst, base, disp },
                Instruction::Load {
                    dst: d,
                    base: b,
                    disp: o,
                    ..
                },
            ) => dst.matches(d) && base.matches(b) && disp.matches(o),
            (
                InstructionPattern::Store { base, disp, src },
                Instruction::Store {
                    base: b,
                    disp: o,
                    src: s,
                    ..
                },
            ) => base.matches(b) && disp.matches(o) && src.matches(s),
            (
                InstructionPattern::LoadWide { lo, hi, base, disp },
                Instruction::LoadWide {
                    lo: l,
                    hi: h,
                    base: b,
                    disp: o,
                },
            )
            | (
                InstructionPattern::StoreWide { base, disp, lo, hi },
                Instruction::StoreWide {
                    base: b,
                    disp: o,
                    lo: l,
                    hi: h,
                },
            ) => lo.matches(l) && hi.matches(h) && base.matches(b) && disp.matches(o),
            (
                InstructionPattern::LoadIndexed { dst, base, index },
                Instruction::LoadIndexed {
                    dst: d,
                    base: b,
                    index: i,
                    ..
                },
            ) => dst.matches(d) && base.matches(b) && index.matches(i),
            (
                InstructionPattern::LoadThread { dst, offset },
                Instruction::LoadThread {
                    dst: d,
                    offset: o,
                },
            ) => dst.matches(d) && offset.matches(o),
            (
                InstructionPattern::LoadCodeAddress { dst },
                Instruction::LoadCodeAddress { dst: d, .. },
            )
            | (
                InstructionPattern::LoadMethodAddress { dst },
                Instruction::LoadMethodAddress { dst: d, .. },
            ) => dst.matches(d),
            (
                InstructionPattern::Alu { op, dst },
                Instruction::AluRegReg { op: o, dst: d, .. }
                | Instruction::AluRegRegReg { op: o, dst: d, .. }
                | Instruction::AluRegImm { op: o, dst: d, .. },
            ) => op.matches(o) && dst.matches(d),
            (
                InstructionPattern::AluRegImm { op, dst, src, imm },
                Instruction::AluRegImm {
                    op: o,
                    dst: d,
                    src: s,
                    imm: i,
                },
            ) => op.matches(o) && dst.matches(d) && src.matches(s) && imm.matches(i),
            (
                InstructionPattern::BranchCmp { cond, lhs, rhs },
                Instruction::BranchCmp {
                    cond: c,
                    lhs: l,
                    rhs: r,
                    ..
                },
            ) => cond.matches(c) && lhs.matches(l) && rhs.matches(r),
            (
                InstructionPattern::BranchCmpImm { cond, reg, imm },
                Instruction::BranchCmpImm {
                    cond: c,
                    reg: r,
                    imm: i,
                    ..
                },
            ) => cond.matches(c) && reg.matches(r) && imm.matches(i),
            (InstructionPattern::Jump, Instruction::Jump { .. }) => true,
            (
                InstructionPattern::BlockLoad { base, count },
                Instruction::BlockLoad {
                    base: b, count: c, ..
                },
            )
            | (
                InstructionPattern::BlockStore { base, count },
                Instruction::BlockStore {
                    base: b, count: c, ..
                },
            ) => base.matches(b) && count.matches(c),
            (
                InstructionPattern::VecLoad { disp, kind },
                Instruction::VecLoad {
                    disp: d, kind: k, ..
                },
            )
            | (
                InstructionPattern::VecStore { disp, kind },
                Instruction::VecStore {
                    disp: d, kind: k, ..
                },
            ) => disp.matches(d) && kind.matches(k),
            (InstructionPattern::CallReg { target }, Instruction::CallReg { target: t }) => {
                target.matches(t)
            }
            (
                InstructionPattern::CallMem { base, disp },
                Instruction::CallMem { base: b, disp: d },
            ) => base.matches(b) && disp.matches(d),
            (
                InstructionPattern::CallThreadMem { offset },
                Instruction::CallThreadMem { offset: o },
            ) => offset.matches(o),
            (InstructionPattern::CallRelative, Instruction::CallRelative { .. }) => true,
            (InstructionPattern::Barrier(kind), Instruction::Barrier(k)) => kind.matches(k),
            (InstructionPattern::MarkGcCard, Instruction::MarkGcCard { .. }) => true,
            _ => false,
        }
    }
}

/// Find the first occurrence of a pattern in an instruction sequence
///
/// Returns the index where the pattern starts, or None if not found
pub fn find_pattern(instructions: &[Instruction], pattern: &[InstructionPattern]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(0);
    }

    'outer: for start in 0..=instructions.len().saturating_sub(pattern.len()) {
        for (i, pat) in pattern.iter().enumerate() {
            if start + i >= instructions.len() || !pat.matches(&instructions[start + i]) {
                continue 'outer;
            }
        }
        return Some(start);
    }
    None
}

/// Assert that an instruction sequence contains a pattern
///
/// Panics with a descriptive message if the pattern is not found
pub fn assert_has_pattern(instructions: &[Instruction], pattern: &[InstructionPattern]) {
    if find_pattern(instructions, pattern).is_none() {
        panic!(
            "Pattern not found in instruction sequence.\n\nExpected pattern:\n{}\n\nActual instructions:\n{}",
            format_patterns(pattern),
            format_instructions(instructions)
        );
    }
}

/// Assert that instructions match a pattern exactly
///
/// Panics with a descriptive message if they don't match
pub fn assert_matches(instructions: &[Instruction], pattern: &[InstructionPattern]) {
    if instructions.len() != pattern.len() {
        panic!(
            "Instruction count mismatch: expected {}, got {}.\n\nExpected pattern:\n{}\n\nActual instructions:\n{}",
            pattern.len(),
            instructions.len(),
            format_patterns(pattern),
            format_instructions(instructions)
        );
    }

    for (i, (instr, pat)) in instructions.iter().zip(pattern.iter()).enumerate() {
        if !pat.matches(instr) {
            panic!(
                "Instruction mismatch at index {}:\nExpected: {:?}\nActual:   {:?}\n\nFull instructions:\n{}",
                i,
                pat,
                instr,
                format_instructions(instructions)
            );
        }
    }
}

fn format_patterns(patterns: &[InstructionPattern]) -> String {
    patterns
        .iter()
        .map(|p| format!("  {:?}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_instructions(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .enumerate()
        .map(|(i, insn)| format!("  {:3}: {:?}", i, insn))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count instructions with a specific opcode
pub fn count_opcode(instructions: &[Instruction], opcode: Opcode) -> usize {
    instructions.iter().filter(|i| i.opcode() == opcode).count()
}

/// Check if an instruction sequence contains a specific opcode
pub fn has_opcode(instructions: &[Instruction], opcode: Opcode) -> bool {
    instructions.iter().any(|i| i.opcode() == opcode)
}

/// Filter instructions by opcode
pub fn filter_by_opcode(instructions: &[Instruction], opcode: Opcode) -> Vec<&Instruction> {
    instructions.iter().filter(|i| i.opcode() == opcode).collect()
}

/// Instructions of the main body, without the deferred blocks.
pub fn main_body(code: &EmittedCode) -> &[Instruction] {
    &code.instructions[..code.main_len]
}
