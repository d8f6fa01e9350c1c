use std::fmt;

use super::{BarrierKind, Instruction, MemSize, UnaryOp, VecMove};
use crate::target::{Reg, TargetAbi};

/// Renders an instruction with the target's register names.
pub struct Listing<'a> {
    pub insn: &'a Instruction,
    pub abi: Option<&'a dyn TargetAbi>,
}

impl Listing<'_> {
    fn reg(&self, reg: Reg) -> String {
        match self.abi {
            Some(abi) => abi.reg_name(reg),
            None => reg.to_string(),
        }
    }
}

fn load_mnemonic(size: MemSize) -> &'static str {
    match size {
        MemSize::Word => "ldr",
        MemSize::UnsignedHalf => "ldrh",
    }
}

fn store_mnemonic(size: MemSize) -> &'static str {
    match size {
        MemSize::Word => "str",
        MemSize::UnsignedHalf => "strh",
    }
}

fn vec_suffix(kind: VecMove) -> &'static str {
    match kind {
        VecMove::Aligned => "a128",
        VecMove::Unaligned => "u128",
        VecMove::Lo => "lo64",
        VecMove::Hi => "hi64",
    }
}

impl fmt::Display for Listing<'_> {
    #[allow(clippy::too_many_lines)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = |reg: &Reg| self.reg(*reg);
        match self.insn {
            Instruction::Label(label) => write!(f, "L{}:", label.index()),
            Instruction::IntrinsicRetry => write!(f, "; intrinsic retry"),
            Instruction::LoadConst { dst, value } => write!(f, "mov {}, #{value}", r(dst)),
            Instruction::Copy { dst, src } => write!(f, "mov {}, {}", r(dst), r(src)),
            Instruction::Load {
                dst,
                base,
                disp,
                size,
            } => write!(f, "{} {}, [{}, #{disp}]", load_mnemonic(*size), r(dst), r(base)),
            Instruction::Store {
                base,
                disp,
                src,
                size,
            } => write!(f, "{} {}, [{}, #{disp}]", store_mnemonic(*size), r(src), r(base)),
            Instruction::LoadWide { lo, hi, base, disp } => {
                write!(f, "ldrd {}, {}, [{}, #{disp}]", r(lo), r(hi), r(base))
            }
            Instruction::StoreWide { base, disp, lo, hi } => {
                write!(f, "strd {}, {}, [{}, #{disp}]", r(lo), r(hi), r(base))
            }
            Instruction::LoadIndexed {
                dst,
                base,
                index,
                scale,
                disp,
                size,
            } => write!(
                f,
                "{} {}, [{}, {}, lsl #{scale}, #{disp}]",
                load_mnemonic(*size),
                r(dst),
                r(base),
                r(index)
            ),
            Instruction::StoreIndexed {
                base,
                index,
                scale,
                src,
                size,
            } => write!(
                f,
                "{} {}, [{}, {}, lsl #{scale}]",
                store_mnemonic(*size),
                r(src),
                r(base),
                r(index)
            ),
            Instruction::LoadThread { dst, offset } => {
                write!(f, "mov {}, fs:[#{offset}]", r(dst))
            }
            Instruction::LoadCodeAddress { dst, method } => {
                write!(f, "mov {}, =code({method})", r(dst))
            }
            Instruction::LoadMethodAddress { dst, method } => {
                write!(f, "mov {}, =method({method})", r(dst))
            }
            Instruction::AluRegReg { op, dst, src } => {
                write!(f, "{} {}, {}", op.mnemonic(), r(dst), r(src))
            }
            Instruction::AluRegRegReg { op, dst, lhs, rhs } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), r(dst), r(lhs), r(rhs))
            }
            Instruction::AluRegImm { op, dst, src, imm } => {
                write!(f, "{} {}, {}, #{imm}", op.mnemonic(), r(dst), r(src))
            }
            Instruction::Unary { op, dst, src } => {
                let name = match op {
                    UnaryOp::Rev => "rev",
                    UnaryOp::Revsh => "revsh",
                };
                write!(f, "{name} {}, {}", r(dst), r(src))
            }
            Instruction::BranchCmp {
                cond,
                lhs,
                rhs,
                target,
            } => write!(
                f,
                "cmp {}, {}; b{} L{}",
                r(lhs),
                r(rhs),
                cond.mnemonic(),
                target.index()
            ),
            Instruction::BranchCmpImm {
                cond,
                reg,
                imm,
                target,
            } => write!(
                f,
                "cmp {}, #{imm}; b{} L{}",
                r(reg),
                cond.mnemonic(),
                target.index()
            ),
            Instruction::BranchCmpMem {
                cond,
                reg,
                base,
                disp,
                target,
            } => write!(
                f,
                "cmp {}, [{}, #{disp}]; b{} L{}",
                r(reg),
                r(base),
                cond.mnemonic(),
                target.index()
            ),
            Instruction::BranchMemImm {
                cond,
                base,
                disp,
                imm,
                target,
            } => write!(
                f,
                "cmp [{}, #{disp}], #{imm}; b{} L{}",
                r(base),
                cond.mnemonic(),
                target.index()
            ),
            Instruction::Jump { target } => write!(f, "b L{}", target.index()),
            Instruction::BlockLoad { base, first, count } => {
                write!(f, "vldm {}, {{{}..+{count}}}", r(base), r(first))
            }
            Instruction::BlockStore { base, first, count } => {
                write!(f, "vstm {}, {{{}..+{count}}}", r(base), r(first))
            }
            Instruction::VecLoad {
                dst,
                base,
                disp,
                kind,
            } => write!(f, "movdq.{} {}, [{}, #{disp}]", vec_suffix(*kind), r(dst), r(base)),
            Instruction::VecStore {
                base,
                disp,
                src,
                kind,
            } => write!(f, "movdq.{} [{}, #{disp}], {}", vec_suffix(*kind), r(base), r(src)),
            Instruction::CallReg { target } => write!(f, "blx {}", r(target)),
            Instruction::CallMem { base, disp } => write!(f, "call [{}, #{disp}]", r(base)),
            Instruction::CallThreadMem { offset } => write!(f, "call fs:[#{offset}]"),
            Instruction::CallRelative { method } => write!(f, "call rel({method})"),
            Instruction::Barrier(kind) => {
                let name = match kind {
                    BarrierKind::LoadLoad => "loadload",
                    BarrierKind::StoreStore => "storestore",
                    BarrierKind::StoreLoad => "storeload",
                };
                write!(f, "dmb {name}")
            }
            Instruction::MarkGcCard { value, object } => {
                write!(f, "mark_card {}, {}", r(value), r(object))
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listing = Listing {
            insn: self,
            abi: None,
        };
        fmt::Display::fmt(&listing, f)
    }
}
