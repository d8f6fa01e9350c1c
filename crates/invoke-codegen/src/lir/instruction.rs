use super::{Label, Opcode};
use crate::codegen::MethodRef;
use crate::target::Reg;

/// Branch conditions. `U*` variants compare unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    Ult,
    Uge,
    Ugt,
    Ule,
}

impl Cond {
    #[must_use]
    pub fn holds(self, lhs: u32, rhs: u32) -> bool {
        let (sl, sr) = (lhs as i32, rhs as i32);
        match self {
            Cond::Eq => lhs == rhs,
            Cond::Ne => lhs != rhs,
            Cond::Lt => sl < sr,
            Cond::Ge => sl >= sr,
            Cond::Gt => sl > sr,
            Cond::Le => sl <= sr,
            Cond::Ult => lhs < rhs,
            Cond::Uge => lhs >= rhs,
            Cond::Ugt => lhs > rhs,
            Cond::Ule => lhs <= rhs,
        }
    }

    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Ge => "ge",
            Cond::Gt => "gt",
            Cond::Le => "le",
            Cond::Ult => "lo",
            Cond::Uge => "hs",
            Cond::Ugt => "hi",
            Cond::Ule => "ls",
        }
    }
}

/// Two-operand ALU operations. `Add` sets the carry flag; `Adc` consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    And,
    Or,
    Xor,
    Asr,
    Lsr,
    Lsl,
}

impl AluOp {
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Adc => "adc",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "orr",
            AluOp::Xor => "eor",
            AluOp::Asr => "asr",
            AluOp::Lsr => "lsr",
            AluOp::Lsl => "lsl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Reverse the four bytes of a word.
    Rev,
    /// Reverse the bytes of the low halfword and sign-extend.
    Revsh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemSize {
    Word,
    UnsignedHalf,
}

/// Flavour of a 128-bit vector memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VecMove {
    /// 16-byte aligned full move.
    Aligned,
    /// Unaligned full move.
    Unaligned,
    /// Low 64 bits of the vector register, 8-byte aligned.
    Lo,
    /// High 64 bits of the vector register, 8-byte aligned.
    Hi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    LoadLoad,
    StoreStore,
    StoreLoad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Branch target pseudo-op.
    Label(Label),
    /// Marks the start of an intrinsic launchpad.
    IntrinsicRetry,
    LoadConst {
        dst: Reg,
        value: i32,
    },
    /// Register move; may cross register classes.
    Copy {
        dst: Reg,
        src: Reg,
    },
    Load {
        dst: Reg,
        base: Reg,
        disp: i32,
        size: MemSize,
    },
    Store {
        base: Reg,
        disp: i32,
        src: Reg,
        size: MemSize,
    },
    LoadWide {
        lo: Reg,
        hi: Reg,
        base: Reg,
        disp: i32,
    },
    StoreWide {
        base: Reg,
        disp: i32,
        lo: Reg,
        hi: Reg,
    },
    /// `dst = [base + (index << scale) + disp]`.
    LoadIndexed {
        dst: Reg,
        base: Reg,
        index: Reg,
        scale: u8,
        disp: i32,
        size: MemSize,
    },
    /// `[base + (index << scale)] = src`.
    StoreIndexed {
        base: Reg,
        index: Reg,
        scale: u8,
        src: Reg,
        size: MemSize,
    },
    /// Load from thread memory through a segment override.
    LoadThread {
        dst: Reg,
        offset: i32,
    },
    /// Linker-patched code address of a method.
    LoadCodeAddress {
        dst: Reg,
        method: MethodRef,
    },
    /// Linker-patched address of a method object.
    LoadMethodAddress {
        dst: Reg,
        method: MethodRef,
    },
    /// `dst = dst op src`.
    AluRegReg {
        op: AluOp,
        dst: Reg,
        src: Reg,
    },
    /// `dst = lhs op rhs`.
    AluRegRegReg {
        op: AluOp,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    },
    /// `dst = src op imm`.
    AluRegImm {
        op: AluOp,
        dst: Reg,
        src: Reg,
        imm: i32,
    },
    Unary {
        op: UnaryOp,
        dst: Reg,
        src: Reg,
    },
    BranchCmp {
        cond: Cond,
        lhs: Reg,
        rhs: Reg,
        target: Label,
    },
    BranchCmpImm {
        cond: Cond,
        reg: Reg,
        imm: i32,
        target: Label,
    },
    /// Branch if `reg cond [base + disp]`.
    BranchCmpMem {
        cond: Cond,
        reg: Reg,
        base: Reg,
        disp: i32,
        target: Label,
    },
    /// Branch if `[base + disp] cond imm`.
    BranchMemImm {
        cond: Cond,
        base: Reg,
        disp: i32,
        imm: i32,
        target: Label,
    },
    Jump {
        target: Label,
    },
    /// Load `count` consecutive words from `[base]` into floating registers
    /// starting at `first`.
    BlockLoad {
        base: Reg,
        first: Reg,
        count: u8,
    },
    BlockStore {
        base: Reg,
        first: Reg,
        count: u8,
    },
    VecLoad {
        dst: Reg,
        base: Reg,
        disp: i32,
        kind: VecMove,
    },
    VecStore {
        base: Reg,
        disp: i32,
        src: Reg,
        kind: VecMove,
    },
    CallReg {
        target: Reg,
    },
    /// Call through `[base + disp]`.
    CallMem {
        base: Reg,
        disp: i32,
    },
    /// Call through thread memory at `offset`.
    CallThreadMem {
        offset: i32,
    },
    /// PC-relative call, patched by the linker.
    CallRelative {
        method: MethodRef,
    },
    Barrier(BarrierKind),
    /// Dirty the card of `object` after storing reference `value` into it.
    MarkGcCard {
        value: Reg,
        object: Reg,
    },
}

impl Instruction {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Label(_) => Opcode::Label,
            Self::IntrinsicRetry => Opcode::IntrinsicRetry,
            Self::LoadConst { .. } => Opcode::LoadConst,
            Self::Copy { .. } => Opcode::Copy,
            Self::Load { .. } => Opcode::Load,
            Self::Store { .. } => Opcode::Store,
            Self::LoadWide { .. } => Opcode::LoadWide,
            Self::StoreWide { .. } => Opcode::StoreWide,
            Self::LoadIndexed { .. } => Opcode::LoadIndexed,
            Self::StoreIndexed { .. } => Opcode::StoreIndexed,
            Self::LoadThread { .. } => Opcode::LoadThread,
            Self::LoadCodeAddress { .. } => Opcode::LoadCodeAddress,
            Self::LoadMethodAddress { .. } => Opcode::LoadMethodAddress,
            Self::AluRegReg { .. } => Opcode::AluRegReg,
            Self::AluRegRegReg { .. } => Opcode::AluRegRegReg,
            Self::AluRegImm { .. } => Opcode::AluRegImm,
            Self::Unary { .. } => Opcode::Unary,
            Self::BranchCmp { .. } => Opcode::BranchCmp,
            Self::BranchCmpImm { .. } => Opcode::BranchCmpImm,
            Self::BranchCmpMem { .. } => Opcode::BranchCmpMem,
            Self::BranchMemImm { .. } => Opcode::BranchMemImm,
            Self::Jump { .. } => Opcode::Jump,
            Self::BlockLoad { .. } => Opcode::BlockLoad,
            Self::BlockStore { .. } => Opcode::BlockStore,
            Self::VecLoad { .. } => Opcode::VecLoad,
            Self::VecStore { .. } => Opcode::VecStore,
            Self::CallReg { .. } => Opcode::CallReg,
            Self::CallMem { .. } => Opcode::CallMem,
            Self::CallThreadMem { .. } => Opcode::CallThreadMem,
            Self::CallRelative { .. } => Opcode::CallRelative,
            Self::Barrier(_) => Opcode::Barrier,
            Self::MarkGcCard { .. } => Opcode::MarkGcCard,
        }
    }

    /// Get the destination register written by this instruction, if any.
    #[must_use]
    pub fn dest_reg(&self) -> Option<Reg> {
        match self {
            Self::LoadConst { dst, .. }
            | Self::Copy { dst, .. }
            | Self::Load { dst, .. }
            | Self::LoadIndexed { dst, .. }
            | Self::LoadThread { dst, .. }
            | Self::LoadCodeAddress { dst, .. }
            | Self::LoadMethodAddress { dst, .. }
            | Self::AluRegReg { dst, .. }
            | Self::AluRegRegReg { dst, .. }
            | Self::AluRegImm { dst, .. }
            | Self::Unary { dst, .. }
            | Self::VecLoad { dst, .. } => Some(*dst),
            Self::LoadWide { lo, .. } => Some(*lo),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_call(&self) -> bool {
        self.opcode().is_call()
    }

    /// Label this instruction may transfer control to.
    #[must_use]
    pub fn branch_target(&self) -> Option<Label> {
        match self {
            Self::BranchCmp { target, .. }
            | Self::BranchCmpImm { target, .. }
            | Self::BranchCmpMem { target, .. }
            | Self::BranchMemImm { target, .. }
            | Self::Jump { target } => Some(*target),
            _ => None,
        }
    }

    /// Base register and displacement of a word access off `base`.
    #[must_use]
    pub fn memory_operand(&self) -> Option<(Reg, i32)> {
        match self {
            Self::Load { base, disp, .. }
            | Self::Store { base, disp, .. }
            | Self::LoadWide { base, disp, .. }
            | Self::StoreWide { base, disp, .. }
            | Self::VecLoad { base, disp, .. }
            | Self::VecStore { base, disp, .. } => Some((*base, *disp)),
            _ => None,
        }
    }
}
