#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Label,
    IntrinsicRetry,
    LoadConst,
    Copy,
    Load,
    Store,
    LoadWide,
    StoreWide,
    LoadIndexed,
    StoreIndexed,
    LoadThread,
    LoadCodeAddress,
    LoadMethodAddress,
    AluRegReg,
    AluRegRegReg,
    AluRegImm,
    Unary,
    // Compare-and-branch forms
    BranchCmp,
    BranchCmpImm,
    BranchCmpMem,
    BranchMemImm,
    Jump,
    BlockLoad,
    BlockStore,
    VecLoad,
    VecStore,
    CallReg,
    CallMem,
    CallThreadMem,
    CallRelative,
    Barrier,
    MarkGcCard,
}

impl Opcode {
    #[must_use]
    pub const fn is_call(self) -> bool {
        matches!(
            self,
            Self::CallReg | Self::CallMem | Self::CallThreadMem | Self::CallRelative
        )
    }

    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::BranchCmp | Self::BranchCmpImm | Self::BranchCmpMem | Self::BranchMemImm | Self::Jump
        )
    }

    /// Pseudo-ops occupy no code space.
    #[must_use]
    pub const fn is_pseudo(self) -> bool {
        matches!(self, Self::Label | Self::IntrinsicRetry)
    }
}
