//! Low-level IR emitted by the invoke lowering.
//!
//! Instructions are target-neutral in shape but carry physical registers;
//! encoding them is left to the assembler stage.

mod display;
mod instruction;
mod opcode;

pub use display::Listing;
pub use instruction::{AluOp, BarrierKind, Cond, Instruction, MemSize, UnaryOp, VecMove};
pub use opcode::Opcode;

/// A branch target inside one method's instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) usize);

impl Label {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}
