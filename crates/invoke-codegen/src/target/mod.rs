//! Calling-convention descriptions for the supported instruction sets.
//!
//! Everything architecture-specific the invoke lowering needs is reached
//! through [`TargetAbi`]; the lowering itself never matches on the ISA.

pub mod mips;
pub mod thumb2;
pub mod x86;

use std::fmt;

use crate::codegen::Intrinsic;

pub use mips::Mips;
pub use thumb2::Thumb2;
pub use x86::X86;

/// Register class. Core and floating registers are allocated separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Core,
    Fp,
}

/// A physical register, numbered per class in the target's encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    Core(u8),
    Fp(u8),
}

impl Reg {
    #[must_use]
    pub const fn class(self) -> RegClass {
        match self {
            Reg::Core(_) => RegClass::Core,
            Reg::Fp(_) => RegClass::Fp,
        }
    }

    #[must_use]
    pub const fn is_fp(self) -> bool {
        matches!(self, Reg::Fp(_))
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Reg::Core(n) | Reg::Fp(n) => n,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Core(n) => write!(f, "r{n}"),
            Reg::Fp(n) => write!(f, "f{n}"),
        }
    }
}

/// How words 3.. of a range call are moved from the home frame to the
/// outgoing area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrategy {
    /// Block load into floating registers followed by a block store.
    BlockPair,
    /// 128-bit vector moves, split by alignment, with 32-bit tails.
    Vector128,
    /// Call the runtime memcpy helper.
    Memcpy,
}

/// The calling convention and register file of one instruction set.
pub trait TargetAbi: Sync {
    fn isa(&self) -> InstructionSet;

    /// Argument registers `arg0..arg3`. Slot 0 carries the callee method.
    fn arg_regs(&self) -> &'static [Reg; 4];

    /// Separate floating argument registers, if the target passes floats
    /// outside the core argument registers.
    fn fp_arg_regs(&self) -> Option<&'static [Reg; 4]> {
        None
    }

    /// Register the call is made through. `None` when the target calls
    /// through memory instead.
    fn invoke_target(&self) -> Option<Reg>;

    /// Register carrying the interface method index to the IMT stub.
    fn hidden_arg(&self) -> Reg;

    /// Floating mirror of the hidden argument, for targets whose hidden
    /// core register is reused during dispatch.
    fn hidden_fp_arg(&self) -> Option<Reg> {
        None
    }

    fn stack_pointer(&self) -> Reg;

    /// Register holding the current thread. `None` means thread memory is
    /// reached through a segment override.
    fn thread_reg(&self) -> Option<Reg>;

    /// Return registers `(low, high)` for the given class.
    fn return_regs(&self, fp: bool) -> (Reg, Reg);

    /// Allocatable core temps, in allocation preference order.
    fn core_temps(&self) -> &'static [Reg];

    fn fp_temps(&self) -> &'static [Reg];

    /// Registers a call may overwrite.
    fn caller_save(&self) -> &'static [Reg];

    fn copy_strategy(&self, words: usize) -> CopyStrategy;

    /// Whether a bounds check can compare a register against memory directly.
    fn compares_with_memory(&self) -> bool {
        false
    }

    /// Whether promoted double pairs must start at an even register.
    fn fp_pairs_need_even_alignment(&self) -> bool {
        false
    }

    fn supports_intrinsic(&self, _intrinsic: Intrinsic) -> bool {
        true
    }

    fn reg_name(&self, reg: Reg) -> String {
        reg.to_string()
    }

    // ── Derived helpers ──

    /// Argument register `slot`, or `None` past `arg3`.
    fn arg_reg(&self, slot: usize) -> Option<Reg> {
        self.arg_regs().get(slot).copied()
    }

    /// Register an incoming argument word arrives in (words 0-2 map to
    /// `arg1..arg3`), or `None` when it was passed in the caller's frame.
    fn in_arg_reg(&self, word: usize) -> Option<Reg> {
        self.arg_reg(word + 1)
    }

    /// Register the dispatch sequence uses for class and table loads.
    fn dispatch_reg(&self) -> Reg {
        self.invoke_target().unwrap_or(self.arg_regs()[0])
    }

    fn memory_indirect_calls(&self) -> bool {
        self.invoke_target().is_none()
    }

    fn is_caller_save(&self, reg: Reg) -> bool {
        self.caller_save().contains(&reg)
    }
}

/// Instruction set selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstructionSet {
    #[default]
    Thumb2,
    X86,
    Mips,
}

static THUMB2: Thumb2 = Thumb2;
static X86_ABI: X86 = X86;
static MIPS: Mips = Mips;

impl InstructionSet {
    #[must_use]
    pub fn abi(self) -> &'static dyn TargetAbi {
        match self {
            InstructionSet::Thumb2 => &THUMB2,
            InstructionSet::X86 => &X86_ABI,
            InstructionSet::Mips => &MIPS,
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "thumb2" | "arm" => Some(Self::Thumb2),
            "x86" => Some(Self::X86),
            "mips" => Some(Self::Mips),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_registers_are_caller_save() {
        for isa in [InstructionSet::Thumb2, InstructionSet::X86, InstructionSet::Mips] {
            let abi = isa.abi();
            for reg in abi.arg_regs() {
                assert!(abi.is_caller_save(*reg), "{isa:?} {reg}");
            }
            assert!(!abi.is_caller_save(abi.stack_pointer()));
        }
    }

    #[test]
    fn incoming_words_map_past_method_slot() {
        let abi = InstructionSet::Thumb2.abi();
        assert_eq!(abi.in_arg_reg(0), Some(Reg::Core(1)));
        assert_eq!(abi.in_arg_reg(2), Some(Reg::Core(3)));
        assert_eq!(abi.in_arg_reg(3), None);
    }

    #[test]
    fn x86_dispatches_through_arg0() {
        let abi = InstructionSet::X86.abi();
        assert!(abi.memory_indirect_calls());
        assert_eq!(abi.dispatch_reg(), abi.arg_regs()[0]);
        assert_eq!(abi.hidden_fp_arg(), Some(Reg::Fp(0)));
    }
}
