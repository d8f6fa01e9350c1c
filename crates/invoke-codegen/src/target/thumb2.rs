// Thumb2 (32-bit ARM, soft-float calling convention).
//
// Floating arguments travel in core registers; s0-s15 are scratch and back
// the vldm/vstm block copy.

use super::{CopyStrategy, InstructionSet, Reg, TargetAbi};

pub const R0: Reg = Reg::Core(0);
pub const R1: Reg = Reg::Core(1);
pub const R2: Reg = Reg::Core(2);
pub const R3: Reg = Reg::Core(3);
/// Thread register.
pub const R9: Reg = Reg::Core(9);
/// Intra-procedure scratch; carries the hidden interface argument.
pub const R12: Reg = Reg::Core(12);
pub const SP: Reg = Reg::Core(13);
pub const LR: Reg = Reg::Core(14);

/// Largest block copy done with a single vldm/vstm pair.
pub const MAX_BLOCK_COPY_WORDS: usize = 16;

const ARGS: [Reg; 4] = [R0, R1, R2, R3];
const CORE_TEMPS: [Reg; 5] = [R0, R1, R2, R3, R12];
const FP_TEMPS: [Reg; 16] = [
    Reg::Fp(0),
    Reg::Fp(1),
    Reg::Fp(2),
    Reg::Fp(3),
    Reg::Fp(4),
    Reg::Fp(5),
    Reg::Fp(6),
    Reg::Fp(7),
    Reg::Fp(8),
    Reg::Fp(9),
    Reg::Fp(10),
    Reg::Fp(11),
    Reg::Fp(12),
    Reg::Fp(13),
    Reg::Fp(14),
    Reg::Fp(15),
];
const CALLER_SAVE: [Reg; 22] = [
    R0,
    R1,
    R2,
    R3,
    R12,
    LR,
    Reg::Fp(0),
    Reg::Fp(1),
    Reg::Fp(2),
    Reg::Fp(3),
    Reg::Fp(4),
    Reg::Fp(5),
    Reg::Fp(6),
    Reg::Fp(7),
    Reg::Fp(8),
    Reg::Fp(9),
    Reg::Fp(10),
    Reg::Fp(11),
    Reg::Fp(12),
    Reg::Fp(13),
    Reg::Fp(14),
    Reg::Fp(15),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Thumb2;

impl TargetAbi for Thumb2 {
    fn isa(&self) -> InstructionSet {
        InstructionSet::Thumb2
    }

    fn arg_regs(&self) -> &'static [Reg; 4] {
        &ARGS
    }

    fn invoke_target(&self) -> Option<Reg> {
        Some(LR)
    }

    fn hidden_arg(&self) -> Reg {
        R12
    }

    fn stack_pointer(&self) -> Reg {
        SP
    }

    fn thread_reg(&self) -> Option<Reg> {
        Some(R9)
    }

    fn return_regs(&self, _fp: bool) -> (Reg, Reg) {
        (R0, R1)
    }

    fn core_temps(&self) -> &'static [Reg] {
        &CORE_TEMPS
    }

    fn fp_temps(&self) -> &'static [Reg] {
        &FP_TEMPS
    }

    fn caller_save(&self) -> &'static [Reg] {
        &CALLER_SAVE
    }

    fn copy_strategy(&self, words: usize) -> CopyStrategy {
        if words <= MAX_BLOCK_COPY_WORDS {
            CopyStrategy::BlockPair
        } else {
            CopyStrategy::Memcpy
        }
    }

    fn fp_pairs_need_even_alignment(&self) -> bool {
        true
    }

    fn reg_name(&self, reg: Reg) -> String {
        match reg {
            Reg::Core(9) => "rSELF".to_string(),
            Reg::Core(12) => "r12".to_string(),
            Reg::Core(13) => "sp".to_string(),
            Reg::Core(14) => "lr".to_string(),
            Reg::Core(15) => "pc".to_string(),
            Reg::Core(n) => format!("r{n}"),
            Reg::Fp(n) => format!("s{n}"),
        }
    }
}
