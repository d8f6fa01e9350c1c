// MIPS32 (o32-style managed convention).

use super::{CopyStrategy, InstructionSet, Reg, TargetAbi};
use crate::codegen::Intrinsic;

pub const V0: Reg = Reg::Core(2);
pub const V1: Reg = Reg::Core(3);
pub const A0: Reg = Reg::Core(4);
pub const A1: Reg = Reg::Core(5);
pub const A2: Reg = Reg::Core(6);
pub const A3: Reg = Reg::Core(7);
pub const T0: Reg = Reg::Core(8);
/// Thread register.
pub const S1: Reg = Reg::Core(17);
pub const T9: Reg = Reg::Core(25);
pub const SP: Reg = Reg::Core(29);
pub const RA: Reg = Reg::Core(31);

const NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "rSELF", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

const ARGS: [Reg; 4] = [A0, A1, A2, A3];
const FP_ARGS: [Reg; 4] = [Reg::Fp(12), Reg::Fp(13), Reg::Fp(14), Reg::Fp(15)];
const CORE_TEMPS: [Reg; 16] = [
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    Reg::Core(9),
    Reg::Core(10),
    Reg::Core(11),
    Reg::Core(12),
    Reg::Core(13),
    Reg::Core(14),
    Reg::Core(15),
    Reg::Core(24),
    T9,
];
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
const CALLER_SAVE: [Reg; 33] = [
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    Reg::Core(9),
    Reg::Core(10),
    Reg::Core(11),
    Reg::Core(12),
    Reg::Core(13),
    Reg::Core(14),
    Reg::Core(15),
    Reg::Core(24),
    T9,
    RA,
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
pub struct Mips;

impl TargetAbi for Mips {
    fn isa(&self) -> InstructionSet {
        InstructionSet::Mips
    }

    fn arg_regs(&self) -> &'static [Reg; 4] {
        &ARGS
    }

    fn fp_arg_regs(&self) -> Option<&'static [Reg; 4]> {
        Some(&FP_ARGS)
    }

    fn invoke_target(&self) -> Option<Reg> {
        Some(T9)
    }

    fn hidden_arg(&self) -> Reg {
        T0
    }

    fn stack_pointer(&self) -> Reg {
        SP
    }

    fn thread_reg(&self) -> Option<Reg> {
        Some(S1)
    }

    fn return_regs(&self, fp: bool) -> (Reg, Reg) {
        if fp { (Reg::Fp(0), Reg::Fp(1)) } else { (V0, V1) }
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

    fn copy_strategy(&self, _words: usize) -> CopyStrategy {
        CopyStrategy::Memcpy
    }

    fn supports_intrinsic(&self, intrinsic: Intrinsic) -> bool {
        matches!(intrinsic, Intrinsic::CurrentThread)
    }

    fn reg_name(&self, reg: Reg) -> String {
        match reg {
            Reg::Core(n) => NAMES
                .get(usize::from(n))
                .map_or_else(|| format!("r{n}"), |name| (*name).to_string()),
            Reg::Fp(n) => format!("f{n}"),
        }
    }
}
