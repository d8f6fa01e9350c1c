// 32-bit x86.
//
// Calls go through memory (the callee's entry-point field or thread memory),
// so there is no invoke-target register. Dispatch loads reuse eax, which also
// carries the hidden interface argument; the hidden value is mirrored into
// xmm0 before eax is overwritten.

use super::{CopyStrategy, InstructionSet, Reg, TargetAbi};

pub const EAX: Reg = Reg::Core(0);
pub const ECX: Reg = Reg::Core(1);
pub const EDX: Reg = Reg::Core(2);
pub const EBX: Reg = Reg::Core(3);
pub const ESP: Reg = Reg::Core(4);
pub const XMM0: Reg = Reg::Fp(0);
pub const XMM1: Reg = Reg::Fp(1);

const NAMES: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];

const ARGS: [Reg; 4] = [EAX, ECX, EDX, EBX];
const CORE_TEMPS: [Reg; 4] = [EAX, ECX, EDX, EBX];
const FP_TEMPS: [Reg; 8] = [
    Reg::Fp(0),
    Reg::Fp(1),
    Reg::Fp(2),
    Reg::Fp(3),
    Reg::Fp(4),
    Reg::Fp(5),
    Reg::Fp(6),
    Reg::Fp(7),
];
const CALLER_SAVE: [Reg; 12] = [
    EAX,
    ECX,
    EDX,
    EBX,
    Reg::Fp(0),
    Reg::Fp(1),
    Reg::Fp(2),
    Reg::Fp(3),
    Reg::Fp(4),
    Reg::Fp(5),
    Reg::Fp(6),
    Reg::Fp(7),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct X86;

impl TargetAbi for X86 {
    fn isa(&self) -> InstructionSet {
        InstructionSet::X86
    }

    fn arg_regs(&self) -> &'static [Reg; 4] {
        &ARGS
    }

    fn invoke_target(&self) -> Option<Reg> {
        None
    }

    fn hidden_arg(&self) -> Reg {
        EAX
    }

    fn hidden_fp_arg(&self) -> Option<Reg> {
        Some(XMM0)
    }

    fn stack_pointer(&self) -> Reg {
        ESP
    }

    fn thread_reg(&self) -> Option<Reg> {
        None
    }

    fn return_regs(&self, fp: bool) -> (Reg, Reg) {
        if fp { (XMM0, XMM1) } else { (EAX, EDX) }
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
        CopyStrategy::Vector128
    }

    fn compares_with_memory(&self) -> bool {
        true
    }

    fn reg_name(&self, reg: Reg) -> String {
        match reg {
            Reg::Core(n) => NAMES
                .get(usize::from(n))
                .map_or_else(|| format!("r{n}"), |name| (*name).to_string()),
            Reg::Fp(n) => format!("xmm{n}"),
        }
    }
}
