// Method-entry handling of incoming arguments.

use tracing::debug;

use super::emitter::CodeEmitter;
use super::location::{VReg, ValueLocation};
use super::promotion::PromotionEntry;
use crate::abi::METHOD_PTR_OFFSET;
use crate::target::Reg;
use crate::{Error, Result};

/// Move incoming arguments to where the method body expects them.
///
/// `ins` describes the incoming argument words in order; they occupy the
/// last `ins.len()` virtual registers. Words arriving in registers are
/// copied to their promoted register or stored to their home slot; words
/// arriving in the frame are loaded into their promoted registers. A wide
/// argument that is only half promoted is always stored, as is (where the
/// target requires even-aligned pairs) a float pair promoted to registers
/// that do not form a usable double.
pub fn flush_ins(e: &mut CodeEmitter, ins: &[ValueLocation]) -> Result<()> {
    let abi = e.abi();
    let sp = abi.stack_pointer();
    e.store_word_disp(sp, METHOD_PTR_OFFSET, abi.arg_regs()[0]);

    let num_vregs = e.method().frame.num_vregs;
    let num_ins = u32::try_from(ins.len())
        .ok()
        .filter(|n| *n <= num_vregs)
        .ok_or_else(|| {
            Error::Invariant(format!(
                "{} incoming words do not fit in {num_vregs} virtual registers",
                ins.len()
            ))
        })?;
    let start = num_vregs - num_ins;
    let mut flushed = 0;

    for (i, loc) in ins.iter().enumerate() {
        let vreg = VReg(start + i as u32);
        let entry = e.method().promotion.get(vreg);
        let home = e.vreg_offset(vreg);
        let Some(reg) = abi.in_arg_reg(i) else {
            if let Some(core) = entry.core {
                e.load_word_disp(sp, home, core);
            }
            if let Some(fp) = entry.fp {
                e.load_word_disp(sp, home, fp);
            }
            continue;
        };

        let promoted = if loc.fp { entry.fp } else { entry.core };
        let mut need_flush = match promoted {
            Some(dst) => {
                e.op_reg_copy(dst, reg);
                false
            }
            None => true,
        };
        if loc.wide {
            let partner = if loc.high_word {
                VReg(vreg.0.wrapping_sub(1))
            } else {
                vreg.next()
            };
            let partner = e.method().promotion.get(partner);
            need_flush |= half_promoted(entry, partner);
            if loc.fp && !need_flush && abi.fp_pairs_need_even_alignment() {
                let (low, high) = if loc.high_word {
                    (partner.fp, entry.fp)
                } else {
                    (entry.fp, partner.fp)
                };
                need_flush |= !usable_double(low, high);
            }
        }
        if need_flush {
            e.store_word_disp(sp, home, reg);
            flushed += 1;
        }
    }
    debug!(num_ins, flushed, "incoming arguments placed");
    Ok(())
}

fn half_promoted(a: PromotionEntry, b: PromotionEntry) -> bool {
    a.core.is_some() != b.core.is_some() || a.fp.is_some() != b.fp.is_some()
}

/// An even register followed by its odd neighbour.
fn usable_double(low: Option<Reg>, high: Option<Reg>) -> bool {
    match (low, high) {
        (Some(Reg::Fp(lo)), Some(Reg::Fp(hi))) => lo % 2 == 0 && hi == lo + 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{Instruction, MemSize};
    use crate::codegen::{DexFileId, FrameLayout, MethodContext, PromotionMap};
    use crate::target::thumb2::{R0, R1, R2, SP};
    use crate::{CompilerOptions, InstructionSet};

    fn emitter(promotion: PromotionMap) -> CodeEmitter {
        CodeEmitter::new(
            CompilerOptions {
                instruction_set: InstructionSet::Thumb2,
                ..CompilerOptions::default()
            },
            MethodContext {
                dex_file: DexFileId(0),
                num_method_ids: 4,
                frame: FrameLayout {
                    num_outs: 0,
                    num_vregs: 6,
                },
                promotion,
            },
        )
    }

    fn store(disp: i32, src: Reg) -> Instruction {
        Instruction::Store {
            base: SP,
            disp,
            src,
            size: MemSize::Word,
        }
    }

    #[test]
    fn method_pointer_and_homed_ins_are_stored() {
        let mut e = emitter(PromotionMap::new());
        let ins = [ValueLocation::frame(VReg(4)), ValueLocation::frame(VReg(5))];
        flush_ins(&mut e, &ins).unwrap();
        assert_eq!(
            e.instructions(),
            &[store(0, R0), store(4 + 16, R1), store(4 + 20, R2)]
        );
    }

    #[test]
    fn promoted_in_is_copied_not_stored() {
        let mut promotion = PromotionMap::new();
        promotion.promote_core(VReg(5), Reg::Core(6));
        let mut e = emitter(promotion);
        flush_ins(&mut e, &[ValueLocation::frame(VReg(5))]).unwrap();
        assert_eq!(
            e.instructions(),
            &[store(0, R0), Instruction::Copy {
                dst: Reg::Core(6),
                src: R1
            }]
        );
    }

    #[test]
    fn half_promoted_wide_is_flushed() {
        let mut promotion = PromotionMap::new();
        promotion.promote_core(VReg(4), Reg::Core(6));
        let mut e = emitter(promotion);
        flush_ins(&mut e, &ValueLocation::frame_wide(VReg(4))).unwrap();
        let stores = e
            .instructions()
            .iter()
            .filter(|i| matches!(i, Instruction::Store { .. }))
            .count();
        // Method slot plus both halves.
        assert_eq!(stores, 3);
    }

    #[test]
    fn odd_float_pair_is_flushed() {
        let mut promotion = PromotionMap::new();
        promotion.promote_fp(VReg(4), Reg::Fp(17));
        promotion.promote_fp(VReg(5), Reg::Fp(18));
        let mut e = emitter(promotion);
        let ins = ValueLocation::frame_wide(VReg(4)).map(ValueLocation::with_fp);
        flush_ins(&mut e, &ins).unwrap();
        let insns = e.instructions();
        assert!(insns.contains(&Instruction::Copy {
            dst: Reg::Fp(17),
            src: R1
        }));
        assert!(insns.contains(&store(4 + 16, R1)));
        assert!(insns.contains(&store(4 + 20, R2)));
    }

    #[test]
    fn frame_passed_in_loads_promoted_register() {
        let mut promotion = PromotionMap::new();
        promotion.promote_core(VReg(5), Reg::Core(7));
        let mut e = emitter(promotion);
        let ins: Vec<_> = (2..6).map(|v| ValueLocation::frame(VReg(v))).collect();
        flush_ins(&mut e, &ins).unwrap();
        assert!(e.instructions().contains(&Instruction::Load {
            dst: Reg::Core(7),
            base: SP,
            disp: 4 + 20,
            size: MemSize::Word,
        }));
    }
}
