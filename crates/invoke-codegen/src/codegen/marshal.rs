// Argument marshaling.
//
// Argument words 0-2 travel in arg1..arg3; words 3 and up go to the
// outgoing area above the method slot. Short lists are placed word by word
// (small form); long range lists are bulk-copied from their home slots
// (range form). Dispatch steps are interleaved with the argument moves.

use tracing::debug;

use super::dispatch::CallSequence;
use super::emitter::CodeEmitter;
use super::helpers::HelperArg;
use super::location::LocKind;
use crate::abi::{
    MAX_SMALL_FORM_WORDS, REGISTER_ARG_WORDS, RuntimeEntryPoint, WORD_SIZE, out_arg_offset,
};
use crate::lir::{AluOp, Instruction, VecMove};
use crate::target::{CopyStrategy, Reg, RegClass};
use crate::{Error, Result};

/// Place every argument word of the call and, when `null_check` is set,
/// null-check the receiver in arg1. Returns the null-check branch.
pub fn marshal_args(
    e: &mut CodeEmitter,
    seq: &mut CallSequence<'_>,
    null_check: bool,
) -> Result<Option<usize>> {
    let info = seq.info();
    let words = info.num_arg_words();
    if words <= MAX_SMALL_FORM_WORDS {
        gen_args_small_form(e, seq, null_check)
    } else if info.is_range {
        gen_args_range_form(e, seq, null_check)
    } else {
        Err(Error::Invariant(format!(
            "non-range invoke with {words} argument words"
        )))
    }
}

/// Up to five words: stack words first, then the argument registers.
fn gen_args_small_form(
    e: &mut CodeEmitter,
    seq: &mut CallSequence<'_>,
    null_check: bool,
) -> Result<Option<usize>> {
    let info = seq.info();
    let words = info.num_arg_words();
    if words == 0 {
        return Ok(None);
    }
    debug!(words, "small-form arguments");
    seq.advance(e)?;

    if words > REGISTER_ARG_WORDS {
        let abi = e.abi();
        let sp = abi.stack_pointer();
        let [_, _, arg2, arg3] = *abi.arg_regs();
        let mut next = REGISTER_ARG_WORDS;

        // A wide value starting at word 2 straddles the register/stack
        // boundary; its high half goes to outgoing word 3.
        if info.args[2].is_wide_low() {
            let pair = e.update_loc_wide(info.args[2]);
            let high = if let LocKind::PhysReg(rs) = pair.kind {
                rs.high_reg()?
            } else {
                e.load_value_direct_fixed(info.args[3], arg3)?;
                seq.advance(e)?;
                arg3
            };
            e.store_word_disp(sp, out_arg_offset(3), high);
            seq.advance(e)?;
            next += 1;
        }

        while next < words {
            let arg = info.args[next];
            if arg.is_wide_low() {
                let loc = e.update_loc_wide(arg);
                let (lo, hi) = if let LocKind::PhysReg(rs) = loc.kind {
                    (rs.low, rs.high_reg()?)
                } else {
                    e.load_value_direct_wide_fixed(arg, arg2, arg3)?;
                    seq.advance(e)?;
                    (arg2, arg3)
                };
                e.store_wide_disp(sp, out_arg_offset(next), lo, hi);
                next += 2;
            } else {
                let loc = e.update_loc(arg.word());
                let src = if let LocKind::PhysReg(rs) = loc.kind {
                    rs.low
                } else {
                    e.load_value_direct_fixed(arg, arg2)?;
                    seq.advance(e)?;
                    arg2
                };
                e.store_word_disp(sp, out_arg_offset(next), src);
                next += 1;
            }
            seq.advance(e)?;
        }
    }

    load_arg_regs(e, seq)?;
    receiver_null_check(e, seq, null_check)
}

/// More than five words: words 3.. are bulk-copied from their (contiguous)
/// home slots, then words 0-2 are loaded as in the small form.
fn gen_args_range_form(
    e: &mut CodeEmitter,
    seq: &mut CallSequence<'_>,
    null_check: bool,
) -> Result<Option<usize>> {
    let info = seq.info();
    let words = info.num_arg_words();

    // The copy reads home slots, so promoted values must be written back.
    // Constants are homed through arg3, which nothing holds yet.
    let scratch = e.abi().arg_regs()[3];
    let mut i = 0;
    while i < words {
        let arg = info.args[i];
        if arg.is_wide_low() {
            if i >= 2 {
                e.flush_to_home(arg, scratch)?;
            }
            i += 2;
        } else {
            if i >= REGISTER_ARG_WORDS {
                e.flush_to_home(arg, scratch)?;
            }
            i += 1;
        }
    }

    let first = info.args[REGISTER_ARG_WORDS].vreg;
    for (k, arg) in info.args[REGISTER_ARG_WORDS..].iter().enumerate() {
        if arg.vreg.0 != first.0.wrapping_add(k as u32) {
            return Err(Error::Invariant(format!(
                "range argument word {} is v{}, expected v{}",
                REGISTER_ARG_WORDS + k,
                arg.vreg.0,
                first.0.wrapping_add(k as u32)
            )));
        }
    }

    let abi = e.abi();
    let sp = abi.stack_pointer();
    let [arg0, arg1, _, arg3] = *abi.arg_regs();
    let start = e.vreg_offset(first);
    let outs = out_arg_offset(REGISTER_ARG_WORDS);
    let stack_words = words - REGISTER_ARG_WORDS;
    let strategy = abi.copy_strategy(stack_words);
    debug!(words, stack_words, ?strategy, "range-form arguments");

    match strategy {
        CopyStrategy::BlockPair => {
            let count = u8::try_from(stack_words)
                .map_err(|_| Error::Invariant(format!("block copy of {stack_words} words")))?;
            let first_fp = Reg::Fp(0);
            seq.advance(e)?;
            e.emit(Instruction::AluRegImm {
                op: AluOp::Add,
                dst: arg3,
                src: sp,
                imm: start,
            });
            e.emit(Instruction::BlockLoad {
                base: arg3,
                first: first_fp,
                count,
            });
            seq.advance(e)?;
            e.emit(Instruction::AluRegImm {
                op: AluOp::Add,
                dst: arg3,
                src: sp,
                imm: outs,
            });
            seq.advance(e)?;
            e.emit(Instruction::BlockStore {
                base: arg3,
                first: first_fp,
                count,
            });
            seq.advance(e)?;
        }
        CopyStrategy::Vector128 => {
            // Interface calls stage the hidden argument ahead of the copy.
            seq.advance(e)?;
            copy_with_vectors(e, start, outs, stack_words)?;
        }
        CopyStrategy::Memcpy => {
            e.emit(Instruction::AluRegImm {
                op: AluOp::Add,
                dst: arg0,
                src: sp,
                imm: outs,
            });
            e.emit(Instruction::AluRegImm {
                op: AluOp::Add,
                dst: arg1,
                src: sp,
                imm: start,
            });
            e.call_runtime_helper(
                RuntimeEntryPoint::Memcpy,
                &[
                    HelperArg::AllocatedReg(arg0),
                    HelperArg::AllocatedReg(arg1),
                    HelperArg::Imm(stack_words as i32 * WORD_SIZE),
                ],
                false,
            )?;
        }
    }

    load_arg_regs(e, seq)?;
    seq.advance(e)?;
    receiver_null_check(e, seq, null_check)
}

/// Copy `words` words from `[sp + src]` to `[sp + dst]` with 128-bit moves
/// where they save instructions. A vector move is used for the last four
/// words, or earlier when either side is 16-byte aligned; 8-byte aligned
/// sides are split into low/high halves.
fn copy_with_vectors(e: &mut CodeEmitter, mut src: i32, mut dst: i32, mut words: usize) -> Result<()> {
    let abi = e.abi();
    let sp = abi.stack_pointer();
    let scratch = abi.arg_regs()[3];
    while words > 0 {
        let src_16 = src & 0xF == 0;
        let dst_16 = dst & 0xF == 0;
        if words == 4 || (words > 4 && (src_16 || dst_16)) {
            e.with_temp(RegClass::Fp, |e, t| {
                if src_16 {
                    e.emit(vec_load(t, sp, src, VecMove::Aligned));
                } else if src & 0x7 == 0 {
                    e.emit(vec_load(t, sp, src, VecMove::Lo));
                    e.emit(vec_load(t, sp, src + 8, VecMove::Hi));
                } else {
                    e.emit(vec_load(t, sp, src, VecMove::Unaligned));
                }
                if dst_16 {
                    e.emit(vec_store(sp, dst, t, VecMove::Aligned));
                } else if dst & 0x7 == 0 {
                    e.emit(vec_store(sp, dst, t, VecMove::Lo));
                    e.emit(vec_store(sp, dst + 8, t, VecMove::Hi));
                } else {
                    e.emit(vec_store(sp, dst, t, VecMove::Unaligned));
                }
                Ok(())
            })?;
            src += 16;
            dst += 16;
            words -= 4;
        } else {
            e.load_word_disp(sp, src, scratch);
            e.store_word_disp(sp, dst, scratch);
            src += WORD_SIZE;
            dst += WORD_SIZE;
            words -= 1;
        }
    }
    Ok(())
}

const fn vec_load(dst: Reg, base: Reg, disp: i32, kind: VecMove) -> Instruction {
    Instruction::VecLoad {
        dst,
        base,
        disp,
        kind,
    }
}

const fn vec_store(base: Reg, disp: i32, src: Reg, kind: VecMove) -> Instruction {
    Instruction::VecStore {
        base,
        disp,
        src,
        kind,
    }
}

/// Load argument words 0-2 into arg1..arg3, one dispatch step after each
/// register. A wide value only travels as a pair when both halves fit.
fn load_arg_regs(e: &mut CodeEmitter, seq: &mut CallSequence<'_>) -> Result<()> {
    let info = seq.info();
    let regs = *e.abi().arg_regs();
    let skip_this = seq.strategy().loads_receiver();
    let mut next_reg = 1 + usize::from(skip_this);
    let mut next_arg = usize::from(skip_this);
    while next_reg < regs.len() && next_arg < info.num_arg_words() {
        let arg = info.args[next_arg];
        next_arg += 1;
        if arg.is_wide_low() && next_reg + 1 < regs.len() {
            e.load_value_direct_wide_fixed(arg, regs[next_reg], regs[next_reg + 1])?;
            next_reg += 1;
            next_arg += 1;
        } else {
            e.load_value_direct_fixed(arg, regs[next_reg])?;
        }
        next_reg += 1;
        seq.advance(e)?;
    }
    Ok(())
}

fn receiver_null_check(
    e: &mut CodeEmitter,
    seq: &CallSequence<'_>,
    null_check: bool,
) -> Result<Option<usize>> {
    if !null_check {
        return Ok(None);
    }
    let receiver = e.abi().arg_regs()[1];
    e.gen_null_check(receiver, seq.info().opt_flags)
}
