// Inline expansions of well-known library methods.
//
// An inliner either declines (returns `false`, and the caller emits the
// ordinary call) or emits the whole expansion. Checks the called method
// would perform are replicated inline; a failing check branches to a
// launchpad that re-issues the real call.

use tracing::debug;

use super::call_info::CallInfo;
use super::emitter::CodeEmitter;
use super::location::{LocKind, ValueLocation};
use crate::abi::{
    ARRAY_DATA_OFFSET, RuntimeEntryPoint, STRING_COUNT_OFFSET, STRING_OFFSET_OFFSET,
    STRING_VALUE_OFFSET, THREAD_PEER_OFFSET,
};
use crate::lir::{AluOp, BarrierKind, Cond, Instruction, MemSize, UnaryOp};
use crate::target::{Reg, RegClass};
use crate::{Error, Result};

/// Library methods with an inline expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `String.charAt(I)C`
    StringCharAt,
    /// `String.length()I`
    StringLength,
    /// `String.isEmpty()Z`
    StringIsEmpty,
    /// `Integer.reverseBytes(I)I`
    ReverseBytesInt,
    /// `Long.reverseBytes(J)J`
    ReverseBytesLong,
    /// `Short.reverseBytes(S)S`
    ReverseBytesShort,
    AbsInt,
    AbsLong,
    AbsFloat,
    AbsDouble,
    /// `Float.floatToRawIntBits` and `Float.intBitsToFloat`.
    FloatBitsConvert,
    /// `Double.doubleToRawLongBits` and `Double.longBitsToDouble`.
    DoubleBitsConvert,
    /// `String.indexOf(I)I`
    StringIndexOf,
    /// `String.indexOf(II)I`
    StringIndexOfFrom,
    /// `String.compareTo(Ljava/lang/String;)I`
    StringCompareTo,
    /// `Thread.currentThread()`
    CurrentThread,
    /// `Unsafe.get{Int,Long}[Volatile](Object, long)`
    UnsafeGet { long: bool, volatile: bool },
    /// `Unsafe.put{Int,Long,Object}[Volatile|Ordered](Object, long, value)`
    UnsafePut {
        long: bool,
        object: bool,
        volatile: bool,
        ordered: bool,
    },
}

impl Intrinsic {
    /// Look up an intrinsic by its method name as written in call-site
    /// descriptions, e.g. `"String.charAt"` or `"Unsafe.putLongVolatile"`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let intrinsic = match name {
            "String.charAt" => Self::StringCharAt,
            "String.length" => Self::StringLength,
            "String.isEmpty" => Self::StringIsEmpty,
            "Integer.reverseBytes" => Self::ReverseBytesInt,
            "Long.reverseBytes" => Self::ReverseBytesLong,
            "Short.reverseBytes" => Self::ReverseBytesShort,
            "Math.absInt" => Self::AbsInt,
            "Math.absLong" => Self::AbsLong,
            "Math.absFloat" => Self::AbsFloat,
            "Math.absDouble" => Self::AbsDouble,
            "Float.floatToRawIntBits" | "Float.intBitsToFloat" => Self::FloatBitsConvert,
            "Double.doubleToRawLongBits" | "Double.longBitsToDouble" => Self::DoubleBitsConvert,
            "String.indexOf" => Self::StringIndexOf,
            "String.indexOfFrom" => Self::StringIndexOfFrom,
            "String.compareTo" => Self::StringCompareTo,
            "Thread.currentThread" => Self::CurrentThread,
            _ => return Self::unsafe_from_name(name),
        };
        Some(intrinsic)
    }

    fn unsafe_from_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("Unsafe.")?;
        let (rest, volatile, ordered) = if let Some(r) = rest.strip_suffix("Volatile") {
            (r, true, false)
        } else if let Some(r) = rest.strip_suffix("Ordered") {
            (r, false, true)
        } else {
            (rest, false, false)
        };
        match rest {
            "getInt" if !ordered => Some(Self::UnsafeGet {
                long: false,
                volatile,
            }),
            "getLong" if !ordered => Some(Self::UnsafeGet {
                long: true,
                volatile,
            }),
            "putInt" | "putLong" | "putObject" => Some(Self::UnsafePut {
                long: rest == "putLong",
                object: rest == "putObject",
                volatile,
                ordered,
            }),
            _ => None,
        }
    }
}

/// Try to expand `intrinsic` inline. Returns `false` when the expansion
/// declines and the ordinary call must be emitted instead.
pub fn gen_intrinsic(e: &mut CodeEmitter, info: &CallInfo, intrinsic: Intrinsic) -> Result<bool> {
    if !e.abi().supports_intrinsic(intrinsic) {
        debug!(?intrinsic, isa = ?e.abi().isa(), "intrinsic not available on target");
        return Ok(false);
    }
    match intrinsic {
        Intrinsic::StringCharAt => gen_char_at(e, info),
        Intrinsic::StringLength => gen_string_is_empty_or_length(e, info, false),
        Intrinsic::StringIsEmpty => gen_string_is_empty_or_length(e, info, true),
        Intrinsic::ReverseBytesInt => gen_reverse_bytes(e, info, UnaryOp::Rev),
        Intrinsic::ReverseBytesShort => gen_reverse_bytes(e, info, UnaryOp::Revsh),
        Intrinsic::ReverseBytesLong => gen_reverse_bytes_long(e, info),
        Intrinsic::AbsInt => gen_abs_int(e, info),
        Intrinsic::AbsLong => gen_abs_long(e, info),
        Intrinsic::AbsFloat => gen_abs_float(e, info),
        Intrinsic::AbsDouble => gen_abs_double(e, info),
        Intrinsic::FloatBitsConvert => {
            let dest = e.inline_target(info);
            e.store_value(dest, arg(info, 0)?)?;
            Ok(true)
        }
        Intrinsic::DoubleBitsConvert => {
            let dest = e.inline_target_wide(info);
            e.store_value_wide(dest, arg(info, 0)?)?;
            Ok(true)
        }
        Intrinsic::StringIndexOf => gen_index_of(e, info, true),
        Intrinsic::StringIndexOfFrom => gen_index_of(e, info, false),
        Intrinsic::StringCompareTo => gen_string_compare_to(e, info),
        Intrinsic::CurrentThread => gen_current_thread(e, info),
        Intrinsic::UnsafeGet { long, volatile } => gen_unsafe_get(e, info, long, volatile),
        Intrinsic::UnsafePut {
            long,
            object,
            volatile,
            ordered,
        } => gen_unsafe_put(e, info, long, object, volatile, ordered),
    }
}

fn arg(info: &CallInfo, word: usize) -> Result<ValueLocation> {
    info.args.get(word).copied().ok_or_else(|| {
        Error::Invariant(format!(
            "intrinsic {:?} is missing argument word {word}",
            info.intrinsic
        ))
    })
}

fn reg_of(loc: ValueLocation) -> Result<Reg> {
    loc.reg()
        .ok_or_else(|| Error::Invariant("value was not materialized in a register".to_string()))
}

fn pair_of(loc: ValueLocation) -> Result<(Reg, Reg)> {
    match loc.kind {
        LocKind::PhysReg(rs) => Ok((rs.low, rs.high_reg()?)),
        _ => Err(Error::Invariant(
            "wide value was not materialized in a register pair".to_string(),
        )),
    }
}

// ── String ──

fn gen_char_at(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    let memory_compare = e.abi().compares_with_memory();
    let obj = e.load_value(arg(info, 0)?, RegClass::Core)?;
    let obj_reg = reg_of(obj)?;
    let idx_arg = arg(info, 1)?;
    let const_idx = idx_arg.const_value().map(|v| v as i32);
    // Compare-with-memory targets keep a constant index as an immediate.
    let idx = match const_idx {
        Some(_) if memory_compare => None,
        _ => Some(e.load_value(idx_arg, RegClass::Core)?),
    };

    e.gen_null_check(obj_reg, info.opt_flags)?;
    let launchpad = (!info.opt_flags.ignore_range_check).then(|| e.new_label());
    let off = e.alloc_temp(RegClass::Core)?;
    let ptr = e.alloc_temp(RegClass::Core)?;

    if memory_compare {
        if let Some(label) = launchpad {
            match (idx, const_idx) {
                (Some(idx), _) => {
                    let branch = e.emit(Instruction::BranchCmpMem {
                        cond: Cond::Uge,
                        reg: reg_of(idx)?,
                        base: obj_reg,
                        disp: STRING_COUNT_OFFSET,
                        target: label,
                    });
                    e.mark_exception_point(branch);
                }
                (None, Some(value)) => {
                    let branch = e.emit(Instruction::BranchMemImm {
                        cond: Cond::Ule,
                        base: obj_reg,
                        disp: STRING_COUNT_OFFSET,
                        imm: value,
                        target: label,
                    });
                    e.mark_exception_point(branch);
                }
                (None, None) => {
                    return Err(Error::Invariant("charAt index not materialized".to_string()));
                }
            }
            e.mark_possible_null_pointer_exception(info.opt_flags);
        }
        e.load_word_disp(obj_reg, STRING_OFFSET_OFFSET, off);
        e.load_word_disp(obj_reg, STRING_VALUE_OFFSET, ptr);
    } else {
        let idx_reg = match idx {
            Some(loc) => reg_of(loc)?,
            None => return Err(Error::Invariant("charAt index not materialized".to_string())),
        };
        let max = if launchpad.is_some() {
            let max = e.alloc_temp(RegClass::Core)?;
            e.load_word_disp(obj_reg, STRING_COUNT_OFFSET, max);
            e.mark_possible_null_pointer_exception(info.opt_flags);
            Some(max)
        } else {
            None
        };
        e.load_word_disp(obj_reg, STRING_OFFSET_OFFSET, off);
        e.mark_possible_null_pointer_exception(info.opt_flags);
        e.load_word_disp(obj_reg, STRING_VALUE_OFFSET, ptr);
        if let (Some(label), Some(max)) = (launchpad, max) {
            let branch = e.emit(Instruction::BranchCmp {
                cond: Cond::Uge,
                lhs: idx_reg,
                rhs: max,
                target: label,
            });
            e.mark_exception_point(branch);
            e.free_temp(max);
        }
        e.emit(Instruction::AluRegImm {
            op: AluOp::Add,
            dst: ptr,
            src: ptr,
            imm: ARRAY_DATA_OFFSET,
        });
    }

    match (idx, const_idx) {
        (Some(idx), _) => {
            e.emit(Instruction::AluRegReg {
                op: AluOp::Add,
                dst: off,
                src: reg_of(idx)?,
            });
        }
        (None, Some(value)) => {
            e.emit(Instruction::AluRegImm {
                op: AluOp::Add,
                dst: off,
                src: off,
                imm: value,
            });
        }
        (None, None) => {}
    }
    e.free_loc(obj);
    if let Some(idx) = idx {
        e.free_loc(idx);
    }

    let dest = e.inline_target(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    e.emit(Instruction::LoadIndexed {
        dst: reg_of(result)?,
        base: ptr,
        index: off,
        scale: 1,
        disp: if memory_compare { ARRAY_DATA_OFFSET } else { 0 },
        size: MemSize::UnsignedHalf,
    });
    e.free_temp(off);
    e.free_temp(ptr);
    e.store_value(dest, result)?;
    e.free_loc(result);

    if let Some(label) = launchpad {
        // The real charAt throws on this path, so nothing resumes here.
        e.add_intrinsic_launchpad(info, label, None);
    }
    Ok(true)
}

fn gen_string_is_empty_or_length(e: &mut CodeEmitter, info: &CallInfo, is_empty: bool) -> Result<bool> {
    let obj = e.load_value(arg(info, 0)?, RegClass::Core)?;
    let obj_reg = reg_of(obj)?;
    let dest = e.inline_target(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    let res = reg_of(result)?;
    e.gen_null_check(obj_reg, info.opt_flags)?;
    e.load_word_disp(obj_reg, STRING_COUNT_OFFSET, res);
    e.mark_possible_null_pointer_exception(info.opt_flags);
    if is_empty {
        // (count - 1) >>> 31 is 1 exactly when count is 0.
        e.emit(Instruction::AluRegImm {
            op: AluOp::Sub,
            dst: res,
            src: res,
            imm: 1,
        });
        e.emit(Instruction::AluRegImm {
            op: AluOp::Lsr,
            dst: res,
            src: res,
            imm: 31,
        });
    }
    e.free_loc(obj);
    e.store_value(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

/// `indexOf` runs in a runtime helper. A code point that may exceed
/// 0xFFFF takes the launchpad, which resumes right after the helper call.
fn gen_index_of(e: &mut CodeEmitter, info: &CallInfo, zero_based: bool) -> Result<bool> {
    let obj = arg(info, 0)?;
    let ch = arg(info, 1)?;
    if let Some(value) = ch.const_value()
        && value & !0xFFFF != 0
    {
        debug!(value, "indexOf with a supplementary code point, not inlined");
        return Ok(false);
    }

    e.clobber_caller_save();
    e.lock_call_temps();
    let [reg_ptr, reg_char, reg_start, _] = *e.abi().arg_regs();
    e.load_value_direct_fixed(obj, reg_ptr)?;
    e.load_value_direct_fixed(ch, reg_char)?;
    if zero_based {
        e.load_constant(reg_start, 0);
    } else {
        e.load_value_direct_fixed(arg(info, 2)?, reg_start)?;
    }
    let target = e.call_helper_setup(RuntimeEntryPoint::IndexOf)?;
    e.gen_null_check(reg_ptr, info.opt_flags)?;
    let launchpad = if ch.const_value().is_none() {
        let label = e.new_label();
        e.emit(Instruction::BranchCmpImm {
            cond: Cond::Gt,
            reg: reg_char,
            imm: 0xFFFF,
            target: label,
        });
        Some(label)
    } else {
        None
    };
    e.call_helper(target, RuntimeEntryPoint::IndexOf, false)?;
    e.clobber_caller_save();
    if let Some(label) = launchpad {
        let resume = e.new_label();
        e.define_label(resume)?;
        e.add_intrinsic_launchpad(info, label, Some(resume));
    }
    let ret = e.get_return(false);
    let dest = e.inline_target(info);
    e.store_value(dest, ret)?;
    e.free_call_temps();
    Ok(true)
}

fn gen_string_compare_to(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    e.clobber_caller_save();
    e.lock_call_temps();
    let [reg_this, reg_cmp, _, _] = *e.abi().arg_regs();
    e.load_value_direct_fixed(arg(info, 0)?, reg_this)?;
    e.load_value_direct_fixed(arg(info, 1)?, reg_cmp)?;
    let target = e.call_helper_setup(RuntimeEntryPoint::StringCompareTo)?;
    e.gen_null_check(reg_this, info.opt_flags)?;
    // A null argument is left to the real compareTo, which throws.
    let label = e.new_label();
    e.emit(Instruction::BranchCmpImm {
        cond: Cond::Eq,
        reg: reg_cmp,
        imm: 0,
        target: label,
    });
    e.add_intrinsic_launchpad(info, label, None);
    e.call_helper(target, RuntimeEntryPoint::StringCompareTo, false)?;
    e.clobber_caller_save();
    let ret = e.get_return(false);
    let dest = e.inline_target(info);
    e.store_value(dest, ret)?;
    e.free_call_temps();
    Ok(true)
}

// ── Bit twiddling ──

fn gen_reverse_bytes(e: &mut CodeEmitter, info: &CallInfo, op: UnaryOp) -> Result<bool> {
    let src = e.load_value(arg(info, 0)?, RegClass::Core)?;
    let dest = e.inline_target(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    e.emit(Instruction::Unary {
        op,
        dst: reg_of(result)?,
        src: reg_of(src)?,
    });
    e.free_loc(src);
    e.store_value(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

fn gen_reverse_bytes_long(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    let src = e.load_value_wide(arg(info, 0)?, RegClass::Core)?;
    let (src_lo, src_hi) = pair_of(src)?;
    let dest = e.inline_target_wide(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    let (res_lo, res_hi) = pair_of(result)?;
    // The first reverse overwrites the result's low register.
    let saved = if res_lo == src_lo {
        let t = e.alloc_temp(RegClass::Core)?;
        e.op_reg_copy(t, src_lo);
        Some(t)
    } else {
        None
    };
    e.emit(Instruction::Unary {
        op: UnaryOp::Rev,
        dst: res_lo,
        src: src_hi,
    });
    e.emit(Instruction::Unary {
        op: UnaryOp::Rev,
        dst: res_hi,
        src: saved.unwrap_or(src_lo),
    });
    if let Some(t) = saved {
        e.free_temp(t);
    }
    e.free_loc(src);
    e.store_value_wide(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

fn gen_abs_int(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    let src = e.load_value(arg(info, 0)?, RegClass::Core)?;
    let src_reg = reg_of(src)?;
    let dest = e.inline_target(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    let res = reg_of(result)?;
    e.with_temp(RegClass::Core, |e, sign| {
        e.emit(Instruction::AluRegImm {
            op: AluOp::Asr,
            dst: sign,
            src: src_reg,
            imm: 31,
        });
        e.emit(Instruction::AluRegRegReg {
            op: AluOp::Add,
            dst: res,
            lhs: src_reg,
            rhs: sign,
        });
        e.emit(Instruction::AluRegReg {
            op: AluOp::Xor,
            dst: res,
            src: sign,
        });
        Ok(())
    })?;
    e.free_loc(src);
    e.store_value(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

fn gen_abs_long(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    let src = e.load_value_wide(arg(info, 0)?, RegClass::Core)?;
    let (src_lo, src_hi) = pair_of(src)?;
    let dest = e.inline_target_wide(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    let (res_lo, res_hi) = pair_of(result)?;
    e.op_reg_copy_wide(res_lo, res_hi, src_lo, src_hi)?;
    e.free_loc(src);
    e.with_temp(RegClass::Core, |e, sign| {
        e.emit(Instruction::AluRegImm {
            op: AluOp::Asr,
            dst: sign,
            src: res_hi,
            imm: 31,
        });
        for (op, dst) in [
            (AluOp::Add, res_lo),
            (AluOp::Adc, res_hi),
            (AluOp::Xor, res_lo),
            (AluOp::Xor, res_hi),
        ] {
            e.emit(Instruction::AluRegReg { op, dst, src: sign });
        }
        Ok(())
    })?;
    e.store_value_wide(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

fn gen_abs_float(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    let src = e.load_value(arg(info, 0)?, RegClass::Core)?;
    let dest = e.inline_target(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    e.emit(Instruction::AluRegImm {
        op: AluOp::And,
        dst: reg_of(result)?,
        src: reg_of(src)?,
        imm: 0x7fff_ffff,
    });
    e.free_loc(src);
    e.store_value(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

fn gen_abs_double(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    let src = e.load_value_wide(arg(info, 0)?, RegClass::Core)?;
    let (src_lo, src_hi) = pair_of(src)?;
    let dest = e.inline_target_wide(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    let (res_lo, res_hi) = pair_of(result)?;
    e.op_reg_copy_wide(res_lo, res_hi, src_lo, src_hi)?;
    e.emit(Instruction::AluRegImm {
        op: AluOp::And,
        dst: res_hi,
        src: res_hi,
        imm: 0x7fff_ffff,
    });
    e.free_loc(src);
    e.store_value_wide(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

// ── Thread and Unsafe ──

fn gen_current_thread(e: &mut CodeEmitter, info: &CallInfo) -> Result<bool> {
    let dest = e.inline_target(info);
    let result = e.eval_loc(dest, RegClass::Core)?;
    let res = reg_of(result)?;
    match e.abi().thread_reg() {
        Some(thread) => {
            e.load_word_disp(thread, THREAD_PEER_OFFSET, res);
        }
        None => {
            e.emit(Instruction::LoadThread {
                dst: res,
                offset: THREAD_PEER_OFFSET,
            });
        }
    }
    e.store_value(dest, result)?;
    e.free_loc(result);
    Ok(true)
}

/// Arguments: word 0 is the `Unsafe` receiver, word 1 the object, words
/// 2-3 the long offset (only the low word is used).
fn gen_unsafe_get(e: &mut CodeEmitter, info: &CallInfo, long: bool, volatile: bool) -> Result<bool> {
    if volatile {
        e.emit(Instruction::Barrier(BarrierKind::LoadLoad));
    }
    let obj = e.load_value(arg(info, 1)?, RegClass::Core)?;
    let off = e.load_value(arg(info, 2)?, RegClass::Core)?;
    let (obj_reg, off_reg) = (reg_of(obj)?, reg_of(off)?);
    if long {
        let addr = e.alloc_temp(RegClass::Core)?;
        e.emit(Instruction::AluRegRegReg {
            op: AluOp::Add,
            dst: addr,
            lhs: obj_reg,
            rhs: off_reg,
        });
        e.free_loc(obj);
        e.free_loc(off);
        let dest = e.inline_target_wide(info);
        let result = e.eval_loc(dest, RegClass::Core)?;
        let (lo, hi) = pair_of(result)?;
        e.load_wide_disp(addr, 0, lo, hi);
        e.free_temp(addr);
        e.store_value_wide(dest, result)?;
        e.free_loc(result);
    } else {
        let dest = e.inline_target(info);
        let result = e.eval_loc(dest, RegClass::Core)?;
        e.emit(Instruction::LoadIndexed {
            dst: reg_of(result)?,
            base: obj_reg,
            index: off_reg,
            scale: 0,
            disp: 0,
            size: MemSize::Word,
        });
        e.free_loc(obj);
        e.free_loc(off);
        e.store_value(dest, result)?;
        e.free_loc(result);
    }
    Ok(true)
}

/// Arguments as for [`gen_unsafe_get`], followed by the value at word 4.
fn gen_unsafe_put(
    e: &mut CodeEmitter,
    info: &CallInfo,
    long: bool,
    object: bool,
    volatile: bool,
    ordered: bool,
) -> Result<bool> {
    if volatile || ordered {
        e.emit(Instruction::Barrier(BarrierKind::StoreStore));
    }
    let obj = e.load_value(arg(info, 1)?, RegClass::Core)?;
    let off = e.load_value(arg(info, 2)?, RegClass::Core)?;
    let (obj_reg, off_reg) = (reg_of(obj)?, reg_of(off)?);
    let value_arg = arg(info, 4)?;
    if long {
        let addr = e.alloc_temp(RegClass::Core)?;
        e.emit(Instruction::AluRegRegReg {
            op: AluOp::Add,
            dst: addr,
            lhs: obj_reg,
            rhs: off_reg,
        });
        e.free_loc(obj);
        e.free_loc(off);
        let value = e.load_value_wide(value_arg, RegClass::Core)?;
        let (lo, hi) = pair_of(value)?;
        e.store_wide_disp(addr, 0, lo, hi);
        e.free_loc(value);
        e.free_temp(addr);
        if volatile {
            e.emit(Instruction::Barrier(BarrierKind::StoreLoad));
        }
    } else {
        let value = e.load_value(value_arg, RegClass::Core)?;
        let value_reg = reg_of(value)?;
        e.emit(Instruction::StoreIndexed {
            base: obj_reg,
            index: off_reg,
            scale: 0,
            src: value_reg,
            size: MemSize::Word,
        });
        if volatile {
            e.emit(Instruction::Barrier(BarrierKind::StoreLoad));
        }
        if object {
            e.emit(Instruction::MarkGcCard {
                value: value_reg,
                object: obj_reg,
            });
        }
        e.free_loc(value);
        e.free_loc(obj);
        e.free_loc(off);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_names_decode_modifiers() {
        assert_eq!(
            Intrinsic::from_name("Unsafe.putObjectVolatile"),
            Some(Intrinsic::UnsafePut {
                long: false,
                object: true,
                volatile: true,
                ordered: false,
            })
        );
        assert_eq!(
            Intrinsic::from_name("Unsafe.getLong"),
            Some(Intrinsic::UnsafeGet {
                long: true,
                volatile: false,
            })
        );
        assert_eq!(Intrinsic::from_name("Unsafe.getIntOrdered"), None);
        assert_eq!(
            Intrinsic::from_name("String.charAt"),
            Some(Intrinsic::StringCharAt)
        );
        assert_eq!(Intrinsic::from_name("String.trim"), None);
    }
}
