// Value locations and the operations that move values between them.
//
// A location says where a virtual register's value can be found right now:
// an immediate, a physical register (or pair), or its home slot in the frame.
// Materializing a location may check out a temp; the caller frees it after
// its last use.

use super::emitter::CodeEmitter;
use super::call_info::CallInfo;
use crate::abi::WORD_SIZE;
use crate::target::{Reg, RegClass};
use crate::{Error, Result};

/// A virtual (dex) register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl VReg {
    /// Marker for values with no backing virtual register (return registers).
    pub const NONE: VReg = VReg(u32::MAX);

    #[must_use]
    pub const fn next(self) -> VReg {
        VReg(self.0 + 1)
    }
}

/// A register or register pair. Wide values put the low word in `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegStorage {
    pub low: Reg,
    pub high: Option<Reg>,
}

impl RegStorage {
    #[must_use]
    pub const fn solo(reg: Reg) -> Self {
        Self {
            low: reg,
            high: None,
        }
    }

    #[must_use]
    pub const fn pair(low: Reg, high: Reg) -> Self {
        Self {
            low,
            high: Some(high),
        }
    }

    pub fn high_reg(self) -> Result<Reg> {
        self.high
            .ok_or_else(|| Error::Invariant(format!("{} is not a register pair", self.low)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocKind {
    /// Immediate; wide constants carry all 64 bits.
    Const(i64),
    PhysReg(RegStorage),
    /// The home slot of `vreg` in the frame.
    Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLocation {
    pub kind: LocKind,
    pub wide: bool,
    pub fp: bool,
    pub vreg: VReg,
    /// Set on the second word of a wide value in an argument list.
    pub high_word: bool,
}

impl ValueLocation {
    #[must_use]
    pub const fn frame(vreg: VReg) -> Self {
        Self {
            kind: LocKind::Frame,
            wide: false,
            fp: false,
            vreg,
            high_word: false,
        }
    }

    #[must_use]
    pub const fn constant(vreg: VReg, value: i32) -> Self {
        Self {
            kind: LocKind::Const(value as i64),
            wide: false,
            fp: false,
            vreg,
            high_word: false,
        }
    }

    #[must_use]
    pub const fn in_reg(vreg: VReg, reg: Reg) -> Self {
        Self {
            kind: LocKind::PhysReg(RegStorage::solo(reg)),
            wide: false,
            fp: reg.is_fp(),
            vreg,
            high_word: false,
        }
    }

    /// Both argument words of a wide value homed at `vreg`, `vreg + 1`.
    #[must_use]
    pub const fn frame_wide(vreg: VReg) -> [Self; 2] {
        Self::wide_words(LocKind::Frame, vreg)
    }

    #[must_use]
    pub const fn constant_wide(vreg: VReg, value: i64) -> [Self; 2] {
        Self::wide_words(LocKind::Const(value), vreg)
    }

    #[must_use]
    pub const fn in_pair(vreg: VReg, low: Reg, high: Reg) -> [Self; 2] {
        Self::wide_words(LocKind::PhysReg(RegStorage::pair(low, high)), vreg)
    }

    const fn wide_words(kind: LocKind, vreg: VReg) -> [Self; 2] {
        let low = Self {
            kind,
            wide: true,
            fp: false,
            vreg,
            high_word: false,
        };
        let high = Self {
            vreg: vreg.next(),
            high_word: true,
            ..low
        };
        [low, high]
    }

    /// Same location, flagged as holding floating-point bits.
    #[must_use]
    pub const fn with_fp(mut self) -> Self {
        self.fp = true;
        self
    }

    #[must_use]
    pub const fn is_wide_low(&self) -> bool {
        self.wide && !self.high_word
    }

    #[must_use]
    pub const fn const_value(&self) -> Option<i64> {
        match self.kind {
            LocKind::Const(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn reg(&self) -> Option<Reg> {
        match self.kind {
            LocKind::PhysReg(rs) => Some(rs.low),
            _ => None,
        }
    }

    #[must_use]
    pub const fn high_reg(&self) -> Option<Reg> {
        match self.kind {
            LocKind::PhysReg(rs) => rs.high,
            _ => None,
        }
    }

    /// Narrow view of the single word this entry describes. For a wide
    /// value this is the low or high half, depending on `high_word`.
    #[must_use]
    pub fn word(&self) -> ValueLocation {
        let kind = if !self.wide {
            self.kind
        } else {
            match self.kind {
                LocKind::Const(v) => {
                    let word = if self.high_word { v >> 32 } else { v };
                    LocKind::Const(i64::from(word as i32))
                }
                LocKind::PhysReg(rs) => {
                    let reg = if self.high_word {
                        rs.high.unwrap_or(rs.low)
                    } else {
                        rs.low
                    };
                    LocKind::PhysReg(RegStorage::solo(reg))
                }
                LocKind::Frame => LocKind::Frame,
            }
        };
        ValueLocation {
            kind,
            wide: false,
            high_word: false,
            ..*self
        }
    }

    /// The wide value this word belongs to, addressed from its low word.
    #[must_use]
    pub fn pair(&self) -> ValueLocation {
        if self.high_word {
            ValueLocation {
                vreg: VReg(self.vreg.0 - 1),
                high_word: false,
                ..*self
            }
        } else {
            *self
        }
    }

    fn class(&self) -> RegClass {
        if self.fp { RegClass::Fp } else { RegClass::Core }
    }
}

impl CodeEmitter {
    /// Home slot offset of `vreg` from the stack pointer.
    #[must_use]
    pub fn vreg_offset(&self, vreg: VReg) -> i32 {
        self.method().frame.vreg_offset(vreg)
    }

    /// Whether every word of `loc` has a promoted register of its own class.
    #[must_use]
    pub fn is_promoted_as(&self, loc: ValueLocation) -> bool {
        let promotion = &self.method().promotion;
        let held = |vreg| promotion.reg_for(vreg, loc.fp).is_some();
        held(loc.vreg) && (!loc.wide || held(loc.vreg.next()))
    }

    /// Re-resolve a narrow location: a frame value may currently sit in its
    /// promoted register or in a temp that mirrors it.
    #[must_use]
    pub fn update_loc(&self, loc: ValueLocation) -> ValueLocation {
        if loc.wide {
            return self.update_loc_wide(loc.pair());
        }
        if loc.kind != LocKind::Frame || loc.vreg == VReg::NONE {
            return loc;
        }
        let promoted = self.method().promotion.reg_for(loc.vreg, loc.fp);
        match promoted.or_else(|| self.pool.live_reg(loc.vreg)) {
            Some(reg) => ValueLocation {
                kind: LocKind::PhysReg(RegStorage::solo(reg)),
                ..loc
            },
            None => loc,
        }
    }

    /// Wide counterpart of [`update_loc`](Self::update_loc): both halves must
    /// be found in registers for the pair to be used.
    #[must_use]
    pub fn update_loc_wide(&self, loc: ValueLocation) -> ValueLocation {
        let loc = loc.pair();
        if loc.kind != LocKind::Frame || loc.vreg == VReg::NONE {
            return loc;
        }
        let promotion = &self.method().promotion;
        let (lo_vreg, hi_vreg) = (loc.vreg, loc.vreg.next());
        let promoted = promotion
            .reg_for(lo_vreg, loc.fp)
            .zip(promotion.reg_for(hi_vreg, loc.fp));
        let live = || self.pool.live_reg(lo_vreg).zip(self.pool.live_reg(hi_vreg));
        match promoted.or_else(live) {
            Some((lo, hi)) => ValueLocation {
                kind: LocKind::PhysReg(RegStorage::pair(lo, hi)),
                ..loc
            },
            None => loc,
        }
    }

    /// Load one word into exactly `dst`.
    pub fn load_value_direct_fixed(&mut self, loc: ValueLocation, dst: Reg) -> Result<()> {
        let loc = if loc.wide { loc.word() } else { loc };
        let loc = self.update_loc(loc);
        match loc.kind {
            LocKind::PhysReg(rs) => self.op_reg_copy(dst, rs.low),
            LocKind::Const(v) => {
                self.load_constant(dst, v as i32);
            }
            LocKind::Frame => {
                let sp = self.abi().stack_pointer();
                let disp = self.vreg_offset(loc.vreg);
                self.load_word_disp(sp, disp, dst);
            }
        }
        Ok(())
    }

    /// Load a wide value into exactly `lo`/`hi`.
    pub fn load_value_direct_wide_fixed(
        &mut self,
        loc: ValueLocation,
        lo: Reg,
        hi: Reg,
    ) -> Result<()> {
        let loc = self.update_loc_wide(loc);
        match loc.kind {
            LocKind::PhysReg(rs) => self.op_reg_copy_wide(lo, hi, rs.low, rs.high_reg()?)?,
            LocKind::Const(v) => {
                self.load_constant(lo, v as i32);
                self.load_constant(hi, (v >> 32) as i32);
            }
            LocKind::Frame => {
                let sp = self.abi().stack_pointer();
                let disp = self.vreg_offset(loc.vreg);
                self.load_wide_disp(sp, disp, lo, hi);
            }
        }
        Ok(())
    }

    /// Make a narrow value available in a register of `class`, checking out
    /// a temp when it is not already in one.
    pub fn load_value(&mut self, loc: ValueLocation, class: RegClass) -> Result<ValueLocation> {
        let loc = self.update_loc(if loc.wide { loc.word() } else { loc });
        if let LocKind::PhysReg(rs) = loc.kind
            && rs.low.class() == class
        {
            self.pool.claim(rs.low);
            return Ok(loc);
        }
        let reg = self.pool.alloc_temp(class)?;
        self.load_value_direct_fixed(loc, reg)?;
        if loc.const_value().is_none() {
            self.pool.mark_live(reg, loc.vreg);
        }
        Ok(ValueLocation {
            kind: LocKind::PhysReg(RegStorage::solo(reg)),
            ..loc
        })
    }

    pub fn load_value_wide(&mut self, loc: ValueLocation, class: RegClass) -> Result<ValueLocation> {
        let loc = self.update_loc_wide(loc);
        if let LocKind::PhysReg(rs) = loc.kind
            && rs.low.class() == class
            && let Some(hi) = rs.high
        {
            self.pool.claim(rs.low);
            self.pool.claim(hi);
            return Ok(loc);
        }
        let lo = self.pool.alloc_temp(class)?;
        let hi = match self.pool.alloc_temp(class) {
            Ok(hi) => hi,
            Err(err) => {
                self.pool.free_temp(lo);
                return Err(err);
            }
        };
        self.load_value_direct_wide_fixed(loc, lo, hi)?;
        if loc.const_value().is_none() {
            self.pool.mark_live(lo, loc.vreg);
            self.pool.mark_live(hi, loc.vreg.next());
        }
        Ok(ValueLocation {
            kind: LocKind::PhysReg(RegStorage::pair(lo, hi)),
            ..loc
        })
    }

    /// Release the temps backing a materialized location.
    pub fn free_loc(&mut self, loc: ValueLocation) {
        if let LocKind::PhysReg(rs) = loc.kind {
            self.pool.free_temp(rs.low);
            if let Some(hi) = rs.high {
                self.pool.free_temp(hi);
            }
        }
    }

    /// Pick the register(s) a result destined for `dest` is computed into:
    /// its promoted register if it has one, otherwise fresh temps.
    pub fn eval_loc(&mut self, dest: ValueLocation, class: RegClass) -> Result<ValueLocation> {
        if dest.wide {
            let loc = self.update_loc_wide(dest);
            if let LocKind::PhysReg(rs) = loc.kind
                && rs.high.is_some()
                && rs.low.class() == class
                && (loc.vreg == VReg::NONE || self.is_promoted_as(loc))
            {
                return Ok(loc);
            }
            let lo = self.pool.alloc_temp(class)?;
            let hi = match self.pool.alloc_temp(class) {
                Ok(hi) => hi,
                Err(err) => {
                    self.pool.free_temp(lo);
                    return Err(err);
                }
            };
            return Ok(ValueLocation {
                kind: LocKind::PhysReg(RegStorage::pair(lo, hi)),
                ..loc
            });
        }
        let loc = self.update_loc(dest);
        if let LocKind::PhysReg(rs) = loc.kind
            && rs.low.class() == class
            && (loc.vreg == VReg::NONE || self.is_promoted_as(loc))
        {
            return Ok(loc);
        }
        let reg = self.pool.alloc_temp(class)?;
        Ok(ValueLocation {
            kind: LocKind::PhysReg(RegStorage::solo(reg)),
            ..loc
        })
    }

    /// Store a narrow value to `dest`. Non-promoted destinations are written
    /// through to their home slot; the source register keeps mirroring the
    /// destination afterwards.
    pub fn store_value(&mut self, dest: ValueLocation, src: ValueLocation) -> Result<()> {
        let (src_loc, loaded) = match src.kind {
            LocKind::PhysReg(_) => (src.word(), false),
            _ => (self.load_value(src, dest.class())?, true),
        };
        let src_reg = src_loc
            .reg()
            .ok_or_else(|| Error::Invariant("stored value not in a register".to_string()))?;
        let dest_loc = self.update_loc(dest);
        let promoted = dest.vreg != VReg::NONE && self.is_promoted_as(dest);
        if let LocKind::PhysReg(rs) = dest_loc.kind
            && (dest.vreg == VReg::NONE || promoted)
        {
            self.op_reg_copy(rs.low, src_reg);
        }
        if dest.vreg != VReg::NONE {
            if !promoted {
                let sp = self.abi().stack_pointer();
                let disp = self.vreg_offset(dest.vreg);
                self.store_word_disp(sp, disp, src_reg);
            }
            self.pool.mark_live(src_reg, dest.vreg);
        }
        if loaded {
            self.free_loc(src_loc);
        }
        Ok(())
    }

    pub fn store_value_wide(&mut self, dest: ValueLocation, src: ValueLocation) -> Result<()> {
        let (src_loc, loaded) = match src.kind {
            LocKind::PhysReg(_) => (src.pair(), false),
            _ => (self.load_value_wide(src, dest.class())?, true),
        };
        let (src_lo, src_hi) = match src_loc.kind {
            LocKind::PhysReg(rs) => (rs.low, rs.high_reg()?),
            _ => return Err(Error::Invariant("stored value not in a register".to_string())),
        };
        let dest = dest.pair();
        let dest_loc = self.update_loc_wide(dest);
        let promoted = dest.vreg != VReg::NONE && self.is_promoted_as(dest);
        if let LocKind::PhysReg(rs) = dest_loc.kind
            && (dest.vreg == VReg::NONE || promoted)
        {
            self.op_reg_copy_wide(rs.low, rs.high_reg()?, src_lo, src_hi)?;
        }
        if dest.vreg != VReg::NONE {
            if !promoted {
                let sp = self.abi().stack_pointer();
                let disp = self.vreg_offset(dest.vreg);
                self.store_wide_disp(sp, disp, src_lo, src_hi);
            }
            self.pool.mark_live(src_lo, dest.vreg);
            self.pool.mark_live(src_hi, dest.vreg.next());
        }
        if loaded {
            self.free_loc(src_loc);
        }
        Ok(())
    }

    /// Location of a narrow return value.
    #[must_use]
    pub fn get_return(&self, fp: bool) -> ValueLocation {
        let (low, _) = self.abi().return_regs(fp);
        ValueLocation {
            fp,
            ..ValueLocation::in_reg(VReg::NONE, low)
        }
    }

    #[must_use]
    pub fn get_return_wide(&self, fp: bool) -> ValueLocation {
        let (low, high) = self.abi().return_regs(fp);
        ValueLocation {
            kind: LocKind::PhysReg(RegStorage::pair(low, high)),
            wide: true,
            fp,
            vreg: VReg::NONE,
            high_word: false,
        }
    }

    /// Where an inlined call should leave its narrow result.
    #[must_use]
    pub fn inline_target(&self, info: &CallInfo) -> ValueLocation {
        info.result.unwrap_or_else(|| self.get_return(false))
    }

    #[must_use]
    pub fn inline_target_wide(&self, info: &CallInfo) -> ValueLocation {
        info.result
            .map_or_else(|| self.get_return_wide(false), |loc| loc.pair())
    }

    /// Write the promoted or constant value of an argument word back to its
    /// home slot. Constants go through `scratch`, a register the caller
    /// already holds. Returns whether a store was emitted.
    pub fn flush_to_home(&mut self, loc: ValueLocation, scratch: Reg) -> Result<bool> {
        let sp = self.abi().stack_pointer();
        if loc.wide {
            let loc = self.update_loc_wide(loc);
            let disp = self.vreg_offset(loc.vreg);
            match loc.kind {
                LocKind::PhysReg(rs) if self.is_promoted_as(loc) => {
                    self.store_wide_disp(sp, disp, rs.low, rs.high_reg()?);
                    Ok(true)
                }
                LocKind::Const(v) => {
                    self.load_constant(scratch, v as i32);
                    self.store_word_disp(sp, disp, scratch);
                    self.load_constant(scratch, (v >> 32) as i32);
                    self.store_word_disp(sp, disp + WORD_SIZE, scratch);
                    Ok(true)
                }
                LocKind::PhysReg(_) | LocKind::Frame => Ok(false),
            }
        } else {
            let loc = self.update_loc(loc);
            let disp = self.vreg_offset(loc.vreg);
            match loc.kind {
                LocKind::PhysReg(rs) if self.is_promoted_as(loc) => {
                    self.store_word_disp(sp, disp, rs.low);
                    Ok(true)
                }
                LocKind::Const(v) => {
                    self.load_constant(scratch, v as i32);
                    self.store_word_disp(sp, disp, scratch);
                    Ok(true)
                }
                // A temp mirroring the value implies the home slot is current.
                LocKind::PhysReg(_) | LocKind::Frame => Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::promotion::PromotionMap;
    use crate::lir::Instruction;
    use crate::target::InstructionSet;
    use crate::test_harness::{method_context, options};

    fn promoted_emitter(isa: InstructionSet, vregs: &[(u32, Reg)]) -> CodeEmitter {
        let mut promotion = PromotionMap::new();
        for &(v, reg) in vregs {
            match reg {
                Reg::Core(_) => promotion.promote_core(VReg(v), reg),
                Reg::Fp(_) => promotion.promote_fp(VReg(v), reg),
            }
        }
        CodeEmitter::new(options(isa), method_context(promotion))
    }

    #[test]
    fn wide_words_split_constants() {
        let [lo, hi] = ValueLocation::constant_wide(VReg(2), 0x1234_5678_9abc_def0);
        assert_eq!(lo.word().const_value(), Some(i64::from(0x9abc_def0_u32 as i32)));
        assert_eq!(hi.word().const_value(), Some(0x1234_5678));
        assert_eq!(hi.vreg, VReg(3));
        assert_eq!(hi.pair().vreg, VReg(2));
    }

    #[test]
    fn register_pair_words() {
        let [lo, hi] = ValueLocation::in_pair(VReg(0), Reg::Core(4), Reg::Core(5));
        assert_eq!(lo.word().reg(), Some(Reg::Core(4)));
        assert_eq!(hi.word().reg(), Some(Reg::Core(5)));
        assert!(!hi.word().wide);
    }

    #[test]
    fn fp_store_to_core_promoted_vreg_writes_home() {
        let mut e = promoted_emitter(InstructionSet::X86, &[(3, Reg::Core(5))]);
        let src = e.get_return(true);
        e.store_value(ValueLocation::frame(VReg(3)).with_fp(), src).unwrap();

        let sp = e.abi().stack_pointer();
        let home = e.vreg_offset(VReg(3));
        let src_reg = src.reg().unwrap();
        assert!(e.instructions().iter().any(|i| matches!(
            i,
            Instruction::Store { base, disp, src, .. } if *base == sp && *disp == home && *src == src_reg
        )));
        assert!(!e.instructions().iter().any(|i| matches!(
            i,
            Instruction::Copy { dst, .. } if *dst == Reg::Core(5)
        )));
    }

    #[test]
    fn core_store_to_core_promoted_vreg_stays_in_register() {
        let mut e = promoted_emitter(InstructionSet::X86, &[(3, Reg::Core(5))]);
        let src = e.get_return(false);
        e.store_value(ValueLocation::frame(VReg(3)), src).unwrap();
        assert_eq!(
            e.instructions(),
            &[Instruction::Copy {
                dst: Reg::Core(5),
                src: src.reg().unwrap(),
            }]
        );
    }

    #[test]
    fn wide_fp_store_needs_both_halves_promoted_as_fp() {
        let mut e = promoted_emitter(
            InstructionSet::X86,
            &[(4, Reg::Fp(6)), (5, Reg::Core(6))],
        );
        let src = e.get_return_wide(true);
        e.store_value_wide(ValueLocation::frame_wide(VReg(4))[0].with_fp(), src)
            .unwrap();

        let sp = e.abi().stack_pointer();
        let home = e.vreg_offset(VReg(4));
        assert!(e.instructions().iter().any(|i| matches!(
            i,
            Instruction::StoreWide { base, disp, .. } if *base == sp && *disp == home
        )));
    }

    #[test]
    fn failed_wide_eval_releases_its_first_temp() {
        let mut e = promoted_emitter(InstructionSet::Thumb2, &[]);
        let mut held = Vec::new();
        while let Ok(t) = e.alloc_temp(RegClass::Core) {
            held.push(t);
        }
        let spare = held.pop().unwrap();
        e.free_temp(spare);

        let dest = ValueLocation::frame_wide(VReg(6))[0];
        let err = e.eval_loc(dest, RegClass::Core).unwrap_err();
        assert!(matches!(err, Error::OutOfTemps(RegClass::Core)));
        assert_eq!(e.alloc_temp(RegClass::Core).unwrap(), spare);
    }
}
