// Temp register pool with per-register liveness tracking.
//
// Each allocatable register records whether it is checked out as a temp,
// whether it is locked as a fixed call register, and which virtual register
// (if any) it currently mirrors. Values are always written through to their
// home slot or promoted register, so dropping liveness never loses data.

use super::location::VReg;
use crate::target::{Reg, RegClass, TargetAbi};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct RegSlot {
    reg: Reg,
    in_use: bool,
    locked: bool,
    live: Option<VReg>,
}

impl RegSlot {
    fn new(reg: Reg) -> Self {
        Self {
            reg,
            in_use: false,
            locked: false,
            live: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterPool {
    core: Vec<RegSlot>,
    fp: Vec<RegSlot>,
}

impl RegisterPool {
    #[must_use]
    pub fn new(abi: &dyn TargetAbi) -> Self {
        Self {
            core: abi.core_temps().iter().copied().map(RegSlot::new).collect(),
            fp: abi.fp_temps().iter().copied().map(RegSlot::new).collect(),
        }
    }

    fn slots(&self) -> impl Iterator<Item = &RegSlot> {
        self.core.iter().chain(self.fp.iter())
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut RegSlot> {
        self.core.iter_mut().chain(self.fp.iter_mut())
    }

    fn slot_mut(&mut self, reg: Reg) -> Option<&mut RegSlot> {
        let slots = match reg.class() {
            RegClass::Core => &mut self.core,
            RegClass::Fp => &mut self.fp,
        };
        slots.iter_mut().find(|s| s.reg == reg)
    }

    #[must_use]
    pub fn is_temp(&self, reg: Reg) -> bool {
        self.slots().any(|s| s.reg == reg)
    }

    /// Check out a temp of `class`. Registers not mirroring any value are
    /// preferred so cached values survive as long as possible.
    pub fn alloc_temp(&mut self, class: RegClass) -> Result<Reg> {
        let slots = match class {
            RegClass::Core => &mut self.core,
            RegClass::Fp => &mut self.fp,
        };
        let pick = slots
            .iter()
            .position(|s| !s.in_use && !s.locked && s.live.is_none())
            .or_else(|| slots.iter().position(|s| !s.in_use && !s.locked))
            .ok_or(Error::OutOfTemps(class))?;
        let slot = &mut slots[pick];
        slot.in_use = true;
        slot.live = None;
        Ok(slot.reg)
    }

    /// Check out a temp that already mirrors a value the caller is about to
    /// read, so later allocations cannot reuse it. Non-temps are ignored.
    pub fn claim(&mut self, reg: Reg) {
        if let Some(slot) = self.slot_mut(reg)
            && !slot.locked
        {
            slot.in_use = true;
        }
    }

    /// Return a temp to the pool. Liveness is kept; freeing a register that
    /// is not a temp (a promoted or fixed register) does nothing.
    pub fn free_temp(&mut self, reg: Reg) {
        if let Some(slot) = self.slot_mut(reg)
            && !slot.locked
        {
            slot.in_use = false;
        }
    }

    /// Reserve a fixed register for a call sequence.
    pub fn lock(&mut self, reg: Reg) {
        if let Some(slot) = self.slot_mut(reg) {
            slot.in_use = true;
            slot.locked = true;
            slot.live = None;
        }
    }

    pub fn unlock(&mut self, reg: Reg) {
        if let Some(slot) = self.slot_mut(reg) {
            slot.in_use = false;
            slot.locked = false;
        }
    }

    /// The register no longer mirrors any value.
    pub fn clobber(&mut self, reg: Reg) {
        if let Some(slot) = self.slot_mut(reg) {
            slot.live = None;
        }
    }

    pub fn clobber_caller_save(&mut self, abi: &dyn TargetAbi) {
        for reg in abi.caller_save() {
            self.clobber(*reg);
        }
    }

    /// Forget every cached value.
    pub fn clobber_all(&mut self) {
        for slot in self.slots_mut() {
            slot.live = None;
        }
    }

    /// Forget any register mirroring `vreg` (its value is about to change).
    pub fn forget_vreg(&mut self, vreg: VReg) {
        for slot in self.slots_mut() {
            if slot.live == Some(vreg) {
                slot.live = None;
            }
        }
    }

    /// Record that `reg` now holds the current value of `vreg`.
    pub fn mark_live(&mut self, reg: Reg, vreg: VReg) {
        if vreg == VReg::NONE {
            return;
        }
        self.forget_vreg(vreg);
        if let Some(slot) = self.slot_mut(reg) {
            slot.live = Some(vreg);
        }
    }

    /// Register currently mirroring `vreg`, if any.
    #[must_use]
    pub fn live_reg(&self, vreg: VReg) -> Option<Reg> {
        self.slots().find(|s| s.live == Some(vreg)).map(|s| s.reg)
    }

    /// Release every temp and lock, as at the start of a new block.
    pub fn reset(&mut self) {
        for slot in self.slots_mut() {
            slot.in_use = false;
            slot.locked = false;
        }
    }

    /// Temps checked out and not yet freed (locks excluded).
    #[must_use]
    pub fn held_temps(&self) -> Vec<Reg> {
        self.slots()
            .filter(|s| s.in_use && !s.locked)
            .map(|s| s.reg)
            .collect()
    }

    #[must_use]
    pub fn locked_regs(&self) -> Vec<Reg> {
        self.slots().filter(|s| s.locked).map(|s| s.reg).collect()
    }
}
