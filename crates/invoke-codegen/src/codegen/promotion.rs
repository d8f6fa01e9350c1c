use std::collections::HashMap;

use super::location::VReg;
use crate::target::Reg;

/// Permanent registers a virtual register was promoted to, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionEntry {
    pub core: Option<Reg>,
    pub fp: Option<Reg>,
}

/// Per-method promotion decisions made by the register allocator.
///
/// A promoted virtual register lives in its callee-save register for the
/// whole method; its home slot is only written when something needs the
/// value in memory (range-call bulk copies, incoming-argument flushes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionMap {
    entries: HashMap<VReg, PromotionEntry>,
}

impl PromotionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn promote_core(&mut self, vreg: VReg, reg: Reg) {
        self.entries.entry(vreg).or_default().core = Some(reg);
    }

    pub fn promote_fp(&mut self, vreg: VReg, reg: Reg) {
        self.entries.entry(vreg).or_default().fp = Some(reg);
    }

    #[must_use]
    pub fn get(&self, vreg: VReg) -> PromotionEntry {
        self.entries.get(&vreg).copied().unwrap_or_default()
    }

    /// Promoted register of the requested class.
    #[must_use]
    pub fn reg_for(&self, vreg: VReg, fp: bool) -> Option<Reg> {
        let entry = self.get(vreg);
        if fp { entry.fp } else { entry.core }
    }
}
