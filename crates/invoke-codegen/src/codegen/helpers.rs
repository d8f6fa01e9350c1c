// Runtime-helper calls.
//
// Arguments are moved into the argument registers greedily, left to right,
// with one adjacent-pair hazard check: when argument N's destination is the
// source of argument N+1, the two moves are swapped. Anything else that
// would overwrite a pending source is rejected. Immediates and the current
// method pointer have no source register and are materialized last.

use tracing::debug;

use super::emitter::CodeEmitter;
use super::location::{LocKind, ValueLocation};
use crate::abi::RuntimeEntryPoint;
use crate::target::Reg;
use crate::{Error, Result};

/// One argument of a runtime-helper call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HelperArg {
    Imm(i32),
    /// Copy a register into the argument slot.
    Reg(Reg),
    /// The value already sits in its argument register.
    AllocatedReg(Reg),
    /// The current method pointer.
    Method,
    Loc(ValueLocation),
}

/// A planned move of one argument into its slot.
#[derive(Debug, Clone, Copy)]
struct ArgMove {
    arg: HelperArg,
    dst_lo: Reg,
    dst_hi: Option<Reg>,
    src: [Option<Reg>; 2],
}

impl ArgMove {
    fn dsts(&self) -> impl Iterator<Item = Reg> {
        std::iter::once(self.dst_lo).chain(self.dst_hi)
    }

    fn reads(&self, reg: Reg) -> bool {
        self.src.contains(&Some(reg))
    }

    /// Whether executing this move changes the contents of `reg`.
    fn writes(&self, reg: Reg) -> bool {
        match (self.dst_lo == reg, self.dst_hi == Some(reg)) {
            (true, _) => self.src[0] != Some(reg),
            (_, true) => self.src[1] != Some(reg),
            _ => false,
        }
    }

    fn has_source(&self) -> bool {
        self.src.iter().any(Option::is_some)
    }
}

impl CodeEmitter {
    /// Call `entry` with `args` placed in consecutive argument slots. A wide
    /// location takes two slots. Returns the call instruction index.
    pub fn call_runtime_helper(
        &mut self,
        entry: RuntimeEntryPoint,
        args: &[HelperArg],
        safepoint: bool,
    ) -> Result<usize> {
        let target = self.call_helper_setup(entry)?;
        let mut moves = self.plan_helper_args(args)?;
        if let Some(target) = target
            && let Some(m) = moves.iter().find(|m| m.reads(target))
        {
            return Err(Error::Invariant(format!(
                "helper argument {:?} reads the invoke-target register",
                m.arg
            )));
        }

        // Source-free arguments go last so they cannot clobber a pending source.
        moves.sort_by_key(|m| !m.has_source());
        for i in 0..moves.len().saturating_sub(1) {
            let (first, second) = (moves[i], moves[i + 1]);
            if first.dsts().any(|d| second.reads(d) && first.writes(d)) {
                if second.dsts().any(|d| first.reads(d) && second.writes(d)) {
                    return Err(Error::Invariant(format!(
                        "helper arguments {:?} and {:?} swap registers",
                        first.arg, second.arg
                    )));
                }
                moves.swap(i, i + 1);
            }
        }
        for (i, m) in moves.iter().enumerate() {
            for later in &moves[i + 1..] {
                if let Some(reg) = m.dsts().find(|d| later.reads(*d) && m.writes(*d)) {
                    return Err(Error::Invariant(format!(
                        "helper argument {:?} overwrites {reg} before {:?} reads it",
                        m.arg, later.arg
                    )));
                }
            }
        }

        debug!(helper = entry.name(), args = moves.len(), safepoint, "runtime helper call");
        for m in &moves {
            self.emit_helper_arg(m)?;
        }
        self.clobber_caller_save();
        self.call_helper(target, entry, safepoint)
    }

    fn plan_helper_args(&self, args: &[HelperArg]) -> Result<Vec<ArgMove>> {
        let abi = self.abi();
        let mut slot = 0;
        let mut moves = Vec::with_capacity(args.len());
        for arg in args {
            let wide = matches!(arg, HelperArg::Loc(loc) if loc.wide);
            let width = if wide { 2 } else { 1 };
            if slot + width > abi.arg_regs().len() {
                return Err(Error::Invariant(format!(
                    "runtime helper takes at most {} argument words",
                    abi.arg_regs().len()
                )));
            }
            let use_fp = matches!(arg, HelperArg::Loc(loc) if loc.fp);
            let regs = match abi.fp_arg_regs() {
                Some(fp_regs) if use_fp => fp_regs,
                _ => abi.arg_regs(),
            };
            let dst_lo = regs[slot];
            let dst_hi = wide.then(|| regs[slot + 1]);
            let src = match arg {
                HelperArg::Reg(reg) | HelperArg::AllocatedReg(reg) => [Some(*reg), None],
                HelperArg::Loc(loc) => {
                    let loc = if loc.wide {
                        self.update_loc_wide(*loc)
                    } else {
                        self.update_loc(*loc)
                    };
                    match loc.kind {
                        LocKind::PhysReg(rs) => [Some(rs.low), rs.high],
                        _ => [None, None],
                    }
                }
                HelperArg::Imm(_) | HelperArg::Method => [None, None],
            };
            if let HelperArg::AllocatedReg(reg) = arg
                && *reg != dst_lo
            {
                return Err(Error::Invariant(format!(
                    "allocated helper argument {reg} is not in slot register {dst_lo}"
                )));
            }
            moves.push(ArgMove {
                arg: *arg,
                dst_lo,
                dst_hi,
                src,
            });
            slot += width;
        }
        Ok(moves)
    }

    fn emit_helper_arg(&mut self, m: &ArgMove) -> Result<()> {
        match m.arg {
            HelperArg::Imm(value) => {
                self.load_constant(m.dst_lo, value);
            }
            HelperArg::Reg(reg) => self.op_reg_copy(m.dst_lo, reg),
            HelperArg::AllocatedReg(_) => {}
            HelperArg::Method => {
                self.load_curr_method_direct(m.dst_lo);
            }
            HelperArg::Loc(loc) => match m.dst_hi {
                Some(hi) => self.load_value_direct_wide_fixed(loc, m.dst_lo, hi)?,
                None => self.load_value_direct_fixed(loc, m.dst_lo)?,
            },
        }
        Ok(())
    }
}
