// Per-method code emitter.
//
// Owns the instruction stream, labels, safepoint and exception metadata, the
// temp pool and the deferred blocks (throw paths and intrinsic launchpads)
// that are compiled after the main body.

use tracing::{debug, trace};

use super::call_info::{CallInfo, DexFileId, MethodRef, OptFlags};
use super::location::VReg;
use super::promotion::PromotionMap;
use super::regpool::RegisterPool;
use crate::abi::{METHOD_PTR_OFFSET, OUTS_OFFSET, RuntimeEntryPoint, WORD_SIZE};
use crate::lir::{Cond, Instruction, Label, MemSize};
use crate::target::{InstructionSet, Reg, RegClass, TargetAbi};
use crate::{Error, Result};

/// Compiler-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    pub instruction_set: InstructionSet,
    /// Rely on the fault handler instead of emitting explicit null checks.
    pub implicit_null_checks: bool,
    pub inline_intrinsics: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            instruction_set: InstructionSet::Thumb2,
            implicit_null_checks: false,
            inline_intrinsics: true,
        }
    }
}

/// Frame shape of the method being compiled.
///
/// ```text
/// sp + 0                      current method
/// sp + 4 .. 4 + 4*num_outs    outgoing argument words
/// sp + 4 + 4*num_outs + 4*v   home slot of virtual register v
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Outgoing argument words reserved for the largest call.
    pub num_outs: u32,
    pub num_vregs: u32,
}

impl FrameLayout {
    /// Home slot offset of `vreg`. Call sites are checked against the frame
    /// with [`checked_vreg_offset`](Self::checked_vreg_offset) before any
    /// code is emitted for them.
    #[must_use]
    pub const fn vreg_offset(&self, vreg: VReg) -> i32 {
        OUTS_OFFSET.wrapping_add(WORD_SIZE.wrapping_mul(self.num_outs.wrapping_add(vreg.0) as i32))
    }

    /// Home slot offset of `vreg`, or `None` when it is not a register of
    /// this frame or its offset does not fit a displacement.
    #[must_use]
    pub fn checked_vreg_offset(&self, vreg: VReg) -> Option<i32> {
        if vreg.0 >= self.num_vregs {
            return None;
        }
        let slot = i32::try_from(self.num_outs.checked_add(vreg.0)?).ok()?;
        slot.checked_mul(WORD_SIZE)?.checked_add(OUTS_OFFSET)
    }
}

/// Inputs fixed for the whole method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodContext {
    pub dex_file: DexFileId,
    /// Number of method ids in `dex_file`; bounds every method index.
    pub num_method_ids: u32,
    pub frame: FrameLayout,
    pub promotion: PromotionMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    CodeAddress,
    MethodAddress,
    RelativeCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkerFixup {
    pub instruction: usize,
    pub method: MethodRef,
    pub kind: FixupKind,
}

/// Result of compiling one method's call sites.
#[derive(Debug, Clone)]
pub struct EmittedCode {
    pub instructions: Vec<Instruction>,
    /// Instruction index of each label, indexed by [`Label::index`].
    pub labels: Vec<Option<usize>>,
    pub safepoints: Vec<usize>,
    /// Instructions that may raise an exception (null and bounds checks,
    /// loads covered by implicit null checks).
    pub exception_points: Vec<usize>,
    pub linker_fixups: Vec<LinkerFixup>,
    /// Instructions before this index are the main body; deferred blocks follow.
    pub main_len: usize,
}

impl EmittedCode {
    #[must_use]
    pub fn label_position(&self, label: Label) -> Option<usize> {
        self.labels.get(label.index()).copied().flatten()
    }
}

/// A block compiled after the main body.
#[derive(Debug, Clone)]
pub(crate) enum SlowPath {
    ThrowNullPointer {
        label: Label,
    },
    IntrinsicLaunchpad {
        label: Label,
        info: Box<CallInfo>,
        resume: Option<Label>,
    },
}

pub struct CodeEmitter {
    abi: &'static dyn TargetAbi,
    options: CompilerOptions,
    method: MethodContext,
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    safepoints: Vec<usize>,
    exception_points: Vec<usize>,
    linker_fixups: Vec<LinkerFixup>,
    slow_paths: Vec<SlowPath>,
    pub(crate) pool: RegisterPool,
}

impl CodeEmitter {
    #[must_use]
    pub fn new(options: CompilerOptions, method: MethodContext) -> Self {
        let abi = options.instruction_set.abi();
        Self {
            abi,
            options,
            method,
            instructions: Vec::new(),
            labels: Vec::new(),
            safepoints: Vec::new(),
            exception_points: Vec::new(),
            linker_fixups: Vec::new(),
            slow_paths: Vec::new(),
            pool: RegisterPool::new(abi),
        }
    }

    #[must_use]
    pub fn abi(&self) -> &'static dyn TargetAbi {
        self.abi
    }

    #[must_use]
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    #[must_use]
    pub fn method(&self) -> &MethodContext {
        &self.method
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[must_use]
    pub fn safepoints(&self) -> &[usize] {
        &self.safepoints
    }

    #[must_use]
    pub fn exception_points(&self) -> &[usize] {
        &self.exception_points
    }

    #[must_use]
    pub fn pending_slow_paths(&self) -> usize {
        self.slow_paths.len()
    }

    #[must_use]
    pub fn pool(&self) -> &RegisterPool {
        &self.pool
    }

    // ── Emission ──

    /// Append an instruction, dropping cached liveness of every register it
    /// writes. Returns the instruction index.
    pub fn emit(&mut self, insn: Instruction) -> usize {
        match &insn {
            Instruction::LoadWide { lo, hi, .. } => {
                self.pool.clobber(*lo);
                self.pool.clobber(*hi);
            }
            Instruction::BlockLoad { first, count, .. } => {
                for n in 0..*count {
                    self.pool.clobber(Reg::Fp(first.number() + n));
                }
            }
            _ => {
                if let Some(dst) = insn.dest_reg() {
                    self.pool.clobber(dst);
                }
            }
        }
        let index = self.instructions.len();
        let fixup = match &insn {
            Instruction::LoadCodeAddress { method, .. } => Some((*method, FixupKind::CodeAddress)),
            Instruction::LoadMethodAddress { method, .. } => {
                Some((*method, FixupKind::MethodAddress))
            }
            Instruction::CallRelative { method } => Some((*method, FixupKind::RelativeCall)),
            _ => None,
        };
        if let Some((method, kind)) = fixup {
            self.linker_fixups.push(LinkerFixup {
                instruction: index,
                method,
                kind,
            });
        }
        trace!(index, insn = %insn, "emit");
        self.instructions.push(insn);
        index
    }

    /// Emit a call instruction. No temp may be checked out across a call.
    pub fn emit_call(&mut self, insn: Instruction) -> Result<usize> {
        let abi = self.abi;
        if let Some(reg) = self
            .pool
            .held_temps()
            .into_iter()
            .find(|r| abi.is_caller_save(*r))
        {
            return Err(Error::Invariant(format!(
                "temp {} still allocated across a call",
                abi.reg_name(reg)
            )));
        }
        Ok(self.emit(insn))
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len());
        self.labels.push(None);
        label
    }

    pub fn define_label(&mut self, label: Label) -> Result<()> {
        let position = self.instructions.len();
        let Some(slot) = self.labels.get_mut(label.index()) else {
            return Err(Error::Invariant(format!(
                "label L{} was never allocated",
                label.index()
            )));
        };
        if slot.is_some() {
            return Err(Error::Invariant(format!(
                "label L{} defined twice",
                label.index()
            )));
        }
        *slot = Some(position);
        self.emit(Instruction::Label(label));
        Ok(())
    }

    pub fn mark_safepoint(&mut self, index: usize) {
        self.safepoints.push(index);
    }

    pub fn mark_exception_point(&mut self, index: usize) {
        self.exception_points.push(index);
    }

    pub fn load_constant(&mut self, dst: Reg, value: i32) -> usize {
        self.emit(Instruction::LoadConst { dst, value })
    }

    /// Register move; a no-op when source and destination coincide.
    pub fn op_reg_copy(&mut self, dst: Reg, src: Reg) {
        if dst != src {
            self.emit(Instruction::Copy { dst, src });
        }
    }

    /// Pair move that tolerates overlap between source and destination.
    pub fn op_reg_copy_wide(&mut self, dst_lo: Reg, dst_hi: Reg, src_lo: Reg, src_hi: Reg) -> Result<()> {
        if dst_lo == src_hi && dst_hi == src_lo {
            // Full swap.
            return self.with_temp(dst_lo.class(), |e, t| {
                e.op_reg_copy(t, src_lo);
                e.op_reg_copy(dst_hi, src_hi);
                e.op_reg_copy(dst_lo, t);
                Ok(())
            });
        }
        if dst_lo == src_hi {
            self.op_reg_copy(dst_hi, src_hi);
            self.op_reg_copy(dst_lo, src_lo);
        } else {
            self.op_reg_copy(dst_lo, src_lo);
            self.op_reg_copy(dst_hi, src_hi);
        }
        Ok(())
    }

    pub fn load_word_disp(&mut self, base: Reg, disp: i32, dst: Reg) -> usize {
        self.emit(Instruction::Load {
            dst,
            base,
            disp,
            size: MemSize::Word,
        })
    }

    pub fn store_word_disp(&mut self, base: Reg, disp: i32, src: Reg) -> usize {
        self.emit(Instruction::Store {
            base,
            disp,
            src,
            size: MemSize::Word,
        })
    }

    pub fn load_wide_disp(&mut self, base: Reg, disp: i32, lo: Reg, hi: Reg) -> usize {
        self.emit(Instruction::LoadWide { lo, hi, base, disp })
    }

    pub fn store_wide_disp(&mut self, base: Reg, disp: i32, lo: Reg, hi: Reg) -> usize {
        self.emit(Instruction::StoreWide { base, disp, lo, hi })
    }

    /// Load the current method pointer from its frame slot.
    pub fn load_curr_method_direct(&mut self, dst: Reg) -> usize {
        let sp = self.abi.stack_pointer();
        self.load_word_disp(sp, METHOD_PTR_OFFSET, dst)
    }

    // ── Temps ──

    /// Check out a temp for the duration of `f`; it is released on every
    /// exit path, including errors.
    pub fn with_temp<R>(
        &mut self,
        class: RegClass,
        f: impl FnOnce(&mut Self, Reg) -> Result<R>,
    ) -> Result<R> {
        let reg = self.pool.alloc_temp(class)?;
        let out = f(self, reg);
        self.pool.free_temp(reg);
        out
    }

    pub fn alloc_temp(&mut self, class: RegClass) -> Result<Reg> {
        self.pool.alloc_temp(class)
    }

    pub fn free_temp(&mut self, reg: Reg) {
        self.pool.free_temp(reg);
    }

    /// Reserve the fixed call registers so temp allocation avoids them.
    pub fn lock_call_temps(&mut self) {
        for reg in self.call_temps() {
            self.pool.lock(reg);
        }
    }

    pub fn free_call_temps(&mut self) {
        for reg in self.call_temps() {
            self.pool.unlock(reg);
        }
    }

    fn call_temps(&self) -> Vec<Reg> {
        let abi = self.abi;
        let mut regs: Vec<Reg> = abi.arg_regs().to_vec();
        regs.push(abi.hidden_arg());
        regs.extend(abi.hidden_fp_arg());
        regs.extend(abi.invoke_target());
        regs
    }

    pub fn clobber_caller_save(&mut self) {
        self.pool.clobber_caller_save(self.abi);
    }

    /// Make every value live only in its home slot or promoted register.
    /// Stores write through, so this only drops cached liveness.
    pub fn flush_all_regs(&mut self) {
        self.pool.clobber_all();
    }

    /// Register state as it is right after a call: nothing checked out,
    /// nothing cached.
    pub fn reset_to_after_call(&mut self) {
        self.pool.reset();
        self.pool.clobber_all();
    }

    // ── Checks ──

    /// Null-check `reg`. With explicit checks this branches to a deferred
    /// throw block and returns the branch index; with implicit checks the
    /// following dereference is recorded instead (see
    /// [`mark_possible_null_pointer_exception`](Self::mark_possible_null_pointer_exception)).
    pub fn gen_null_check(&mut self, reg: Reg, opt: OptFlags) -> Result<Option<usize>> {
        if opt.ignore_null_check || self.options.implicit_null_checks {
            return Ok(None);
        }
        let label = self.new_label();
        let branch = self.emit(Instruction::BranchCmpImm {
            cond: Cond::Eq,
            reg,
            imm: 0,
            target: label,
        });
        self.mark_exception_point(branch);
        self.slow_paths.push(SlowPath::ThrowNullPointer { label });
        Ok(Some(branch))
    }

    /// Record the last emitted instruction as a faulting dereference when
    /// implicit null checks are in use.
    pub fn mark_possible_null_pointer_exception(&mut self, opt: OptFlags) {
        if self.options.implicit_null_checks
            && !opt.ignore_null_check
            && let Some(last) = self.instructions.len().checked_sub(1)
        {
            self.mark_exception_point(last);
        }
    }

    pub(crate) fn add_intrinsic_launchpad(
        &mut self,
        info: &CallInfo,
        label: Label,
        resume: Option<Label>,
    ) {
        self.slow_paths.push(SlowPath::IntrinsicLaunchpad {
            label,
            info: Box::new(info.for_launchpad()),
            resume,
        });
    }

    // ── Runtime helpers ──

    /// Load a helper's address into the invoke-target register. Returns
    /// `None` on targets that call thread memory directly.
    pub fn call_helper_setup(&mut self, entry: RuntimeEntryPoint) -> Result<Option<Reg>> {
        let abi = self.abi;
        let Some(target) = abi.invoke_target() else {
            return Ok(None);
        };
        let thread = abi.thread_reg().ok_or_else(|| {
            Error::Unsupported(format!("{:?} has no thread register", abi.isa()))
        })?;
        self.load_word_disp(thread, entry.thread_offset(), target);
        Ok(Some(target))
    }

    /// Emit the helper call prepared by [`call_helper_setup`](Self::call_helper_setup).
    pub fn call_helper(
        &mut self,
        target: Option<Reg>,
        entry: RuntimeEntryPoint,
        safepoint: bool,
    ) -> Result<usize> {
        let insn = match target {
            Some(reg) => Instruction::CallReg { target: reg },
            None => Instruction::CallThreadMem {
                offset: entry.thread_offset(),
            },
        };
        let index = self.emit_call(insn)?;
        if safepoint {
            self.mark_safepoint(index);
        }
        Ok(index)
    }

    // ── Finishing ──

    /// Compile deferred blocks, verify labels and temps, and hand back the
    /// method's code.
    pub fn finish(mut self) -> Result<EmittedCode> {
        self.check_no_temps_held("end of method body")?;
        let main_len = self.instructions.len();

        let mut next = 0;
        while next < self.slow_paths.len() {
            let path = self.slow_paths[next].clone();
            next += 1;
            self.compile_slow_path(path)?;
        }
        self.check_no_temps_held("end of deferred blocks")?;

        for insn in &self.instructions {
            if let Some(target) = insn.branch_target()
                && self.labels.get(target.index()).copied().flatten().is_none()
            {
                return Err(Error::Invariant(format!(
                    "branch to undefined label L{}",
                    target.index()
                )));
            }
        }

        debug!(
            instructions = self.instructions.len(),
            deferred = self.instructions.len() - main_len,
            safepoints = self.safepoints.len(),
            "method finished"
        );
        Ok(EmittedCode {
            instructions: self.instructions,
            labels: self.labels,
            safepoints: self.safepoints,
            exception_points: self.exception_points,
            linker_fixups: self.linker_fixups,
            main_len,
        })
    }

    fn check_no_temps_held(&self, at: &str) -> Result<()> {
        let held = self.pool.held_temps();
        let locked = self.pool.locked_regs();
        if held.is_empty() && locked.is_empty() {
            return Ok(());
        }
        Err(Error::Invariant(format!(
            "registers still reserved at {at}: held {held:?}, locked {locked:?}"
        )))
    }

    fn compile_slow_path(&mut self, path: SlowPath) -> Result<()> {
        match path {
            SlowPath::ThrowNullPointer { label } => {
                self.define_label(label)?;
                self.reset_to_after_call();
                self.call_runtime_helper(RuntimeEntryPoint::ThrowNullPointer, &[], true)?;
            }
            SlowPath::IntrinsicLaunchpad {
                label,
                info,
                resume,
            } => {
                self.define_label(label)?;
                self.reset_to_after_call();
                self.emit(Instruction::IntrinsicRetry);
                super::invoke::gen_invoke_no_inline(self, &info)?;
                if let Some(resume) = resume {
                    self.emit(Instruction::Jump { target: resume });
                }
            }
        }
        Ok(())
    }
}
