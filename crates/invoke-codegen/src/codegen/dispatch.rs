// Dispatch strategies and their call-sequence state machines.
//
// Each strategy is a step function over a small state counter. A step emits
// the next piece of target-resolution code and returns the following state,
// or `Done` once the sequence is exhausted. The argument marshaler calls
// `advance` between its own loads so dispatch loads overlap argument setup.

use tracing::{debug, trace};

use super::call_info::{CallInfo, DirectTarget, InvokeType, MethodLoweringInfo};
use super::emitter::CodeEmitter;
use crate::abi::{
    CLASS_IMTABLE_OFFSET, CLASS_VTABLE_OFFSET, IMT_SIZE, METHOD_ENTRY_POINT_OFFSET,
    METHOD_RESOLVED_METHODS_OFFSET, OBJECT_CLASS_OFFSET, RuntimeEntryPoint, array_slot_offset,
};
use crate::lir::Instruction;
use crate::target::TargetAbi;
use crate::{Error, Result};

/// Position in a call sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Step(u8),
    Done,
}

impl CallState {
    pub const START: CallState = CallState::Step(0);
}

/// One variant per (invoke kind, fast/slow) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchStrategy {
    StaticFast,
    DirectFast,
    VirtualFast,
    InterfaceFast,
    StaticSlow,
    DirectSlow,
    VirtualSlow,
    SuperSlow,
    InterfaceSlow,
}

impl DispatchStrategy {
    /// Pick the strategy for an already-sharpened invoke kind. Super calls
    /// have no fast path.
    pub fn select(kind: InvokeType, fast_path: bool) -> Result<Self> {
        let strategy = match (kind, fast_path) {
            (InvokeType::Static, true) => Self::StaticFast,
            (InvokeType::Direct, true) => Self::DirectFast,
            (InvokeType::Virtual, true) => Self::VirtualFast,
            (InvokeType::Interface, true) => Self::InterfaceFast,
            (InvokeType::Static, false) => Self::StaticSlow,
            (InvokeType::Direct, false) => Self::DirectSlow,
            (InvokeType::Virtual, false) => Self::VirtualSlow,
            (InvokeType::Super, false) => Self::SuperSlow,
            (InvokeType::Interface, false) => Self::InterfaceSlow,
            (InvokeType::Super, true) => {
                return Err(Error::Invariant(
                    "super invokes are always lowered through the slow path".to_string(),
                ));
            }
        };
        debug!(?kind, fast_path, ?strategy, "dispatch strategy");
        Ok(strategy)
    }

    #[must_use]
    pub const fn is_fast_path(self) -> bool {
        matches!(
            self,
            Self::StaticFast | Self::DirectFast | Self::VirtualFast | Self::InterfaceFast
        )
    }

    /// The sequence itself loads the receiver into `arg1`, so argument
    /// loading starts at word 1.
    #[must_use]
    pub const fn loads_receiver(self) -> bool {
        matches!(self, Self::VirtualFast | Self::InterfaceFast)
    }

    /// Direct calls resolved at compile time still owe the receiver null
    /// check; the marshaler emits it after loading the arguments.
    #[must_use]
    pub const fn needs_marshal_null_check(self) -> bool {
        matches!(self, Self::DirectFast)
    }

    /// Access-checking trampoline used by the slow path.
    #[must_use]
    pub const fn trampoline(self) -> Option<RuntimeEntryPoint> {
        match self {
            Self::StaticSlow => Some(RuntimeEntryPoint::InvokeStaticTrampolineWithAccessCheck),
            Self::DirectSlow => Some(RuntimeEntryPoint::InvokeDirectTrampolineWithAccessCheck),
            Self::VirtualSlow => Some(RuntimeEntryPoint::InvokeVirtualTrampolineWithAccessCheck),
            Self::SuperSlow => Some(RuntimeEntryPoint::InvokeSuperTrampolineWithAccessCheck),
            Self::InterfaceSlow => {
                Some(RuntimeEntryPoint::InvokeInterfaceTrampolineWithAccessCheck)
            }
            _ => None,
        }
    }

    /// Number of emitting steps before the sequence reports `Done`.
    #[must_use]
    pub fn step_count(self, abi: &dyn TargetAbi, method: &MethodLoweringInfo) -> usize {
        let entry_load = usize::from(!abi.memory_indirect_calls());
        match self {
            Self::StaticFast | Self::DirectFast => {
                if known_addresses(method) {
                    1
                } else {
                    3 + entry_load
                }
            }
            Self::VirtualFast => 4 + entry_load,
            Self::InterfaceFast => 5 + entry_load,
            _ => 1,
        }
    }

    /// Run the step for `state` and return the next state.
    pub fn step(self, e: &mut CodeEmitter, info: &CallInfo, state: CallState) -> Result<CallState> {
        let CallState::Step(n) = state else {
            return Ok(CallState::Done);
        };
        match self {
            Self::StaticFast | Self::DirectFast => next_sd_call_insn(e, info, n),
            Self::VirtualFast => next_vcall_insn(e, info, n),
            Self::InterfaceFast => next_interface_call_insn(e, info, n),
            _ => {
                let trampoline = self.trampoline().ok_or_else(|| {
                    Error::Invariant(format!("{self:?} has no trampoline"))
                })?;
                next_invoke_insn_sp(e, info, trampoline, n)
            }
        }
    }
}

fn known_addresses(method: &MethodLoweringInfo) -> bool {
    method.direct_code.is_known() && method.direct_method.is_known()
}

fn check_method_index(e: &CodeEmitter, info: &CallInfo) -> Result<()> {
    let ctx = e.method();
    let target = info.method.target;
    if target.dex_file != ctx.dex_file {
        return Err(Error::Invariant(format!(
            "method {target} is not in the caller's dex file {}",
            ctx.dex_file.0
        )));
    }
    if target.method_index >= ctx.num_method_ids {
        return Err(Error::Invariant(format!(
            "method index {} out of range ({} method ids)",
            target.method_index, ctx.num_method_ids
        )));
    }
    Ok(())
}

fn receiver(info: &CallInfo) -> Result<super::location::ValueLocation> {
    info.args
        .first()
        .copied()
        .ok_or_else(|| Error::Invariant("instance call without a receiver".to_string()))
}

/// Static and direct calls: current method, resolved-methods table, target
/// method, entry point. Known code and method addresses collapse the whole
/// sequence into one step.
fn next_sd_call_insn(e: &mut CodeEmitter, info: &CallInfo, state: u8) -> Result<CallState> {
    let abi = e.abi();
    let arg0 = abi.arg_regs()[0];
    let method = &info.method;

    if known_addresses(method) {
        if state != 0 {
            return Ok(CallState::Done);
        }
        if let Some(target) = abi.invoke_target() {
            match method.direct_code {
                DirectTarget::Known(addr) => {
                    e.load_constant(target, addr as i32);
                }
                DirectTarget::LinkerPatch => {
                    e.emit(Instruction::LoadCodeAddress {
                        dst: target,
                        method: method.target,
                    });
                }
                DirectTarget::Unknown => {}
            }
        }
        match method.direct_method {
            DirectTarget::Known(addr) => {
                e.load_constant(arg0, addr as i32);
            }
            DirectTarget::LinkerPatch => {
                e.emit(Instruction::LoadMethodAddress {
                    dst: arg0,
                    method: method.target,
                });
            }
            DirectTarget::Unknown => {}
        }
        return Ok(CallState::Step(1));
    }

    match state {
        0 => {
            e.load_curr_method_direct(arg0);
        }
        1 => {
            e.load_word_disp(arg0, METHOD_RESOLVED_METHODS_OFFSET, arg0);
            // Set up the code address early when it is already known.
            if let Some(target) = abi.invoke_target() {
                match method.direct_code {
                    DirectTarget::Known(addr) => {
                        e.load_constant(target, addr as i32);
                    }
                    DirectTarget::LinkerPatch => {
                        e.emit(Instruction::LoadCodeAddress {
                            dst: target,
                            method: method.target,
                        });
                    }
                    DirectTarget::Unknown => {}
                }
            }
        }
        2 => {
            check_method_index(e, info)?;
            e.load_word_disp(arg0, array_slot_offset(method.target.method_index), arg0);
        }
        3 => {
            let Some(target) = abi.invoke_target() else {
                return Ok(CallState::Done);
            };
            if method.direct_code == DirectTarget::Unknown {
                e.load_word_disp(arg0, METHOD_ENTRY_POINT_OFFSET, target);
            }
        }
        _ => return Ok(CallState::Done),
    }
    Ok(CallState::Step(state + 1))
}

/// Virtual calls: receiver, null check and class, vtable, method, entry point.
fn next_vcall_insn(e: &mut CodeEmitter, info: &CallInfo, state: u8) -> Result<CallState> {
    let abi = e.abi();
    let arg0 = abi.arg_regs()[0];
    let arg1 = abi.arg_regs()[1];
    let scratch = abi.dispatch_reg();

    match state {
        0 => {
            let this = receiver(info)?;
            e.load_value_direct_fixed(this, arg1)?;
        }
        1 => {
            e.gen_null_check(arg1, info.opt_flags)?;
            e.load_word_disp(arg1, OBJECT_CLASS_OFFSET, scratch);
            e.mark_possible_null_pointer_exception(info.opt_flags);
        }
        2 => {
            e.load_word_disp(scratch, CLASS_VTABLE_OFFSET, scratch);
        }
        3 => {
            e.load_word_disp(scratch, array_slot_offset(info.method.vtable_index), arg0);
        }
        4 => {
            let Some(target) = abi.invoke_target() else {
                return Ok(CallState::Done);
            };
            e.load_word_disp(arg0, METHOD_ENTRY_POINT_OFFSET, target);
        }
        _ => return Ok(CallState::Done),
    }
    Ok(CallState::Step(state + 1))
}

/// Interface calls: hidden interface method index, receiver, null check and
/// class, IMT, method at `index mod IMT_SIZE`, entry point.
fn next_interface_call_insn(e: &mut CodeEmitter, info: &CallInfo, state: u8) -> Result<CallState> {
    let abi = e.abi();
    let arg0 = abi.arg_regs()[0];
    let arg1 = abi.arg_regs()[1];
    let scratch = abi.dispatch_reg();

    match state {
        0 => {
            check_method_index(e, info)?;
            let hidden = abi.hidden_arg();
            e.load_constant(hidden, info.method.target.method_index as i32);
            if let Some(hidden_fp) = abi.hidden_fp_arg() {
                e.op_reg_copy(hidden_fp, hidden);
            }
        }
        1 => {
            let this = receiver(info)?;
            e.load_value_direct_fixed(this, arg1)?;
        }
        2 => {
            e.gen_null_check(arg1, info.opt_flags)?;
            e.load_word_disp(arg1, OBJECT_CLASS_OFFSET, scratch);
            e.mark_possible_null_pointer_exception(info.opt_flags);
        }
        3 => {
            e.load_word_disp(scratch, CLASS_IMTABLE_OFFSET, scratch);
        }
        4 => {
            let slot = info.method.vtable_index % IMT_SIZE;
            e.load_word_disp(scratch, array_slot_offset(slot), arg0);
        }
        5 => {
            let Some(target) = abi.invoke_target() else {
                return Ok(CallState::Done);
            };
            e.load_word_disp(arg0, METHOD_ENTRY_POINT_OFFSET, target);
        }
        _ => return Ok(CallState::Done),
    }
    Ok(CallState::Step(state + 1))
}

/// Slow path for every kind: the access-checking trampoline resolves the
/// method index passed in `arg0`.
fn next_invoke_insn_sp(
    e: &mut CodeEmitter,
    info: &CallInfo,
    trampoline: RuntimeEntryPoint,
    state: u8,
) -> Result<CallState> {
    if state != 0 {
        return Ok(CallState::Done);
    }
    let abi = e.abi();
    if let Some(target) = abi.invoke_target() {
        let thread = abi.thread_reg().ok_or_else(|| {
            Error::Unsupported(format!("{:?} has no thread register", abi.isa()))
        })?;
        e.load_word_disp(thread, trampoline.thread_offset(), target);
    }
    let target = info.method.target;
    if target.dex_file != e.method().dex_file {
        return Err(Error::Invariant(format!(
            "slow-path method {target} is not in the caller's dex file"
        )));
    }
    e.load_constant(abi.arg_regs()[0], target.method_index as i32);
    Ok(CallState::Step(1))
}

/// Drives one strategy's state machine for a single call site.
pub struct CallSequence<'a> {
    strategy: DispatchStrategy,
    info: &'a CallInfo,
    state: CallState,
    steps: usize,
}

impl<'a> CallSequence<'a> {
    #[must_use]
    pub fn new(strategy: DispatchStrategy, info: &'a CallInfo) -> Self {
        Self {
            strategy,
            info,
            state: CallState::START,
            steps: 0,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    #[must_use]
    pub fn info(&self) -> &'a CallInfo {
        self.info
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Emitting steps run so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Run one step; a finished sequence stays finished.
    pub fn advance(&mut self, e: &mut CodeEmitter) -> Result<()> {
        if self.state == CallState::Done {
            return Ok(());
        }
        let next = self.strategy.step(e, self.info, self.state)?;
        trace!(strategy = ?self.strategy, from = ?self.state, to = ?next, "dispatch step");
        if matches!(next, CallState::Step(_)) {
            self.steps += 1;
        }
        self.state = next;
        Ok(())
    }

    /// Run the remaining steps.
    pub fn drain(&mut self, e: &mut CodeEmitter) -> Result<()> {
        while self.state != CallState::Done {
            self.advance(e)?;
        }
        Ok(())
    }
}
