// Invoke lowering entry points.

use tracing::debug;

use super::call_info::{CallInfo, DirectTarget};
use super::dispatch::{CallSequence, DispatchStrategy};
use super::emitter::CodeEmitter;
use super::intrinsics::{Intrinsic, gen_intrinsic};
use super::marshal::marshal_args;
use crate::abi::METHOD_ENTRY_POINT_OFFSET;
use crate::lir::Instruction;
use crate::{Error, Result};

/// What was emitted for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSummary {
    pub strategy: DispatchStrategy,
    /// Emitting dispatch steps, interleaved and drained.
    pub dispatch_steps: usize,
    /// Index of the call instruction (also recorded as a safepoint).
    pub call_index: usize,
    /// Receiver null check emitted by the argument marshaler.
    pub null_check: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOutcome {
    Inlined(Intrinsic),
    Call(CallSummary),
}

/// Lower one invoke: expand it inline when it names an intrinsic that
/// accepts, otherwise emit the full call.
pub fn gen_invoke(e: &mut CodeEmitter, info: &CallInfo) -> Result<InvokeOutcome> {
    info.validate(&e.method().frame)?;
    if e.options().inline_intrinsics
        && let Some(intrinsic) = info.intrinsic
    {
        if gen_intrinsic(e, info, intrinsic)? {
            debug!(?intrinsic, dex_pc = info.dex_pc, "intrinsic inlined");
            return Ok(InvokeOutcome::Inlined(intrinsic));
        }
        debug!(?intrinsic, dex_pc = info.dex_pc, "intrinsic declined");
    }
    gen_invoke_no_inline(e, info).map(InvokeOutcome::Call)
}

/// Emit the ordinary call sequence: flush, dispatch interleaved with
/// argument marshaling, the call itself and the result store.
pub fn gen_invoke_no_inline(e: &mut CodeEmitter, info: &CallInfo) -> Result<CallSummary> {
    info.validate(&e.method().frame)?;
    e.flush_all_regs();
    e.lock_call_temps();

    let method = &info.method;
    let strategy = DispatchStrategy::select(method.sharp_type, method.fast_path)?;
    let mut seq = CallSequence::new(strategy, info);
    let null_check = marshal_args(e, &mut seq, strategy.needs_marshal_null_check())?;
    seq.drain(e)?;

    let abi = e.abi();
    let call = match abi.invoke_target() {
        Some(target) => Instruction::CallReg { target },
        None if strategy.is_fast_path() => {
            let sharp_direct = matches!(
                strategy,
                DispatchStrategy::StaticFast | DispatchStrategy::DirectFast
            );
            if sharp_direct && method.direct_code == DirectTarget::LinkerPatch {
                Instruction::CallRelative {
                    method: method.target,
                }
            } else {
                Instruction::CallMem {
                    base: abi.arg_regs()[0],
                    disp: METHOD_ENTRY_POINT_OFFSET,
                }
            }
        }
        None => {
            let trampoline = strategy.trampoline().ok_or_else(|| {
                Error::Invariant(format!("{strategy:?} has no trampoline"))
            })?;
            Instruction::CallThreadMem {
                offset: trampoline.thread_offset(),
            }
        }
    };
    let call_index = e.emit_call(call)?;
    e.mark_safepoint(call_index);
    e.clobber_caller_save();

    if let Some(result) = info.result {
        if result.wide {
            let ret = e.get_return_wide(result.fp);
            e.store_value_wide(result, ret)?;
        } else {
            let ret = e.get_return(result.fp);
            e.store_value(result, ret)?;
        }
    }
    e.free_call_temps();

    debug!(
        dex_pc = info.dex_pc,
        ?strategy,
        steps = seq.steps(),
        words = info.num_arg_words(),
        "invoke lowered"
    );
    Ok(CallSummary {
        strategy,
        dispatch_steps: seq.steps(),
        call_index,
        null_check,
    })
}
