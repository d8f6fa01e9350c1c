//! Invoke lowering: call-site description in, LIR instructions out.
//!
//! The pieces, bottom-up:
//!
//! - [`location`]: where values live and how they are moved into registers
//! - [`emitter`]: the per-method instruction buffer, labels and deferred blocks
//! - [`helpers`]: calls into the runtime entry-point table
//! - [`dispatch`]: the call-sequence state machines that resolve the callee
//! - [`marshal`]: argument placement, interleaved with dispatch steps
//! - [`intrinsics`]: inline expansions with launchpads back to the real call
//! - [`invoke`]: the entry points tying it all together

mod call_info;
pub mod dispatch;
mod emitter;
pub mod helpers;
mod ins;
pub mod intrinsics;
mod invoke;
pub mod location;
pub mod marshal;
mod promotion;
mod regpool;

pub use call_info::{
    CallInfo, DexFileId, DirectTarget, InvokeType, MethodLoweringInfo, MethodRef, OptFlags,
};
pub use dispatch::{CallSequence, CallState, DispatchStrategy};
pub use emitter::{
    CodeEmitter, CompilerOptions, EmittedCode, FixupKind, FrameLayout, LinkerFixup, MethodContext,
};
pub use helpers::HelperArg;
pub use ins::flush_ins;
pub use intrinsics::{Intrinsic, gen_intrinsic};
pub use invoke::{CallSummary, InvokeOutcome, gen_invoke, gen_invoke_no_inline};
pub use location::{LocKind, RegStorage, VReg, ValueLocation};
pub use promotion::{PromotionEntry, PromotionMap};
pub use regpool::RegisterPool;
