#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]

pub mod abi;
pub mod codegen;
pub mod error;
pub mod lir;
pub mod target;

/// Test harness module for writing unit and integration tests.
///
/// This module is only available when running tests or when the
/// `test-harness` feature is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use codegen::{
    CallInfo, CallSummary, CodeEmitter, CompilerOptions, DexFileId, DirectTarget, EmittedCode,
    FrameLayout, Intrinsic, InvokeOutcome, InvokeType, MethodContext, MethodLoweringInfo,
    MethodRef, OptFlags, PromotionMap, ValueLocation, VReg, gen_invoke, gen_invoke_no_inline,
};
pub use error::{Error, Result};
pub use lir::{Instruction, Label, Opcode};
pub use target::{InstructionSet, Reg, RegClass, TargetAbi};
