// Call-site description handed to the invoke lowering by the MIR front end.

use std::fmt;

use super::emitter::FrameLayout;
use super::intrinsics::Intrinsic;
use super::location::{VReg, ValueLocation};
use crate::{Error, Result};

/// Identifies one dex file within the compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DexFileId(pub u32);

/// A method reference: dex file plus method index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub dex_file: DexFileId,
    pub method_index: u32,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dex{}:{}", self.dex_file.0, self.method_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeType {
    Static,
    Direct,
    Virtual,
    Super,
    Interface,
}

impl InvokeType {
    /// Whether the call passes a receiver in argument word 0.
    #[must_use]
    pub const fn has_receiver(self) -> bool {
        !matches!(self, InvokeType::Static)
    }
}

/// What the compiler knows about a direct call's code or method address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectTarget {
    /// Must be loaded at runtime.
    #[default]
    Unknown,
    /// Filled in by the linker.
    LinkerPatch,
    /// A constant address.
    Known(u32),
}

impl DirectTarget {
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, DirectTarget::Unknown)
    }
}

/// Resolution results for the invoked method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLoweringInfo {
    /// Invoke kind as written.
    pub invoke_type: InvokeType,
    /// Invoke kind after devirtualization.
    pub sharp_type: InvokeType,
    pub fast_path: bool,
    pub target: MethodRef,
    /// vtable slot for virtual calls, IMT source index for interface calls.
    pub vtable_index: u32,
    pub direct_code: DirectTarget,
    pub direct_method: DirectTarget,
}

/// Per-instruction optimization flags proven by earlier passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptFlags {
    pub ignore_null_check: bool,
    pub ignore_range_check: bool,
}

/// One invoke instruction.
///
/// `args` holds one entry per argument word. A wide value appears as two
/// consecutive entries, the low word first and the high word flagged with
/// `high_word`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallInfo {
    pub dex_pc: u32,
    pub args: Vec<ValueLocation>,
    /// Destination of the returned value, if it is used.
    pub result: Option<ValueLocation>,
    pub is_range: bool,
    pub opt_flags: OptFlags,
    pub method: MethodLoweringInfo,
    pub intrinsic: Option<Intrinsic>,
}

impl CallInfo {
    #[must_use]
    pub fn num_arg_words(&self) -> usize {
        self.args.len()
    }

    /// Copy of this call site for re-issuing from a launchpad; the receiver
    /// has already been null-checked by the inline path.
    #[must_use]
    pub fn for_launchpad(&self) -> CallInfo {
        let mut info = self.clone();
        info.opt_flags.ignore_null_check = true;
        info.intrinsic = None;
        info
    }

    /// Check the call site against the method's `frame`: every wide low word
    /// is immediately followed by its high word, and every argument and
    /// result register has a home slot.
    pub fn validate(&self, frame: &FrameLayout) -> Result<()> {
        let in_frame = |vreg: VReg, what: &str| {
            if vreg == VReg::NONE || frame.checked_vreg_offset(vreg).is_some() {
                Ok(())
            } else {
                Err(Error::Invariant(format!(
                    "{what} v{} is outside the {}-register frame",
                    vreg.0, frame.num_vregs
                )))
            }
        };
        for (i, arg) in self.args.iter().enumerate() {
            in_frame(arg.vreg, &format!("argument word {i}"))?;
        }
        if let Some(result) = self.result {
            in_frame(result.vreg, "result")?;
            if result.wide && result.vreg != VReg::NONE {
                in_frame(VReg(result.vreg.0.wrapping_add(1)), "result high word")?;
            }
        }

        let mut i = 0;
        while i < self.args.len() {
            let arg = &self.args[i];
            if arg.high_word {
                return Err(Error::Invariant(format!(
                    "argument word {i} is a high half without a low half"
                )));
            }
            if arg.wide {
                let Some(high) = self.args.get(i + 1) else {
                    return Err(Error::Invariant(format!(
                        "wide argument at word {i} is missing its high word"
                    )));
                };
                if !high.wide || !high.high_word || Some(high.vreg.0) != arg.vreg.0.checked_add(1) {
                    return Err(Error::Invariant(format!(
                        "wide argument flagged inconsistently at word {i}"
                    )));
                }
                i += 2;
            } else {
                i += 1;
            }
        }
        Ok(())
    }
}
