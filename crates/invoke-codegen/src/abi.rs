//! Runtime ABI constants (object layout, frame layout, entry-point table).
//!
//! These values are supplied by the runtime's object model. They are centralized
//! here so the dispatch sequences, the intrinsics and the test simulator agree
//! on a single layout.

// ── Frame Layout ──

/// Size of a virtual register slot and of every outgoing argument word.
pub const WORD_SIZE: i32 = 4;

/// The current method pointer lives at `[sp + 0]`.
pub const METHOD_PTR_OFFSET: i32 = 0;

/// Outgoing argument word `k` is stored at `[sp + OUTS_OFFSET + 4 * k]`.
///
/// Word 0 is reserved for the callee's method pointer slot, so the first
/// argument word lands one word above the frame base.
pub const OUTS_OFFSET: i32 = WORD_SIZE;

/// Number of argument words passed in registers (after the method pointer).
pub const REGISTER_ARG_WORDS: usize = 3;

/// Calls with more argument words than this use the bulk-copy range path.
pub const MAX_SMALL_FORM_WORDS: usize = 5;

/// Offset of outgoing argument word `word`.
#[must_use]
pub const fn out_arg_offset(word: usize) -> i32 {
    OUTS_OFFSET + WORD_SIZE * word as i32
}

// ── Object Model ──

/// `Object::klass_`.
pub const OBJECT_CLASS_OFFSET: i32 = 0;

/// `Array::length_`.
pub const ARRAY_LENGTH_OFFSET: i32 = 8;

/// First element of an array whose components are at most one word wide.
pub const ARRAY_DATA_OFFSET: i32 = 12;

/// `Class::vtable_`, an array of method pointers.
pub const CLASS_VTABLE_OFFSET: i32 = 0x60;

/// `Class::imtable_`, an array of [`IMT_SIZE`] method pointers.
pub const CLASS_IMTABLE_OFFSET: i32 = 0x44;

/// `ArtMethod::dex_cache_resolved_methods_`.
pub const METHOD_RESOLVED_METHODS_OFFSET: i32 = 0x14;

/// `ArtMethod::entry_point_from_compiled_code_`.
pub const METHOD_ENTRY_POINT_OFFSET: i32 = 0x28;

/// `String::value_`, the backing char array.
pub const STRING_VALUE_OFFSET: i32 = 8;

/// `String::count_`, the number of chars.
pub const STRING_COUNT_OFFSET: i32 = 12;

/// `String::offset_`, index of the first char inside `value_`.
pub const STRING_OFFSET_OFFSET: i32 = 20;

/// `Thread::peer_`, the managed `java.lang.Thread` object.
pub const THREAD_PEER_OFFSET: i32 = 0x64;

/// Number of slots in the interface method table.
pub const IMT_SIZE: u32 = 64;

/// Offset of slot `index` in an object-pointer array.
#[must_use]
pub const fn array_slot_offset(index: u32) -> i32 {
    ARRAY_DATA_OFFSET + WORD_SIZE * index as i32
}

// ── Runtime Entry Points ──

/// Start of the entry-point table inside the thread object.
pub const THREAD_ENTRYPOINT_BASE: i32 = 0x100;

/// Runtime routines reachable through the thread's entry-point table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeEntryPoint {
    Memcpy,
    StringCompareTo,
    IndexOf,
    ThrowNullPointer,
    InvokeStaticTrampolineWithAccessCheck,
    InvokeDirectTrampolineWithAccessCheck,
    InvokeSuperTrampolineWithAccessCheck,
    InvokeVirtualTrampolineWithAccessCheck,
    InvokeInterfaceTrampolineWithAccessCheck,
}

impl RuntimeEntryPoint {
    pub const ALL: [RuntimeEntryPoint; 9] = [
        Self::Memcpy,
        Self::StringCompareTo,
        Self::IndexOf,
        Self::ThrowNullPointer,
        Self::InvokeStaticTrampolineWithAccessCheck,
        Self::InvokeDirectTrampolineWithAccessCheck,
        Self::InvokeSuperTrampolineWithAccessCheck,
        Self::InvokeVirtualTrampolineWithAccessCheck,
        Self::InvokeInterfaceTrampolineWithAccessCheck,
    ];

    /// Position in the entry-point table.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Memcpy => 0,
            Self::StringCompareTo => 1,
            Self::IndexOf => 2,
            Self::ThrowNullPointer => 3,
            Self::InvokeStaticTrampolineWithAccessCheck => 4,
            Self::InvokeDirectTrampolineWithAccessCheck => 5,
            Self::InvokeSuperTrampolineWithAccessCheck => 6,
            Self::InvokeVirtualTrampolineWithAccessCheck => 7,
            Self::InvokeInterfaceTrampolineWithAccessCheck => 8,
        }
    }

    /// Byte offset of this entry from the thread register.
    #[must_use]
    pub const fn thread_offset(self) -> i32 {
        THREAD_ENTRYPOINT_BASE + WORD_SIZE * self.index() as i32
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Memcpy => "pMemcpy",
            Self::StringCompareTo => "pStringCompareTo",
            Self::IndexOf => "pIndexOf",
            Self::ThrowNullPointer => "pThrowNullPointer",
            Self::InvokeStaticTrampolineWithAccessCheck => "pInvokeStaticTrampolineWithAccessCheck",
            Self::InvokeDirectTrampolineWithAccessCheck => "pInvokeDirectTrampolineWithAccessCheck",
            Self::InvokeSuperTrampolineWithAccessCheck => "pInvokeSuperTrampolineWithAccessCheck",
            Self::InvokeVirtualTrampolineWithAccessCheck => {
                "pInvokeVirtualTrampolineWithAccessCheck"
            }
            Self::InvokeInterfaceTrampolineWithAccessCheck => {
                "pInvokeInterfaceTrampolineWithAccessCheck"
            }
        }
    }
}
