//! A small LIR interpreter for checking what emitted call sequences do.
//!
//! The machine models one method frame, a word-addressed heap with classes,
//! objects and strings, the thread's entry-point table and a fixed set of
//! callee methods. Calls are not executed; they are recorded as
//! [`CallEvent`]s and answered by a callee model, after which every
//! caller-save register holds [`CLOBBER`].

use std::collections::HashMap;
use std::fmt;

use crate::abi::{
    ARRAY_DATA_OFFSET, ARRAY_LENGTH_OFFSET, CLASS_IMTABLE_OFFSET, CLASS_VTABLE_OFFSET, IMT_SIZE,
    METHOD_ENTRY_POINT_OFFSET, METHOD_PTR_OFFSET, METHOD_RESOLVED_METHODS_OFFSET,
    OBJECT_CLASS_OFFSET, RuntimeEntryPoint, STRING_COUNT_OFFSET, STRING_OFFSET_OFFSET,
    STRING_VALUE_OFFSET, THREAD_PEER_OFFSET, array_slot_offset, out_arg_offset,
};
use crate::codegen::{EmittedCode, MethodContext, VReg};
use crate::lir::{AluOp, BarrierKind, Instruction, MemSize, UnaryOp, VecMove};
use crate::target::{InstructionSet, Reg, TargetAbi};

pub const SP_BASE: u32 = 0x0010_0000;
pub const THREAD_BASE: u32 = 0x0020_0000;
pub const HELPER_BASE: u32 = 0xF000_0000;
/// Value left in caller-save registers after a call.
pub const CLOBBER: u32 = 0xDEAD_BEEF;
/// Default return value of a callee without a model.
pub const DEFAULT_RETURN: u64 = 0x0000_0007_0000_002A;

const METHOD_BASE: u32 = 0x0030_0000;
const CODE_BASE: u32 = 0x0040_0000;
const RESOLVED_TABLE: u32 = 0x0050_0000;
const CALLER_METHOD: u32 = 0x0051_0000;
const PEER_OBJECT: u32 = 0x0052_0000;
const HEAP_BASE: u32 = 0x0060_0000;
/// Accesses below this address fault as null dereferences.
const NULL_PAGE: u32 = 0x1000;
const OUT_WORDS_RECORDED: usize = 24;
const STEP_LIMIT: usize = 10_000;

/// Address of the method object for method index `index`.
#[must_use]
pub const fn method_object_addr(index: u32) -> u32 {
    METHOD_BASE + index * 0x40
}

/// Entry point of the compiled code of method `index`.
#[must_use]
pub const fn code_addr(index: u32) -> u32 {
    CODE_BASE + index * 0x10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    NullPointer,
    IndexOutOfBounds,
}

/// What a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// Managed method by index, reached directly or through a trampoline.
    Method(u32),
    Helper(RuntimeEntryPoint),
}

/// Machine state observed at a call instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub target: CallTarget,
    /// Trampoline the call went through, for slow-path invokes.
    pub trampoline: Option<RuntimeEntryPoint>,
    /// Contents of arg0 (the callee method, or the method index for
    /// trampolines).
    pub method_arg: u32,
    /// Contents of arg1..arg3.
    pub args: [u32; 3],
    /// Outgoing words 0.. as stored in the caller's frame.
    pub outs: Vec<u32>,
    /// Hidden interface argument (its floating mirror where the target has one).
    pub hidden: u32,
    /// Instruction index of the call.
    pub at: usize,
}

impl CallEvent {
    /// The first `words` argument words as the callee sees them: words 0-2
    /// from registers, the rest from the outgoing area.
    #[must_use]
    pub fn arg_words(&self, words: usize) -> Vec<u32> {
        (0..words)
            .map(|k| if k < 3 { self.args[k] } else { self.outs[k] })
            .collect()
    }
}

/// How a modelled callee finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeResult {
    Return(u64),
    Throw(Exception),
}

pub type CalleeModel = fn(&CallEvent, &Machine) -> CalleeResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub exception: Option<Exception>,
    pub calls: Vec<CallEvent>,
    /// Launchpads entered.
    pub retries: usize,
    pub barriers: Vec<BarrierKind>,
    /// `(value, object)` pairs passed to card marking.
    pub gc_cards: Vec<(u32, u32)>,
}

impl Outcome {
    /// Managed calls, in order.
    #[must_use]
    pub fn method_calls(&self) -> Vec<&CallEvent> {
        self.calls
            .iter()
            .filter(|c| matches!(c.target, CallTarget::Method(_)))
            .collect()
    }
}

pub struct Machine {
    abi: &'static dyn TargetAbi,
    core: [u32; 32],
    fp: [[u32; 4]; 32],
    memory: HashMap<u32, u8>,
    carry: bool,
    next_object: u32,
    models: HashMap<u32, CalleeModel>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("isa", &self.abi.isa())
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// A machine with the frame at [`SP_BASE`], the caller's method in the
    /// method slot, the entry-point table filled in and `num_methods`
    /// resolvable methods.
    pub fn new(isa: InstructionSet, num_methods: u32) -> Self {
        let abi = isa.abi();
        let mut m = Self {
            abi,
            core: [0; 32],
            fp: [[0; 4]; 32],
            memory: HashMap::new(),
            carry: false,
            next_object: HEAP_BASE,
            models: HashMap::new(),
        };
        m.set_reg(abi.stack_pointer(), SP_BASE);
        if let Some(thread) = abi.thread_reg() {
            m.set_reg(thread, THREAD_BASE);
        }
        for ep in RuntimeEntryPoint::ALL {
            m.write_word(
                THREAD_BASE.wrapping_add(ep.thread_offset() as u32),
                HELPER_BASE + ep.index() as u32,
            );
        }
        m.write_word(THREAD_BASE + THREAD_PEER_OFFSET as u32, PEER_OBJECT);
        m.write_word(SP_BASE + METHOD_PTR_OFFSET as u32, CALLER_METHOD);
        m.write_word(
            CALLER_METHOD + METHOD_RESOLVED_METHODS_OFFSET as u32,
            RESOLVED_TABLE,
        );
        for index in 0..num_methods {
            let method = method_object_addr(index);
            m.write_word(
                RESOLVED_TABLE.wrapping_add(array_slot_offset(index) as u32),
                method,
            );
            m.write_word(method + METHOD_ENTRY_POINT_OFFSET as u32, code_addr(index));
        }
        m
    }

    #[must_use]
    pub fn peer_object() -> u32 {
        PEER_OBJECT
    }

    // ── State access ──

    pub fn reg(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Core(n) => self.core[usize::from(n)],
            Reg::Fp(n) => self.fp[usize::from(n)][0],
        }
    }

    pub fn set_reg(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::Core(n) => self.core[usize::from(n)] = value,
            Reg::Fp(n) => self.fp[usize::from(n)][0] = value,
        }
    }

    pub fn read_word(&self, addr: u32) -> u32 {
        u32::from_le_bytes([0, 1, 2, 3].map(|i| self.read_byte(addr.wrapping_add(i))))
    }

    pub fn read_half(&self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr.wrapping_add(1))])
    }

    fn read_byte(&self, addr: u32) -> u8 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.memory.insert(addr.wrapping_add(i as u32), byte);
        }
    }

    pub fn write_half(&mut self, addr: u32, value: u16) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.memory.insert(addr.wrapping_add(i as u32), byte);
        }
    }

    fn vreg_addr(ctx: &MethodContext, vreg: VReg) -> u32 {
        SP_BASE.wrapping_add(ctx.frame.vreg_offset(vreg) as u32)
    }

    /// Home slot contents of `vreg`.
    pub fn vreg(&self, ctx: &MethodContext, vreg: VReg) -> u32 {
        self.read_word(Self::vreg_addr(ctx, vreg))
    }

    pub fn set_vreg(&mut self, ctx: &MethodContext, vreg: VReg, value: u32) {
        self.write_word(Self::vreg_addr(ctx, vreg), value);
    }

    /// Outgoing argument word `word` as stored in the frame.
    pub fn out_word(&self, word: usize) -> u32 {
        self.read_word(SP_BASE.wrapping_add(out_arg_offset(word) as u32))
    }

    // ── Heap ──

    fn alloc(&mut self, bytes: u32) -> u32 {
        let addr = self.next_object;
        self.next_object += (bytes + 15) & !15;
        addr
    }

    /// A class whose vtable holds `vtable` (method indices) and whose IMT
    /// maps `imt` slots to method indices.
    pub fn new_class(&mut self, vtable: &[u32], imt: &[(u32, u32)]) -> u32 {
        let class = self.alloc(0x80);
        let vt = self.new_array(&vtable.iter().map(|i| method_object_addr(*i)).collect::<Vec<_>>());
        let mut slots = vec![0; IMT_SIZE as usize];
        for (slot, method) in imt {
            slots[(*slot % IMT_SIZE) as usize] = method_object_addr(*method);
        }
        let table = self.new_array(&slots);
        self.write_word(class + CLASS_VTABLE_OFFSET as u32, vt);
        self.write_word(class + CLASS_IMTABLE_OFFSET as u32, table);
        class
    }

    pub fn new_object(&mut self, class: u32) -> u32 {
        let obj = self.alloc(0x20);
        self.write_word(obj + OBJECT_CLASS_OFFSET as u32, class);
        obj
    }

    pub fn set_class(&mut self, object: u32, class: u32) {
        self.write_word(object + OBJECT_CLASS_OFFSET as u32, class);
    }

    fn new_array(&mut self, words: &[u32]) -> u32 {
        let array = self.alloc(ARRAY_DATA_OFFSET as u32 + 4 * words.len() as u32);
        self.write_word(array + ARRAY_LENGTH_OFFSET as u32, words.len() as u32);
        for (i, w) in words.iter().enumerate() {
            self.write_word(array.wrapping_add(array_slot_offset(i as u32) as u32), *w);
        }
        array
    }

    /// A string whose chars start `offset` chars into its backing array.
    pub fn new_string_at(&mut self, text: &str, offset: u32) -> u32 {
        let chars: Vec<u16> = text.encode_utf16().collect();
        let total = offset + chars.len() as u32;
        let value = self.alloc(ARRAY_DATA_OFFSET as u32 + 2 * total);
        self.write_word(value + ARRAY_LENGTH_OFFSET as u32, total);
        for (i, c) in chars.iter().enumerate() {
            let at = value + ARRAY_DATA_OFFSET as u32 + 2 * (offset + i as u32);
            self.write_half(at, *c);
        }
        let string = self.alloc(0x20);
        self.write_word(string + STRING_VALUE_OFFSET as u32, value);
        self.write_word(string + STRING_COUNT_OFFSET as u32, chars.len() as u32);
        self.write_word(string + STRING_OFFSET_OFFSET as u32, offset);
        string
    }

    pub fn new_string(&mut self, text: &str) -> u32 {
        self.new_string_at(text, 0)
    }

    /// UTF-16 contents of a string object.
    pub fn string_chars(&self, string: u32) -> Vec<u16> {
        let value = self.read_word(string + STRING_VALUE_OFFSET as u32);
        let count = self.read_word(string + STRING_COUNT_OFFSET as u32);
        let offset = self.read_word(string + STRING_OFFSET_OFFSET as u32);
        (0..count)
            .map(|i| self.read_half(value + ARRAY_DATA_OFFSET as u32 + 2 * (offset + i)))
            .collect()
    }

    /// Answer calls to method `index` with `model`.
    pub fn define_method(&mut self, index: u32, model: CalleeModel) {
        self.models.insert(index, model);
    }

    // ── Execution ──

    /// Run `code` from its first instruction until the main body ends, an
    /// exception is raised, or control runs off the deferred blocks.
    pub fn run(&mut self, code: &EmittedCode) -> Outcome {
        let mut outcome = Outcome::default();
        let mut pc = 0;
        let mut steps = 0;
        while pc < code.instructions.len() && pc != code.main_len {
            steps += 1;
            assert!(steps <= STEP_LIMIT, "step limit exceeded at {pc}");
            let at = pc;
            pc += 1;
            match self.step(code, at, &mut outcome) {
                Ok(Some(next)) => pc = next,
                Ok(None) => {}
                Err(exception) => {
                    outcome.exception = Some(exception);
                    break;
                }
            }
        }
        outcome
    }

    fn load(&self, addr: u32) -> Result<u32, Exception> {
        if addr < NULL_PAGE {
            return Err(Exception::NullPointer);
        }
        Ok(self.read_word(addr))
    }

    fn store(&mut self, addr: u32, value: u32) -> Result<(), Exception> {
        if addr < NULL_PAGE {
            return Err(Exception::NullPointer);
        }
        self.write_word(addr, value);
        Ok(())
    }

    fn ea(&self, base: Reg, disp: i32) -> u32 {
        self.reg(base).wrapping_add(disp as u32)
    }

    fn jump(code: &EmittedCode, target: crate::lir::Label) -> usize {
        code.label_position(target)
            .unwrap_or_else(|| panic!("jump to undefined label L{}", target.index()))
    }

    fn alu(&mut self, op: AluOp, lhs: u32, rhs: u32) -> u32 {
        match op {
            AluOp::Add => {
                let (sum, carry) = lhs.overflowing_add(rhs);
                self.carry = carry;
                sum
            }
            AluOp::Adc => {
                let (partial, c1) = lhs.overflowing_add(rhs);
                let (sum, c2) = partial.overflowing_add(u32::from(self.carry));
                self.carry = c1 || c2;
                sum
            }
            AluOp::Sub => lhs.wrapping_sub(rhs),
            AluOp::And => lhs & rhs,
            AluOp::Or => lhs | rhs,
            AluOp::Xor => lhs ^ rhs,
            AluOp::Asr => ((lhs as i32) >> (rhs & 31)) as u32,
            AluOp::Lsr => lhs >> (rhs & 31),
            AluOp::Lsl => lhs << (rhs & 31),
        }
    }

    fn vec_load(&mut self, dst: Reg, addr: u32, kind: VecMove) {
        let lanes = match kind {
            VecMove::Aligned | VecMove::Unaligned => 0..4,
            VecMove::Lo => 0..2,
            VecMove::Hi => 2..4,
        };
        if kind == VecMove::Aligned {
            assert_eq!(addr & 0xF, 0, "aligned vector load from {addr:#x}");
        }
        let base = lanes.start;
        for lane in lanes {
            self.fp[usize::from(dst.number())][lane] =
                self.read_word(addr + 4 * (lane - base) as u32);
        }
    }

    fn vec_store(&mut self, src: Reg, addr: u32, kind: VecMove) {
        let lanes = match kind {
            VecMove::Aligned | VecMove::Unaligned => 0..4,
            VecMove::Lo => 0..2,
            VecMove::Hi => 2..4,
        };
        if kind == VecMove::Aligned {
            assert_eq!(addr & 0xF, 0, "aligned vector store to {addr:#x}");
        }
        let base = lanes.start;
        for lane in lanes {
            let value = self.fp[usize::from(src.number())][lane];
            self.write_word(addr + 4 * (lane - base) as u32, value);
        }
    }

    /// Execute one instruction; returns a branch target when control moves.
    fn step(
        &mut self,
        code: &EmittedCode,
        at: usize,
        outcome: &mut Outcome,
    ) -> Result<Option<usize>, Exception> {
        match &code.instructions[at] {
            Instruction::Label(_) => {}
            Instruction::IntrinsicRetry => outcome.retries += 1,
            Instruction::LoadConst { dst, value } => self.set_reg(*dst, *value as u32),
            Instruction::Copy { dst, src } => self.set_reg(*dst, self.reg(*src)),
            Instruction::Load {
                dst,
                base,
                disp,
                size,
            } => {
                let addr = self.ea(*base, *disp);
                let value = self.load(addr)?;
                let value = match size {
                    MemSize::Word => value,
                    MemSize::UnsignedHalf => u32::from(self.read_half(addr)),
                };
                self.set_reg(*dst, value);
            }
            Instruction::Store {
                base,
                disp,
                src,
                size,
            } => {
                let addr = self.ea(*base, *disp);
                match size {
                    MemSize::Word => self.store(addr, self.reg(*src))?,
                    MemSize::UnsignedHalf => self.write_half(addr, self.reg(*src) as u16),
                }
            }
            Instruction::LoadWide { lo, hi, base, disp } => {
                let addr = self.ea(*base, *disp);
                let (l, h) = (self.load(addr)?, self.load(addr + 4)?);
                self.set_reg(*lo, l);
                self.set_reg(*hi, h);
            }
            Instruction::StoreWide { base, disp, lo, hi } => {
                let addr = self.ea(*base, *disp);
                self.store(addr, self.reg(*lo))?;
                self.store(addr + 4, self.reg(*hi))?;
            }
            Instruction::LoadIndexed {
                dst,
                base,
                index,
                scale,
                disp,
                size,
            } => {
                let addr = self
                    .reg(*base)
                    .wrapping_add(self.reg(*index) << scale)
                    .wrapping_add(*disp as u32);
                let value = match size {
                    MemSize::Word => self.load(addr)?,
                    MemSize::UnsignedHalf => {
                        self.load(addr)?;
                        u32::from(self.read_half(addr))
                    }
                };
                self.set_reg(*dst, value);
            }
            Instruction::StoreIndexed {
                base,
                index,
                scale,
                src,
                size,
            } => {
                let addr = self.reg(*base).wrapping_add(self.reg(*index) << scale);
                match size {
                    MemSize::Word => self.store(addr, self.reg(*src))?,
                    MemSize::UnsignedHalf => self.write_half(addr, self.reg(*src) as u16),
                }
            }
            Instruction::LoadThread { dst, offset } => {
                let value = self.read_word(THREAD_BASE.wrapping_add(*offset as u32));
                self.set_reg(*dst, value);
            }
            Instruction::LoadCodeAddress { dst, method } => {
                self.set_reg(*dst, code_addr(method.method_index));
            }
            Instruction::LoadMethodAddress { dst, method } => {
                self.set_reg(*dst, method_object_addr(method.method_index));
            }
            Instruction::AluRegReg { op, dst, src } => {
                let value = self.alu(*op, self.reg(*dst), self.reg(*src));
                self.set_reg(*dst, value);
            }
            Instruction::AluRegRegReg { op, dst, lhs, rhs } => {
                let value = self.alu(*op, self.reg(*lhs), self.reg(*rhs));
                self.set_reg(*dst, value);
            }
            Instruction::AluRegImm { op, dst, src, imm } => {
                let value = self.alu(*op, self.reg(*src), *imm as u32);
                self.set_reg(*dst, value);
            }
            Instruction::Unary { op, dst, src } => {
                let v = self.reg(*src);
                let value = match op {
                    UnaryOp::Rev => v.swap_bytes(),
                    UnaryOp::Revsh => i32::from((v as u16).swap_bytes() as i16) as u32,
                };
                self.set_reg(*dst, value);
            }
            Instruction::BranchCmp {
                cond,
                lhs,
                rhs,
                target,
            } => {
                if cond.holds(self.reg(*lhs), self.reg(*rhs)) {
                    return Ok(Some(Self::jump(code, *target)));
                }
            }
            Instruction::BranchCmpImm {
                cond,
                reg,
                imm,
                target,
            } => {
                if cond.holds(self.reg(*reg), *imm as u32) {
                    return Ok(Some(Self::jump(code, *target)));
                }
            }
            Instruction::BranchCmpMem {
                cond,
                reg,
                base,
                disp,
                target,
            } => {
                let mem = self.load(self.ea(*base, *disp))?;
                if cond.holds(self.reg(*reg), mem) {
                    return Ok(Some(Self::jump(code, *target)));
                }
            }
            Instruction::BranchMemImm {
                cond,
                base,
                disp,
                imm,
                target,
            } => {
                let mem = self.load(self.ea(*base, *disp))?;
                if cond.holds(mem, *imm as u32) {
                    return Ok(Some(Self::jump(code, *target)));
                }
            }
            Instruction::Jump { target } => return Ok(Some(Self::jump(code, *target))),
            Instruction::BlockLoad { base, first, count } => {
                let addr = self.reg(*base);
                for k in 0..*count {
                    let value = self.load(addr + 4 * u32::from(k))?;
                    self.set_reg(Reg::Fp(first.number() + k), value);
                }
            }
            Instruction::BlockStore { base, first, count } => {
                let addr = self.reg(*base);
                for k in 0..*count {
                    let value = self.reg(Reg::Fp(first.number() + k));
                    self.store(addr + 4 * u32::from(k), value)?;
                }
            }
            Instruction::VecLoad {
                dst,
                base,
                disp,
                kind,
            } => {
                let addr = self.ea(*base, *disp);
                self.vec_load(*dst, addr, *kind);
            }
            Instruction::VecStore {
                base,
                disp,
                src,
                kind,
            } => {
                let addr = self.ea(*base, *disp);
                self.vec_store(*src, addr, *kind);
            }
            Instruction::CallReg { target } => {
                let addr = self.reg(*target);
                self.call(addr, at, outcome)?;
            }
            Instruction::CallMem { base, disp } => {
                let addr = self.load(self.ea(*base, *disp))?;
                self.call(addr, at, outcome)?;
            }
            Instruction::CallThreadMem { offset } => {
                let addr = self.read_word(THREAD_BASE.wrapping_add(*offset as u32));
                self.call(addr, at, outcome)?;
            }
            Instruction::CallRelative { method } => {
                self.call(code_addr(method.method_index), at, outcome)?;
            }
            Instruction::Barrier(kind) => outcome.barriers.push(*kind),
            Instruction::MarkGcCard { value, object } => {
                outcome.gc_cards.push((self.reg(*value), self.reg(*object)));
            }
        }
        Ok(None)
    }

    fn call(&mut self, addr: u32, at: usize, outcome: &mut Outcome) -> Result<(), Exception> {
        let abi = self.abi;
        let [a0, a1, a2, a3] = *abi.arg_regs();
        let hidden = abi
            .hidden_fp_arg()
            .map_or_else(|| self.reg(abi.hidden_arg()), |r| self.reg(r));
        let mut event = CallEvent {
            target: CallTarget::Helper(RuntimeEntryPoint::Memcpy),
            trampoline: None,
            method_arg: self.reg(a0),
            args: [self.reg(a1), self.reg(a2), self.reg(a3)],
            outs: (0..OUT_WORDS_RECORDED).map(|k| self.out_word(k)).collect(),
            hidden,
            at,
        };

        let result = if let Some(entry) = addr
            .checked_sub(HELPER_BASE)
            .and_then(|i| RuntimeEntryPoint::ALL.get(i as usize).copied())
        {
            event.target = CallTarget::Helper(entry);
            match entry {
                RuntimeEntryPoint::InvokeStaticTrampolineWithAccessCheck
                | RuntimeEntryPoint::InvokeDirectTrampolineWithAccessCheck
                | RuntimeEntryPoint::InvokeSuperTrampolineWithAccessCheck
                | RuntimeEntryPoint::InvokeVirtualTrampolineWithAccessCheck
                | RuntimeEntryPoint::InvokeInterfaceTrampolineWithAccessCheck => {
                    event.target = CallTarget::Method(event.method_arg);
                    event.trampoline = Some(entry);
                    self.invoke_method(event.method_arg, &event)
                }
                _ => self.run_helper(entry, &event),
            }
        } else if let Some(index) = addr
            .checked_sub(CODE_BASE)
            .filter(|off| off % 0x10 == 0)
            .map(|off| off / 0x10)
        {
            event.target = CallTarget::Method(index);
            self.invoke_method(index, &event)
        } else {
            panic!("call to unmapped address {addr:#x} at {at}");
        };
        outcome.calls.push(event);

        for reg in abi.caller_save() {
            match reg {
                Reg::Core(n) => self.core[usize::from(*n)] = CLOBBER,
                Reg::Fp(n) => self.fp[usize::from(*n)] = [CLOBBER; 4],
            }
        }
        match result {
            CalleeResult::Return(value) => {
                let (lo, hi) = abi.return_regs(false);
                self.set_reg(lo, value as u32);
                self.set_reg(hi, (value >> 32) as u32);
                let (flo, fhi) = abi.return_regs(true);
                if flo.is_fp() {
                    self.set_reg(flo, value as u32);
                    self.set_reg(fhi, (value >> 32) as u32);
                }
                Ok(())
            }
            CalleeResult::Throw(exception) => Err(exception),
        }
    }

    fn invoke_method(&self, index: u32, event: &CallEvent) -> CalleeResult {
        match self.models.get(&index) {
            Some(model) => model(event, self),
            None => CalleeResult::Return(DEFAULT_RETURN),
        }
    }

    fn run_helper(&mut self, entry: RuntimeEntryPoint, event: &CallEvent) -> CalleeResult {
        let [a0, a1, a2] = [event.method_arg, event.args[0], event.args[1]];
        match entry {
            RuntimeEntryPoint::Memcpy => {
                for k in (0..a2).step_by(4) {
                    let word = self.read_word(a1 + k);
                    self.write_word(a0 + k, word);
                }
                CalleeResult::Return(u64::from(a0))
            }
            RuntimeEntryPoint::ThrowNullPointer => CalleeResult::Throw(Exception::NullPointer),
            RuntimeEntryPoint::IndexOf => {
                let chars = self.string_chars(a0);
                let start = (a2 as i32).max(0) as usize;
                let found = chars
                    .iter()
                    .enumerate()
                    .skip(start)
                    .find(|(_, c)| u32::from(**c) == a1)
                    .map_or(-1, |(i, _)| i as i32);
                CalleeResult::Return(u64::from(found as u32))
            }
            RuntimeEntryPoint::StringCompareTo => {
                if a1 == 0 {
                    return CalleeResult::Throw(Exception::NullPointer);
                }
                CalleeResult::Return(u64::from(
                    compare_utf16(&self.string_chars(a0), &self.string_chars(a1)) as u32,
                ))
            }
            _ => unreachable!("trampolines are dispatched as method calls"),
        }
    }
}

/// `String.compareTo` on UTF-16 contents.
#[must_use]
pub fn compare_utf16(a: &[u16], b: &[u16]) -> i32 {
    for (x, y) in a.iter().zip(b) {
        if x != y {
            return i32::from(*x) - i32::from(*y);
        }
    }
    a.len() as i32 - b.len() as i32
}

// ── Callee models ──

/// `String.charAt(I)C` with the receiver in word 0 and the index in word 1.
pub fn string_char_at(event: &CallEvent, m: &Machine) -> CalleeResult {
    let [this, index, _] = event.args;
    if this == 0 {
        return CalleeResult::Throw(Exception::NullPointer);
    }
    let chars = m.string_chars(this);
    match chars.get(index as usize) {
        Some(c) => CalleeResult::Return(u64::from(*c)),
        None => CalleeResult::Throw(Exception::IndexOutOfBounds),
    }
}

/// `String.indexOf(I)I`, including supplementary code points.
pub fn string_index_of(event: &CallEvent, m: &Machine) -> CalleeResult {
    let [this, code_point, _] = event.args;
    if this == 0 {
        return CalleeResult::Throw(Exception::NullPointer);
    }
    let text = String::from_utf16_lossy(&m.string_chars(this));
    let found = char::from_u32(code_point).and_then(|c| {
        let mut utf16_index = 0;
        for ch in text.chars() {
            if ch == c {
                return Some(utf16_index);
            }
            utf16_index += ch.len_utf16() as i32;
        }
        None
    });
    CalleeResult::Return(u64::from(found.unwrap_or(-1) as u32))
}

/// `String.compareTo(String)I`.
pub fn string_compare_to(event: &CallEvent, m: &Machine) -> CalleeResult {
    let [this, other, _] = event.args;
    if this == 0 || other == 0 {
        return CalleeResult::Throw(Exception::NullPointer);
    }
    CalleeResult::Return(u64::from(
        compare_utf16(&m.string_chars(this), &m.string_chars(other)) as u32,
    ))
}
