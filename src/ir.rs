use crate::opcodes;

/// Intermediate representation for parsed JVM classes and methods.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Class {
    pub(crate) name: String,
    pub(crate) methods: Vec<Method>,
    pub(crate) artifact_index: i64,
}

/// Intermediate representation for a method and its bytecode.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Method {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access: MethodAccess,
    pub(crate) instructions: Vec<Instruction>,
}

/// Raw method access flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct MethodAccess {
    pub(crate) flags: u16,
}

/// Bytecode instruction captured for rewriting.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Instruction {
    pub(crate) offset: u32,
    pub(crate) opcode: u8,
    pub(crate) kind: InstructionKind,
}

/// Instruction kinds the redirector distinguishes.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum InstructionKind {
    Invoke(CallSite),
    Other,
}

/// Call site extracted from bytecode, or built as a replacement for one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CallSite {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) kind: CallKind,
    pub(crate) offset: u32,
}

/// Invocation kind of a call instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

impl CallKind {
    pub(crate) fn opcode(self) -> u8 {
        match self {
            CallKind::Virtual => opcodes::INVOKEVIRTUAL,
            CallKind::Interface => opcodes::INVOKEINTERFACE,
            CallKind::Special => opcodes::INVOKESPECIAL,
            CallKind::Static => opcodes::INVOKESTATIC,
        }
    }

    pub(crate) fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            opcodes::INVOKEVIRTUAL => Some(CallKind::Virtual),
            opcodes::INVOKEINTERFACE => Some(CallKind::Interface),
            opcodes::INVOKESPECIAL => Some(CallKind::Special),
            opcodes::INVOKESTATIC => Some(CallKind::Static),
            _ => None,
        }
    }
}

/// Read access to a single instruction.
pub(crate) trait InsnNode {
    fn opcode(&self) -> u8;
    fn call_site(&self) -> Option<&CallSite>;
}

/// The parts of a method body the redirector reads, plus its one mutation.
pub(crate) trait MethodNode {
    type Insn: InsnNode;

    fn access_flags(&self) -> u16;
    fn name(&self) -> &str;
    fn descriptor(&self) -> &str;
    fn instructions(&self) -> &[Self::Insn];
    /// Replace the call at `index` with `replacement`, dropping the original.
    fn replace_call(&mut self, index: usize, replacement: CallSite);

    fn is_synthetic(&self) -> bool {
        self.access_flags() & opcodes::ACC_SYNTHETIC != 0
    }
}

/// A class as seen by the redirector.
pub(crate) trait ClassNode {
    type Method: MethodNode;

    fn name(&self) -> &str;
    fn methods(&self) -> &[Self::Method];
    fn methods_mut(&mut self) -> &mut [Self::Method];
}

impl InsnNode for Instruction {
    fn opcode(&self) -> u8 {
        self.opcode
    }

    fn call_site(&self) -> Option<&CallSite> {
        match &self.kind {
            InstructionKind::Invoke(call) => Some(call),
            InstructionKind::Other => None,
        }
    }
}

impl MethodNode for Method {
    type Insn = Instruction;

    fn access_flags(&self) -> u16 {
        self.access.flags
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    fn replace_call(&mut self, index: usize, mut replacement: CallSite) {
        let Some(slot) = self.instructions.get_mut(index) else {
            return;
        };
        replacement.offset = slot.offset;
        *slot = Instruction {
            offset: slot.offset,
            opcode: replacement.kind.opcode(),
            kind: InstructionKind::Invoke(replacement),
        };
    }
}

impl ClassNode for Class {
    type Method = Method;

    fn name(&self) -> &str {
        &self.name
    }

    fn methods(&self) -> &[Method] {
        &self.methods
    }

    fn methods_mut(&mut self) -> &mut [Method] {
        &mut self.methods
    }
}
