//! Opcode definitions.
//!
//! Single-byte opcodes; integer immediates follow as four little-endian
//! bytes, except `Call`, whose argument count is one byte. The `Display`
//! form is the disassembler mnemonic.

use strum::{Display, FromRepr};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Opcode {
    PushNull,
    PushTrue,
    PushFalse,
    /// int immediate: character code.
    PushChar,
    /// int immediate: number pool index.
    PushNumber,
    /// int immediate: string pool index.
    PushString,
    /// int immediate: function table index.
    PushFunc,
    /// int immediate: extern registry index.
    PushExternFunc,
    /// int immediate: element count; consumes that many stack values.
    PushArrayBlock,
    /// Pushes the last return value, or null when none has been set.
    PushRetval,
    /// Three int immediates: instance size, initializer count, and the
    /// nominal tag index; reads `(index, value)` pairs from the stack.
    PushStruct,

    StringLen,
    ArrayLen,

    StringGet,
    ArrayGet,
    ArraySet,
    /// int immediate: member layout index.
    StructGet,
    /// int immediate: member layout index.
    StructSet,

    Add,
    Sub,
    Mul,
    Div,
    /// Integer remainder; a zero divisor is a runtime error.
    Mod,
    Lt,
    Gt,
    Lte,
    Gte,
    Land,
    Lor,
    Neg,
    Not,
    Equ,

    Read,
    Write,

    /// int immediate: absolute target pc.
    Goto,
    /// int immediate: absolute target pc; pops a bool and jumps when false.
    Gotoz,

    /// int immediate: global slot.
    Set,
    /// int immediate: global slot.
    Get,
    /// int immediate: frame-relative slot (negative for arguments).
    Setlocal,
    /// int immediate: frame-relative slot (negative for arguments).
    Getlocal,

    /// byte immediate: argument count.
    Call,
    Return,
    ReturnValue,

    AtomicEnable,
    AtomicDisable,

    /// int immediate: string pool index of the source file label.
    File,
    /// int immediate: 1-based source line.
    Line,

    Halt,
}
