//! The code buffer and low-level emission helpers.
//!
//! Integer immediates are four little-endian bytes and are patched in place
//! for forward jumps. `FILE`/`LINE` debug opcodes are deduplicated against
//! the last emitted location and re-emitted unconditionally after branches.

use crate::{expressions::Ctx, intern::StringId};

use super::op::Opcode;

/// Width of an integer immediate in the code stream.
pub(crate) const INT_BYTES: usize = 4;

/// Sentinel for a function whose entry pc has not been recorded yet.
pub(crate) const UNEMITTED_PC: usize = usize::MAX;

/// The process-wide code buffer plus the function entry-point table.
#[derive(Debug, Default)]
pub(crate) struct Program {
    pub code: Vec<u8>,
    /// Entry pc per script function-table index; `UNEMITTED_PC` until the
    /// function's body has been emitted.
    pub function_pcs: Vec<usize>,
    last_file: Option<StringId>,
    last_line: Option<u32>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    pub fn emit_byte(&mut self, byte: u8) {
        self.code.push(byte);
    }

    pub fn emit_int(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emits `op` with a placeholder immediate, returning the patch offset.
    pub fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit(op);
        let loc = self.pos();
        self.emit_int(0);
        loc
    }

    pub fn patch_int(&mut self, loc: usize, value: i32) {
        self.code[loc..loc + INT_BYTES].copy_from_slice(&value.to_le_bytes());
    }

    /// Emits `FILE`/`LINE` info when it differs from the last emission, or
    /// unconditionally with `force` (used after branch targets, where the
    /// runtime's notion of "last" is unreliable).
    pub fn emit_location(&mut self, ctx: Ctx, force: bool) {
        if force || self.last_file != Some(ctx.file) {
            self.emit(Opcode::File);
            self.emit_int(i32::try_from(ctx.file.index()).expect("string pool index fits i32"));
        }
        self.last_file = Some(ctx.file);

        if force || self.last_line != Some(ctx.line) {
            self.emit(Opcode::Line);
            self.emit_int(i32::try_from(ctx.line).expect("line number fits i32"));
        }
        self.last_line = Some(ctx.line);
    }

    /// Grows the function table to cover `count` script functions.
    pub fn reserve_functions(&mut self, count: usize) {
        if self.function_pcs.len() < count {
            self.function_pcs.resize(count, UNEMITTED_PC);
        }
    }

    /// Drops code past `len`, resetting the location cache since the
    /// deduplication state may refer to discarded instructions.
    pub fn truncate(&mut self, len: usize) {
        self.code.truncate(len);
        self.last_file = None;
        self.last_line = None;
    }

    #[inline]
    pub fn byte_at(&self, pc: usize) -> u8 {
        self.code[pc]
    }

    #[inline]
    pub fn int_at(&self, pc: usize) -> i32 {
        let bytes: [u8; INT_BYTES] = self.code[pc..pc + INT_BYTES]
            .try_into()
            .expect("code buffer holds a whole immediate");
        i32::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_patching() {
        let mut prog = Program::new();
        prog.emit(Opcode::PushTrue);
        let loc = prog.emit_jump(Opcode::Gotoz);
        prog.emit(Opcode::PushNull);
        let target = i32::try_from(prog.pos()).unwrap();
        prog.patch_int(loc, target);

        assert_eq!(prog.byte_at(0), Opcode::PushTrue as u8);
        assert_eq!(prog.byte_at(1), Opcode::Gotoz as u8);
        assert_eq!(prog.int_at(2), target);
    }

    #[test]
    fn location_info_is_deduplicated() {
        let mut prog = Program::new();
        let file = StringId::from_index(0);
        let ctx = Ctx { file, line: 3 };
        prog.emit_location(ctx, false);
        let after_first = prog.pos();
        prog.emit_location(ctx, false);
        assert_eq!(prog.pos(), after_first, "same location emits nothing");

        prog.emit_location(Ctx { file, line: 4 }, false);
        // Only LINE differs, so only LINE is re-emitted.
        assert_eq!(prog.pos(), after_first + 1 + INT_BYTES);
    }

    #[test]
    fn truncate_resets_location_cache() {
        let mut prog = Program::new();
        let ctx = Ctx {
            file: StringId::from_index(0),
            line: 1,
        };
        prog.emit_location(ctx, false);
        let len = prog.pos();
        prog.truncate(0);
        prog.emit_location(ctx, false);
        assert_eq!(prog.pos(), len, "location is re-emitted after truncation");
    }
}
