//! Bytecode disassembler: one `pc: mnemonic operands` line per instruction.

use std::io::{self, Write};

use crate::{intern::StringId, script::Script, value::format_g};

use super::{builder::INT_BYTES, op::Opcode};

impl Script {
    /// Writes a listing of the whole code buffer to `out`.
    pub fn disassemble(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut pc = 0;
        while pc < self.prog.code.len() {
            write!(out, "{pc}: ")?;
            let byte = self.prog.byte_at(pc);
            pc += 1;
            let Some(op) = Opcode::from_repr(byte) else {
                writeln!(out, "?? ({byte})")?;
                continue;
            };

            match op {
                Opcode::PushChar => {
                    let code = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    writeln!(out, "{op} '{}'", char::from(code as u8))?;
                }
                Opcode::PushNumber => {
                    let index = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    let value = self
                        .compile
                        .interns
                        .get_number(crate::intern::NumberId::from_index(index as u32));
                    writeln!(out, "{op} {}", format_g(value))?;
                }
                Opcode::PushString | Opcode::File => {
                    let index = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    let value = self.compile.interns.get_str(StringId::from_index(index as u32));
                    writeln!(out, "{op} '{value}'")?;
                }
                Opcode::PushFunc => {
                    let index = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    let entry = usize::try_from(index)
                        .ok()
                        .and_then(|i| self.prog.function_pcs.get(i).copied());
                    match entry {
                        Some(entry) if entry != super::builder::UNEMITTED_PC => {
                            writeln!(out, "{op} {index} (pc = {entry})")?;
                        }
                        _ => writeln!(out, "{op} {index}")?,
                    }
                }
                Opcode::PushExternFunc => {
                    let index = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    let name = usize::try_from(index).ok().and_then(|i| self.externs.name(i));
                    writeln!(out, "{op} {} (id={index})", name.unwrap_or("?"))?;
                }
                Opcode::PushStruct => {
                    let size = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    let ninit = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    let tag = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    writeln!(out, "{op} size={size} num_init={ninit} tag={tag}")?;
                }
                Opcode::PushArrayBlock
                | Opcode::StructGet
                | Opcode::StructSet
                | Opcode::Goto
                | Opcode::Gotoz
                | Opcode::Set
                | Opcode::Get
                | Opcode::Setlocal
                | Opcode::Getlocal
                | Opcode::Line => {
                    let value = self.prog.int_at(pc);
                    pc += INT_BYTES;
                    writeln!(out, "{op} {value}")?;
                }
                Opcode::Call => {
                    let nargs = self.prog.byte_at(pc);
                    pc += 1;
                    writeln!(out, "{op} nargs={nargs}")?;
                }
                _ => writeln!(out, "{op}")?,
            }
        }
        Ok(())
    }
}
