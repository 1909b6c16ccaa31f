/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Expands pseudo-instructions (`li`, `mv`, `j`, `ble`, ...) into one or more
//! canonical RV32I instructions, and lowers real mnemonics straight through.
//! `ret` and the `halt` pseudo both become the `Halt` sentinel; the scheduler
//! and encoder turn that into `beq x0,x0,0`.

use crate::errors::AssemblyError;
use crate::rv::ast::{BOp, CanonInstr, IOp, IShiftOp, Imm, Operand, ROp, RawInstr, Reg, SOp, UOp};

/// `li` materializes into one `addi` if the value fits a signed 12-bit
/// immediate, otherwise a `lui`+`addi` pair (split via `hi20`/`lo12`).
pub fn hi20(value: i64) -> i32 {
    (((value + 0x800) >> 12) & 0xFFFFF) as i32
}

pub fn lo12(value: i64) -> i32 {
    let v = value & 0xFFF;
    if v >= 0x800 {
        (v - 0x1000) as i32
    } else {
        v as i32
    }
}

/// Expands one parsed source instruction into its canonical form(s).
pub fn expand(instr: &RawInstr) -> Result<Vec<CanonInstr>, AssemblyError> {
    let line = instr.line;
    let ops = &instr.operands;
    match instr.mnemonic.as_str() {
        "nop" => Ok(vec![CanonInstr::I {
            op: IOp::Addi,
            rd: Reg::ZERO,
            rs1: Reg::ZERO,
            imm: Imm::Value(0),
        }]),
        "ret" | "halt" => Ok(vec![CanonInstr::Halt]),
        "li" => {
            let rd = reg(ops, 0, line, "li")?;
            let imm = imm_value(ops, 1, line, "li")?;
            if (-2048..2048).contains(&imm) {
                Ok(vec![CanonInstr::I {
                    op: IOp::Addi,
                    rd,
                    rs1: Reg::ZERO,
                    imm: Imm::Value(imm),
                }])
            } else {
                Ok(vec![
                    CanonInstr::U {
                        op: UOp::Lui,
                        rd,
                        imm: Imm::Value(hi20(imm as i64)),
                    },
                    CanonInstr::I {
                        op: IOp::Addi,
                        rd,
                        rs1: rd,
                        imm: Imm::Value(lo12(imm as i64)),
                    },
                ])
            }
        }
        "mv" => single(CanonInstr::I {
            op: IOp::Addi,
            rd: reg(ops, 0, line, "mv")?,
            rs1: reg(ops, 1, line, "mv")?,
            imm: Imm::Value(0),
        }),
        "j" => single(CanonInstr::Jal {
            rd: Reg::ZERO,
            label: label(ops, 0, line, "j")?,
        }),
        "jr" => single(CanonInstr::Jalr {
            rd: Reg::ZERO,
            rs1: reg(ops, 0, line, "jr")?,
            imm: Imm::Value(0),
        }),
        "call" => single(CanonInstr::Jal {
            rd: Reg::RA,
            label: label(ops, 0, line, "call")?,
        }),
        "tail" => single(CanonInstr::Jal {
            rd: Reg::ZERO,
            label: label(ops, 0, line, "tail")?,
        }),
        "ble" => single(CanonInstr::B {
            op: BOp::Bge,
            rs1: reg(ops, 1, line, "ble")?,
            rs2: reg(ops, 0, line, "ble")?,
            label: label(ops, 2, line, "ble")?,
        }),
        "bgt" => single(CanonInstr::B {
            op: BOp::Blt,
            rs1: reg(ops, 1, line, "bgt")?,
            rs2: reg(ops, 0, line, "bgt")?,
            label: label(ops, 2, line, "bgt")?,
        }),
        "blez" => single(CanonInstr::B {
            op: BOp::Bge,
            rs1: Reg::ZERO,
            rs2: reg(ops, 0, line, "blez")?,
            label: label(ops, 1, line, "blez")?,
        }),
        "bgtz" => single(CanonInstr::B {
            op: BOp::Blt,
            rs1: Reg::ZERO,
            rs2: reg(ops, 0, line, "bgtz")?,
            label: label(ops, 1, line, "bgtz")?,
        }),
        "beqz" => single(CanonInstr::B {
            op: BOp::Beq,
            rs1: reg(ops, 0, line, "beqz")?,
            rs2: Reg::ZERO,
            label: label(ops, 1, line, "beqz")?,
        }),
        "bnez" => single(CanonInstr::B {
            op: BOp::Bne,
            rs1: reg(ops, 0, line, "bnez")?,
            rs2: Reg::ZERO,
            label: label(ops, 1, line, "bnez")?,
        }),
        "seqz" => single(CanonInstr::I {
            op: IOp::Sltiu,
            rd: reg(ops, 0, line, "seqz")?,
            rs1: reg(ops, 1, line, "seqz")?,
            imm: Imm::Value(1),
        }),
        "snez" => single(CanonInstr::R {
            op: ROp::Sltu,
            rd: reg(ops, 0, line, "snez")?,
            rs1: Reg::ZERO,
            rs2: reg(ops, 1, line, "snez")?,
        }),
        "sltz" => single(CanonInstr::R {
            op: ROp::Slt,
            rd: reg(ops, 0, line, "sltz")?,
            rs1: reg(ops, 1, line, "sltz")?,
            rs2: Reg::ZERO,
        }),
        "sgtz" => single(CanonInstr::R {
            op: ROp::Slt,
            rd: reg(ops, 0, line, "sgtz")?,
            rs1: Reg::ZERO,
            rs2: reg(ops, 1, line, "sgtz")?,
        }),
        "neg" => single(CanonInstr::R {
            op: ROp::Sub,
            rd: reg(ops, 0, line, "neg")?,
            rs1: Reg::ZERO,
            rs2: reg(ops, 1, line, "neg")?,
        }),
        "not" => single(CanonInstr::I {
            op: IOp::Xori,
            rd: reg(ops, 0, line, "not")?,
            rs1: reg(ops, 1, line, "not")?,
            imm: Imm::Value(-1),
        }),
        mnemonic => single(canon_real(mnemonic, ops, line)?),
    }
}

fn single(i: CanonInstr) -> Result<Vec<CanonInstr>, AssemblyError> {
    Ok(vec![i])
}

/// Lowers a genuine (non-pseudo) RV32I mnemonic straight to its canonical form.
fn canon_real(mnemonic: &str, ops: &[Operand], line: usize) -> Result<CanonInstr, AssemblyError> {
    macro_rules! r {
        ($op:expr) => {
            CanonInstr::R {
                op: $op,
                rd: reg(ops, 0, line, mnemonic)?,
                rs1: reg(ops, 1, line, mnemonic)?,
                rs2: reg(ops, 2, line, mnemonic)?,
            }
        };
    }
    macro_rules! i_arith {
        ($op:expr) => {
            CanonInstr::I {
                op: $op,
                rd: reg(ops, 0, line, mnemonic)?,
                rs1: reg(ops, 1, line, mnemonic)?,
                imm: operand_imm(ops, 2, line, mnemonic)?,
            }
        };
    }
    macro_rules! i_shift {
        ($op:expr) => {{
            let shamt = imm_value(ops, 2, line, mnemonic)? & 0x1F;
            CanonInstr::IShift {
                op: $op,
                rd: reg(ops, 0, line, mnemonic)?,
                rs1: reg(ops, 1, line, mnemonic)?,
                shamt: shamt as u8,
            }
        }};
    }
    macro_rules! load {
        ($op:expr) => {{
            let (base, offset) = mem(ops, 1, line, mnemonic)?;
            CanonInstr::I {
                op: $op,
                rd: reg(ops, 0, line, mnemonic)?,
                rs1: base,
                imm: offset,
            }
        }};
    }
    macro_rules! store {
        ($op:expr) => {{
            let (base, offset) = mem(ops, 1, line, mnemonic)?;
            CanonInstr::S {
                op: $op,
                rs1: base,
                rs2: reg(ops, 0, line, mnemonic)?,
                imm: offset,
            }
        }};
    }
    macro_rules! branch {
        ($op:expr) => {
            CanonInstr::B {
                op: $op,
                rs1: reg(ops, 0, line, mnemonic)?,
                rs2: reg(ops, 1, line, mnemonic)?,
                label: label(ops, 2, line, mnemonic)?,
            }
        };
    }

    Ok(match mnemonic {
        "add" => r!(ROp::Add),
        "sub" => r!(ROp::Sub),
        "sll" => r!(ROp::Sll),
        "slt" => r!(ROp::Slt),
        "sltu" => r!(ROp::Sltu),
        "xor" => r!(ROp::Xor),
        "srl" => r!(ROp::Srl),
        "sra" => r!(ROp::Sra),
        "or" => r!(ROp::Or),
        "and" => r!(ROp::And),
        "mul" => r!(ROp::Mul),
        "mulh" => r!(ROp::Mulh),
        "mulhu" => r!(ROp::Mulhu),
        "div" => r!(ROp::Div),
        "divu" => r!(ROp::Divu),
        "addi" => i_arith!(IOp::Addi),
        "slti" => i_arith!(IOp::Slti),
        "sltiu" => i_arith!(IOp::Sltiu),
        "xori" => i_arith!(IOp::Xori),
        "ori" => i_arith!(IOp::Ori),
        "andi" => i_arith!(IOp::Andi),
        "slli" => i_shift!(IShiftOp::Slli),
        "srli" => i_shift!(IShiftOp::Srli),
        "srai" => i_shift!(IShiftOp::Srai),
        "lb" => load!(IOp::Lb),
        "lh" => load!(IOp::Lh),
        "lw" => load!(IOp::Lw),
        "lbu" => load!(IOp::Lbu),
        "lhu" => load!(IOp::Lhu),
        "sb" => store!(SOp::Sb),
        "sh" => store!(SOp::Sh),
        "sw" => store!(SOp::Sw),
        "beq" => branch!(BOp::Beq),
        "bne" => branch!(BOp::Bne),
        "blt" => branch!(BOp::Blt),
        "bge" => branch!(BOp::Bge),
        "bltu" => branch!(BOp::Bltu),
        "bgeu" => branch!(BOp::Bgeu),
        "lui" => CanonInstr::U {
            op: UOp::Lui,
            rd: reg(ops, 0, line, mnemonic)?,
            imm: operand_imm(ops, 1, line, mnemonic)?,
        },
        "auipc" => CanonInstr::U {
            op: UOp::Auipc,
            rd: reg(ops, 0, line, mnemonic)?,
            imm: operand_imm(ops, 1, line, mnemonic)?,
        },
        "jal" => CanonInstr::Jal {
            rd: reg(ops, 0, line, mnemonic)?,
            label: label(ops, 1, line, mnemonic)?,
        },
        "jalr" => {
            let (base, offset) = mem(ops, 1, line, mnemonic)?;
            CanonInstr::Jalr {
                rd: reg(ops, 0, line, mnemonic)?,
                rs1: base,
                imm: offset,
            }
        }
        "ecall" => CanonInstr::Ecall,
        "ebreak" => CanonInstr::Ebreak,
        other => {
            return Err(AssemblyError::UnknownMnemonic {
                line,
                mnemonic: other.to_string(),
            });
        }
    })
}

fn reg(ops: &[Operand], idx: usize, line: usize, mnemonic: &str) -> Result<Reg, AssemblyError> {
    match ops.get(idx) {
        Some(Operand::Reg(r)) => Ok(*r),
        Some(other) => Err(AssemblyError::OperandKind {
            line,
            mnemonic: mnemonic.to_string(),
            reason: format!("expected register, found {other:?}"),
        }),
        None => Err(AssemblyError::OperandCount {
            line,
            mnemonic: mnemonic.to_string(),
            expected: idx + 1,
            found: ops.len(),
        }),
    }
}

fn label(
    ops: &[Operand],
    idx: usize,
    line: usize,
    mnemonic: &str,
) -> Result<String, AssemblyError> {
    match ops.get(idx) {
        Some(Operand::Label(s)) => Ok(s.clone()),
        Some(other) => Err(AssemblyError::OperandKind {
            line,
            mnemonic: mnemonic.to_string(),
            reason: format!("expected label, found {other:?}"),
        }),
        None => Err(AssemblyError::OperandCount {
            line,
            mnemonic: mnemonic.to_string(),
            expected: idx + 1,
            found: ops.len(),
        }),
    }
}

fn operand_imm(
    ops: &[Operand],
    idx: usize,
    line: usize,
    mnemonic: &str,
) -> Result<Imm, AssemblyError> {
    match ops.get(idx) {
        Some(Operand::Imm(v)) => Ok(v.clone()),
        Some(other) => Err(AssemblyError::OperandKind {
            line,
            mnemonic: mnemonic.to_string(),
            reason: format!("expected immediate, found {other:?}"),
        }),
        None => Err(AssemblyError::OperandCount {
            line,
            mnemonic: mnemonic.to_string(),
            expected: idx + 1,
            found: ops.len(),
        }),
    }
}

fn imm_value(
    ops: &[Operand],
    idx: usize,
    line: usize,
    mnemonic: &str,
) -> Result<i32, AssemblyError> {
    match operand_imm(ops, idx, line, mnemonic)? {
        Imm::Value(v) => Ok(v),
        other => Err(AssemblyError::OperandKind {
            line,
            mnemonic: mnemonic.to_string(),
            reason: format!("expected resolved integer, found {other:?} (labels need %hi/%lo)"),
        }),
    }
}

fn mem(
    ops: &[Operand],
    idx: usize,
    line: usize,
    mnemonic: &str,
) -> Result<(Reg, Imm), AssemblyError> {
    match ops.get(idx) {
        Some(Operand::Mem { base, offset }) => Ok((*base, offset.clone())),
        Some(other) => Err(AssemblyError::OperandKind {
            line,
            mnemonic: mnemonic.to_string(),
            reason: format!("expected imm(reg) addressing, found {other:?}"),
        }),
        None => Err(AssemblyError::OperandCount {
            line,
            mnemonic: mnemonic.to_string(),
            expected: idx + 1,
            found: ops.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rv::parser::parse_source;

    fn expand_one(src: &str) -> Vec<CanonInstr> {
        let lines = parse_source(src).unwrap();
        expand(lines[0].instruction.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn test_li_small_fits_addi() {
        let out = expand_one("li a0, 5\n");
        assert_eq!(
            out,
            vec![CanonInstr::I {
                op: IOp::Addi,
                rd: Reg::from_name("a0").unwrap(),
                rs1: Reg::ZERO,
                imm: Imm::Value(5),
            }]
        );
    }

    #[test]
    fn test_li_large_splits_lui_addi() {
        let out = expand_one("li a0, 100000\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], CanonInstr::U { op: UOp::Lui, .. }));
        assert!(matches!(out[1], CanonInstr::I { op: IOp::Addi, .. }));
    }

    #[test]
    fn test_mv_to_addi_zero() {
        let out = expand_one("mv a0, a1\n");
        assert_eq!(
            out,
            vec![CanonInstr::I {
                op: IOp::Addi,
                rd: Reg::from_name("a0").unwrap(),
                rs1: Reg::from_name("a1").unwrap(),
                imm: Imm::Value(0),
            }]
        );
    }

    #[test]
    fn test_ble_swaps_operands_into_bge() {
        let out = expand_one("ble a0, a1, .L1\n");
        assert_eq!(
            out,
            vec![CanonInstr::B {
                op: BOp::Bge,
                rs1: Reg::from_name("a1").unwrap(),
                rs2: Reg::from_name("a0").unwrap(),
                label: ".L1".to_string(),
            }]
        );
    }

    #[test]
    fn test_ret_is_halt() {
        assert_eq!(expand_one("ret\n"), vec![CanonInstr::Halt]);
    }

    #[test]
    fn test_load_with_offset() {
        let out = expand_one("lw a0, 4(sp)\n");
        assert_eq!(
            out,
            vec![CanonInstr::I {
                op: IOp::Lw,
                rd: Reg::from_name("a0").unwrap(),
                rs1: Reg::SP,
                imm: Imm::Value(4),
            }]
        );
    }
}
