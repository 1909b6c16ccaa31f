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

//! Encodes canonical RV32I instructions to their 32-bit machine words.
//! Branch/jump immediates are relative to the referencing instruction's own
//! byte PC; `%hi`/`%lo` immediates are absolute label addresses.

use std::collections::HashMap;

use crate::errors::AssemblyError;
use crate::rv::ast::{BOp, CanonInstr, IOp, IShiftOp, Imm, ROp, SOp, UOp};
use crate::rv::pseudo::{hi20, lo12};

pub const NOP_WORD: u32 = 0x0000_0013; // addi x0,x0,0
pub const HALT_WORD: u32 = 0x0000_0063; // beq x0,x0,0

fn resolve_imm(
    imm: &Imm,
    labels: &HashMap<String, u32>,
    line: usize,
) -> Result<i32, AssemblyError> {
    match imm {
        Imm::Value(v) => Ok(*v),
        Imm::Hi(label) => label_addr(label, labels, line).map(|a| hi20(a as i64)),
        Imm::Lo(label) => label_addr(label, labels, line).map(|a| lo12(a as i64)),
    }
}

fn label_addr(
    label: &str,
    labels: &HashMap<String, u32>,
    line: usize,
) -> Result<u32, AssemblyError> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| AssemblyError::UndefinedLabel {
            line,
            label: label.to_string(),
        })
}

fn check_fits(value: i64, bits: u32, line: usize) -> Result<(), AssemblyError> {
    let half = 1i64 << (bits - 1);
    if value < -half || value >= half {
        return Err(AssemblyError::ImmediateRange { line, value, bits });
    }
    Ok(())
}

/// Encodes one instruction given its byte PC and the final label table.
/// `line` is only used for diagnostics.
pub fn encode(
    instr: &CanonInstr,
    byte_pc: u32,
    labels: &HashMap<String, u32>,
    line: usize,
) -> Result<u32, AssemblyError> {
    match instr {
        CanonInstr::Halt => Ok(HALT_WORD),
        CanonInstr::Ecall => Ok(0x0000_0073),
        CanonInstr::Ebreak => Ok(0x0010_0073),
        CanonInstr::R { op, rd, rs1, rs2 } => {
            let (opc, f3, f7) = r_fields(*op);
            Ok((f7 << 25)
                | ((rs2.0 as u32) << 20)
                | ((rs1.0 as u32) << 15)
                | (f3 << 12)
                | ((rd.0 as u32) << 7)
                | opc)
        }
        CanonInstr::I { op, rd, rs1, imm } => {
            let (opc, f3) = i_fields(*op);
            let raw = resolve_imm(imm, labels, line)?;
            check_fits(raw as i64, 12, line)?;
            let imm12 = (raw as u32) & 0xFFF;
            Ok((imm12 << 20) | ((rs1.0 as u32) << 15) | (f3 << 12) | ((rd.0 as u32) << 7) | opc)
        }
        CanonInstr::IShift { op, rd, rs1, shamt } => {
            let (opc, f3, f7) = ishift_fields(*op);
            Ok((f7 << 25)
                | ((*shamt as u32) << 20)
                | ((rs1.0 as u32) << 15)
                | (f3 << 12)
                | ((rd.0 as u32) << 7)
                | opc)
        }
        CanonInstr::S { op, rs1, rs2, imm } => {
            let (opc, f3) = s_fields(*op);
            let raw = resolve_imm(imm, labels, line)?;
            check_fits(raw as i64, 12, line)?;
            let imm12 = (raw as u32) & 0xFFF;
            Ok(((imm12 >> 5) << 25)
                | ((rs2.0 as u32) << 20)
                | ((rs1.0 as u32) << 15)
                | (f3 << 12)
                | ((imm12 & 0x1F) << 7)
                | opc)
        }
        CanonInstr::B {
            op,
            rs1,
            rs2,
            label,
        } => {
            let target = label_addr(label, labels, line)?;
            let delta = target as i64 - byte_pc as i64;
            if !(-4096..4096).contains(&delta) {
                return Err(AssemblyError::BranchRange {
                    line,
                    label: label.clone(),
                    delta,
                });
            }
            let (opc, f3) = b_fields(*op);
            let imm = delta as u32;
            Ok((((imm >> 12) & 1) << 31)
                | (((imm >> 5) & 0x3F) << 25)
                | ((rs2.0 as u32) << 20)
                | ((rs1.0 as u32) << 15)
                | (f3 << 12)
                | (((imm >> 1) & 0xF) << 8)
                | (((imm >> 11) & 1) << 7)
                | opc)
        }
        CanonInstr::U { op, rd, imm } => {
            let opc = match op {
                UOp::Lui => 0x37,
                UOp::Auipc => 0x17,
            };
            let raw = resolve_imm(imm, labels, line)? as u32;
            Ok(((raw & 0xFFFFF) << 12) | ((rd.0 as u32) << 7) | opc)
        }
        CanonInstr::Jal { rd, label } => {
            let target = label_addr(label, labels, line)?;
            let delta = target as i64 - byte_pc as i64;
            if !(-(1 << 20)..(1 << 20)).contains(&delta) {
                return Err(AssemblyError::JumpRange {
                    line,
                    label: label.clone(),
                    delta,
                });
            }
            let imm = delta as u32;
            Ok((((imm >> 20) & 1) << 31)
                | (((imm >> 1) & 0x3FF) << 21)
                | (((imm >> 11) & 1) << 20)
                | (((imm >> 12) & 0xFF) << 12)
                | ((rd.0 as u32) << 7)
                | 0x6F)
        }
        CanonInstr::Jalr { rd, rs1, imm } => {
            let raw = resolve_imm(imm, labels, line)?;
            check_fits(raw as i64, 12, line)?;
            let imm12 = (raw as u32) & 0xFFF;
            Ok((imm12 << 20) | ((rs1.0 as u32) << 15) | ((rd.0 as u32) << 7) | 0x67)
        }
    }
}

fn r_fields(op: ROp) -> (u32, u32, u32) {
    match op {
        ROp::Add => (0x33, 0, 0x00),
        ROp::Sub => (0x33, 0, 0x20),
        ROp::Sll => (0x33, 1, 0x00),
        ROp::Slt => (0x33, 2, 0x00),
        ROp::Sltu => (0x33, 3, 0x00),
        ROp::Xor => (0x33, 4, 0x00),
        ROp::Srl => (0x33, 5, 0x00),
        ROp::Sra => (0x33, 5, 0x20),
        ROp::Or => (0x33, 6, 0x00),
        ROp::And => (0x33, 7, 0x00),
        ROp::Mul => (0x33, 0, 0x01),
        ROp::Mulh => (0x33, 1, 0x01),
        ROp::Mulhu => (0x33, 3, 0x01),
        ROp::Div => (0x33, 4, 0x01),
        ROp::Divu => (0x33, 5, 0x01),
    }
}

fn i_fields(op: IOp) -> (u32, u32) {
    match op {
        IOp::Addi => (0x13, 0),
        IOp::Slti => (0x13, 2),
        IOp::Sltiu => (0x13, 3),
        IOp::Xori => (0x13, 4),
        IOp::Ori => (0x13, 6),
        IOp::Andi => (0x13, 7),
        IOp::Lb => (0x03, 0),
        IOp::Lh => (0x03, 1),
        IOp::Lw => (0x03, 2),
        IOp::Lbu => (0x03, 4),
        IOp::Lhu => (0x03, 5),
    }
}

fn ishift_fields(op: IShiftOp) -> (u32, u32, u32) {
    match op {
        IShiftOp::Slli => (0x13, 1, 0x00),
        IShiftOp::Srli => (0x13, 5, 0x00),
        IShiftOp::Srai => (0x13, 5, 0x20),
    }
}

fn s_fields(op: SOp) -> (u32, u32) {
    match op {
        SOp::Sb => (0x23, 0),
        SOp::Sh => (0x23, 1),
        SOp::Sw => (0x23, 2),
    }
}

fn b_fields(op: BOp) -> (u32, u32) {
    match op {
        BOp::Beq => (0x63, 0),
        BOp::Bne => (0x63, 1),
        BOp::Blt => (0x63, 4),
        BOp::Bge => (0x63, 5),
        BOp::Bltu => (0x63, 6),
        BOp::Bgeu => (0x63, 7),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rv::ast::Reg;

    fn labels(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_encode_nop() {
        let i = CanonInstr::I {
            op: IOp::Addi,
            rd: Reg::ZERO,
            rs1: Reg::ZERO,
            imm: Imm::Value(0),
        };
        assert_eq!(encode(&i, 0, &labels(&[]), 1).unwrap(), NOP_WORD);
    }

    #[test]
    fn test_encode_halt() {
        assert_eq!(
            encode(&CanonInstr::Halt, 0, &labels(&[]), 1).unwrap(),
            HALT_WORD
        );
    }

    #[test]
    fn test_encode_mv_r0_r1() {
        // mv a0, a1 -> addi a0, a1, 0 == 0x00058513
        let a0 = Reg::from_name("a0").unwrap();
        let a1 = Reg::from_name("a1").unwrap();
        let i = CanonInstr::I {
            op: IOp::Addi,
            rd: a0,
            rs1: a1,
            imm: Imm::Value(0),
        };
        assert_eq!(encode(&i, 0, &labels(&[]), 1).unwrap(), 0x0005_8513);
    }

    #[test]
    fn test_encode_branch_relative_to_self() {
        let i = CanonInstr::B {
            op: BOp::Beq,
            rs1: Reg::ZERO,
            rs2: Reg::ZERO,
            label: "L".to_string(),
        };
        // Backward branch by 8 bytes from byte_pc=12 to label at 4.
        let word = encode(&i, 12, &labels(&[("L", 4)]), 1).unwrap();
        assert_eq!(word & 0x7F, 0x63);
    }

    #[test]
    fn test_branch_out_of_range_errors() {
        let i = CanonInstr::B {
            op: BOp::Beq,
            rs1: Reg::ZERO,
            rs2: Reg::ZERO,
            label: "L".to_string(),
        };
        let err = encode(&i, 0, &labels(&[("L", 1 << 20)]), 1).unwrap_err();
        assert!(matches!(err, AssemblyError::BranchRange { .. }));
    }

    #[test]
    fn test_hi_lo_resolution() {
        let i = CanonInstr::U {
            op: UOp::Lui,
            rd: Reg::from_name("a0").unwrap(),
            imm: Imm::Hi("foo".to_string()),
        };
        let word = encode(&i, 0, &labels(&[("foo", 0x1234)]), 1).unwrap();
        assert_eq!(word >> 12, hi20(0x1234) as u32);
    }
}
