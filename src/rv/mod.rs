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

//! The RV32I half of the toolchain: parse -> expand pseudo-ops -> schedule
//! NOPs for the non-forwarding pipeline -> encode to hex/listing/binary.

pub mod ast;
pub mod encoder;
pub mod hazard;
pub mod output;
pub mod parser;
pub mod pseudo;

use std::collections::{HashMap, HashSet};

use crate::errors::AssemblyError;
use ast::{CanonInstr, Directive, Imm, Reg, WordValue};
use hazard::Hazard;

pub const BYTES_PER_SLOT: u32 = 4;
pub const DEFAULT_RODATA_BASE: u32 = 0x400;
pub const DEFAULT_STACK_TOP: u32 = 0x300;

#[derive(Debug, Clone)]
pub struct AssembleConfig {
    pub rodata_base: u32,
    pub stack_top: u32,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        AssembleConfig {
            rodata_base: DEFAULT_RODATA_BASE,
            stack_top: DEFAULT_STACK_TOP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub byte_pc: u32,
    pub slot_idx: usize,
    pub word: u32,
    pub text: String,
    pub nops: u32,
    pub hazard: Hazard,
    pub labels_here: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AssembledProgram {
    pub entries: Vec<ListingEntry>,
    pub rodata: Vec<u32>,
    pub rodata_base: u32,
    pub stack_top: u32,
    pub labels: HashMap<String, u32>,
    pub halt_byte_pc: u32,
    pub total_slots: usize,
}

impl AssembledProgram {
    /// All program words (real instructions and inserted NOPs) in slot order,
    /// the input to the flat binary encoder.
    pub fn slot_words(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.total_slots);
        for e in &self.entries {
            out.push(e.word);
            for _ in 0..e.nops {
                out.push(encoder::NOP_WORD);
            }
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Text,
    Data,
    Rodata,
}

enum TextItem {
    Label(String),
    Instr {
        canon: CanonInstr,
        line: usize,
        text: String,
    },
}

/// Runs the full pipeline: parse -> classify sections -> expand pseudo-ops ->
/// schedule hazard NOPs -> bind labels -> encode.
pub fn assemble(source: &str, config: &AssembleConfig) -> Result<AssembledProgram, AssemblyError> {
    let lines = parser::parse_source(source)?;

    let mut section = Section::Text;
    let mut text_items: Vec<TextItem> = Vec::new();
    let mut rodata: Vec<u32> = Vec::new();
    let mut rodata_labels: HashMap<String, u32> = HashMap::new();
    let mut rodata_pc: u32 = 0;
    let mut pending_rodata_label: Option<String> = None;
    let mut seen_labels: HashSet<String> = HashSet::new();

    for line in &lines {
        if let Some(label) = &line.label {
            match section {
                Section::Rodata => pending_rodata_label = Some(label.clone()),
                _ => {
                    if !seen_labels.insert(label.clone()) {
                        return Err(AssemblyError::DuplicateLabel(label.clone()));
                    }
                    text_items.push(TextItem::Label(label.clone()));
                }
            }
        }
        match &line.directive {
            Some(Directive::Text) => {
                section = Section::Text;
                continue;
            }
            Some(Directive::Data) => {
                section = Section::Data;
                continue;
            }
            Some(Directive::Rodata) => {
                section = Section::Rodata;
                continue;
            }
            Some(Directive::Align) => continue,
            Some(Directive::Ignored) => continue,
            Some(Directive::Word(values)) if section == Section::Rodata => {
                if let Some(label) = pending_rodata_label.take() {
                    if !seen_labels.insert(label.clone()) {
                        return Err(AssemblyError::DuplicateLabel(label));
                    }
                    rodata_labels.insert(label, rodata_pc);
                }
                for v in values {
                    match v {
                        WordValue::Int(n) => rodata.push(*n as u32),
                        WordValue::Symbol(s) => {
                            return Err(AssemblyError::OperandKind {
                                line: line.line_number,
                                mnemonic: ".word".to_string(),
                                reason: format!(
                                    "symbolic .word value `{s}` is not supported in .rodata"
                                ),
                            });
                        }
                    }
                    rodata_pc += 4;
                }
                continue;
            }
            Some(Directive::Word(_)) => continue,
            None => {}
        }
        if let Some(label) = pending_rodata_label.take() {
            if !seen_labels.insert(label.clone()) {
                return Err(AssemblyError::DuplicateLabel(label));
            }
            rodata_labels.insert(label, rodata_pc);
        }
        if let Some(raw) = &line.instruction {
            if section != Section::Text {
                continue;
            }
            for canon in pseudo::expand(raw)? {
                text_items.push(TextItem::Instr {
                    text: render(&canon),
                    canon,
                    line: raw.line,
                });
            }
        }
    }

    let mut instructions: Vec<TextItem> = startup_stub(config.stack_top);
    instructions.extend(text_items);

    let mut insts: Vec<CanonInstr> = Vec::new();
    let mut orig_lines: Vec<usize> = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    let mut labels_by_idx: HashMap<String, usize> = HashMap::new();
    for item in instructions {
        match item {
            TextItem::Label(name) => {
                labels_by_idx.insert(name, insts.len());
            }
            TextItem::Instr { canon, line, text } => {
                insts.push(canon);
                orig_lines.push(line);
                texts.push(text);
            }
        }
    }

    if insts.is_empty() {
        return Ok(AssembledProgram {
            entries: Vec::new(),
            rodata,
            rodata_base: config.rodata_base,
            stack_top: config.stack_top,
            labels: HashMap::new(),
            halt_byte_pc: 0,
            total_slots: 0,
        });
    }

    let (nops, hazards) = hazard::compute_nops(&insts);

    let n = insts.len();
    let mut byte_pcs = Vec::with_capacity(n);
    let mut pc = 0u32;
    for i in 0..n {
        byte_pcs.push(pc);
        pc += BYTES_PER_SLOT * (1 + nops[i]);
    }
    let total_bytes = pc;
    let halt_byte_pc = byte_pcs[n - 1];

    let mut labels: HashMap<String, u32> = HashMap::new();
    for (name, offset) in &rodata_labels {
        labels.insert(name.clone(), config.rodata_base + offset);
    }
    for (name, idx) in &labels_by_idx {
        let addr = if *idx < n {
            byte_pcs[*idx]
        } else {
            total_bytes
        };
        labels.insert(name.clone(), addr);
    }

    let idx_to_labels: HashMap<usize, Vec<String>> = {
        let mut map: HashMap<usize, Vec<String>> = HashMap::new();
        for (name, idx) in &labels_by_idx {
            map.entry(*idx).or_default().push(name.clone());
        }
        map
    };

    let mut entries = Vec::with_capacity(n);
    for i in 0..n {
        let word = encoder::encode(&insts[i], byte_pcs[i], &labels, orig_lines[i])?;
        entries.push(ListingEntry {
            byte_pc: byte_pcs[i],
            slot_idx: (byte_pcs[i] / BYTES_PER_SLOT) as usize,
            word,
            text: texts[i].clone(),
            nops: nops[i],
            hazard: hazards[i].clone(),
            labels_here: idx_to_labels.get(&i).cloned().unwrap_or_default(),
        });
    }

    let total_slots = (halt_byte_pc / BYTES_PER_SLOT) as usize + 1;

    Ok(AssembledProgram {
        entries,
        rodata,
        rodata_base: config.rodata_base,
        stack_top: config.stack_top,
        labels,
        halt_byte_pc,
        total_slots,
    })
}

/// `li sp, STACK_TOP` injected ahead of the program text, same materialization
/// rule as the `li` pseudo-op (fits in 12 bits -> addi, else lui+addi).
fn startup_stub(stack_top: u32) -> Vec<TextItem> {
    if stack_top == 0 {
        return Vec::new();
    }
    let value = stack_top as i64;
    let canon = if (-2048..2048).contains(&value) {
        vec![CanonInstr::I {
            op: ast::IOp::Addi,
            rd: Reg::SP,
            rs1: Reg::ZERO,
            imm: Imm::Value(value as i32),
        }]
    } else {
        vec![
            CanonInstr::U {
                op: ast::UOp::Lui,
                rd: Reg::SP,
                imm: Imm::Value(pseudo::hi20(value)),
            },
            CanonInstr::I {
                op: ast::IOp::Addi,
                rd: Reg::SP,
                rs1: Reg::SP,
                imm: Imm::Value(pseudo::lo12(value)),
            },
        ]
    };
    canon
        .into_iter()
        .map(|c| TextItem::Instr {
            text: render(&c),
            line: 0,
            canon: c,
        })
        .collect()
}

fn render(instr: &CanonInstr) -> String {
    fn r(reg: Reg) -> &'static str {
        reg.abi_name()
    }
    fn imm_str(imm: &Imm) -> String {
        match imm {
            Imm::Value(v) => v.to_string(),
            Imm::Hi(l) => format!("%hi({l})"),
            Imm::Lo(l) => format!("%lo({l})"),
        }
    }
    match instr {
        CanonInstr::R { op, rd, rs1, rs2 } => {
            format!("{op:?} {}, {}, {}", r(*rd), r(*rs1), r(*rs2)).to_lowercase()
        }
        CanonInstr::I { op, rd, rs1, imm } => {
            let is_load = matches!(
                op,
                ast::IOp::Lb | ast::IOp::Lh | ast::IOp::Lw | ast::IOp::Lbu | ast::IOp::Lhu
            );
            if is_load {
                format!("{op:?} {}, {}({})", r(*rd), imm_str(imm), r(*rs1)).to_lowercase()
            } else {
                format!("{op:?} {}, {}, {}", r(*rd), r(*rs1), imm_str(imm)).to_lowercase()
            }
        }
        CanonInstr::IShift { op, rd, rs1, shamt } => {
            format!("{op:?} {}, {}, {}", r(*rd), r(*rs1), shamt).to_lowercase()
        }
        CanonInstr::S { op, rs1, rs2, imm } => {
            format!("{op:?} {}, {}({})", r(*rs2), imm_str(imm), r(*rs1)).to_lowercase()
        }
        CanonInstr::B {
            op,
            rs1,
            rs2,
            label,
        } => format!("{op:?} {}, {}, {}", r(*rs1), r(*rs2), label).to_lowercase(),
        CanonInstr::U { op, rd, imm } => {
            format!("{op:?} {}, {}", r(*rd), imm_str(imm)).to_lowercase()
        }
        CanonInstr::Jal { rd, label } => format!("jal {}, {}", r(*rd), label),
        CanonInstr::Jalr { rd, rs1, imm } => {
            format!("jalr {}, {}({})", r(*rd), imm_str(imm), r(*rs1))
        }
        CanonInstr::Ecall => "ecall".to_string(),
        CanonInstr::Ebreak => "ebreak".to_string(),
        CanonInstr::Halt => "(halt)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_simple_program_places_halt_last() {
        let src = "addi a0, x0, 1\nret\n";
        let config = AssembleConfig {
            rodata_base: 0x400,
            stack_top: 0,
        };
        let prog = assemble(src, &config).unwrap();
        assert_eq!(prog.entries.last().unwrap().word, encoder::HALT_WORD);
    }

    #[test]
    fn test_assemble_injects_stack_stub_when_nonzero() {
        let src = "ret\n";
        let prog = assemble(src, &AssembleConfig::default()).unwrap();
        // stub (addi sp,x0,0x300) + ret == 2 real instructions, no RAW hazard between them.
        assert_eq!(prog.entries.len(), 2);
        assert_eq!(prog.entries[0].nops, 0);
    }

    #[test]
    fn test_assemble_hazard_inserts_nops_between_dependent_adds() {
        let src = "addi a0, a0, 1\naddi a0, a0, 1\nret\n";
        let prog = assemble(
            src,
            &AssembleConfig {
                rodata_base: 0x400,
                stack_top: 0,
            },
        )
        .unwrap();
        assert_eq!(prog.entries[0].nops, 2);
        assert_eq!(prog.entries[0].hazard, Hazard::Dist1);
    }

    #[test]
    fn test_assemble_branch_to_label() {
        let src = "loop:\naddi a0, a0, -1\nbnez a0, loop\nret\n";
        let prog = assemble(
            src,
            &AssembleConfig {
                rodata_base: 0x400,
                stack_top: 0,
            },
        )
        .unwrap();
        assert_eq!(prog.labels.get("loop"), Some(&0));
    }

    #[test]
    fn test_assemble_rodata_words() {
        let src = ".rodata\nfoo: .word 42\n.text\nret\n";
        let prog = assemble(src, &AssembleConfig::default()).unwrap();
        assert_eq!(prog.rodata, vec![42]);
        assert_eq!(prog.labels.get("foo"), Some(&prog.rodata_base));
    }
}
