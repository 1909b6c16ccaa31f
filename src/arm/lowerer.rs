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

//! Lowers a parsed ARM source into RV32I assembly text, one line at a time.
//!
//! Condition codes don't exist on RV32I, so a `cmp`/`cmn` followed by a
//! conditional branch gets merged into a single compare-and-branch
//! instruction with operands swapped as needed (`ble` after `cmp r2,r3`
//! becomes `bge a3,a2,.L4`). Everything else the lowerer can't translate
//! is passed through as an `[UNTRANSLATED]` comment rather than failing
//! the whole file, with a matching `tracing::warn!`.

use std::collections::{HashMap, HashSet};

use crate::arm::ast::{
    ArmDirective, ArmInstr, ArmLine, ArmOperand, ArmReg, MemOffset, MemOperand, ShiftKind,
};
use crate::errors::AssemblyError;

/// A soft warning raised while lowering (stale/missing `cmp`, unresolved
/// literal pool entry, unrecognized mnemonic). Never fatal: the caller gets
/// both the translated text and this list back from [`crate::arm::translate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerWarning {
    pub line: usize,
    pub message: String,
}

/// Scratch registers used by multi-instruction lowerings (rsb, bic, ror,
/// smlal, register/reg-shift addressing). `SCRATCH_3` coincides with the RV
/// target for ARM's `pc`, so it must not be reused within one lowered ARM
/// instruction's expansion if that instruction also reads `pc`.
const SCRATCH_1: &str = "t4";
const SCRATCH_2: &str = "t5";
const SCRATCH_3: &str = "t6";

const DROP_DIRECTIVES: &[&str] = &[
    ".cpu",
    ".eabi_attribute",
    ".arch",
    ".syntax",
    ".arm",
    ".thumb",
    ".fpu",
    ".code",
    ".force_thumb",
    ".thumb_func",
];

fn cond_branch(mnem: &str) -> Option<(&'static str, bool)> {
    Some(match mnem {
        "beq" => ("beq", false),
        "bne" => ("bne", false),
        "blt" => ("blt", false),
        "bge" => ("bge", false),
        "bgt" => ("blt", true),
        "ble" => ("bge", true),
        "blo" => ("bltu", false),
        "bls" => ("bgeu", true),
        "bhi" => ("bltu", true),
        "bhs" => ("bgeu", false),
        "bcs" => ("bgeu", false),
        "bcc" => ("bltu", false),
        "bpl" => ("bge", false),
        "bmi" => ("blt", false),
        _ => return None,
    })
}

fn shift_ops(mnem: &str) -> Option<(&'static str, &'static str)> {
    Some(match mnem {
        "lsl" => ("slli", "sll"),
        "lsr" => ("srli", "srl"),
        "asr" => ("srai", "sra"),
        _ => return None,
    })
}

/// Maps an ARM register (ABI aliases already resolved by the parser) onto
/// its RV32I counterpart, preserving argument/saved/scratch roles.
fn rv_reg(r: ArmReg) -> &'static str {
    match r.0 {
        0 => "a0",
        1 => "a1",
        2 => "a2",
        3 => "a3",
        4 => "a4",
        5 => "a5",
        6 => "a6",
        7 => "a7",
        8 => "s1",
        9 => "s2",
        10 => "s3",
        11 => "s4",
        12 => "t0",
        13 => "sp",
        14 => "ra",
        15 => "t6",
        16 => "s0", // fp
        other => unreachable!("ARM register index out of range: {other}"),
    }
}

fn is_blank(line: &ArmLine) -> bool {
    line.label.is_none() && line.instruction.is_none() && line.directive.is_none()
}

fn is_label_only(line: &ArmLine) -> bool {
    line.label.is_some() && line.instruction.is_none() && line.directive.is_none()
}

fn single_word_arg(line: &ArmLine) -> Option<String> {
    let d = line.directive.as_ref()?;
    if d.name.eq_ignore_ascii_case(".word") && d.args.len() == 1 {
        Some(d.args[0].clone())
    } else {
        None
    }
}

fn is_word_directive(line: &ArmLine) -> bool {
    line.directive
        .as_ref()
        .is_some_and(|d| d.name.eq_ignore_ascii_case(".word"))
}

fn is_align_directive(line: &ArmLine) -> bool {
    line.directive
        .as_ref()
        .is_some_and(|d| d.name.eq_ignore_ascii_case(".align"))
}

fn looks_like_symbol(s: &str) -> bool {
    s.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '.' || c == '_')
}

pub struct LowerCtx {
    cmp: Option<(String, String)>,
    pool: HashMap<String, String>,
    num_pool: HashMap<String, String>,
    suppressed: HashSet<usize>,
    out: Vec<String>,
    pub warnings: Vec<LowerWarning>,
}

impl LowerCtx {
    pub fn new() -> Self {
        LowerCtx {
            cmp: None,
            pool: HashMap::new(),
            num_pool: HashMap::new(),
            suppressed: HashSet::new(),
            out: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Finds `.Lx:` labels that are only ever followed by a single `.word`
    /// (optionally through a `.align`) and not by a run of further `.word`s
    /// — those are PC-relative literal pool entries, not data arrays, and
    /// get inlined at every load site instead of emitted as a label.
    pub fn scan_literal_pool(&mut self, lines: &[ArmLine]) {
        let n = lines.len();
        for i in 0..n {
            let Some(label) = &lines[i].label else {
                continue;
            };
            if !is_label_only(&lines[i]) || !label.starts_with(".L") {
                continue;
            }
            let label = label.clone();

            let mut j = i + 1;
            while j < n && is_blank(&lines[j]) {
                j += 1;
            }
            let mut align_idx = None;
            if j < n && is_align_directive(&lines[j]) {
                align_idx = Some(j);
                j += 1;
                while j < n && is_blank(&lines[j]) {
                    j += 1;
                }
            }
            let Some(word_val) = (j < n).then(|| single_word_arg(&lines[j])).flatten() else {
                continue;
            };

            let mut k = j + 1;
            while k < n && is_blank(&lines[k]) {
                k += 1;
            }
            if k < n && is_word_directive(&lines[k]) {
                continue; // a run of .word is a data array, not a literal pool slot
            }

            self.suppressed.insert(i);
            if let Some(a) = align_idx {
                self.suppressed.insert(a);
            }
            self.suppressed.insert(j);
            if looks_like_symbol(&word_val) {
                self.pool.insert(label, word_val);
            } else {
                self.num_pool.insert(label, word_val);
            }
        }
    }

    pub fn lower_program(&mut self, lines: &[ArmLine]) -> Result<String, AssemblyError> {
        self.emit_header();
        for (i, line) in lines.iter().enumerate() {
            if self.suppressed.contains(&i) {
                continue;
            }
            self.lower_line(line)?;
        }
        Ok(self.out.join("\n") + "\n")
    }

    fn emit(&mut self, s: impl Into<String>) {
        self.out.push(s.into());
    }

    fn warn(&mut self, line: usize, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(line, "{message}");
        self.emit(format!("\t# [WARNING] {message}"));
        self.warnings.push(LowerWarning { line, message });
    }

    fn emit_header(&mut self) {
        self.emit("\t.option nopic");
        self.emit("\t.attribute arch, \"rv32i2p0\"");
        self.emit("\t.attribute unaligned_access, 0");
        self.emit("\t.attribute stack_align, 16");
    }

    fn lower_line(&mut self, line: &ArmLine) -> Result<(), AssemblyError> {
        if let Some(label) = &line.label {
            self.emit(format!("{label}:"));
        }
        if let Some(instr) = &line.instruction {
            self.lower_instr(instr)?;
        } else if let Some(dir) = &line.directive {
            self.lower_directive(dir);
        }
        Ok(())
    }

    fn lower_directive(&mut self, d: &ArmDirective) {
        let lower = d.name.to_ascii_lowercase();
        if DROP_DIRECTIVES.contains(&lower.as_str()) {
            return;
        }
        if lower == ".global" || lower == ".globl" {
            self.emit(format!("\t.globl\t{}", d.args.join(", ")));
        } else if lower == ".file" {
            self.emit("\t.file\t\"translated_from_arm.s\"");
        } else if d.args.is_empty() {
            self.emit(format!("\t{}", d.name));
        } else {
            self.emit(format!("\t{} {}", d.name, d.args.join(", ")));
        }
    }

    fn reg(&self, instr: &ArmInstr, idx: usize) -> Result<ArmReg, AssemblyError> {
        match instr.operands.get(idx) {
            Some(ArmOperand::Reg(r)) => Ok(*r),
            other => Err(AssemblyError::OperandKind {
                line: instr.line,
                mnemonic: instr.mnemonic.clone(),
                reason: format!("expected a register operand, found {other:?}"),
            }),
        }
    }

    fn label_op(&self, instr: &ArmInstr, idx: usize) -> Result<String, AssemblyError> {
        match instr.operands.get(idx) {
            Some(ArmOperand::Label(s)) => Ok(s.clone()),
            other => Err(AssemblyError::OperandKind {
                line: instr.line,
                mnemonic: instr.mnemonic.clone(),
                reason: format!("expected a branch target, found {other:?}"),
            }),
        }
    }

    fn reg_list_op(&self, instr: &ArmInstr, idx: usize) -> Result<Vec<ArmReg>, AssemblyError> {
        match instr.operands.get(idx) {
            Some(ArmOperand::RegList(regs)) => Ok(regs.clone()),
            other => Err(AssemblyError::OperandKind {
                line: instr.line,
                mnemonic: instr.mnemonic.clone(),
                reason: format!("expected a register list, found {other:?}"),
            }),
        }
    }

    fn lower_instr(&mut self, instr: &ArmInstr) -> Result<(), AssemblyError> {
        let line = instr.line;
        let mnem = instr.mnemonic.as_str();
        let ops = &instr.operands;

        match mnem {
            "b" => {
                self.emit(format!("\tj\t{}", self.label_op(instr, 0)?));
                self.cmp = None;
                return Ok(());
            }
            "bl" => {
                self.emit(format!("\tcall\t{}", self.label_op(instr, 0)?));
                return Ok(());
            }
            "bx" => {
                let r = if ops.is_empty() {
                    "ra".to_string()
                } else {
                    rv_reg(self.reg(instr, 0)?).to_string()
                };
                if r == "ra" {
                    self.emit("\tret");
                } else {
                    self.emit(format!("\tjr\t{r}"));
                }
                self.cmp = None;
                return Ok(());
            }
            "nop" => {
                self.emit("\tnop");
                return Ok(());
            }
            "swi" | "svc" => {
                self.emit(format!("\tecall\t# {mnem}"));
                return Ok(());
            }
            _ => {}
        }

        if let Some((rv_br, swap)) = cond_branch(mnem) {
            let label = self.label_op(instr, 0)?;
            if let Some((rs1, rs2)) = self.cmp.clone() {
                let (rs1, rs2) = if swap { (rs2, rs1) } else { (rs1, rs2) };
                self.emit(format!("\t{rv_br}\t{rs1},{rs2},{label}"));
                self.cmp = None;
            } else {
                self.warn(
                    line,
                    format!("`{mnem}` has no preceding cmp, comparing against zero"),
                );
                self.emit(format!("\t{rv_br}\tzero,zero,{label}"));
            }
            return Ok(());
        }

        if mnem == "cmp" || mnem == "cmn" {
            let rs1 = rv_reg(self.reg(instr, 0)?).to_string();
            match ops.get(1) {
                Some(ArmOperand::Imm(0)) => self.cmp = Some((rs1, "zero".to_string())),
                Some(ArmOperand::Imm(v)) => {
                    self.emit(format!("\tli\tt4,{v}"));
                    self.cmp = Some((rs1, SCRATCH_1.to_string()));
                }
                Some(ArmOperand::Reg(r)) => self.cmp = Some((rs1, rv_reg(*r).to_string())),
                other => {
                    return Err(AssemblyError::OperandKind {
                        line,
                        mnemonic: mnem.to_string(),
                        reason: format!("expected register or immediate, found {other:?}"),
                    });
                }
            }
            return Ok(());
        }

        if mnem == "mov" {
            let rd = rv_reg(self.reg(instr, 0)?).to_string();
            match ops.get(1) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\tli\t{rd},{v}")),
                Some(ArmOperand::Reg(r)) => self.emit(format!("\tmv\t{rd},{}", rv_reg(*r))),
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if mnem == "mvn" {
            let rd = rv_reg(self.reg(instr, 0)?).to_string();
            match ops.get(1) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\tli\t{rd},{}", !*v)),
                Some(ArmOperand::Reg(r)) => self.emit(format!("\tnot\t{rd},{}", rv_reg(*r))),
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if matches!(mnem, "add" | "adds") {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\taddi\t{rd},{rn},{v}")),
                Some(ArmOperand::Reg(r)) => self.emit(format!("\tadd\t{rd},{rn},{}", rv_reg(*r))),
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if matches!(mnem, "sub" | "subs") {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\taddi\t{rd},{rn},{}", -*v)),
                Some(ArmOperand::Reg(r)) => self.emit(format!("\tsub\t{rd},{rn},{}", rv_reg(*r))),
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if matches!(mnem, "rsb" | "rsbs") {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(0)) => self.emit(format!("\tneg\t{rd},{rn}")),
                Some(ArmOperand::Imm(v)) => {
                    self.emit(format!("\tli\tt4,{v}"));
                    self.emit(format!("\tsub\t{rd},{SCRATCH_1},{rn}"));
                }
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if matches!(mnem, "mul" | "muls") {
            let (rd, rn, rm) = (
                rv_reg(self.reg(instr, 0)?),
                rv_reg(self.reg(instr, 1)?),
                rv_reg(self.reg(instr, 2)?),
            );
            self.emit(format!("\tmul\t{rd},{rn},{rm}"));
            return Ok(());
        }

        if matches!(mnem, "smull" | "smulls") {
            let (rdlo, rdhi, rn, rm) = (
                rv_reg(self.reg(instr, 0)?),
                rv_reg(self.reg(instr, 1)?),
                rv_reg(self.reg(instr, 2)?),
                rv_reg(self.reg(instr, 3)?),
            );
            self.emit(format!("\tmul\t{rdlo},{rn},{rm}"));
            self.emit(format!("\tmulh\t{rdhi},{rn},{rm}"));
            return Ok(());
        }

        if matches!(mnem, "umull" | "umulls") {
            let (rdlo, rdhi, rn, rm) = (
                rv_reg(self.reg(instr, 0)?),
                rv_reg(self.reg(instr, 1)?),
                rv_reg(self.reg(instr, 2)?),
                rv_reg(self.reg(instr, 3)?),
            );
            self.emit(format!("\tmul\t{rdlo},{rn},{rm}"));
            self.emit(format!("\tmulhu\t{rdhi},{rn},{rm}"));
            return Ok(());
        }

        if matches!(mnem, "smlal" | "smlals") {
            let (rdlo, rdhi, rn, rm) = (
                rv_reg(self.reg(instr, 0)?),
                rv_reg(self.reg(instr, 1)?),
                rv_reg(self.reg(instr, 2)?),
                rv_reg(self.reg(instr, 3)?),
            );
            self.emit(format!("\tmul\tt5,{rn},{rm}"));
            self.emit(format!("\tmulh\tt6,{rn},{rm}"));
            self.emit(format!("\tadd\t{rdlo},{rdlo},{SCRATCH_2}"));
            self.emit(format!("\tsltu\t{SCRATCH_2},{rdlo},{SCRATCH_2}"));
            self.emit(format!("\tadd\t{rdhi},{rdhi},{SCRATCH_2}"));
            self.emit(format!("\tadd\t{rdhi},{rdhi},{SCRATCH_3}"));
            return Ok(());
        }

        if mnem == "sdiv" {
            let (rd, rn, rm) = (
                rv_reg(self.reg(instr, 0)?),
                rv_reg(self.reg(instr, 1)?),
                rv_reg(self.reg(instr, 2)?),
            );
            self.emit(format!("\tdiv\t{rd},{rn},{rm}"));
            return Ok(());
        }

        if mnem == "udiv" {
            let (rd, rn, rm) = (
                rv_reg(self.reg(instr, 0)?),
                rv_reg(self.reg(instr, 1)?),
                rv_reg(self.reg(instr, 2)?),
            );
            self.emit(format!("\tdivu\t{rd},{rn},{rm}"));
            return Ok(());
        }

        if matches!(mnem, "and" | "ands") {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\tandi\t{rd},{rn},{v}")),
                Some(ArmOperand::Reg(r)) => self.emit(format!("\tand\t{rd},{rn},{}", rv_reg(*r))),
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if matches!(mnem, "orr" | "orrs") {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\tori\t{rd},{rn},{v}")),
                Some(ArmOperand::Reg(r)) => self.emit(format!("\tor\t{rd},{rn},{}", rv_reg(*r))),
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if matches!(mnem, "eor" | "eors") {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\txori\t{rd},{rn},{v}")),
                Some(ArmOperand::Reg(r)) => self.emit(format!("\txor\t{rd},{rn},{}", rv_reg(*r))),
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if mnem == "bic" {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\tandi\t{rd},{rn},{}", !*v)),
                Some(ArmOperand::Reg(r)) => {
                    self.emit(format!("\tnot\tt4,{}", rv_reg(*r)));
                    self.emit(format!("\tand\t{rd},{rn},{SCRATCH_1}"));
                }
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if let Some((imm_op, reg_op)) = shift_ops(mnem) {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(v)) => self.emit(format!("\t{imm_op}\t{rd},{rn},{v}")),
                Some(ArmOperand::Reg(r)) => {
                    self.emit(format!("\t{reg_op}\t{rd},{rn},{}", rv_reg(*r)))
                }
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if mnem == "ror" {
            let (rd, rn) = (rv_reg(self.reg(instr, 0)?), rv_reg(self.reg(instr, 1)?));
            match ops.get(2) {
                Some(ArmOperand::Imm(amt)) => {
                    self.emit(format!("\tsrli\tt4,{rn},{amt}"));
                    self.emit(format!("\tslli\t{rd},{rn},{}", 32 - amt));
                    self.emit(format!("\tor\t{rd},{rd},{SCRATCH_1}"));
                }
                Some(ArmOperand::Reg(r)) => {
                    let amt = rv_reg(*r);
                    self.emit(format!("\tsrl\tt4,{rn},{amt}"));
                    self.emit("\tli\tt5,32".to_string());
                    self.emit(format!("\tsub\t{SCRATCH_2},{SCRATCH_2},{amt}"));
                    self.emit(format!("\tsll\t{rd},{rn},{SCRATCH_2}"));
                    self.emit(format!("\tor\t{rd},{rd},{SCRATCH_1}"));
                }
                other => return Err(bad_operand(line, mnem, other)),
            }
            return Ok(());
        }

        if let Some(rv_op) = load_op(mnem) {
            let rd = rv_reg(self.reg(instr, 0)?).to_string();
            if let Some(ArmOperand::Label(name)) = ops.get(1) {
                if name.starts_with(".L") {
                    self.lower_literal_pool_load(line, &rd, name);
                    return Ok(());
                }
            }
            let mem = expect_mem(instr, 1)?;
            let post_delta = post_indexed_delta(instr, 2);
            self.emit_load(rv_op, &rd, mem, post_delta, line)?;
            return Ok(());
        }

        if let Some(rv_op) = store_op(mnem) {
            let rs = rv_reg(self.reg(instr, 0)?).to_string();
            let mem = expect_mem(instr, 1)?;
            let post_delta = post_indexed_delta(instr, 2);
            self.emit_store(rv_op, &rs, mem, post_delta, line)?;
            return Ok(());
        }

        if mnem == "push" {
            let regs = self.reg_list_op(instr, 0)?;
            let n = regs.len() as i32;
            self.emit(format!("\taddi\tsp,sp,{}", -4 * n));
            for (i, r) in regs.iter().enumerate() {
                self.emit(format!("\tsw\t{},{}(sp)", rv_reg(*r), 4 * i));
            }
            return Ok(());
        }

        if mnem == "pop" {
            let regs = self.reg_list_op(instr, 0)?;
            let n = regs.len();
            for (i, r) in regs.iter().enumerate() {
                self.emit(format!("\tlw\t{},{}(sp)", rv_reg(*r), 4 * i));
            }
            self.emit(format!("\taddi\tsp,sp,{}", 4 * n));
            if regs.contains(&ArmReg::PC) {
                self.emit("\tret");
            }
            return Ok(());
        }

        if matches!(
            mnem,
            "ldm" | "ldmia" | "ldmfd" | "ldmda" | "ldmdb" | "ldmib"
        ) {
            let (base, wb) = base_with_writeback(instr, 0)?;
            let regs = self.reg_list_op(instr, 1)?;
            let base_name = rv_reg(base);
            for (i, r) in regs.iter().enumerate() {
                self.emit(format!("\tlw\t{},{}({base_name})", rv_reg(*r), 4 * i));
            }
            if wb {
                self.emit(format!(
                    "\taddi\t{base_name},{base_name},{}",
                    4 * regs.len()
                ));
            }
            return Ok(());
        }

        if matches!(
            mnem,
            "stm" | "stmia" | "stmea" | "stmda" | "stmdb" | "stmfd"
        ) {
            let (base, wb) = base_with_writeback(instr, 0)?;
            let regs = self.reg_list_op(instr, 1)?;
            let base_name = rv_reg(base);
            for (i, r) in regs.iter().enumerate() {
                self.emit(format!("\tsw\t{},{}({base_name})", rv_reg(*r), 4 * i));
            }
            if wb {
                self.emit(format!(
                    "\taddi\t{base_name},{base_name},{}",
                    4 * regs.len()
                ));
            }
            return Ok(());
        }

        self.warn(
            line,
            format!("unrecognized mnemonic `{mnem}`, left untranslated"),
        );
        self.emit(format!("\t# [UNTRANSLATED] {mnem}"));
        Ok(())
    }

    fn lower_literal_pool_load(&mut self, line: usize, rd: &str, label: &str) {
        if let Some(sym) = self.pool.get(label).cloned() {
            self.emit(format!("\tlui\t{rd},%hi({sym})"));
            self.emit(format!("\taddi\t{rd},{rd},%lo({sym})"));
        } else if let Some(val) = self.num_pool.get(label).cloned() {
            self.emit(format!("\tli\t{rd},{val}"));
        } else {
            // Not a pseudo-op `rv::pseudo::expand` (or the original assembler)
            // recognizes, so emit what `la` would have expanded to rather than
            // the mnemonic itself.
            self.warn(
                line,
                format!("literal pool entry `{label}` not found, treating it as a bare symbol"),
            );
            let sym = label.to_string();
            self.emit(format!("\tlui\t{rd},%hi({sym})"));
            self.emit(format!("\taddi\t{rd},{rd},%lo({sym})"));
        }
    }

    fn compute_addr(&mut self, mem: &MemOperand, tmp: &str) -> String {
        let base = rv_reg(mem.base);
        match &mem.offset {
            MemOffset::None => format!("0({base})"),
            MemOffset::Imm(v) => format!("{v}({base})"),
            MemOffset::Reg(r) => {
                self.emit(format!("\tadd\t{tmp},{base},{}", rv_reg(*r)));
                format!("0({tmp})")
            }
            MemOffset::RegShift { reg, shift, amount } => {
                let shift_instr = match shift {
                    ShiftKind::Lsl => "slli",
                    ShiftKind::Lsr => "srli",
                    ShiftKind::Asr => "srai",
                    ShiftKind::Ror => "slli",
                };
                self.emit(format!("\t{shift_instr}\t{tmp},{},{amount}", rv_reg(*reg)));
                self.emit(format!("\tadd\t{tmp},{base},{tmp}"));
                format!("0({tmp})")
            }
        }
    }

    fn emit_load(
        &mut self,
        op: &str,
        rd: &str,
        mem: &MemOperand,
        post_delta: Option<i32>,
        line: usize,
    ) -> Result<(), AssemblyError> {
        let base = rv_reg(mem.base);
        if mem.writeback {
            let delta = pre_writeback_delta(mem, line)?;
            self.emit(format!("\taddi\t{base},{base},{delta}"));
            self.emit(format!("\t{op}\t{rd},0({base})"));
        } else if let Some(delta) = post_delta {
            self.emit(format!("\t{op}\t{rd},0({base})"));
            self.emit(format!("\taddi\t{base},{base},{delta}"));
        } else {
            let addr = self.compute_addr(mem, SCRATCH_2);
            self.emit(format!("\t{op}\t{rd},{addr}"));
        }
        Ok(())
    }

    fn emit_store(
        &mut self,
        op: &str,
        rs: &str,
        mem: &MemOperand,
        post_delta: Option<i32>,
        line: usize,
    ) -> Result<(), AssemblyError> {
        let base = rv_reg(mem.base);
        if mem.writeback {
            let delta = pre_writeback_delta(mem, line)?;
            self.emit(format!("\taddi\t{base},{base},{delta}"));
            self.emit(format!("\t{op}\t{rs},0({base})"));
        } else if let Some(delta) = post_delta {
            self.emit(format!("\t{op}\t{rs},0({base})"));
            self.emit(format!("\taddi\t{base},{base},{delta}"));
        } else {
            let addr = self.compute_addr(mem, SCRATCH_2);
            self.emit(format!("\t{op}\t{rs},{addr}"));
        }
        Ok(())
    }
}

impl Default for LowerCtx {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_operand(line: usize, mnemonic: &str, operand: Option<&ArmOperand>) -> AssemblyError {
    AssemblyError::OperandKind {
        line,
        mnemonic: mnemonic.to_string(),
        reason: format!("unsupported operand {operand:?}"),
    }
}

fn expect_mem<'a>(instr: &'a ArmInstr, idx: usize) -> Result<&'a MemOperand, AssemblyError> {
    match instr.operands.get(idx) {
        Some(ArmOperand::Mem(m)) => Ok(m),
        other => Err(bad_operand(instr.line, &instr.mnemonic, other)),
    }
}

fn post_indexed_delta(instr: &ArmInstr, idx: usize) -> Option<i32> {
    match instr.operands.get(idx) {
        Some(ArmOperand::Imm(v)) => Some(*v),
        _ => None,
    }
}

fn pre_writeback_delta(mem: &MemOperand, line: usize) -> Result<i32, AssemblyError> {
    match mem.offset {
        MemOffset::Imm(v) => Ok(v),
        _ => Err(AssemblyError::OperandKind {
            line,
            mnemonic: "ldr/str".to_string(),
            reason: "pre-indexed writeback requires an immediate offset".to_string(),
        }),
    }
}

fn base_with_writeback(instr: &ArmInstr, idx: usize) -> Result<(ArmReg, bool), AssemblyError> {
    match instr.operands.get(idx) {
        Some(ArmOperand::Reg(r)) => Ok((*r, false)),
        Some(ArmOperand::RegBang(r)) => Ok((*r, true)),
        other => Err(bad_operand(instr.line, &instr.mnemonic, other)),
    }
}

fn load_op(mnem: &str) -> Option<&'static str> {
    Some(match mnem {
        "ldr" => "lw",
        "ldrb" => "lbu",
        "ldrh" => "lhu",
        "ldrsb" => "lb",
        "ldrsh" => "lh",
        _ => return None,
    })
}

fn store_op(mnem: &str) -> Option<&'static str> {
    Some(match mnem {
        "str" => "sw",
        "strb" => "sb",
        "strh" => "sh",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::parser::parse_source;

    fn lower(src: &str) -> (String, Vec<LowerWarning>) {
        let lines = parse_source(src).unwrap();
        let mut ctx = LowerCtx::new();
        ctx.scan_literal_pool(&lines);
        let text = ctx.lower_program(&lines).unwrap();
        (text, ctx.warnings)
    }

    #[test]
    fn test_mov_register() {
        let (text, _) = lower("mov r0, r1\n");
        assert!(text.contains("mv\ta0,a1"));
    }

    #[test]
    fn test_cmp_ble_merges_into_bge_with_swap() {
        let (text, _) = lower("cmp r2, #0\n\tble .L4\n");
        assert!(text.contains("bge\tzero,a2,.L4"), "{text}");
    }

    #[test]
    fn test_cmp_reg_reg_branch() {
        let (text, _) = lower("cmp r2, r3\n\tbgt .L1\n");
        assert!(text.contains("blt\ta3,a2,.L1"), "{text}");
    }

    #[test]
    fn test_branch_with_no_cmp_warns_and_defaults_to_zero() {
        let (text, warnings) = lower("beq .L9\n");
        assert!(text.contains("beq\tzero,zero,.L9"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_post_indexed_load() {
        let (text, _) = lower("ldr r0, [r1], #4\n");
        assert!(text.contains("lw\ta0,0(a1)"));
        assert!(text.contains("addi\ta1,a1,4"));
    }

    #[test]
    fn test_pre_indexed_store_writeback() {
        let (text, _) = lower("str fp, [sp, #-4]!\n");
        assert!(text.contains("addi\tsp,sp,-4"));
        assert!(text.contains("sw\ts0,0(sp)"));
    }

    #[test]
    fn test_push_then_pop_with_pc_emits_ret() {
        let (text, _) = lower("push {fp, lr}\n\tpop {fp, pc}\n");
        assert!(text.contains("addi\tsp,sp,-8"));
        assert!(text.contains("sw\ts0,0(sp)"));
        assert!(text.contains("sw\tra,4(sp)"));
        assert!(text.contains("lw\ts0,0(sp)"));
        assert!(text.contains("lw\tt6,4(sp)"));
        assert!(text.contains("\tret"));
    }

    #[test]
    fn test_smull_expands_to_mul_mulh() {
        let (text, _) = lower("smull r0, r1, r2, r3\n");
        assert!(text.contains("mul\ta0,a2,a3"));
        assert!(text.contains("mulh\ta1,a2,a3"));
    }

    #[test]
    fn test_literal_pool_symbol_becomes_hi_lo() {
        let src = "ldr r0, .L5\n\tb .Lend\n.L5:\n\t.word some_symbol\n.Lend:\n";
        let (text, _) = lower(src);
        assert!(text.contains("lui\ta0,%hi(some_symbol)"));
        assert!(text.contains("addi\ta0,a0,%lo(some_symbol)"));
        assert!(!text.contains(".L5:"));
    }

    #[test]
    fn test_literal_pool_numeric_becomes_li() {
        let src = "ldr r0, .L3\n\tb .Lend\n.L3:\n\t.word 12345\n.Lend:\n";
        let (text, _) = lower(src);
        assert!(text.contains("li\ta0,12345"));
    }

    #[test]
    fn test_ldmia_with_writeback() {
        let (text, _) = lower("ldmia r0!, {r1, r2}\n");
        assert!(text.contains("lw\ta1,0(a0)"));
        assert!(text.contains("lw\ta2,4(a0)"));
        assert!(text.contains("addi\ta0,a0,8"));
    }

    #[test]
    fn test_unrecognized_mnemonic_untranslated() {
        let (text, warnings) = lower("clz r0, r1\n");
        assert!(text.contains("[UNTRANSLATED]"));
        assert_eq!(warnings.len(), 1);
    }
}
