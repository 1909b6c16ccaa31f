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

//! ARM (armv4t/arm7tdmi) source types, as parsed from GCC-emitted text
//! assembly. Kept close to the source syntax (unlike `rv::ast::CanonInstr`)
//! since the lowerer's job is a line-to-line text translation, not a
//! semantic IR lift.

/// An ARM register, 0..=15. Aliases (`fp`, `ip`, `sp`, `lr`, `pc`) map onto
/// their numeric register and always render back under their own name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArmReg(pub u8);

impl ArmReg {
    pub const SP: ArmReg = ArmReg(13);
    pub const LR: ArmReg = ArmReg(14);
    pub const PC: ArmReg = ArmReg(15);
    /// Sentinel for the `fp` alias, kept distinct from `r11` (same physical
    /// register, different RV target: `fp` lowers to `s0`, bare `r11` to
    /// `s4`, matching how GCC's frame-pointer references and general s-reg
    /// allocations are told apart in the source text).
    pub const FP: ArmReg = ArmReg(16);

    pub fn from_name(name: &str) -> Option<ArmReg> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "fp" => return Some(ArmReg::FP),
            "ip" => return Some(ArmReg(12)),
            "sp" => return Some(ArmReg(13)),
            "lr" => return Some(ArmReg(14)),
            "pc" => return Some(ArmReg(15)),
            _ => {}
        }
        let rest = lower.strip_prefix('r')?;
        let n: u8 = rest.parse().ok()?;
        if n < 16 { Some(ArmReg(n)) } else { None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    pub fn from_name(name: &str) -> Option<ShiftKind> {
        match name {
            "lsl" => Some(ShiftKind::Lsl),
            "lsr" => Some(ShiftKind::Lsr),
            "asr" => Some(ShiftKind::Asr),
            "ror" => Some(ShiftKind::Ror),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemOffset {
    None,
    Imm(i32),
    Reg(ArmReg),
    RegShift {
        reg: ArmReg,
        shift: ShiftKind,
        amount: i32,
    },
}

/// `[base, offset]`, with `writeback` set for the pre-indexed `!` suffix.
/// Post-indexed writeback (`[rn], #imm`) instead appears as a bare trailing
/// `ArmOperand::Imm` operand after this one, same as in the source syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemOperand {
    pub base: ArmReg,
    pub offset: MemOffset,
    pub writeback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmOperand {
    Reg(ArmReg),
    Imm(i32),
    Label(String),
    Mem(MemOperand),
    RegList(Vec<ArmReg>),
    /// A bare `reg!`, as used for the writeback base of `ldm`/`stm`.
    RegBang(ArmReg),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmInstr {
    pub line: usize,
    pub mnemonic: String,
    pub operands: Vec<ArmOperand>,
}

/// A directive kept close to source: name with leading dot, plus its
/// argument text. The lowerer decides what to do with each by name, same
/// as the token-dispatch the original translator uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmDirective {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArmLine {
    pub line_number: usize,
    pub label: Option<String>,
    pub instruction: Option<ArmInstr>,
    pub directive: Option<ArmDirective>,
}
