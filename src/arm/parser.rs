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

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::arm::ast::{
    ArmDirective, ArmInstr, ArmLine, ArmOperand, ArmReg, MemOffset, MemOperand, ShiftKind,
};
use crate::errors::AssemblyError;

#[derive(Parser)]
#[grammar = "arm/grammar.pest"]
struct ArmParser;

pub fn parse_source(source: &str) -> Result<Vec<ArmLine>, AssemblyError> {
    let pairs = ArmParser::parse(Rule::program, source)
        .map_err(|e| AssemblyError::Parse(pest_line(&e), e.to_string()))?;
    let program = pairs
        .into_iter()
        .next()
        .expect("program rule always produced");

    let mut lines = Vec::new();
    let mut line_number = 0usize;
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::line {
            line_number += 1;
            lines.push(build_line(pair, line_number)?);
        }
    }
    Ok(lines)
}

fn pest_line(e: &pest::error::Error<Rule>) -> usize {
    match e.line_col {
        pest::error::LineColLocation::Pos((l, _)) => l,
        pest::error::LineColLocation::Span((l, _), _) => l,
    }
}

fn build_line(pair: Pair<Rule>, line_number: usize) -> Result<ArmLine, AssemblyError> {
    let mut out = ArmLine {
        line_number,
        ..Default::default()
    };
    for inner in pair.into_inner() {
        if inner.as_rule() != Rule::line_content {
            continue;
        }
        for item in inner.into_inner() {
            match item.as_rule() {
                Rule::label => {
                    let text = item.as_str();
                    out.label = Some(text[..text.len() - 1].to_string());
                }
                Rule::instruction => out.instruction = Some(build_instruction(item, line_number)?),
                Rule::directive => out.directive = Some(build_directive(item, line_number)?),
                _ => unreachable!("unexpected line_content child: {:?}", item.as_rule()),
            }
        }
    }
    Ok(out)
}

fn build_instruction(pair: Pair<Rule>, line: usize) -> Result<ArmInstr, AssemblyError> {
    let mut mnemonic = String::new();
    let mut operands = Vec::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::mnemonic => mnemonic = item.as_str().to_ascii_lowercase(),
            Rule::operand_list => {
                for op in item.into_inner() {
                    operands.push(build_operand(op, line)?);
                }
            }
            _ => unreachable!(),
        }
    }
    Ok(ArmInstr {
        line,
        mnemonic,
        operands,
    })
}

fn build_directive(pair: Pair<Rule>, line: usize) -> Result<ArmDirective, AssemblyError> {
    let mut name = String::new();
    let mut args = Vec::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::directive_name => name = item.as_str().to_string(),
            Rule::directive_args => {
                for arg in item.into_inner() {
                    let inner = arg.into_inner().next().expect("directive_arg has a child");
                    args.push(match inner.as_rule() {
                        Rule::string_lit => {
                            let text = inner.as_str();
                            text[1..text.len() - 1].to_string()
                        }
                        Rule::bare_number => inner.as_str().to_string(),
                        _ => render_operand_text(&build_operand(inner, line)?),
                    });
                }
            }
            _ => unreachable!(),
        }
    }
    Ok(ArmDirective { name, args })
}

fn render_operand_text(op: &ArmOperand) -> String {
    match op {
        ArmOperand::Label(s) => s.clone(),
        ArmOperand::Imm(v) => v.to_string(),
        ArmOperand::Reg(r) => format!("r{}", r.0),
        _ => String::new(),
    }
}

fn build_operand(pair: Pair<Rule>, line: usize) -> Result<ArmOperand, AssemblyError> {
    let inner = match pair.as_rule() {
        Rule::operand => pair.into_inner().next().expect("operand has one child"),
        _ => pair,
    };
    match inner.as_rule() {
        Rule::reg_list => {
            let mut regs = Vec::new();
            for range in inner.into_inner() {
                let mut idents = range.into_inner();
                let lo_name = idents
                    .next()
                    .expect("reg_range has at least one ident")
                    .as_str();
                let lo = reg_from_name(lo_name, line)?;
                if let Some(hi_pair) = idents.next() {
                    let hi = reg_from_name(hi_pair.as_str(), line)?;
                    for n in lo.0..=hi.0 {
                        regs.push(ArmReg(n));
                    }
                } else {
                    regs.push(lo);
                }
            }
            Ok(ArmOperand::RegList(regs))
        }
        Rule::mem_operand => {
            let full_text = inner.as_str();
            let writeback = full_text.ends_with('!');
            let mut base = None;
            let mut last_reg = None;
            let mut offset = MemOffset::None;
            for part_wrapper in inner.into_inner() {
                let part = part_wrapper
                    .into_inner()
                    .next()
                    .expect("mem_part has one child");
                let part_text = part.as_str();
                match part.as_rule() {
                    Rule::shift_expr => {
                        let mut sp = part.into_inner();
                        let shift_name = sp.next().expect("shift_expr has name").as_str();
                        let amt_text = sp.next().expect("shift_expr has amount").as_str();
                        let reg = last_reg.take().ok_or_else(|| AssemblyError::OperandKind {
                            line,
                            mnemonic: String::new(),
                            reason: "shift amount with no preceding register".to_string(),
                        })?;
                        offset = MemOffset::RegShift {
                            reg,
                            shift: ShiftKind::from_name(shift_name)
                                .expect("grammar restricts shift names"),
                            amount: parse_hash_imm(amt_text, line)?,
                        };
                    }
                    Rule::immediate => {
                        offset = MemOffset::Imm(parse_hash_imm(part_text, line)?);
                    }
                    Rule::identifier => {
                        let r = reg_from_name(part_text, line)?;
                        if base.is_none() {
                            base = Some(r);
                        } else {
                            last_reg = Some(r);
                            offset = MemOffset::Reg(r);
                        }
                    }
                    _ => unreachable!("unexpected mem_part child: {:?}", part.as_rule()),
                }
            }
            let base = base.ok_or_else(|| AssemblyError::OperandKind {
                line,
                mnemonic: String::new(),
                reason: "memory operand missing base register".to_string(),
            })?;
            Ok(ArmOperand::Mem(MemOperand {
                base,
                offset,
                writeback,
            }))
        }
        Rule::reg_bang => {
            let ident = inner
                .into_inner()
                .next()
                .expect("reg_bang has an identifier");
            Ok(ArmOperand::RegBang(reg_from_name(ident.as_str(), line)?))
        }
        Rule::immediate => Ok(ArmOperand::Imm(parse_hash_imm(inner.as_str(), line)?)),
        Rule::identifier => {
            let name = inner.as_str();
            if let Some(r) = ArmReg::from_name(name) {
                Ok(ArmOperand::Reg(r))
            } else {
                Ok(ArmOperand::Label(name.to_string()))
            }
        }
        other => unreachable!("unexpected operand child: {other:?}"),
    }
}

fn reg_from_name(name: &str, line: usize) -> Result<ArmReg, AssemblyError> {
    ArmReg::from_name(name).ok_or_else(|| AssemblyError::UnknownRegister {
        line,
        name: name.to_string(),
    })
}

/// Parses an ARM `#imm` token (leading `#`, optional `-`, hex or decimal).
fn parse_hash_imm(text: &str, line: usize) -> Result<i32, AssemblyError> {
    let rest = text.strip_prefix('#').unwrap_or(text);
    let (neg, rest) = match rest.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, rest),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).map_err(|e| AssemblyError::Parse(line, e.to_string()))?
    } else {
        rest.parse::<i64>()
            .map_err(|e| AssemblyError::Parse(line, e.to_string()))?
    };
    let value = if neg { -value } else { value };
    i32::try_from(value).map_err(|_| AssemblyError::ImmediateRange {
        line,
        value,
        bits: 32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mov_reg() {
        let lines = parse_source("mov r0, r1\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.mnemonic, "mov");
        assert_eq!(
            ins.operands,
            vec![ArmOperand::Reg(ArmReg(0)), ArmOperand::Reg(ArmReg(1)),]
        );
    }

    #[test]
    fn test_parse_mov_imm() {
        let lines = parse_source("mov r0, #4\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.operands[1], ArmOperand::Imm(4));
    }

    #[test]
    fn test_parse_mem_pre_indexed() {
        let lines = parse_source("str fp, [sp, #-4]!\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(
            ins.operands[1],
            ArmOperand::Mem(MemOperand {
                base: ArmReg::SP,
                offset: MemOffset::Imm(-4),
                writeback: true,
            })
        );
    }

    #[test]
    fn test_parse_mem_post_indexed() {
        let lines = parse_source("ldr r0, [r1], #4\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(
            ins.operands[1],
            ArmOperand::Mem(MemOperand {
                base: ArmReg(1),
                offset: MemOffset::None,
                writeback: false,
            })
        );
        assert_eq!(ins.operands[2], ArmOperand::Imm(4));
    }

    #[test]
    fn test_parse_reg_list_with_range() {
        let lines = parse_source("push {r4-r7, fp, lr}\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        match &ins.operands[0] {
            ArmOperand::RegList(regs) => {
                assert_eq!(
                    *regs,
                    vec![
                        ArmReg(4),
                        ArmReg(5),
                        ArmReg(6),
                        ArmReg(7),
                        ArmReg::FP,
                        ArmReg::LR
                    ]
                );
            }
            other => panic!("expected RegList, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_label_and_branch() {
        let lines = parse_source("ble .L4\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.operands[0], ArmOperand::Label(".L4".to_string()));
    }

    #[test]
    fn test_parse_directive_with_string() {
        let lines = parse_source(".file \"foo.c\"\n").unwrap();
        let d = lines[0].directive.as_ref().unwrap();
        assert_eq!(d.name, ".file");
        assert_eq!(d.args, vec!["foo.c".to_string()]);
    }

    #[test]
    fn test_parse_regshift_mem_operand() {
        let lines = parse_source("ldr r0, [r1, r2, lsl #2]\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(
            ins.operands[1],
            ArmOperand::Mem(MemOperand {
                base: ArmReg(1),
                offset: MemOffset::RegShift {
                    reg: ArmReg(2),
                    shift: ShiftKind::Lsl,
                    amount: 2,
                },
                writeback: false,
            })
        );
    }
}
