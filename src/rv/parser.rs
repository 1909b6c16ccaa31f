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

use crate::errors::AssemblyError;
use crate::rv::ast::{AsmLine, Directive, Imm, Operand, RawInstr, WordValue};

#[derive(Parser)]
#[grammar = "rv/grammar.pest"]
struct RvParser;

/// Parses a full RV32I source file into one [`AsmLine`] per physical line.
pub fn parse_source(source: &str) -> Result<Vec<AsmLine>, AssemblyError> {
    let pairs = RvParser::parse(Rule::program, source)
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

fn build_line(pair: Pair<Rule>, line_number: usize) -> Result<AsmLine, AssemblyError> {
    let mut out = AsmLine {
        line_number,
        ..Default::default()
    };
    let line_start = pair.as_span().start();
    let line_text = pair.as_str().to_string();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::line_comment {
            check_hash_comment_boundary(&inner, line_start, &line_text, line_number)?;
            continue;
        }
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

/// A bare `#` only starts a comment when it is not glued to a preceding
/// token (start of line, or preceded by whitespace) — mirrors the original
/// assembler's `(?<!\S)#` regex. `//` and `@` have no such restriction.
fn check_hash_comment_boundary(
    comment: &Pair<Rule>,
    line_start: usize,
    line_text: &str,
    line_number: usize,
) -> Result<(), AssemblyError> {
    if !comment.as_str().starts_with('#') {
        return Ok(());
    }
    let rel = comment.as_span().start() - line_start;
    if rel == 0 {
        return Ok(());
    }
    match line_text.as_bytes().get(rel - 1) {
        Some(b' ') | Some(b'\t') => Ok(()),
        _ => Err(AssemblyError::Parse(
            line_number,
            format!(
                "'#' in `{}` is not preceded by whitespace and cannot start a comment",
                line_text.trim_end()
            ),
        )),
    }
}

fn build_instruction(pair: Pair<Rule>, line: usize) -> Result<RawInstr, AssemblyError> {
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
            _ => unreachable!("unexpected instruction child: {:?}", item.as_rule()),
        }
    }
    Ok(RawInstr {
        line,
        mnemonic,
        operands,
    })
}

fn build_directive(pair: Pair<Rule>, line: usize) -> Result<Directive, AssemblyError> {
    let mut name = String::new();
    let mut args = Vec::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::directive_name => name = item.as_str().to_string(),
            Rule::directive_args => {
                for arg in item.into_inner() {
                    let operand_pair = arg.into_inner().next().expect("directive_arg has operand");
                    args.push(build_operand(operand_pair, line)?);
                }
            }
            _ => unreachable!("unexpected directive child: {:?}", item.as_rule()),
        }
    }
    if name.starts_with(".cfi_") {
        return Ok(Directive::Ignored);
    }
    if name == ".section" {
        return match args.first() {
            Some(Operand::Label(s)) if s == ".rodata" => Ok(Directive::Rodata),
            Some(Operand::Label(s)) if s == ".data" => Ok(Directive::Data),
            Some(Operand::Label(s)) if s == ".text" => Ok(Directive::Text),
            _ => Ok(Directive::Ignored),
        };
    }
    match name.as_str() {
        ".text" => Ok(Directive::Text),
        ".data" => Ok(Directive::Data),
        ".rodata" => Ok(Directive::Rodata),
        ".align" | ".p2align" | ".balign" => Ok(Directive::Align),
        ".file" | ".option" | ".attribute" | ".globl" | ".type" | ".size" | ".ident" => {
            Ok(Directive::Ignored)
        }
        ".word" | ".4byte" | ".long" => {
            let mut words = Vec::with_capacity(args.len());
            for a in args {
                match a {
                    Operand::Imm(Imm::Value(v)) => words.push(WordValue::Int(v as i64)),
                    Operand::Label(s) => words.push(WordValue::Symbol(s)),
                    other => {
                        return Err(AssemblyError::OperandKind {
                            line,
                            mnemonic: ".word".to_string(),
                            reason: format!("expected integer or label, found {other:?}"),
                        });
                    }
                }
            }
            Ok(Directive::Word(words))
        }
        other => Err(AssemblyError::OperandKind {
            line,
            mnemonic: other.to_string(),
            reason: "unrecognized directive".to_string(),
        }),
    }
}

fn build_operand(pair: Pair<Rule>, line: usize) -> Result<Operand, AssemblyError> {
    let inner = match pair.as_rule() {
        Rule::operand => pair.into_inner().next().expect("operand has one child"),
        _ => pair,
    };
    match inner.as_rule() {
        Rule::hi_lo => {
            let text = inner.as_str();
            let mut it = inner.into_inner();
            let ident = it
                .next()
                .expect("hi_lo has identifier")
                .as_str()
                .to_string();
            if text.starts_with("%hi") {
                Ok(Operand::Imm(Imm::Hi(ident)))
            } else {
                Ok(Operand::Imm(Imm::Lo(ident)))
            }
        }
        Rule::mem_operand => {
            let mut imm = Imm::Value(0);
            let mut base = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::immediate => imm = Imm::Value(parse_int(part.as_str(), line)?),
                    Rule::identifier => {
                        let name = part.as_str();
                        base = Some(reg_from_name(name, line)?);
                    }
                    _ => unreachable!(),
                }
            }
            let base = base.ok_or_else(|| AssemblyError::OperandKind {
                line,
                mnemonic: String::new(),
                reason: "memory operand missing base register".to_string(),
            })?;
            Ok(Operand::Mem { base, offset: imm })
        }
        Rule::immediate => Ok(Operand::Imm(Imm::Value(parse_int(inner.as_str(), line)?))),
        Rule::identifier => {
            let name = inner.as_str();
            if let Some(r) = crate::rv::ast::Reg::from_name(name) {
                Ok(Operand::Reg(r))
            } else {
                Ok(Operand::Label(name.to_string()))
            }
        }
        Rule::opaque_token => Ok(Operand::Other(inner.as_str().to_string())),
        other => unreachable!("unexpected operand child: {other:?}"),
    }
}

fn reg_from_name(name: &str, line: usize) -> Result<crate::rv::ast::Reg, AssemblyError> {
    crate::rv::ast::Reg::from_name(name).ok_or_else(|| AssemblyError::UnknownRegister {
        line,
        name: name.to_string(),
    })
}

fn parse_int(text: &str, line: usize) -> Result<i32, AssemblyError> {
    let (neg, rest) = match text.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, text),
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
    use crate::rv::ast::Reg;

    #[test]
    fn test_parse_nop() {
        let lines = parse_source("addi x0, x0, 0\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.mnemonic, "addi");
        assert_eq!(
            ins.operands,
            vec![
                Operand::Reg(Reg::ZERO),
                Operand::Reg(Reg::ZERO),
                Operand::Imm(Imm::Value(0)),
            ]
        );
    }

    #[test]
    fn test_parse_label_and_instruction() {
        let lines = parse_source("loop: addi a0, a0, 1\n").unwrap();
        assert_eq!(lines[0].label.as_deref(), Some("loop"));
        assert_eq!(lines[0].instruction.as_ref().unwrap().mnemonic, "addi");
    }

    #[test]
    fn test_parse_mem_operand() {
        let lines = parse_source("lw a0, 4(sp)\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(
            ins.operands[1],
            Operand::Mem {
                base: Reg::SP,
                offset: Imm::Value(4),
            }
        );
    }

    #[test]
    fn test_parse_hi_lo() {
        let lines = parse_source("lui a0, %hi(foo)\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.operands[1], Operand::Imm(Imm::Hi("foo".to_string())));
    }

    #[test]
    fn test_parse_word_directive() {
        let lines = parse_source(".word 1, foo, 0x10\n").unwrap();
        match lines[0].directive.as_ref().unwrap() {
            Directive::Word(words) => {
                assert_eq!(
                    *words,
                    vec![
                        WordValue::Int(1),
                        WordValue::Symbol("foo".to_string()),
                        WordValue::Int(16),
                    ]
                );
            }
            other => panic!("expected Word directive, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_comment_only_line() {
        let lines = parse_source("# just a comment\n").unwrap();
        assert!(lines[0].instruction.is_none());
        assert!(lines[0].directive.is_none());
    }

    #[test]
    fn test_parse_hash_comment_after_whitespace_is_a_comment() {
        let lines = parse_source("addi a0, a0, 1 # trailing comment\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.mnemonic, "addi");
    }

    #[test]
    fn test_parse_hash_glued_to_token_is_a_parse_error() {
        let err = parse_source("addi a0, a0, 1#bogus\n").unwrap_err();
        assert!(matches!(err, AssemblyError::Parse(1, _)));
    }

    #[test]
    fn test_parse_slash_slash_glued_to_token_is_still_a_comment() {
        let lines = parse_source("addi a0, a0, 1//bogus\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.mnemonic, "addi");
    }

    #[test]
    fn test_parse_branch_label_operand() {
        let lines = parse_source("beq a0, a1, .L1\n").unwrap();
        let ins = lines[0].instruction.as_ref().unwrap();
        assert_eq!(ins.operands[2], Operand::Label(".L1".to_string()));
    }
}
