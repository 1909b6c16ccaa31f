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

use thiserror::Error;

/// Errors surfaced by the RV32I assembler pipeline (parsing through encoding).
///
/// Every variant is fatal from the library's point of view; the soft
/// ARM->RV warning channel (unrecognized mnemonic, stale/missing comparison)
/// is handled separately via [`crate::arm::lowerer::LowerWarning`] and never
/// raises one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("Syntax error on line {0}: {1}")]
    Parse(usize, String),

    #[error("{kind} error on line {line}: {reason}")]
    RvParse {
        line: usize,
        kind: &'static str,
        reason: String,
    },

    #[error("line {line}: undefined label `{label}`")]
    UndefinedLabel { line: usize, label: String },

    #[error("line {line}: unknown register `{name}`")]
    UnknownRegister { line: usize, name: String },

    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error(
        "line {line}: branch target `{label}` is {delta} bytes away, outside the +-4KiB B-type range"
    )]
    BranchRange {
        line: usize,
        label: String,
        delta: i64,
    },

    #[error(
        "line {line}: jump target `{label}` is {delta} bytes away, outside the +-1MiB J-type range"
    )]
    JumpRange {
        line: usize,
        label: String,
        delta: i64,
    },

    #[error("line {line}: immediate {value} does not fit in {bits} bits")]
    ImmediateRange { line: usize, value: i64, bits: u32 },

    #[error("line {line}: `{mnemonic}` expects {expected} operands, found {found}")]
    OperandCount {
        line: usize,
        mnemonic: String,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid operand to `{mnemonic}`: {reason}")]
    OperandKind {
        line: usize,
        mnemonic: String,
        reason: String,
    },

    #[error("duplicate label definition: `{0}`")]
    DuplicateLabel(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AssemblyError {
    fn from(e: std::io::Error) -> Self {
        AssemblyError::Io(e.to_string())
    }
}
