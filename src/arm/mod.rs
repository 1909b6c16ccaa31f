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

//! Translates armv4t/arm7tdmi GCC-emitted text assembly into RV32I text
//! assembly fed straight into [`crate::rv::assemble`].

pub mod ast;
pub mod lowerer;
pub mod parser;

use crate::errors::AssemblyError;
pub use lowerer::LowerWarning;

/// Parses and lowers a full ARM source file, returning the generated RV32I
/// assembly text plus any soft warnings collected along the way.
pub fn translate(source: &str) -> Result<(String, Vec<LowerWarning>), AssemblyError> {
    let lines = parser::parse_source(source)?;
    let mut ctx = lowerer::LowerCtx::new();
    ctx.scan_literal_pool(&lines);
    let rendered = ctx.lower_program(&lines)?;
    Ok((rendered, ctx.warnings))
}
