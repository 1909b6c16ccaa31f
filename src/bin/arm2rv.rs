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

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use rv32pipe::arm;

/// Translates armv4t/arm7tdmi GCC assembly into RV32I assembly.
#[derive(ClapParser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// Input ARM assembly file.
    input: PathBuf,
    /// Output RV32I assembly file. Written to stdout if omitted.
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let opts = Opts::parse();
    let source = fs::read_to_string(&opts.input)
        .with_context(|| format!("Failed to read input file: {}", opts.input.display()))?;

    let (translated, warnings) =
        arm::translate(&source).context("Failed during translation stage")?;
    for w in &warnings {
        tracing::warn!(line = w.line, "{}", w.message);
    }

    match &opts.output {
        Some(path) => {
            fs::write(path, translated)
                .with_context(|| format!("Failed to write output file: {}", path.display()))?;
            println!("translated {} -> {}", opts.input.display(), path.display());
        }
        None => print!("{translated}"),
    }

    Ok(())
}
