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
use rv32pipe::rv::{self, AssembleConfig, output};

fn parse_hex(s: &str) -> Result<u32, String> {
    let trimmed = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16).map_err(|e| e.to_string())
}

/// Assembles RV32I text assembly into the target pipeline's binary image
/// and supporting listing/Verilog files.
#[derive(ClapParser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// Input RV32I assembly file.
    src: PathBuf,

    /// Base address of the rodata section.
    #[clap(long, value_parser = parse_hex, default_value = "0x400")]
    rodata: u32,

    /// Initial stack pointer value.
    #[clap(long, value_parser = parse_hex, default_value = "0x300")]
    stack: u32,

    /// Output path for the instruction memory image.
    #[clap(long, default_value = "imem.hex")]
    imem: PathBuf,

    /// Output path for the data memory image.
    #[clap(long, default_value = "dmem.hex")]
    dmem: PathBuf,

    /// Optional output path for a flat little-endian binary image.
    #[clap(long)]
    bin: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let opts = Opts::parse();
    let source = fs::read_to_string(&opts.src)
        .with_context(|| format!("Failed to read input file: {}", opts.src.display()))?;

    let config = AssembleConfig {
        rodata_base: opts.rodata,
        stack_top: opts.stack,
    };

    let program = rv::assemble(&source, &config).context("Failed during assembly pipeline")?;
    tracing::debug!(
        insts = program.entries.len(),
        slots = program.total_slots,
        "assembled program"
    );

    let stem = opts
        .src
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    let source_name = opts.src.display().to_string();

    let listing_path = opts.src.with_file_name(format!("{stem}.listing"));
    fs::write(
        &listing_path,
        output::render_listing(&program, &source_name),
    )
    .with_context(|| format!("Failed to write listing file: {}", listing_path.display()))?;

    let vh_path = opts.src.with_file_name(format!("{stem}.vh"));
    fs::write(&vh_path, output::render_verilog(&program, &source_name))
        .with_context(|| format!("Failed to write Verilog task file: {}", vh_path.display()))?;

    fs::write(&opts.imem, output::render_imem_hex(&program))
        .with_context(|| format!("Failed to write imem file: {}", opts.imem.display()))?;

    fs::write(&opts.dmem, output::render_dmem_hex(&program))
        .with_context(|| format!("Failed to write dmem file: {}", opts.dmem.display()))?;

    if let Some(bin_path) = &opts.bin {
        fs::write(bin_path, output::render_bin(&program))
            .with_context(|| format!("Failed to write binary image: {}", bin_path.display()))?;
    }

    println!(
        "assembled {} -> {} insts, {} slots, HALT at byte {}",
        opts.src.display(),
        program.entries.len(),
        program.total_slots,
        program.halt_byte_pc
    );

    Ok(())
}
