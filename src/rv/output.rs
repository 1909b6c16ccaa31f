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

//! Renders an [`AssembledProgram`] to the toolchain's four output formats:
//! a human-readable `.listing`, a Verilog `.vh` icache/dcache loader, the
//! `imem.hex`/`dmem.hex` pair the bash harness loads, and an optional flat
//! `.bin` image.

use crate::rv::encoder::NOP_WORD;
use crate::rv::hazard::Hazard;
use crate::rv::{AssembledProgram, BYTES_PER_SLOT};

fn hazard_text(h: &Hazard) -> &'static str {
    match h {
        Hazard::None => "",
        Hazard::Dist1 => "RAW (dist-1, +2 NOP)",
        Hazard::Dist2 => "RAW (dist-2, +1 NOP)",
    }
}

pub fn render_listing(prog: &AssembledProgram, source_name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("RV32I Listing - {source_name}\n"));
    out.push_str(&format!(
        "  RODATA_BASE=0x{:04X}  STACK_TOP=0x{:04X}\n",
        prog.rodata_base, prog.stack_top
    ));
    let total_nops: u32 = prog.entries.iter().map(|e| e.nops).sum();
    out.push_str(&format!(
        "  {} insts  {} NOPs  {} slots  HALT byte PC={}\n",
        prog.entries.len(),
        total_nops,
        prog.total_slots,
        prog.halt_byte_pc
    ));
    out.push_str(&"-".repeat(82));
    out.push('\n');
    out.push_str(&format!(
        "{:>7} {:>5}  {:>10}  {:<36} Hazard\n",
        "BytePC", "Slot", "Hex", "Assembly"
    ));
    out.push_str(&"-".repeat(82));
    out.push('\n');
    for e in &prog.entries {
        for label in &e.labels_here {
            out.push_str(&format!("<{label}>:\n"));
        }
        out.push_str(&format!(
            "{:7} {:5}  0x{:08X}  {:<36} {}\n",
            e.byte_pc,
            e.slot_idx,
            e.word,
            e.text,
            hazard_text(&e.hazard)
        ));
        for k in 0..e.nops {
            out.push_str(&format!(
                "{:>7} {:5}  0x{:08X}  (NOP)\n",
                "",
                e.slot_idx + 1 + k as usize,
                NOP_WORD
            ));
        }
    }
    out
}

pub fn render_verilog(prog: &AssembledProgram, source_name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("// Auto-generated from {source_name}\n"));
    out.push_str(&format!(
        "// Insts={}  Slots={}  HALT byte PC={}\n\n",
        prog.entries.len(),
        prog.total_slots,
        prog.halt_byte_pc
    ));
    out.push_str("task load_icache;\ninteger _ki;\nbegin\n");
    out.push_str(
        "    for (_ki = 0; _ki < 512; _ki = _ki + 1)\n        dut.Imm.mem[_ki] = 32'h00000013;\n\n",
    );
    for e in &prog.entries {
        out.push_str(&format!(
            "    dut.Imm.mem[{:3}] = 32'h{:08X}; // {}\n",
            e.slot_idx, e.word, e.text
        ));
        for k in 0..e.nops {
            out.push_str(&format!(
                "    dut.Imm.mem[{:3}] = 32'h{:08X}; // NOP\n",
                e.slot_idx + 1 + k as usize,
                NOP_WORD
            ));
        }
    }
    out.push_str("end\nendtask\n\ntask load_dcache;\ninteger _kd;\nbegin\n");
    out.push_str(
        "    for (_kd = 0; _kd < 512; _kd = _kd + 1)\n        dut.mm_stage_inst.Dmm.mem[_kd] = 32'h00000000;\n\n",
    );
    let base_word = prog.rodata_base / BYTES_PER_SLOT;
    for (i, v) in prog.rodata.iter().enumerate() {
        out.push_str(&format!(
            "    dut.mm_stage_inst.Dmm.mem[{}] = 32'h{:08X};\n",
            base_word as usize + i,
            v
        ));
    }
    out.push_str("end\nendtask\n");
    out
}

pub fn render_imem_hex(prog: &AssembledProgram) -> String {
    let mut out = String::new();
    out.push_str("# imem.hex\n");
    for e in &prog.entries {
        for label in &e.labels_here {
            out.push_str(&format!("# <{label}>\n"));
        }
        out.push_str(&format!(
            "0x{:08X}  # [{}] {}\n",
            e.word, e.slot_idx, e.text
        ));
        for k in 0..e.nops {
            out.push_str(&format!(
                "0x{:08X}  # [{}] NOP\n",
                NOP_WORD,
                e.slot_idx + 1 + k as usize
            ));
        }
    }
    out
}

pub fn render_dmem_hex(prog: &AssembledProgram) -> String {
    let mut out = String::new();
    out.push_str("# dmem.hex\n");
    let base_word = prog.rodata_base / BYTES_PER_SLOT;
    for (i, v) in prog.rodata.iter().enumerate() {
        out.push_str(&format!("0x{:08X}  # [{}]\n", v, base_word as usize + i));
    }
    out
}

/// Flat little-endian binary image: every program slot word, back to back.
pub fn render_bin(prog: &AssembledProgram) -> Vec<u8> {
    let mut out = Vec::with_capacity(prog.total_slots * 4);
    for word in prog.slot_words() {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rv::{AssembleConfig, assemble};

    #[test]
    fn test_render_bin_little_endian() {
        let prog = assemble(
            "ret\n",
            &AssembleConfig {
                rodata_base: 0x400,
                stack_top: 0,
            },
        )
        .unwrap();
        let bytes = render_bin(&prog);
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes, crate::rv::encoder::HALT_WORD.to_le_bytes());
    }

    #[test]
    fn test_render_bin_includes_inserted_nops() {
        let prog = assemble(
            "addi a0, a0, 1\naddi a0, a0, 1\nret\n",
            &AssembleConfig {
                rodata_base: 0x400,
                stack_top: 0,
            },
        )
        .unwrap();
        let bytes = render_bin(&prog);
        assert_eq!(bytes.len(), prog.total_slots * 4);
    }

    #[test]
    fn test_listing_contains_hazard_annotation() {
        let prog = assemble(
            "addi a0, a0, 1\naddi a0, a0, 1\nret\n",
            &AssembleConfig {
                rodata_base: 0x400,
                stack_top: 0,
            },
        )
        .unwrap();
        let listing = render_listing(&prog, "test.s");
        assert!(listing.contains("dist-1"));
    }
}
