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

use rv32pipe::arm;
use rv32pipe::rv::{self, AssembleConfig, output};

fn no_stub() -> AssembleConfig {
    AssembleConfig {
        rodata_base: 0x400,
        stack_top: 0,
    }
}

#[test]
fn test_arm_mov_lowers_and_encodes_to_spec_word() {
    let (rv_text, warnings) = arm::translate("mov r0, r1\nbx lr\n").unwrap();
    assert!(warnings.is_empty());
    assert!(rv_text.contains("mv\ta0,a1"));

    let prog = rv::assemble(&rv_text, &no_stub()).unwrap();
    assert_eq!(prog.entries[0].word, 0x0005_8513);
}

#[test]
fn test_arm_cmp_immediate_ble_becomes_bge_zero() {
    let src = "cmp r2, #0\nble .L1\n.L1:\nbx lr\n";
    let (rv_text, _) = arm::translate(src).unwrap();
    assert!(rv_text.contains("bge\tzero,a2,.L1"));
}

#[test]
fn test_arm_post_indexed_load_expands_to_two_slots() {
    let (rv_text, _) = arm::translate("ldr r0, [r1], #4\nbx lr\n").unwrap();
    let prog = rv::assemble(&rv_text, &no_stub()).unwrap();
    assert_eq!(prog.entries[0].text, "lw a0, 0(a1)");
    assert_eq!(prog.entries[1].text, "addi a1, a1, 4");
}

#[test]
fn test_arm_push_list_expands_to_decrement_then_stores() {
    let (rv_text, _) = arm::translate("push {fp, lr}\nbx lr\n").unwrap();
    let prog = rv::assemble(&rv_text, &no_stub()).unwrap();
    assert_eq!(prog.entries[0].text, "addi sp, sp, -8");
    assert_eq!(prog.entries[1].text, "sw s0, 0(sp)");
    assert_eq!(prog.entries[2].text, "sw ra, 4(sp)");
}

#[test]
fn test_hazard_scheduler_matches_worked_example() {
    let src = "addi a0, a0, 1\naddi a1, a0, 2\naddi a2, a0, 3\naddi a3, a5, 4\nret\n";
    let prog = rv::assemble(src, &no_stub()).unwrap();
    assert_eq!(prog.entries[0].nops, 2);
    assert_eq!(prog.entries[1].nops, 0);
    assert_eq!(prog.entries[2].nops, 0);
    assert_eq!(prog.entries[3].nops, 0);
}

#[test]
fn test_halt_is_final_slot_and_carries_no_padding() {
    let src = "addi a0, a0, 1\naddi a1, a0, 1\nret\n";
    let prog = rv::assemble(src, &no_stub()).unwrap();
    let last = prog.entries.last().unwrap();
    assert_eq!(last.word, rv::encoder::HALT_WORD);
    assert_eq!(last.nops, 0);
    let total_nops: u32 = prog.entries.iter().map(|e| e.nops).sum();
    assert_eq!(prog.total_slots, prog.entries.len() + total_nops as usize);
}

#[test]
fn test_literal_pool_numeric_inlines_as_li_with_no_rodata_word() {
    let src = ".rodata\n.LC0:\n.word 42\n.text\nldr r0, .LC0\nbx lr\n";
    let (rv_text, _) = arm::translate(src).unwrap();
    assert!(!rv_text.contains(".word 42"));
    let prog = rv::assemble(&rv_text, &no_stub()).unwrap();
    assert!(prog.rodata.is_empty());
}

#[test]
fn test_literal_pool_symbol_inlines_as_hi_lo_pair() {
    let src = ".rodata\n.LC0:\n.word some_sym\n.text\nldr r0, .LC0\nbx lr\n";
    let (rv_text, _) = arm::translate(src).unwrap();
    assert!(rv_text.contains("%hi(some_sym)"));
    assert!(rv_text.contains("%lo(some_sym)"));
}

#[test]
fn test_undefined_label_is_fatal_assembly_error() {
    let err = rv::assemble("j nowhere\n", &no_stub()).unwrap_err();
    assert!(matches!(
        err,
        rv32pipe::errors::AssemblyError::UndefinedLabel { .. }
    ));
}

#[test]
fn test_duplicate_text_label_is_a_fatal_assembly_error() {
    let src = "loop:\naddi a0, a0, 1\nloop:\naddi a1, a1, 1\nret\n";
    let err = rv::assemble(src, &no_stub()).unwrap_err();
    assert!(matches!(
        err,
        rv32pipe::errors::AssemblyError::DuplicateLabel(name) if name == "loop"
    ));
}

#[test]
fn test_duplicate_rodata_label_is_a_fatal_assembly_error() {
    let src = ".rodata\nfoo: .word 1\nfoo: .word 2\n.text\nret\n";
    let err = rv::assemble(src, &no_stub()).unwrap_err();
    assert!(matches!(
        err,
        rv32pipe::errors::AssemblyError::DuplicateLabel(name) if name == "foo"
    ));
}

#[test]
fn test_rvasm_output_files_round_trip_through_tempdir() {
    let src = "addi a0, a0, 1\naddi a1, a0, 2\nret\n";
    let prog = rv::assemble(src, &AssembleConfig::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let listing_path = dir.path().join("prog.listing");
    let vh_path = dir.path().join("prog.vh");
    let imem_path = dir.path().join("imem.hex");
    let dmem_path = dir.path().join("dmem.hex");
    let bin_path = dir.path().join("prog.bin");

    fs::write(&listing_path, output::render_listing(&prog, "prog.s")).unwrap();
    fs::write(&vh_path, output::render_verilog(&prog, "prog.s")).unwrap();
    fs::write(&imem_path, output::render_imem_hex(&prog)).unwrap();
    fs::write(&dmem_path, output::render_dmem_hex(&prog)).unwrap();
    fs::write(&bin_path, output::render_bin(&prog)).unwrap();

    let listing = fs::read_to_string(&listing_path).unwrap();
    assert!(listing.contains("addi"));

    let vh = fs::read_to_string(&vh_path).unwrap();
    assert!(vh.contains("task"));

    let imem = fs::read_to_string(&imem_path).unwrap();
    assert_eq!(imem.lines().count(), prog.total_slots + 1);

    let bin = fs::read(&bin_path).unwrap();
    assert_eq!(bin.len(), prog.total_slots * 4);
    assert_eq!(
        u32::from_le_bytes(bin[0..4].try_into().unwrap()),
        prog.entries[0].word
    );
}

#[test]
fn test_full_loop_program_end_to_end_through_arm_and_rv() {
    let src = "\
        mov r0, #0\n\
    .Lloop:\n\
        cmp r0, #10\n\
        bge .Ldone\n\
        add r0, r0, #1\n\
        b .Lloop\n\
    .Ldone:\n\
        bx lr\n";
    let (rv_text, warnings) = arm::translate(src).unwrap();
    assert!(warnings.is_empty());
    let prog = rv::assemble(&rv_text, &AssembleConfig::default()).unwrap();
    assert_eq!(prog.entries.last().unwrap().word, rv::encoder::HALT_WORD);
    assert!(prog.labels.contains_key(".Lloop"));
    assert!(prog.labels.contains_key(".Ldone"));
}
