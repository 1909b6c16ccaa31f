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

//! NOP scheduling for the 5-stage, non-forwarding, early-branch-resolution
//! pipeline: registers are read in ID and written at the end of WB, so two
//! instructions racing on the same register need slot distance >= 3.
//!
//! dist-1 (i, i+1 RAW): nops_after[i] >= 2
//! dist-2 (i, i+2 RAW): nops_after[i] + nops_after[i+1] >= 1
//! dist-3+: safe without NOPs.

use crate::rv::ast::CanonInstr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hazard {
    None,
    Dist1,
    Dist2,
}

/// Computes, for every instruction, how many NOPs must follow it. The last
/// instruction (the HALT slot) never gets a trailing NOP.
pub fn compute_nops(insts: &[CanonInstr]) -> (Vec<u32>, Vec<Hazard>) {
    let n = insts.len();
    let mut nops = vec![0u32; n];
    let mut haz = vec![Hazard::None; n];
    if n == 0 {
        return (nops, haz);
    }

    for i in 0..n.saturating_sub(1) {
        let Some(rd) = insts[i].dest() else { continue };
        if insts[i + 1].srcs().contains(&rd) && nops[i] < 2 {
            nops[i] = 2;
            haz[i] = Hazard::Dist1;
        }
    }

    for i in 0..n.saturating_sub(2) {
        let Some(rd) = insts[i].dest() else { continue };
        if insts[i + 2].srcs().contains(&rd) && nops[i] + nops[i + 1] < 1 {
            nops[i] = 1;
            if haz[i] == Hazard::None {
                haz[i] = Hazard::Dist2;
            }
        }
    }

    nops[n - 1] = 0;
    haz[n - 1] = Hazard::None;
    (nops, haz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rv::ast::{BOp, IOp, Imm, Reg};

    fn addi(rd: Reg, rs1: Reg, imm: i32) -> CanonInstr {
        CanonInstr::I {
            op: IOp::Addi,
            rd,
            rs1,
            imm: Imm::Value(imm),
        }
    }

    #[test]
    fn test_dist1_hazard_needs_two_nops() {
        let a0 = Reg::from_name("a0").unwrap();
        let insts = vec![addi(a0, a0, 1), addi(a0, a0, 1), CanonInstr::Halt];
        let (nops, haz) = compute_nops(&insts);
        assert_eq!(nops, vec![2, 0, 0]);
        assert_eq!(haz[0], Hazard::Dist1);
    }

    #[test]
    fn test_dist2_hazard_needs_one_nop() {
        let a0 = Reg::from_name("a0").unwrap();
        let a1 = Reg::from_name("a1").unwrap();
        let insts = vec![
            addi(a0, a0, 1),
            addi(a1, a1, 1),
            addi(a1, a0, 0),
            CanonInstr::Halt,
        ];
        let (nops, haz) = compute_nops(&insts);
        assert_eq!(nops, vec![1, 0, 0, 0]);
        assert_eq!(haz[0], Hazard::Dist2);
    }

    #[test]
    fn test_no_hazard_no_nops() {
        let a0 = Reg::from_name("a0").unwrap();
        let a1 = Reg::from_name("a1").unwrap();
        let a2 = Reg::from_name("a2").unwrap();
        let insts = vec![addi(a0, a0, 1), addi(a1, a1, 1), addi(a2, a2, 1)];
        let (nops, _) = compute_nops(&insts);
        assert_eq!(nops, vec![0, 0, 0]);
    }

    #[test]
    fn test_writes_to_zero_never_hazard() {
        let insts = vec![
            addi(Reg::ZERO, Reg::ZERO, 0),
            addi(Reg::ZERO, Reg::ZERO, 0),
            CanonInstr::Halt,
        ];
        let (nops, _) = compute_nops(&insts);
        assert_eq!(nops, vec![0, 0, 0]);
    }

    #[test]
    fn test_branch_has_no_dest_never_a_hazard_source() {
        let a0 = Reg::from_name("a0").unwrap();
        let insts = vec![
            addi(a0, a0, 1),
            CanonInstr::B {
                op: BOp::Beq,
                rs1: a0,
                rs2: Reg::ZERO,
                label: ".L1".to_string(),
            },
        ];
        // dist-1 RAW: a0 def then a0 used as rs1 one slot later.
        let (nops, haz) = compute_nops(&insts);
        assert_eq!(nops[0], 2);
        assert_eq!(haz[0], Hazard::Dist1);
    }

    #[test]
    fn test_halt_slot_never_gets_trailing_nop() {
        let a0 = Reg::from_name("a0").unwrap();
        let insts = vec![addi(a0, a0, 1), addi(a0, a0, 1)];
        let (nops, _) = compute_nops(&insts);
        assert_eq!(nops[1], 0);
    }
}
