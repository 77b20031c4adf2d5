//! Property-based tests for the arithmetic and stack laws.
//!
//! Each property assembles a tiny program, runs it to completion, and
//! checks the architectural contract against an independent widened-integer
//! model.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use mcs51::sfr::{PSW_AC, PSW_C, PSW_OV, PSW_P, SFR_B};
use mcs51::{CodeMemory, Cpu, Hooks};

fn cpu_with(bytes: &[u8]) -> Cpu {
    let mut cpu = Cpu::new(CodeMemory::from_image(bytes));
    cpu.reset(true);
    cpu
}

fn run(cpu: &mut Cpu, ctx: &mut dyn Hooks, instructions: usize) {
    let mut retired = 0;
    let mut guard = 0;
    while retired < instructions {
        if cpu.tick(ctx) {
            retired += 1;
        }
        guard += 1;
        assert!(guard < 10_000);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// (B:A) = a*b, C cleared, OV tracks the high byte.
    #[test]
    fn prop_mul(a in any::<u8>(), b in any::<u8>()) {
        // MOV A,#a / MOV B,#b / MUL AB
        let mut cpu = cpu_with(&[0x74, a, 0x75, 0xF0, b, 0xA4]);
        run(&mut cpu, &mut (), 3);
        let wide = a as u16 * b as u16;
        prop_assert_eq!(((cpu.sfr(SFR_B) as u16) << 8) | cpu.a() as u16, wide);
        prop_assert!(!cpu.psw(PSW_C));
        prop_assert_eq!(cpu.psw(PSW_OV), wide > 0xFF);
    }

    /// A = a/b and B = a%b for nonzero divisors; flags clear.
    #[test]
    fn prop_div(a in any::<u8>(), b in 1u8..) {
        let mut cpu = cpu_with(&[0x74, a, 0x75, 0xF0, b, 0x84]);
        run(&mut cpu, &mut (), 3);
        prop_assert_eq!(cpu.a(), a / b);
        prop_assert_eq!(cpu.b(), a % b);
        prop_assert!(!cpu.psw(PSW_C));
        prop_assert!(!cpu.psw(PSW_OV));
    }

    /// Divide by zero only promises C=0, OV=1.
    #[test]
    fn prop_div_by_zero(a in any::<u8>()) {
        let mut cpu = cpu_with(&[0x74, a, 0x75, 0xF0, 0x00, 0x84]);
        run(&mut cpu, &mut (), 3);
        prop_assert!(!cpu.psw(PSW_C));
        prop_assert!(cpu.psw(PSW_OV));
    }

    /// PSW.P always equals popcount(A) mod 2 after a write to A.
    #[test]
    fn prop_parity(a in any::<u8>()) {
        let mut cpu = cpu_with(&[0x74, a]);
        run(&mut cpu, &mut (), 1);
        prop_assert_eq!(cpu.psw(PSW_P) as u32, a.count_ones() % 2);
    }

    /// ADDC against a widened model: result, carry, aux carry and signed
    /// overflow all agree.
    #[test]
    fn prop_addc_flags(a in any::<u8>(), b in any::<u8>(), carry in any::<bool>()) {
        // CLR C or SETB C / MOV A,#a / ADDC A,#b
        let set_c = if carry { 0xD3 } else { 0xC3 };
        let mut cpu = cpu_with(&[set_c, 0x74, a, 0x34, b]);
        run(&mut cpu, &mut (), 3);

        let wide = a as u16 + b as u16 + carry as u16;
        prop_assert_eq!(cpu.a(), wide as u8);
        prop_assert_eq!(cpu.psw(PSW_C), wide > 0xFF);
        prop_assert_eq!(
            cpu.psw(PSW_AC),
            (a & 0x0F) + (b & 0x0F) + carry as u8 > 0x0F
        );
        let signed = a as i8 as i16 + b as i8 as i16 + carry as i16;
        prop_assert_eq!(cpu.psw(PSW_OV), !(-128..=127).contains(&signed));
        prop_assert_eq!(cpu.psw(PSW_P) as u32, cpu.a().count_ones() % 2);
    }

    /// SUBB against a widened model.
    #[test]
    fn prop_subb_flags(a in any::<u8>(), b in any::<u8>(), borrow in any::<bool>()) {
        let set_c = if borrow { 0xD3 } else { 0xC3 };
        let mut cpu = cpu_with(&[set_c, 0x74, a, 0x94, b]);
        run(&mut cpu, &mut (), 3);

        let wide = a as i16 - b as i16 - borrow as i16;
        prop_assert_eq!(cpu.a(), wide as u8);
        prop_assert_eq!(cpu.psw(PSW_C), wide < 0);
        prop_assert_eq!(
            cpu.psw(PSW_AC),
            ((a & 0x0F) as i16 - (b & 0x0F) as i16 - borrow as i16) < 0
        );
        let signed = a as i8 as i16 - b as i8 as i16 - borrow as i16;
        prop_assert_eq!(cpu.psw(PSW_OV), !(-128..=127).contains(&signed));
    }

    /// PUSH then POP to the same direct address is the identity and leaves
    /// SP where it started.
    #[test]
    fn prop_push_pop_identity(addr in 0u8..0x80, value in any::<u8>()) {
        let mut cpu = cpu_with(&[0xC0, addr, 0xD0, addr]);
        cpu.lower[addr as usize] = value;
        run(&mut cpu, &mut (), 2);
        prop_assert_eq!(cpu.lower[addr as usize], value);
        prop_assert_eq!(cpu.sp(), 0x07);
    }

    /// RET lands on the byte after the LCALL, wherever the callee sits.
    #[test]
    fn prop_lcall_ret(target in 0x0010u16..0x0300) {
        let mut cpu = Cpu::new(CodeMemory::with_size(1024).unwrap());
        cpu.reset(true);
        cpu.code_mut().write(0x0000, 0x12);
        cpu.code_mut().write(0x0001, (target >> 8) as u8);
        cpu.code_mut().write(0x0002, target as u8);
        cpu.code_mut().write(target, 0x22); // RET
        run(&mut cpu, &mut (), 2);
        prop_assert_eq!(cpu.pc, 0x0003);
        prop_assert_eq!(cpu.sp(), 0x07);
    }

    /// A DJNZ countdown costs 1 + 2n cycles to settle past the loop.
    #[test]
    fn prop_djnz_cycles(n in 1u8..40) {
        let mut cpu = cpu_with(&[0x79, n, 0xD9, 0xFE, 0x00]);
        let mut cycles = 0u32;
        while !(cpu.pc == 0x04 && cpu.tick_delay() == 0) {
            cpu.tick(&mut ());
            cycles += 1;
            prop_assert!(cycles < 10_000);
        }
        prop_assert_eq!(cycles, 1 + 2 * n as u32);
        prop_assert_eq!(cpu.r(1), 0);
    }
}
