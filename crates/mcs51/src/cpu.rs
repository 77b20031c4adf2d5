use std::fmt;

use tracing::{debug, trace};

use crate::disasm;
use crate::memory::{CodeMemory, ExternalRam};
use crate::ops::{self, OpHandler};
use crate::sfr::*;
use crate::traits::Hooks;

/// Low-priority ISR in flight.
pub const ACTIVE_LOW: u8 = 0x01;
/// High-priority ISR in flight.
pub const ACTIVE_HIGH: u8 = 0x02;

/// Suspicious-but-survivable conditions detected during execution.
///
/// These are diagnostics, not aborts: they are delivered through
/// [`Hooks::exception`] and execution continues with well-defined behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// Stack access above 0x7F with no upper RAM fitted, or the stack
    /// pointer rolled over.
    Stack,
    /// An accumulator-to-accumulator move encoded through the direct ACC
    /// address (`MOV A,0E0h` / `MOV 0E0h,A`).
    AccToA,
    /// PSW at RETI differs from the value at ISR entry (P, F0 and the
    /// reserved bit excluded).
    IretPswMismatch,
    /// SP at RETI differs from the value at ISR entry.
    IretSpMismatch,
    /// A at RETI differs from the value at ISR entry.
    IretAccMismatch,
    /// The single reserved opcode (0xA5) was executed.
    IllegalOpcode,
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exception::Stack => write!(f, "stack outside internal RAM, or SP rollover"),
            Exception::AccToA => write!(f, "accumulator moved to itself via direct ACC address"),
            Exception::IretPswMismatch => write!(f, "PSW not preserved over interrupt"),
            Exception::IretSpMismatch => write!(f, "SP not preserved over interrupt"),
            Exception::IretAccMismatch => write!(f, "A not preserved over interrupt"),
            Exception::IllegalOpcode => write!(f, "reserved opcode executed"),
        }
    }
}

impl std::error::Error for Exception {}

/// The five interrupt sources of the base 8051, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Ext0,
    Timer0,
    Ext1,
    Timer1,
    Serial,
}

impl Interrupt {
    /// Sampling order; ties within a priority level resolve in this order.
    pub const POLL_ORDER: [Interrupt; 5] = [
        Interrupt::Ext0,
        Interrupt::Timer0,
        Interrupt::Ext1,
        Interrupt::Timer1,
        Interrupt::Serial,
    ];

    /// Fixed code address the source vectors to.
    pub fn vector(self) -> u16 {
        match self {
            Interrupt::Ext0 => 0x0003,
            Interrupt::Timer0 => 0x000B,
            Interrupt::Ext1 => 0x0013,
            Interrupt::Timer1 => 0x001B,
            Interrupt::Serial => 0x0023,
        }
    }

    fn enable_mask(self) -> u8 {
        match self {
            Interrupt::Ext0 => IE_EX0,
            Interrupt::Timer0 => IE_ET0,
            Interrupt::Ext1 => IE_EX1,
            Interrupt::Timer1 => IE_ET1,
            Interrupt::Serial => IE_ES,
        }
    }

    fn priority_mask(self) -> u8 {
        match self {
            Interrupt::Ext0 => IP_PX0,
            Interrupt::Timer0 => IP_PT0,
            Interrupt::Ext1 => IP_PX1,
            Interrupt::Timer1 => IP_PT1,
            Interrupt::Serial => IP_PS,
        }
    }
}

/// Register values recorded at ISR entry, for the RETI preservation checks.
#[derive(Debug, Clone, Copy, Default)]
struct IrqSnapshot {
    a: u8,
    psw: u8,
    sp: u8,
}

pub struct Cpu {
    code: CodeMemory,
    xdata: ExternalRam,
    /// Internal RAM 0x00-0x7F: register banks, bit space, stack, scratch.
    pub lower: [u8; 128],
    /// Internal RAM 0x80-0xFF, indirect-only. `None` on 8031/8051-class
    /// parts without it; stack growth into this range then raises
    /// [`Exception::Stack`].
    pub upper: Option<Box<[u8; 128]>>,
    /// SFR latches, directly addressable at 0x80-0xFF.
    pub sfr: [u8; 128],
    pub pc: u16,
    tick_delay: u32,
    interrupt_active: u8,
    int_snapshot: [IrqSnapshot; 2],
    ops: [OpHandler; 256],
}

impl Cpu {
    /// Creates a CPU in reset state around the given program memory, with
    /// no external RAM and no upper internal RAM.
    pub fn new(code: CodeMemory) -> Self {
        let mut cpu = Self {
            code,
            xdata: ExternalRam::none(),
            lower: [0; 128],
            upper: None,
            sfr: [0; 128],
            pc: 0,
            tick_delay: 0,
            interrupt_active: 0,
            int_snapshot: [IrqSnapshot::default(); 2],
            ops: ops::default_table(),
        };
        cpu.reset(false);
        cpu
    }

    /// Attaches external data memory.
    pub fn with_xdata(mut self, xdata: ExternalRam) -> Self {
        self.xdata = xdata;
        self
    }

    /// Fits the upper 128 bytes of internal RAM (8052-style idata).
    pub fn with_upper_ram(mut self) -> Self {
        self.upper = Some(Box::new([0; 128]));
        self
    }

    /// Puts the CPU back into reset state: PC = 0, SP = 0x07, flags and
    /// pointer registers cleared, ports released high, the default opcode
    /// table reinstalled. `wipe` additionally zeroes lower, upper and
    /// external RAM (program memory is left alone).
    pub fn reset(&mut self, wipe: bool) {
        if wipe {
            self.lower.fill(0);
            if let Some(upper) = self.upper.as_deref_mut() {
                upper.fill(0);
            }
            self.xdata.fill(0);
        }
        self.sfr.fill(0);
        self.sfr_set(SFR_SP, 0x07);
        for port in [SFR_P0, SFR_P1, SFR_P2, SFR_P3] {
            self.sfr_set(port, 0xFF);
        }
        self.pc = 0;
        self.tick_delay = 0;
        self.interrupt_active = 0;
        self.int_snapshot = [IrqSnapshot::default(); 2];
        self.ops = ops::default_table();
        debug!("cpu reset (wipe={})", wipe);
    }

    // --- register and SFR plumbing (internal path: no hooks) ---

    pub fn a(&self) -> u8 {
        self.sfr(SFR_A)
    }

    /// The single funnel for accumulator writes; keeps PSW.P equal to the
    /// bit-parity of A.
    pub(crate) fn a_set(&mut self, value: u8) {
        self.sfr[(SFR_A - SFR_BASE) as usize] = value;
        self.psw_set(PSW_P, value.count_ones() & 1 != 0);
    }

    pub fn b(&self) -> u8 {
        self.sfr(SFR_B)
    }

    pub(crate) fn b_set(&mut self, value: u8) {
        self.sfr[(SFR_B - SFR_BASE) as usize] = value;
    }

    pub fn sp(&self) -> u8 {
        self.sfr(SFR_SP)
    }

    pub(crate) fn sp_set(&mut self, value: u8) {
        self.sfr[(SFR_SP - SFR_BASE) as usize] = value;
    }

    pub fn dptr(&self) -> u16 {
        ((self.sfr(SFR_DPH) as u16) << 8) | self.sfr(SFR_DPL) as u16
    }

    pub(crate) fn dptr_set(&mut self, value: u16) {
        self.sfr[(SFR_DPH - SFR_BASE) as usize] = (value >> 8) as u8;
        self.sfr[(SFR_DPL - SFR_BASE) as usize] = (value & 0xFF) as u8;
    }

    /// Latch value of the SFR at byte address `addr` (0x80-0xFF).
    pub fn sfr(&self, addr: u8) -> u8 {
        self.sfr[addr.wrapping_sub(SFR_BASE) as usize]
    }

    /// Raw latch write. Accumulator writes are diverted through the parity
    /// funnel.
    pub(crate) fn sfr_set(&mut self, addr: u8, value: u8) {
        if addr == SFR_A {
            self.a_set(value);
        } else {
            self.sfr[addr.wrapping_sub(SFR_BASE) as usize] = value;
        }
    }

    pub fn psw(&self, flag: u8) -> bool {
        self.sfr(SFR_PSW) & (1 << flag) != 0
    }

    pub(crate) fn psw_set(&mut self, flag: u8, value: bool) {
        let idx = (SFR_PSW - SFR_BASE) as usize;
        if value {
            self.sfr[idx] |= 1 << flag;
        } else {
            self.sfr[idx] &= !(1 << flag);
        }
    }

    fn bank_base(&self) -> usize {
        (((self.sfr(SFR_PSW) >> 3) & 0x03) as usize) * 8
    }

    /// `Rn` in the bank selected by PSW RS1:RS0.
    pub fn r(&self, n: u8) -> u8 {
        self.lower[self.bank_base() + n as usize]
    }

    pub(crate) fn r_set(&mut self, n: u8, value: u8) {
        self.lower[self.bank_base() + n as usize] = value;
    }

    // --- hooked SFR path (direct addressing from program code) ---

    pub(crate) fn sfr_read_hooked(&mut self, ctx: &mut dyn Hooks, addr: u8) -> u8 {
        // A and PSW always answer from the latch: a hook overriding either
        // would desync the parity funnel and flag engine from what the
        // program observes.
        if addr == SFR_A {
            return self.a();
        }
        if addr == SFR_PSW {
            return self.sfr(SFR_PSW);
        }
        match ctx.sfr_read(&*self, addr) {
            Some(value) => value,
            None => self.sfr(addr),
        }
    }

    pub(crate) fn sfr_write_hooked(&mut self, ctx: &mut dyn Hooks, addr: u8, value: u8) {
        if addr == SFR_A {
            self.a_set(value);
            return;
        }
        self.sfr[addr.wrapping_sub(SFR_BASE) as usize] = value;
        ctx.sfr_write(&*self, addr);
    }

    // --- addressing modes; every helper carries its mode explicitly ---

    /// Direct addressing: 0x00-0x7F is lower RAM, 0x80-0xFF is the SFR bank.
    pub(crate) fn read_direct(&mut self, ctx: &mut dyn Hooks, addr: u8) -> u8 {
        if addr < 0x80 {
            self.lower[addr as usize]
        } else {
            self.sfr_read_hooked(ctx, addr)
        }
    }

    pub(crate) fn write_direct(&mut self, ctx: &mut dyn Hooks, addr: u8, value: u8) {
        if addr < 0x80 {
            self.lower[addr as usize] = value;
        } else {
            self.sfr_write_hooked(ctx, addr, value);
        }
    }

    /// Indirect addressing: 0x00-0x7F is lower RAM, 0x80-0xFF is upper RAM
    /// when fitted. Without upper RAM the access raises the STACK
    /// diagnostic; reads return 0, writes are dropped.
    pub(crate) fn read_indirect(&mut self, ctx: &mut dyn Hooks, addr: u8) -> u8 {
        if addr < 0x80 {
            self.lower[addr as usize]
        } else {
            match self.upper.as_deref() {
                Some(upper) => upper[(addr & 0x7F) as usize],
                None => {
                    self.raise(ctx, Exception::Stack);
                    0
                }
            }
        }
    }

    pub(crate) fn write_indirect(&mut self, ctx: &mut dyn Hooks, addr: u8, value: u8) {
        if addr < 0x80 {
            self.lower[addr as usize] = value;
        } else {
            match self.upper.as_deref_mut() {
                Some(upper) => upper[(addr & 0x7F) as usize] = value,
                None => self.raise(ctx, Exception::Stack),
            }
        }
    }

    /// Bit addressing: 0x00-0x7F maps into lower RAM bytes 0x20-0x2F,
    /// 0x80-0xFF into the SFRs whose byte address has a zero low nibble
    /// or sits on an 8-byte boundary (byte = bit & 0xF8).
    pub(crate) fn read_bit(&mut self, ctx: &mut dyn Hooks, bit: u8) -> bool {
        let pos = bit & 0x07;
        if bit < 0x80 {
            self.lower[(0x20 + (bit >> 3)) as usize] & (1 << pos) != 0
        } else {
            self.sfr_read_hooked(ctx, bit & 0xF8) & (1 << pos) != 0
        }
    }

    pub(crate) fn write_bit(&mut self, ctx: &mut dyn Hooks, bit: u8, value: bool) {
        let pos = bit & 0x07;
        if bit < 0x80 {
            let byte = &mut self.lower[(0x20 + (bit >> 3)) as usize];
            if value {
                *byte |= 1 << pos;
            } else {
                *byte &= !(1 << pos);
            }
        } else {
            let addr = bit & 0xF8;
            let byte = self.sfr_read_hooked(ctx, addr);
            let byte = if value {
                byte | (1 << pos)
            } else {
                byte & !(1 << pos)
            };
            self.sfr_write_hooked(ctx, addr, byte);
        }
    }

    // --- external buses ---

    pub fn read_code(&self, addr: u16) -> u8 {
        self.code.read(addr)
    }

    pub fn code(&self) -> &CodeMemory {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut CodeMemory {
        &mut self.code
    }

    pub fn xdata(&self) -> &ExternalRam {
        &self.xdata
    }

    pub fn xdata_mut(&mut self) -> &mut ExternalRam {
        &mut self.xdata
    }

    pub(crate) fn read_xdata(&mut self, ctx: &mut dyn Hooks, addr: u16) -> u8 {
        match ctx.xdata_read(&*self, addr) {
            Some(value) => value,
            None => self.xdata.read(addr),
        }
    }

    pub(crate) fn write_xdata(&mut self, ctx: &mut dyn Hooks, addr: u16, value: u8) {
        if !ctx.xdata_write(&*self, addr, value) {
            self.xdata.write(addr, value);
        }
    }

    // --- stack protocol ---

    pub(crate) fn push_stack(&mut self, ctx: &mut dyn Hooks, value: u8) {
        let sp = self.sp().wrapping_add(1);
        self.sp_set(sp);
        if sp == 0 {
            self.raise(ctx, Exception::Stack);
        }
        self.write_indirect(ctx, sp, value);
    }

    /// Low byte first, then high, as the hardware call instructions do.
    pub(crate) fn push_stack16(&mut self, ctx: &mut dyn Hooks, value: u16) {
        self.push_stack(ctx, (value & 0xFF) as u8);
        self.push_stack(ctx, (value >> 8) as u8);
    }

    pub(crate) fn pop_stack(&mut self, ctx: &mut dyn Hooks) -> u8 {
        let sp = self.sp();
        let value = self.read_indirect(ctx, sp);
        self.sp_set(sp.wrapping_sub(1));
        if sp == 0 {
            self.raise(ctx, Exception::Stack);
        }
        value
    }

    pub(crate) fn pop_stack16(&mut self, ctx: &mut dyn Hooks) -> u16 {
        let hi = self.pop_stack(ctx);
        let lo = self.pop_stack(ctx);
        ((hi as u16) << 8) | lo as u16
    }

    // --- diagnostics ---

    pub(crate) fn raise(&mut self, ctx: &mut dyn Hooks, cause: Exception) {
        trace!("exception at {:04X}: {}", self.pc, cause);
        ctx.exception(&*self, cause);
    }

    // --- interrupt controller ---

    /// Which ISR priority levels are in flight ([`ACTIVE_LOW`] /
    /// [`ACTIVE_HIGH`] bits).
    pub fn interrupt_active(&self) -> u8 {
        self.interrupt_active
    }

    /// Samples IE/IP/TCON/SCON at an instruction boundary and vectors to
    /// the winning pending source, if any. Returns whether a dispatch
    /// happened; the transition costs two machine cycles, one of which the
    /// caller has already consumed.
    fn poll_interrupts(&mut self, ctx: &mut dyn Hooks) -> bool {
        if self.interrupt_active & ACTIVE_HIGH != 0 {
            return false;
        }
        let ie = self.sfr(SFR_IE);
        if ie & IE_EA == 0 {
            return false;
        }
        let tcon = self.sfr(SFR_TCON);
        let scon = self.sfr(SFR_SCON);
        let ip = self.sfr(SFR_IP);

        let mut first_low = None;
        let mut first_high = None;
        for source in Interrupt::POLL_ORDER {
            if ie & source.enable_mask() == 0 {
                continue;
            }
            let requested = match source {
                Interrupt::Ext0 => tcon & TCON_IE0 != 0,
                Interrupt::Timer0 => tcon & TCON_TF0 != 0,
                Interrupt::Ext1 => tcon & TCON_IE1 != 0,
                Interrupt::Timer1 => tcon & TCON_TF1 != 0,
                Interrupt::Serial => scon & (SCON_RI | SCON_TI) != 0,
            };
            if !requested {
                continue;
            }
            if ip & source.priority_mask() != 0 {
                if first_high.is_none() {
                    first_high = Some(source);
                }
            } else if first_low.is_none() {
                first_low = Some(source);
            }
        }

        let (source, high) = match (first_high, first_low) {
            (Some(source), _) => (source, true),
            (None, Some(source)) if self.interrupt_active == 0 => (source, false),
            _ => return false,
        };

        let level = high as usize;
        self.int_snapshot[level] = IrqSnapshot {
            a: self.a(),
            psw: self.sfr(SFR_PSW),
            sp: self.sp(),
        };

        // Acknowledge: edge-triggered external requests and timer overflow
        // flags clear on dispatch; level-triggered externals and the serial
        // RI/TI flags stay for the ISR to handle.
        match source {
            Interrupt::Ext0 => {
                if tcon & TCON_IT0 != 0 {
                    self.sfr_set(SFR_TCON, self.sfr(SFR_TCON) & !TCON_IE0);
                }
            }
            Interrupt::Ext1 => {
                if tcon & TCON_IT1 != 0 {
                    self.sfr_set(SFR_TCON, self.sfr(SFR_TCON) & !TCON_IE1);
                }
            }
            Interrupt::Timer0 => self.sfr_set(SFR_TCON, self.sfr(SFR_TCON) & !TCON_TF0),
            Interrupt::Timer1 => self.sfr_set(SFR_TCON, self.sfr(SFR_TCON) & !TCON_TF1),
            Interrupt::Serial => {}
        }

        let return_pc = self.pc;
        self.push_stack16(ctx, return_pc);
        self.interrupt_active |= if high { ACTIVE_HIGH } else { ACTIVE_LOW };
        self.pc = source.vector();
        self.tick_delay = 1;
        trace!(
            "interrupt {:?} dispatched to {:04X} ({} priority)",
            source,
            self.pc,
            if high { "high" } else { "low" }
        );
        true
    }

    /// RETI: restore PC, run the preservation diagnostics against the
    /// entry snapshot, release the active priority level. The return
    /// proceeds even when a mismatch is reported.
    pub(crate) fn return_from_interrupt(&mut self, ctx: &mut dyn Hooks) {
        self.pc = self.pop_stack16(ctx);
        if self.interrupt_active == 0 {
            return;
        }
        let high = self.interrupt_active & ACTIVE_HIGH != 0;
        let snap = self.int_snapshot[high as usize];
        if self.sp() != snap.sp {
            self.raise(ctx, Exception::IretSpMismatch);
        }
        if self.sfr(SFR_PSW) & !PSW_IRET_IGNORE != snap.psw & !PSW_IRET_IGNORE {
            self.raise(ctx, Exception::IretPswMismatch);
        }
        if self.a() != snap.a {
            self.raise(ctx, Exception::IretAccMismatch);
        }
        self.interrupt_active &= !if high { ACTIVE_HIGH } else { ACTIVE_LOW };
        trace!(
            "return from {} priority interrupt",
            if high { "high" } else { "low" }
        );
    }

    // --- executor ---

    /// Cycles still owed by the in-flight instruction.
    pub fn tick_delay(&self) -> u32 {
        self.tick_delay
    }

    /// Advances one machine cycle. Returns `true` when an instruction
    /// retired on this cycle; interrupt transitions and the tail cycles of
    /// multi-cycle instructions return `false`.
    pub fn tick(&mut self, ctx: &mut dyn Hooks) -> bool {
        if self.tick_delay > 0 {
            self.tick_delay -= 1;
            return false;
        }
        if self.poll_interrupts(ctx) {
            return false;
        }
        let opcode = self.code.read(self.pc);
        let handler = self.ops[opcode as usize];
        let cycles = handler(self, ctx);
        self.tick_delay = cycles.saturating_sub(1);
        true
    }

    /// Executes one complete step synchronously, collapsing any cycle
    /// countdown, and returns its machine-cycle cost. A pending interrupt
    /// is taken first and counts as the step (two cycles).
    pub fn do_op(&mut self, ctx: &mut dyn Hooks) -> u32 {
        self.tick_delay = 0;
        if self.poll_interrupts(ctx) {
            self.tick_delay = 0;
            return 2;
        }
        let opcode = self.code.read(self.pc);
        let handler = self.ops[opcode as usize];
        handler(self, ctx)
    }

    /// Replaces the handler for one opcode on this instance.
    pub fn set_op(&mut self, opcode: u8, handler: OpHandler) {
        self.ops[opcode as usize] = handler;
    }

    /// Decodes the instruction at `addr` into (length, mnemonic).
    pub fn decode(&self, addr: u16) -> (u8, String) {
        disasm::decode(&self.code, addr)
    }
}
