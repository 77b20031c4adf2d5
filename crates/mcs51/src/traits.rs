use crate::cpu::{Cpu, Exception};

/// Host-side overrides for the CPU's bus transactions, passed into
/// [`Cpu::tick`]/[`Cpu::do_op`] per call.
///
/// Every method has a default reproducing the bare-silicon behavior, so a
/// host that wants nothing special can pass `&mut ()`. Methods receive the
/// CPU by shared reference; mutating it from inside a hook is deliberately
/// unrepresentable.
pub trait Hooks {
    /// Override a direct read of an SFR. Returning `None` falls back to the
    /// latch value in the SFR bank.
    ///
    /// Not consulted for ACC or PSW, nor for the core's internal register
    /// plumbing (flag engine, parity maintenance, interrupt sampling).
    fn sfr_read(&mut self, cpu: &Cpu, sfr: u8) -> Option<u8> {
        let _ = (cpu, sfr);
        None
    }

    /// Observe a direct write to an SFR. Called after the latch has been
    /// updated; `cpu.sfr(sfr)` already holds the new value. Not called for
    /// ACC or internal-path writes.
    fn sfr_write(&mut self, cpu: &Cpu, sfr: u8) {
        let _ = (cpu, sfr);
    }

    /// Override a `MOVX` read. Returning `None` falls back to indexing the
    /// CPU's external RAM modulo its size.
    fn xdata_read(&mut self, cpu: &Cpu, addr: u16) -> Option<u8> {
        let _ = (cpu, addr);
        None
    }

    /// Intercept a `MOVX` write. Returning `true` claims the transaction;
    /// `false` lets the CPU write its external RAM as usual.
    fn xdata_write(&mut self, cpu: &Cpu, addr: u16, value: u8) -> bool {
        let _ = (cpu, addr, value);
        false
    }

    /// A suspicious-but-survivable condition was detected. Execution
    /// continues after this returns; halting is the host's decision.
    fn exception(&mut self, cpu: &Cpu, cause: Exception) {
        let _ = (cpu, cause);
    }
}

/// The no-host case: latch-backed SFRs, plain external RAM, ignored
/// diagnostics.
impl Hooks for () {}

impl<H: Hooks + ?Sized> Hooks for &mut H {
    fn sfr_read(&mut self, cpu: &Cpu, sfr: u8) -> Option<u8> {
        (**self).sfr_read(cpu, sfr)
    }
    fn sfr_write(&mut self, cpu: &Cpu, sfr: u8) {
        (**self).sfr_write(cpu, sfr)
    }
    fn xdata_read(&mut self, cpu: &Cpu, addr: u16) -> Option<u8> {
        (**self).xdata_read(cpu, addr)
    }
    fn xdata_write(&mut self, cpu: &Cpu, addr: u16, value: u8) -> bool {
        (**self).xdata_write(cpu, addr, value)
    }
    fn exception(&mut self, cpu: &Cpu, cause: Exception) {
        (**self).exception(cpu, cause)
    }
}

/// Two hook sets composed: `A` is offered each transaction first, `B` sees
/// whatever `A` declined. Exceptions are delivered to both.
impl<A, B> Hooks for (A, B)
where
    A: Hooks,
    B: Hooks,
{
    fn sfr_read(&mut self, cpu: &Cpu, sfr: u8) -> Option<u8> {
        self.0.sfr_read(cpu, sfr).or_else(|| self.1.sfr_read(cpu, sfr))
    }
    fn sfr_write(&mut self, cpu: &Cpu, sfr: u8) {
        self.0.sfr_write(cpu, sfr);
        self.1.sfr_write(cpu, sfr);
    }
    fn xdata_read(&mut self, cpu: &Cpu, addr: u16) -> Option<u8> {
        self.0
            .xdata_read(cpu, addr)
            .or_else(|| self.1.xdata_read(cpu, addr))
    }
    fn xdata_write(&mut self, cpu: &Cpu, addr: u16, value: u8) -> bool {
        self.0.xdata_write(cpu, addr, value) || self.1.xdata_write(cpu, addr, value)
    }
    fn exception(&mut self, cpu: &Cpu, cause: Exception) {
        self.0.exception(cpu, cause);
        self.1.exception(cpu, cause);
    }
}
