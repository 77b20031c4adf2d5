//! SFR (special-function register) addresses and bit masks for the base 8051.

/// Base address for SFRs: 0x80
pub const SFR_BASE: u8 = 0x80;
/// Port 0 register: 8-bit bidirectional I/O port
pub const SFR_P0: u8 = 0x80;
/// Stack pointer register: points to the top of the stack in internal RAM
pub const SFR_SP: u8 = 0x81;
/// Data pointer low byte: low byte of the 16-bit data pointer (DPTR)
pub const SFR_DPL: u8 = 0x82;
/// Data pointer high byte: high byte of the 16-bit data pointer (DPTR)
pub const SFR_DPH: u8 = 0x83;
/// Power control register: controls power management features
pub const SFR_PCON: u8 = 0x87;
/// Timer/counter control register: timer run bits and interrupt request flags
pub const SFR_TCON: u8 = 0x88;
/// Timer/counter mode register: sets operating modes for timer 0 and timer 1
pub const SFR_TMOD: u8 = 0x89;
/// Timer 0 low byte
pub const SFR_TL0: u8 = 0x8A;
/// Timer 1 low byte
pub const SFR_TL1: u8 = 0x8B;
/// Timer 0 high byte
pub const SFR_TH0: u8 = 0x8C;
/// Timer 1 high byte
pub const SFR_TH1: u8 = 0x8D;
/// Port 1 register: 8-bit bidirectional I/O port
pub const SFR_P1: u8 = 0x90;
/// Serial control register: serial mode bits and RI/TI request flags
pub const SFR_SCON: u8 = 0x98;
/// Serial buffer register: holds data for serial transmission/reception
pub const SFR_SBUF: u8 = 0x99;
/// Port 2 register: 8-bit bidirectional I/O port; supplies the high address
/// byte for `MOVX @Ri`
pub const SFR_P2: u8 = 0xA0;
/// Interrupt enable register: per-source enables plus the EA master enable
pub const SFR_IE: u8 = 0xA8;
/// Port 3 register: 8-bit bidirectional I/O port
pub const SFR_P3: u8 = 0xB0;
/// Interrupt priority register: selects high or low priority per source
pub const SFR_IP: u8 = 0xB8;
/// Program status word: contains processor status flags
pub const SFR_PSW: u8 = 0xD0;
/// Accumulator register: primary working register for arithmetic operations
pub const SFR_A: u8 = 0xE0;
/// B register: secondary working register used in multiplication/division
pub const SFR_B: u8 = 0xF0;

/// Carry flag: bit position within PSW
pub const PSW_C: u8 = 0x07;
/// Auxiliary carry flag: carry out of the low nibble
pub const PSW_AC: u8 = 0x06;
/// User-defined flag 0
pub const PSW_F0: u8 = 0x05;
/// Register bank select 1
pub const PSW_RS1: u8 = 0x04;
/// Register bank select 0
pub const PSW_RS0: u8 = 0x03;
/// Overflow flag
pub const PSW_OV: u8 = 0x02;
/// Reserved bit
pub const PSW_RES: u8 = 0x01;
/// Parity flag: even/odd number of ones in the accumulator
pub const PSW_P: u8 = 0x00;

/// PSW bits ignored by the RETI preservation check (P, F0 and the reserved
/// bit carry no cross-interrupt contract).
pub const PSW_IRET_IGNORE: u8 = (1 << PSW_P) | (1 << PSW_F0) | (1 << PSW_RES);

pub const IE_EX0: u8 = 0x01;
pub const IE_ET0: u8 = 0x02;
pub const IE_EX1: u8 = 0x04;
pub const IE_ET1: u8 = 0x08;
pub const IE_ES: u8 = 0x10;
/// Master enable: no interrupt is taken while clear.
pub const IE_EA: u8 = 0x80;

pub const IP_PX0: u8 = 0x01;
pub const IP_PT0: u8 = 0x02;
pub const IP_PX1: u8 = 0x04;
pub const IP_PT1: u8 = 0x08;
pub const IP_PS: u8 = 0x10;

/// External interrupt 0 type: set = edge-triggered
pub const TCON_IT0: u8 = 0x01;
/// External interrupt 0 request flag
pub const TCON_IE0: u8 = 0x02;
/// External interrupt 1 type: set = edge-triggered
pub const TCON_IT1: u8 = 0x04;
/// External interrupt 1 request flag
pub const TCON_IE1: u8 = 0x08;
/// Timer 0 run control
pub const TCON_TR0: u8 = 0x10;
/// Timer 0 overflow flag
pub const TCON_TF0: u8 = 0x20;
/// Timer 1 run control
pub const TCON_TR1: u8 = 0x40;
/// Timer 1 overflow flag
pub const TCON_TF1: u8 = 0x80;

/// Serial receive interrupt request flag
pub const SCON_RI: u8 = 0x01;
/// Serial transmit interrupt request flag
pub const SCON_TI: u8 = 0x02;

/// Returns the conventional name of an SFR byte address, if it has one.
pub fn sfr_name(addr: u8) -> Option<&'static str> {
    Some(match addr {
        SFR_P0 => "P0",
        SFR_SP => "SP",
        SFR_DPL => "DPL",
        SFR_DPH => "DPH",
        SFR_PCON => "PCON",
        SFR_TCON => "TCON",
        SFR_TMOD => "TMOD",
        SFR_TL0 => "TL0",
        SFR_TL1 => "TL1",
        SFR_TH0 => "TH0",
        SFR_TH1 => "TH1",
        SFR_P1 => "P1",
        SFR_SCON => "SCON",
        SFR_SBUF => "SBUF",
        SFR_P2 => "P2",
        SFR_IE => "IE",
        SFR_P3 => "P3",
        SFR_IP => "IP",
        SFR_PSW => "PSW",
        SFR_A => "ACC",
        SFR_B => "B",
        _ => return None,
    })
}
