use bitfield_struct::bitfield;

/// `IA32_APIC_BASE` (MSR `0x1B`).
#[bitfield(u64)]
pub struct Ia32ApicBase {
    #[bits(8)]
    __: u8,

    /// Bit 8: set on the bootstrap processor by hardware.
    pub bsp: bool,

    #[bits(1)]
    __: u8,

    /// Bit 10: x2APIC mode (EXTD).
    pub x2apic: bool,

    /// Bit 11: APIC global enable.
    pub enabled: bool,

    /// Bits 12–51: xAPIC MMIO base >> 12 (unused in x2APIC mode).
    #[bits(40)]
    pub base_4k: u64,

    #[bits(12)]
    __: u16,
}
