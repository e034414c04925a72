use bitfield_struct::bitfield;

/// x2APIC interrupt command register (MSR `0x830`).
///
/// ```rust
/// # use kernel_registers::msr::{DeliveryMode, Icr, Level};
/// let sipi = Icr::startup(3, 0x07);
/// assert_eq!(sipi.vector(), 0x07);
/// assert_eq!(sipi.delivery_mode(), DeliveryMode::Startup);
/// assert_eq!(sipi.destination(), 3);
/// ```
#[bitfield(u64)]
pub struct Icr {
    /// Bits 0–7: vector. For a start-up IPI this is the page number of the
    /// real-mode entry point.
    pub vector: u8,

    /// Bits 8–10: delivery mode.
    #[bits(3)]
    pub delivery_mode: DeliveryMode,

    /// Bit 11: logical (1) or physical (0) destination.
    pub logical_destination: bool,

    #[bits(2)]
    __: u8,

    /// Bit 14: level.
    #[bits(1)]
    pub level: Level,

    /// Bit 15: trigger mode.
    #[bits(1)]
    pub trigger_mode: TriggerMode,

    #[bits(16)]
    __: u16,

    /// Bits 32–63: destination x2APIC ID.
    pub destination: u32,
}

impl Icr {
    /// INIT IPI to `apic_id`, asserted and level-triggered.
    #[must_use]
    pub const fn init(apic_id: u32) -> Self {
        Self::new()
            .with_delivery_mode(DeliveryMode::Init)
            .with_level(Level::Assert)
            .with_trigger_mode(TriggerMode::Level)
            .with_destination(apic_id)
    }

    /// INIT level de-assert, broadcast the way older processors expect it.
    #[must_use]
    pub const fn init_deassert(apic_id: u32) -> Self {
        Self::new()
            .with_delivery_mode(DeliveryMode::Init)
            .with_level(Level::Deassert)
            .with_trigger_mode(TriggerMode::Level)
            .with_destination(apic_id)
    }

    /// Start-up IPI to `apic_id` entering real mode at `vector << 12`.
    #[must_use]
    pub const fn startup(apic_id: u32, vector: u8) -> Self {
        Self::new()
            .with_vector(vector)
            .with_delivery_mode(DeliveryMode::Startup)
            .with_level(Level::Assert)
            .with_destination(apic_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeliveryMode {
    Fixed = 0b000,
    LowestPriority = 0b001,
    Smi = 0b010,
    Reserved = 0b011,
    Nmi = 0b100,
    Init = 0b101,
    Startup = 0b110,
    Reserved2 = 0b111,
}

impl DeliveryMode {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b111 {
            0b000 => Self::Fixed,
            0b001 => Self::LowestPriority,
            0b010 => Self::Smi,
            0b011 => Self::Reserved,
            0b100 => Self::Nmi,
            0b101 => Self::Init,
            0b110 => Self::Startup,
            _ => Self::Reserved2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Level {
    Deassert = 0,
    Assert = 1,
}

impl Level {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        if value & 1 == 0 {
            Self::Deassert
        } else {
            Self::Assert
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerMode {
    Edge = 0,
    Level = 1,
}

impl TriggerMode {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        if value & 1 == 0 {
            Self::Edge
        } else {
            Self::Level
        }
    }
}
