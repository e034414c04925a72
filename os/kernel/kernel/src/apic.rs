//! # Local APIC (x2APIC)
//!
//! The kernel runs the local APIC in x2APIC mode only: identification and
//! inter-processor interrupts are MSR accesses. The universal start-up
//! algorithm (Intel SDM Vol. 3, §9.4.4) is expressed once in
//! [`InitSipiSipi`], over a [`LocalApic`] that only knows how to write the
//! interrupt command register and wait.

use kernel_info::smp::startup_vector;
use kernel_memory_addresses::PhysicalAddress;
use kernel_registers::msr::Icr;
use kernel_smp::{SmpError, StartupIpi};
use log::{debug, error};

/// Wait after asserting INIT.
pub const INIT_ASSERT_DELAY_US: u32 = 200;

/// Wait after de-asserting INIT, before the first start-up IPI.
pub const INIT_DEASSERT_DELAY_US: u32 = 10_000;

/// Wait after each start-up IPI.
pub const SIPI_DELAY_US: u32 = 200;

/// The calling core's local APIC, as far as start-up needs it.
pub trait LocalApic {
    /// Write the interrupt command register.
    fn send(&mut self, icr: Icr);

    /// Busy-wait for roughly `us` microseconds.
    fn delay_us(&mut self, us: u32);
}

/// INIT, INIT de-assert, then two start-up IPIs.
#[derive(Debug)]
pub struct InitSipiSipi<L> {
    apic: L,
}

impl<L: LocalApic> InitSipiSipi<L> {
    pub const fn new(apic: L) -> Self {
        Self { apic }
    }
}

impl<L: LocalApic> StartupIpi for InitSipiSipi<L> {
    fn send_startup(&mut self, apic_id: u32, target: PhysicalAddress) -> Result<(), SmpError> {
        let Some(vector) = startup_vector(target.as_u64()) else {
            error!("cannot start APIC {apic_id} at {target}: not a real-mode page");
            return Err(SmpError::Startup { apic_id, target });
        };

        debug!("APIC {apic_id}: INIT, SIPI {vector:#04x} x2");
        self.apic.send(Icr::init(apic_id));
        self.apic.delay_us(INIT_ASSERT_DELAY_US);
        self.apic.send(Icr::init_deassert(apic_id));
        self.apic.delay_us(INIT_DEASSERT_DELAY_US);

        // Processors that ignore the first start-up IPI accept the second.
        for _ in 0..2 {
            self.apic.send(Icr::startup(apic_id, vector));
            self.apic.delay_us(SIPI_DELAY_US);
        }
        Ok(())
    }
}

/// The x2APIC of the executing core.
#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct X2Apic;

#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
impl X2Apic {
    /// Spurious vector, with the software-enable bit.
    const SVR_ENABLE: u64 = (1 << 8) | 0xFF;

    /// Switch the calling core to x2APIC mode and software-enable it.
    ///
    /// # Safety
    /// Ring 0 only. The CPU must support x2APIC.
    pub unsafe fn enable() -> u32 {
        use kernel_registers::msr::{IA32_APIC_BASE, Ia32ApicBase, X2APIC_SVR};

        unsafe {
            let base = Ia32ApicBase::from_bits(IA32_APIC_BASE.load_raw())
                .with_enabled(true)
                .with_x2apic(true);
            IA32_APIC_BASE.store_raw(base.into_bits());
            X2APIC_SVR.store_raw(Self::SVR_ENABLE);
        }
        Self::id()
    }

    /// APIC id of the executing core.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn id() -> u32 {
        // SAFETY: reading the ID MSR has no side effects once x2APIC is on.
        unsafe { kernel_registers::msr::X2APIC_ID.load_raw() as u32 }
    }
}

#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
impl LocalApic for X2Apic {
    fn send(&mut self, icr: Icr) {
        // SAFETY: a single WRMSR; x2APIC mode was enabled during boot.
        unsafe { kernel_registers::msr::X2APIC_ICR.store_raw(icr.into_bits()) }
    }

    fn delay_us(&mut self, us: u32) {
        // Uncalibrated: a port 0x80 write takes about a microsecond.
        for _ in 0..us {
            // SAFETY: the POST diagnostic port is free to write.
            unsafe {
                core::arch::asm!("out 0x80, al", in("al") 0u8, options(nomem, nostack, preserves_flags));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::smp::TRAMPOLINE_PHYS;
    use kernel_registers::msr::{DeliveryMode, Level};

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Icr>,
        waited: Vec<u32>,
    }

    impl LocalApic for Recorder {
        fn send(&mut self, icr: Icr) {
            self.sent.push(icr);
        }

        fn delay_us(&mut self, us: u32) {
            self.waited.push(us);
        }
    }

    #[test]
    fn init_then_two_startups() {
        let mut ipi = InitSipiSipi::new(Recorder::default());
        ipi.send_startup(3, PhysicalAddress::new(TRAMPOLINE_PHYS))
            .unwrap();
        let rec = ipi.apic;

        let modes: Vec<_> = rec.sent.iter().map(Icr::delivery_mode).collect();
        assert_eq!(
            modes,
            [
                DeliveryMode::Init,
                DeliveryMode::Init,
                DeliveryMode::Startup,
                DeliveryMode::Startup
            ]
        );
        assert_eq!(rec.sent[0].level(), Level::Assert);
        assert_eq!(rec.sent[1].level(), Level::Deassert);
        assert!(rec.sent.iter().all(|icr| icr.destination() == 3));
        assert!(rec.sent[2..].iter().all(|icr| icr.vector() == 0x07));
        assert_eq!(
            rec.waited,
            [INIT_ASSERT_DELAY_US, INIT_DEASSERT_DELAY_US, SIPI_DELAY_US, SIPI_DELAY_US]
        );
    }

    #[test]
    fn targets_outside_real_mode_are_refused() {
        let mut ipi = InitSipiSipi::new(Recorder::default());
        for raw in [0x10_0000, 0x7010] {
            let target = PhysicalAddress::new(raw);
            assert_eq!(
                ipi.send_startup(1, target),
                Err(SmpError::Startup { apic_id: 1, target })
            );
        }
        assert!(ipi.apic.sent.is_empty());
    }
}
