//! Virtualization memory overhead
//!
//! The launcher pod runs the hypervisor process, which consumes memory beyond
//! what the guest can address: page tables, CPU tables, IO threads, video RAM,
//! and the shared libraries of the process itself. [`MemoryOverhead`] holds a
//! calibration of those costs so it can be tuned to a hypervisor build without
//! touching rendering logic.

use serde::{Deserialize, Serialize};

use crate::quantity::{parse_units, QuantityError};

const MIB: u64 = 1024 * 1024;

/// Calibrated memory overhead of the hypervisor process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryOverhead {
    /// Fixed cost for shared libraries and process bookkeeping
    pub fixed_bytes: u64,
    /// CPU table cost per virtual CPU
    pub per_vcpu_bytes: u64,
    /// Cost of the dedicated IO thread
    pub iothread_bytes: u64,
    /// Video RAM
    pub video_bytes: u64,
    /// Guest bytes covered by one byte of page table
    pub pagetable_divisor: u64,
}

impl Default for MemoryOverhead {
    fn default() -> Self {
        Self {
            fixed_bytes: 64_000_000,
            per_vcpu_bytes: 8 * MIB,
            iothread_bytes: 8 * MIB,
            video_bytes: 16 * MIB,
            pagetable_divisor: 512,
        }
    }
}

impl MemoryOverhead {
    /// Overhead in bytes for a guest of `guest_memory` bytes with `cores` vCPUs.
    ///
    /// A VM without an explicit CPU topology runs one vCPU, so `cores` below
    /// one is treated as one. Page table memory is sized from the guest memory
    /// rounded up to a whole kilobyte.
    pub fn overhead_bytes(&self, guest_memory: u64, cores: u32) -> u64 {
        let pagetable =
            guest_memory.div_ceil(1000).saturating_mul(1000) / self.pagetable_divisor.max(1);
        let vcpus = u64::from(cores.max(1));

        pagetable
            .saturating_add(self.fixed_bytes)
            .saturating_add(self.per_vcpu_bytes.saturating_mul(vcpus))
            .saturating_add(self.iothread_bytes)
            .saturating_add(self.video_bytes)
    }

    /// Add the overhead for the given guest to a requested memory quantity.
    ///
    /// `quantity` is the requests or limits value being adjusted; both are
    /// adjusted by the same overhead so the guest sees the same headroom under
    /// either bound. The result is a plain byte count.
    pub fn adjust_memory(
        &self,
        quantity: &str,
        guest_memory: u64,
        cores: u32,
    ) -> Result<String, QuantityError> {
        let requested = parse_units(quantity)?;
        let adjusted = requested
            .checked_add(self.overhead_bytes(guest_memory, cores))
            .ok_or(QuantityError::Overflow)?;
        Ok(adjusted.to_string())
    }
}
