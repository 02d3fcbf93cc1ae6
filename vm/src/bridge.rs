//! Host-call bridge: resolves guest pointers against WASM linear memory and
//! carries the tick-borrowing contract between the resource meter and the
//! engine's fuel counter across a host import call.

use chain_shared::chain_error;
use chain_shared::error::Result;

use crate::meter::ResourceMeter;

/// Bounds-checked access to a contiguous byte buffer, mirroring the guest's
/// linear memory. A zero-length slice at the end-of-memory address is valid.
pub trait Memory {
    fn len(&self) -> usize;
    fn try_slice(&self, offset: u32, len: u32) -> Result<&[u8]>;
    fn try_slice_mut(&mut self, offset: u32, len: u32) -> Result<&mut [u8]>;
}

impl Memory for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn try_slice(&self, offset: u32, len: u32) -> Result<&[u8]> {
        self.get(offset as usize..)
            .and_then(|rest| rest.get(..len as usize))
            .ok_or_else(|| chain_error!(WasmTrap; "guest buffer ({}, {}) out of bounds", offset, len))
    }

    fn try_slice_mut(&mut self, offset: u32, len: u32) -> Result<&mut [u8]> {
        self.get_mut(offset as usize..)
            .and_then(|rest| rest.get_mut(..len as usize))
            .ok_or_else(|| chain_error!(WasmTrap; "guest buffer ({}, {}) out of bounds", offset, len))
    }
}

/// Writes `value` into the guest's `ret_buf`, failing if it doesn't fit, and
/// reports the written length through `out_bytes_written`.
pub fn write_return(
    memory: &mut dyn Memory,
    ret_ptr: u32,
    ret_len: u32,
    out_written_ptr: u32,
    value: &[u8],
) -> Result<()> {
    if value.len() as u32 > ret_len {
        return Err(chain_error!(InsufficientReturnBuffer; "return buffer too small: need {}, have {}", value.len(), ret_len));
    }
    memory.try_slice_mut(ret_ptr, value.len() as u32)?.copy_from_slice(value);
    let len_bytes = (value.len() as u32).to_le_bytes();
    memory.try_slice_mut(out_written_ptr, 4)?.copy_from_slice(&len_bytes);
    Ok(())
}

/// Tracks fuel consumed by the guest between host-import entries and
/// converts it into resource-meter compute charges, then hands back a
/// refreshed fuel ceiling derived from the meter's own remaining budget --
/// so a host call that exhausts an rc session shrinks the guest's next
/// run of ticks instead of only failing retroactively.
pub struct TickBridge {
    previous_ticks: u64,
}

impl TickBridge {
    pub fn new(meter: &ResourceMeter) -> Self {
        TickBridge {
            previous_ticks: saturating_ticks(meter.compute_bandwidth_remaining()),
        }
    }

    /// Charges the meter for ticks consumed since the last entry (or since
    /// construction), given the engine-reported fuel remaining just now.
    pub fn charge_elapsed(&mut self, meter: &ResourceMeter, current_fuel: u64) -> Result<()> {
        let consumed = self.previous_ticks.saturating_sub(current_fuel);
        meter.use_compute_bandwidth(consumed)?;
        self.previous_ticks = saturating_ticks(meter.compute_bandwidth_remaining());
        Ok(())
    }

    /// The fuel ceiling the engine should be set to run until the next entry.
    pub fn refreshed_budget(&self) -> u64 {
        self.previous_ticks
    }
}

fn saturating_ticks(remaining: u64) -> u64 {
    remaining.min(i64::MAX as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_bounds_check_rejects_out_of_range_reads() {
        let buf = [1u8, 2, 3, 4];
        assert!(buf.try_slice(2, 3).is_err());
        assert_eq!(buf.try_slice(1, 2).unwrap(), &[2, 3]);
    }

    #[test]
    fn zero_length_slice_at_end_of_memory_is_valid() {
        let buf = [1u8, 2, 3, 4];
        assert_eq!(buf.try_slice(4, 0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn write_return_fails_when_value_exceeds_ret_len() {
        let mut buf = [0u8; 16];
        assert!(write_return(&mut buf, 0, 2, 8, b"too long").is_err());
    }

    #[test]
    fn write_return_copies_value_and_records_length() {
        let mut buf = [0u8; 16];
        write_return(&mut buf, 0, 8, 8, b"hi").unwrap();
        assert_eq!(&buf[0..2], b"hi");
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 2);
    }

    #[test]
    fn tick_bridge_charges_consumed_and_refreshes_from_meter() {
        let meter = ResourceMeter::new(crate::meter::ResourceLimitData {
            compute_bandwidth_limit: 1_000,
            ..Default::default()
        });
        let mut bridge = TickBridge::new(&meter);
        bridge.charge_elapsed(&meter, 700).unwrap();
        assert_eq!(meter.compute_bandwidth_used(), 300);
        assert_eq!(bridge.refreshed_budget(), 700);
    }
}
