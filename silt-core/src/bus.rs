//! The memory interface the core addresses its simulated address space through.

use std::fmt::Debug;

/// Access widths supported by the memory interface.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Width {
    Byte,
    Half,
    Word,
    Double,
}

impl Width {
    /// Returns the access size in bytes.
    pub const fn size(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Double => 8,
        }
    }
}

/// Fixed-latency memory interface, total over the simulated address space.
///
/// Every `(address, width)` pair must be handled without panicking; how
/// out-of-range addresses are treated (wrapping, aliasing, reading zeros) is
/// the implementor's choice, as long as accesses stay deterministic. Values
/// are exchanged in little-endian byte order, in the low-order bytes of the
/// `u64` for sub-doubleword widths.
///
/// A real I/O-backed device behind this interface may block, but that is the
/// device layer's concern, not the core's: from the core's point of view
/// every access completes synchronously.
pub trait Bus: Debug {
    /// Reads a `width`-sized value from `address`.
    fn read(&mut self, address: u32, width: Width) -> u64;

    /// Writes the low `width` bytes of `value` to `address`.
    fn write(&mut self, address: u32, width: Width, value: u64);
}

/// Byte-based RAM implementation backing a continuous region of the address
/// space starting at `base`.
///
/// This can be categorized as *main memory* according to the types of memory
/// resources defined by the RISC-V spec. Addresses are mapped onto the
/// backing store modulo its size, which keeps the interface total without
/// modeling access faults.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Ram {
    base: u32,
    data: Vec<u8>,
}

impl Ram {
    /// Create a new zero-initialized RAM region of `size` bytes starting at `base`.
    ///
    /// `size` must be at least one, and at most `1 << 32` (since it must be addressable by `u32`).
    /// If `size` does not satisfy these conditions, `None` is returned.
    pub fn new(base: u32, size: usize) -> Option<Self> {
        if size == 0 || (usize::BITS > 32 && size > (1 << 32)) {
            None
        } else {
            Some(Self {
                base,
                data: vec![0; size],
            })
        }
    }

    /// Returns the size expressed in bytes. Guaranteed to be at least one.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns the base address of the region.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Copies `bytes` into RAM starting at absolute address `address`.
    ///
    /// Used by drivers to place program images before releasing the core from
    /// reset. Bytes that would land outside the region wrap around, same as
    /// regular accesses.
    pub fn load(&mut self, address: u32, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let offset = self.offset(address.wrapping_add(i as u32));
            self.data[offset] = byte;
        }
    }

    /// Force RAM back to its reset state, which is all-zeros.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    fn offset(&self, address: u32) -> usize {
        address.wrapping_sub(self.base) as usize % self.data.len()
    }
}

impl Bus for Ram {
    fn read(&mut self, address: u32, width: Width) -> u64 {
        let mut value = 0u64;
        for i in (0..width.size()).rev() {
            let offset = self.offset(address.wrapping_add(i));
            value = (value << 8) | self.data[offset] as u64;
        }
        value
    }

    fn write(&mut self, address: u32, width: Width, value: u64) {
        for i in 0..width.size() {
            let offset = self.offset(address.wrapping_add(i));
            self.data[offset] = (value >> (8 * i)) as u8;
        }
    }
}
