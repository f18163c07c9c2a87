//! Packet memory area (PMA) and the buffer descriptor table
//!
//! The USB peripheral exchanges packets through a dedicated SRAM that's shared
//! with the CPU. Depending on the part, the CPU sees each 16-bit packet memory
//! word either at a 32-bit stride ([`Access::Word1x16`]) or packed
//! ([`Access::Word2x16`]). All offsets in this module are packet memory
//! offsets, as seen by the USB peripheral. They're translated into CPU
//! addresses when accessed.

/// How the CPU addresses packet memory
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    /// One 16-bit packet memory word per 32-bit CPU word.
    ///
    /// STM32F1, STM32L1, and most STM32F3 parts.
    Word1x16,
    /// Two 16-bit packet memory words per 32-bit CPU word.
    ///
    /// STM32F0, STM32L0, STM32L4, STM32G4, and STM32F303xD/E parts.
    Word2x16,
}

/// Number of endpoint registers, and buffer descriptor table entries
pub const DESCRIPTOR_COUNT: usize = 8;

/// Size, in bytes, of the buffer descriptor table
///
/// The table is always placed at offset zero.
pub const BTABLE_SIZE: u16 = (DESCRIPTOR_COUNT * 8) as u16;

/// Mask for the number of bytes received, taken from a `COUNT_RX` word
const COUNT_RX_MASK: u16 = 0x3FF;

/// The CPU's view of packet memory
pub struct PacketMemory {
    base: *mut u8,
    access: Access,
}

impl PacketMemory {
    /// Create a packet memory handle
    ///
    /// # Safety
    ///
    /// `base` must point to packet memory that's laid out as described by `access`,
    /// and it must be large enough for every offset later used with this object.
    /// Nothing else may access that memory.
    pub const unsafe fn new(base: *mut u8, access: Access) -> Self {
        PacketMemory { base, access }
    }

    /// Returns the CPU pointer to the 16-bit word at `offset`
    fn word(&self, offset: u16) -> *mut u16 {
        debug_assert!(offset % 2 == 0, "Unaligned packet memory offset {}", offset);
        let offset = usize::from(offset);
        let byte = match self.access {
            Access::Word1x16 => offset * 2,
            Access::Word2x16 => offset,
        };
        // Safety: caller of new() guarantees the memory is large enough.
        unsafe { self.base.add(byte).cast() }
    }

    /// Read the 16-bit word at `offset`
    pub fn read(&self, offset: u16) -> u16 {
        // Safety: see word().
        unsafe { self.word(offset).read_volatile() }
    }

    /// Write the 16-bit word at `offset`
    pub fn write(&self, offset: u16, value: u16) {
        // Safety: see word().
        unsafe { self.word(offset).write_volatile(value) }
    }

    /// Copy `data` into packet memory, starting at `offset`
    ///
    /// The packet memory only supports 16-bit accesses. If `data` has an odd
    /// length, the last word is padded with a zero byte.
    pub fn copy_to(&self, offset: u16, data: &[u8]) {
        for (idx, chunk) in data.chunks(2).enumerate() {
            let word = u16::from_le_bytes([chunk[0], chunk.get(1).copied().unwrap_or(0)]);
            self.write(offset + 2 * idx as u16, word);
        }
    }

    /// Copy packet memory into `data`, starting at `offset`
    pub fn copy_from(&self, offset: u16, data: &mut [u8]) {
        for (idx, chunk) in data.chunks_mut(2).enumerate() {
            let bytes = self.read(offset + 2 * idx as u16).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// A pair of `ADDR` / `COUNT` words in a buffer descriptor
///
/// Single-buffered endpoints use `Tx` for transmit, and `Rx` for
/// receive. Double-buffered endpoints use `Tx` for buffer 0, and
/// `Rx` for buffer 1, no matter the endpoint direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Slot {
    Tx,
    Rx,
}

impl Slot {
    /// Returns the slot for a double-buffered endpoint's buffer
    pub const fn double(buffer: usize) -> Self {
        if buffer == 0 {
            Slot::Tx
        } else {
            Slot::Rx
        }
    }

    const fn addr(self) -> u16 {
        match self {
            Slot::Tx => 0,
            Slot::Rx => 4,
        }
    }

    const fn count(self) -> u16 {
        self.addr() + 2
    }
}

/// One entry of the buffer descriptor table
pub struct Descriptor<'a> {
    pma: &'a PacketMemory,
    base: u16,
}

/// Returns the buffer descriptor for the endpoint register `index`
pub fn descriptor(pma: &PacketMemory, index: usize) -> Descriptor<'_> {
    debug_assert!(index < DESCRIPTOR_COUNT);
    Descriptor {
        pma,
        base: (index * 8) as u16,
    }
}

impl Descriptor<'_> {
    /// Set the packet memory address of the buffer described by `slot`
    pub fn set_addr(&self, slot: Slot, addr: u16) {
        self.pma.write(self.base + slot.addr(), addr);
    }

    /// Set the number of bytes to transmit from the buffer described by `slot`
    pub fn set_tx_count(&self, slot: Slot, count: u16) {
        self.pma.write(self.base + slot.count(), count);
    }

    /// Describe the size of the receive buffer in `slot`
    ///
    /// This also zeros the received byte count.
    pub fn set_rx_block(&self, slot: Slot, block: RxBlock) {
        self.pma.write(self.base + slot.count(), block.bits());
    }

    /// Returns the number of bytes received into the buffer described by `slot`
    pub fn rx_count(&self, slot: Slot) -> usize {
        usize::from(self.pma.read(self.base + slot.count()) & COUNT_RX_MASK)
    }
}

/// The `BL_SIZE` and `NUM_BLOCK` encoding of a receive buffer size
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RxBlock {
    bits: u16,
    size: u16,
}

impl RxBlock {
    /// The actual buffer size, which may be larger than requested
    pub const fn size(&self) -> usize {
        self.size as usize
    }

    /// The value written to the `COUNT_RX` word
    pub const fn bits(&self) -> u16 {
        self.bits
    }
}

/// Compute the smallest receive buffer that holds `size` bytes
///
/// Sizes up to 62 bytes are allocated in 2 byte blocks. Anything larger is
/// allocated in 32 byte blocks. Returns `None` if `size` is zero, or larger
/// than the biggest full-speed packet (1023 bytes).
pub const fn rx_block(size: usize) -> Option<RxBlock> {
    const BL_SIZE: u16 = 1 << 15;
    const NUM_BLOCK_OFFSET: u16 = 10;

    if size == 0 || size > 1023 {
        return None;
    }
    let size = size as u16;
    if size > 62 {
        let num_block = (size - 1) >> 5;
        Some(RxBlock {
            bits: BL_SIZE | (num_block << NUM_BLOCK_OFFSET),
            size: (num_block + 1) << 5,
        })
    } else {
        let num_block = (size + 1) >> 1;
        Some(RxBlock {
            bits: num_block << NUM_BLOCK_OFFSET,
            size: num_block << 1,
        })
    }
}
