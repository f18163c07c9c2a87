//! Endpoint packet memory buffers

/// A region of packet memory, owned by one endpoint buffer
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Buffer {
    offset: u16,
    len: u16,
}

impl Buffer {
    /// The buffer's packet memory offset
    pub const fn offset(&self) -> u16 {
        self.offset
    }
    /// The number of bytes reserved for this buffer
    pub const fn size(&self) -> usize {
        self.len as usize
    }
}

/// Packet memory buffer allocator
///
/// Hands out buffers from the low end of packet memory towards the high end.
/// Buffers are never returned; endpoints keep their buffers across bus resets.
pub struct Allocator {
    ptr: u16,
    end: u16,
}

impl Allocator {
    /// Manage the packet memory offsets `start..end`
    ///
    /// `start` is rounded up to the next 16-bit word.
    pub const fn new(start: u16, end: u16) -> Self {
        let start = start + (start & 1);
        Allocator { ptr: start, end }
    }
    /// Allocates a buffer of `size` bytes
    ///
    /// The returned buffer is at least `size` bytes large, and starts
    /// on a 16-bit word.
    pub fn allocate(&mut self, size: usize) -> Option<Buffer> {
        let len = u16::try_from(size).ok()?;
        let len = len.checked_add(len & 1)?;
        let new_ptr = self.ptr.checked_add(len)?;
        if new_ptr > self.end {
            None
        } else {
            let buffer = Buffer {
                offset: self.ptr,
                len,
            };
            self.ptr = new_ptr;
            Some(buffer)
        }
    }
    /// Allocates two buffers of `size` bytes, or neither
    pub fn allocate_pair(&mut self, size: usize) -> Option<[Buffer; 2]> {
        let len = u16::try_from(size).ok()?;
        let len = len.checked_add(len & 1)?;
        let end = self.ptr.checked_add(len)?.checked_add(len)?;
        if end > self.end {
            return None;
        }
        Some([self.allocate(size)?, self.allocate(size)?])
    }
}
