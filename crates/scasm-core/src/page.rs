//! Page geometry of the code stream.
//!
//! An IP is a logical offset into the concatenated code. The VM, the
//! assembler and the disassembler all split it the same way:
//! `page = ip >> PAGE_SHIFT`, `offset = ip & PAGE_MASK`.

use byteorder::{ByteOrder, LittleEndian};

/// log2 of the page capacity.
pub const PAGE_SHIFT: u32 = 14;
/// Capacity of one code page, in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;
/// Mask extracting the in-page offset of an IP.
pub const PAGE_MASK: u32 = PAGE_SIZE - 1;
/// Sanity ceiling on the encoded size of a single instruction.
pub const MAX_INSTRUCTION_LEN: usize = (PAGE_SIZE / 2) as usize;

/// Index of the page holding `ip`.
#[inline]
pub const fn page_index(ip: u32) -> u32 { ip >> PAGE_SHIFT }

/// Offset of `ip` inside its page.
#[inline]
pub const fn page_offset(ip: u32) -> u32 { ip & PAGE_MASK }

/// IP of the first byte of page `index`.
#[inline]
pub const fn page_start(index: u32) -> u32 { index << PAGE_SHIFT }

/// Fixed-width little-endian value readable from a page.
pub trait PageRead: Sized {
    /// Encoded width in bytes.
    const SIZE: usize;
    /// Decodes from exactly `SIZE` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

impl PageRead for u8 {
    const SIZE: usize = 1;
    fn read_le(bytes: &[u8]) -> Self { bytes[0] }
}

impl PageRead for u16 {
    const SIZE: usize = 2;
    fn read_le(bytes: &[u8]) -> Self { LittleEndian::read_u16(bytes) }
}

impl PageRead for i16 {
    const SIZE: usize = 2;
    fn read_le(bytes: &[u8]) -> Self { LittleEndian::read_i16(bytes) }
}

impl PageRead for u32 {
    const SIZE: usize = 4;
    fn read_le(bytes: &[u8]) -> Self { LittleEndian::read_u32(bytes) }
}

impl PageRead for i32 {
    const SIZE: usize = 4;
    fn read_le(bytes: &[u8]) -> Self { LittleEndian::read_i32(bytes) }
}

impl PageRead for f32 {
    const SIZE: usize = 4;
    fn read_le(bytes: &[u8]) -> Self { LittleEndian::read_f32(bytes) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn geometry() {
        assert_eq!(PAGE_SIZE, 0x4000);
        assert_eq!(PAGE_MASK, 0x3FFF);
        assert_eq!(page_index(0x4000), 1);
        assert_eq!(page_offset(0x4000), 0);
        assert_eq!(page_index(0x7FFF), 1);
        assert_eq!(page_offset(0x7FFF), 0x3FFF);
        assert_eq!(page_start(3), 0xC000);
    }

    #[test]
    fn typed_reads_are_little_endian() {
        let bytes = [0x34, 0x12, 0xFE, 0xFF];
        assert_eq!(u16::read_le(&bytes), 0x1234);
        assert_eq!(i16::read_le(&bytes[2..]), -2);
        assert_eq!(u32::read_le(&bytes), 0xFFFE_1234);
        assert_eq!(f32::read_le(&1.5f32.to_le_bytes()), 1.5);
    }

    proptest! {
        #[test]
        fn decomposition_recomposes(ip in any::<u32>()) {
            prop_assert_eq!(page_start(page_index(ip)) + page_offset(ip), ip);
            prop_assert_eq!(page_index(ip), ip / PAGE_SIZE);
            prop_assert_eq!(page_offset(ip), ip % PAGE_SIZE);
        }
    }
}
