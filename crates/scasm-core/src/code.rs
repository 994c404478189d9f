//! Page-aware, random-access view over finalized code.

use crate::helpers::validate_pages;
use crate::page::{page_index, page_offset, PageRead, PAGE_SIZE};
use crate::{CoreError, CoreResult};

/// Finalized code pages plus the logical code length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PagedCode {
    pages: Vec<Vec<u8>>,
    length: u32,
}

impl PagedCode {
    /// Wraps assembler output after checking the page layout.
    pub fn new(pages: Vec<Vec<u8>>, length: u32) -> CoreResult<Self> {
        validate_pages(&pages, length)?;
        Ok(Self { pages, length })
    }

    /// Splits a raw concatenated page array every `PAGE_SIZE` bytes.
    pub fn from_raw(bytes: &[u8]) -> CoreResult<Self> {
        let length = u32::try_from(bytes.len()).map_err(|_| CoreError::corrupted("code larger than 4 GiB"))?;
        let pages = bytes.chunks(PAGE_SIZE as usize).map(<[u8]>::to_vec).collect();
        Ok(Self { pages, length })
    }

    /// Concatenates the pages back into one buffer.
    pub fn to_raw(&self) -> Vec<u8> { self.pages.concat() }

    /// Total code length.
    pub const fn length(&self) -> u32 { self.length }

    /// Pages, the last one possibly short.
    pub fn pages(&self) -> &[Vec<u8>] { &self.pages }

    /// Byte at `ip`.
    pub fn byte(&self, ip: u32) -> CoreResult<u8> { self.read::<u8>(ip) }

    /// Little-endian value at `ip`.
    pub fn read<T: PageRead>(&self, ip: u32) -> CoreResult<T> {
        self.slice(ip, T::SIZE).map(T::read_le)
    }

    /// `size` bytes at `ip`, all within one page.
    pub fn slice(&self, ip: u32, size: usize) -> CoreResult<&[u8]> {
        let end = u64::from(ip) + size as u64;
        if end > u64::from(self.length) {
            return Err(CoreError::OutOfBounds { ip, size, length: self.length });
        }
        let page = self
            .pages
            .get(page_index(ip) as usize)
            .ok_or(CoreError::OutOfBounds { ip, size, length: self.length })?;
        let start = page_offset(ip) as usize;
        page.get(start..start + size).ok_or(CoreError::PageStraddle { ip, size })
    }
}
