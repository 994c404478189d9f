//! Layout checks on finalized page arrays.

use crate::page::{page_offset, PAGE_SIZE};
use crate::{CoreError, CoreResult};

/// Checks that `pages` is a well-formed image of `length` code bytes.
///
/// Every page but the last holds exactly `PAGE_SIZE` bytes; the last holds
/// `length % PAGE_SIZE`, or a full page when that remainder is zero.
pub fn validate_pages(pages: &[Vec<u8>], length: u32) -> CoreResult<()> {
    let expected_count = length.div_ceil(PAGE_SIZE) as usize;
    if pages.len() != expected_count {
        return Err(CoreError::corrupted(format!(
            "{} page(s) for {length} byte(s), expected {expected_count}",
            pages.len()
        )));
    }

    let Some((last, full)) = pages.split_last() else {
        return Ok(());
    };

    if let Some(i) = full.iter().position(|p| p.len() != PAGE_SIZE as usize) {
        return Err(CoreError::corrupted(format!("page {i} holds {} byte(s), expected {PAGE_SIZE}", full[i].len())));
    }

    let tail = match page_offset(length) {
        0 => PAGE_SIZE,
        n => n,
    };
    if last.len() != tail as usize {
        return Err(CoreError::corrupted(format!("last page holds {} byte(s), expected {tail}", last.len())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32) -> Vec<u8> { vec![0; n as usize] }

    #[test]
    fn empty_image() {
        assert!(validate_pages(&[], 0).is_ok());
        assert!(validate_pages(&[page(0)], 0).is_err());
    }

    #[test]
    fn short_and_full_tails() {
        assert!(validate_pages(&[page(PAGE_SIZE), page(5)], PAGE_SIZE + 5).is_ok());
        assert!(validate_pages(&[page(PAGE_SIZE)], PAGE_SIZE).is_ok());
        assert!(validate_pages(&[page(PAGE_SIZE), page(PAGE_SIZE)], 2 * PAGE_SIZE).is_ok());
    }

    #[test]
    fn rejects_short_middle_page() {
        let err = validate_pages(&[page(10), page(5)], PAGE_SIZE + 5).unwrap_err();
        assert!(err.to_string().contains("page 0"));
    }

    #[test]
    fn rejects_wrong_count() {
        assert!(validate_pages(&[page(5)], PAGE_SIZE + 5).is_err());
    }
}
