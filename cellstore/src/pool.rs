//! Process-wide pools for block decode buffers and section-offset vectors.
//!
//! Iterators are short-lived and each one decodes whole blocks, so buffer
//! churn dominates allocator pressure on the read path. The pools are plain
//! free lists: producers may offer, consumers may take, and dropping a
//! buffer instead of returning it is harmless.

use std::sync::Mutex;

/// Upper bound on buffers retained per pool.
const MAX_POOLED: usize = 32;

static BYTE_POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());
static OFFSET_POOL: Mutex<Vec<Vec<u32>>> = Mutex::new(Vec::new());

/// Fetch a zero-filled buffer of exactly `len` bytes, reusing a pooled
/// allocation when one is large enough.
pub(crate) fn fetch_buffer(len: usize) -> Vec<u8> {
    if let Ok(mut pool) = BYTE_POOL.lock() {
        if let Some(mut buf) = pool.pop() {
            if buf.capacity() >= len {
                buf.clear();
                buf.resize(len, 0);
                return buf;
            }
            // Too small, let it drop.
        }
    }
    vec![0; len]
}

/// Return a buffer to the pool.
pub(crate) fn release_buffer(buf: Vec<u8>) {
    if buf.capacity() == 0 {
        return;
    }
    if let Ok(mut pool) = BYTE_POOL.lock() {
        if pool.len() < MAX_POOLED {
            pool.push(buf);
        }
    }
}

/// Fetch an empty offset vector with capacity for at least `min_cap` entries.
pub(crate) fn fetch_offsets(min_cap: usize) -> Vec<u32> {
    if let Ok(mut pool) = OFFSET_POOL.lock() {
        if let Some(mut offs) = pool.pop() {
            offs.clear();
            offs.reserve(min_cap);
            return offs;
        }
    }
    Vec::with_capacity(min_cap)
}

/// Return an offset vector to the pool.
pub(crate) fn release_offsets(offs: Vec<u32>) {
    if offs.capacity() == 0 {
        return;
    }
    if let Ok(mut pool) = OFFSET_POOL.lock() {
        if pool.len() < MAX_POOLED {
            pool.push(offs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_returns_requested_size() {
        let buf = fetch_buffer(1024);
        assert_eq!(buf.len(), 1024);
        assert!(buf.iter().all(|&b| b == 0));
        release_buffer(buf);

        // A reused buffer is re-zeroed and resized.
        let mut buf = fetch_buffer(16);
        buf.iter_mut().for_each(|b| *b = 0xff);
        release_buffer(buf);
        let buf = fetch_buffer(64);
        assert_eq!(buf.len(), 64);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn offsets_come_back_empty() {
        let mut offs = fetch_offsets(4);
        offs.extend_from_slice(&[1, 2, 3]);
        release_offsets(offs);
        let offs = fetch_offsets(8);
        assert!(offs.is_empty());
        assert!(offs.capacity() >= 3 || offs.capacity() >= 8);
    }

    #[test]
    fn dropping_instead_of_releasing_is_fine() {
        let buf = fetch_buffer(128);
        drop(buf);
        let buf = fetch_buffer(128);
        assert_eq!(buf.len(), 128);
    }
}
