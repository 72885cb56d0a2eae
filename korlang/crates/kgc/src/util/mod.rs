//! Util Module - Shared Utilities

/// Round `value` up to a multiple of `align` (a power of two);
/// `None` on overflow
#[inline]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Round `value` up to the system page size
#[inline]
pub fn align_to_page(value: usize) -> Option<usize> {
    align_up(value, page_size::get())
}

/// Constants for KGC
pub mod constants {
    /// 1 Kilobyte
    pub const KB: usize = 1024;
    /// 1 Megabyte
    pub const MB: usize = 1024 * 1024;

    /// Memory pressure above which the heap is considered under strain
    pub const HIGH_PRESSURE: f64 = 0.85;

    /// Pauses kept for the pause timeline
    pub const PAUSE_WINDOW: usize = 100;

    /// Largest capacity a single generation may request
    pub const MAX_CAPACITY: usize = isize::MAX as usize / 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), Some(0));
        assert_eq!(align_up(1, 8), Some(8));
        assert_eq!(align_up(8, 8), Some(8));
        assert_eq!(align_up(9, 8), Some(16));
    }

    #[test]
    fn test_align_up_overflow() {
        assert_eq!(align_up(usize::MAX - 3, 8), None);
        assert_eq!(align_up(usize::MAX & !7, 8), Some(usize::MAX & !7));
        assert_eq!(align_to_page(usize::MAX), None);
    }

    #[test]
    fn test_align_to_page() {
        let page = page_size::get();
        assert_eq!(align_to_page(1), Some(page));
        assert_eq!(align_to_page(page), Some(page));
    }
}
