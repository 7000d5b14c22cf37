/// Estimate the cost of an item.  This is usually its size in memory, in bytes.
///
/// The caches in this crate will hold up to a specified total cost, then begin evicting entries which are least
/// recently used.
pub trait EstimateCost {
    fn estimate_cost(&self) -> u64;
}

/// Raw encoded bytes cost their length.
impl EstimateCost for Vec<u8> {
    fn estimate_cost(&self) -> u64 {
        self.len() as u64
    }
}

impl EstimateCost for [u8] {
    fn estimate_cost(&self) -> u64 {
        self.len() as u64
    }
}

/// Decoded images cost their pixel buffer: `width * height * bytes_per_pixel`.
impl EstimateCost for image::DynamicImage {
    fn estimate_cost(&self) -> u64 {
        u64::from(self.width())
            * u64::from(self.height())
            * u64::from(self.color().bytes_per_pixel())
    }
}
