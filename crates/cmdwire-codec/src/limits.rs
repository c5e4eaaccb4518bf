//! Resource bounds applied by the encoder and decoder.

/// Default bound on record nesting, counting the outermost record.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default bound on a single string, byte or map field.
pub const DEFAULT_MAX_FIELD_BYTES: usize = 16 * 1024 * 1024;

/// Bounds shared by [`crate::Encoder`] and [`crate::Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum number of records in one nesting chain.
    pub max_depth: usize,
    /// Maximum length of a string or byte field, and of a map's entry count.
    pub max_field_bytes: usize,
}

impl CodecLimits {
    /// Builds limits from explicit bounds.
    #[must_use]
    pub const fn new(max_depth: usize, max_field_bytes: usize) -> Self {
        Self {
            max_depth,
            max_field_bytes,
        }
    }

    /// Most bytes the decoder reads for one value: four full-size fields per
    /// nesting level.
    #[must_use]
    pub fn value_budget(&self) -> u64 {
        let per_level = self.max_field_bytes.saturating_mul(4);
        let total = per_level.saturating_mul(self.max_depth.max(1));
        u64::try_from(total).unwrap_or(u64::MAX)
    }
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_MAX_FIELD_BYTES)
    }
}
