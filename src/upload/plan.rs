// Slice planning: split a byte length into contiguous, disjoint slices.

use crate::error::UploadError;

/// Upper bound for a single slice when no explicit count is requested.
pub const DEFAULT_MAX_SLICE_SIZE: u64 = 500 * 1024 * 1024;

/// A contiguous byte range of the source file uploaded as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
}

impl Slice {
    /// First byte past the end of this slice.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Ordered partition of a file into slices.
///
/// Every slice but the last gets `total / count` bytes; the last one also
/// absorbs the remainder, so the lengths always add up to `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicePlan {
    total: u64,
    slices: Vec<Slice>,
}

impl SlicePlan {
    /// Compute the plan for `total` bytes.
    ///
    /// When `requested` is `None` the count is `ceil(total / max_slice_size)`.
    /// An explicit count may not exceed `total`, so no slice is ever empty.
    pub fn compute(
        total: u64,
        requested: Option<usize>,
        max_slice_size: u64,
    ) -> Result<Self, UploadError> {
        if total == 0 {
            return Err(UploadError::InvalidArgument(
                "cannot slice an empty file".into(),
            ));
        }
        let count = match requested {
            Some(0) => {
                return Err(UploadError::InvalidArgument(
                    "slice count must be at least 1".into(),
                ))
            }
            Some(n) if n as u64 > total => {
                return Err(UploadError::InvalidArgument(format!(
                    "cannot cut {total} bytes into {n} slices"
                )))
            }
            Some(n) => n as u64,
            None => {
                if max_slice_size == 0 {
                    return Err(UploadError::InvalidArgument(
                        "max slice size must be at least 1 byte".into(),
                    ));
                }
                (total - 1) / max_slice_size + 1
            }
        };

        let base = total / count;
        let remainder = total % count;
        let mut slices = Vec::with_capacity(count as usize);
        let mut offset = 0;
        for index in 0..count {
            let length = if index + 1 == count { base + remainder } else { base };
            slices.push(Slice {
                index: index as usize,
                offset,
                length,
            });
            offset += length;
        }

        Ok(SlicePlan { total, slices })
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Slice lengths in index order, as announced by the prepare call.
    pub fn lengths(&self) -> Vec<u64> {
        self.slices.iter().map(|s| s.length).collect()
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn default_bound_gives_three_slices_for_1200_mib() {
        let plan = SlicePlan::compute(1200 * MIB, None, DEFAULT_MAX_SLICE_SIZE).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.lengths(), vec![400 * MIB, 400 * MIB, 400 * MIB]);
    }

    #[test]
    fn remainder_goes_to_last_slice() {
        let plan = SlicePlan::compute(10, Some(3), DEFAULT_MAX_SLICE_SIZE).unwrap();
        assert_eq!(plan.lengths(), vec![3, 3, 4]);
        let offsets: Vec<u64> = plan.slices().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn exact_multiple_of_bound_does_not_add_a_slice() {
        let plan = SlicePlan::compute(1000 * MIB, None, DEFAULT_MAX_SLICE_SIZE).unwrap();
        assert_eq!(plan.len(), 2);
        let plan = SlicePlan::compute(1000 * MIB + 1, None, DEFAULT_MAX_SLICE_SIZE).unwrap();
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn small_file_is_a_single_slice() {
        let plan = SlicePlan::compute(1, None, DEFAULT_MAX_SLICE_SIZE).unwrap();
        assert_eq!(plan.slices(), &[Slice { index: 0, offset: 0, length: 1 }]);
    }

    #[test]
    fn one_byte_per_slice_is_the_finest_plan() {
        let plan = SlicePlan::compute(4, Some(4), DEFAULT_MAX_SLICE_SIZE).unwrap();
        assert_eq!(plan.lengths(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn rejects_more_slices_than_bytes() {
        let err = SlicePlan::compute(2, Some(4), DEFAULT_MAX_SLICE_SIZE).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_huge_slice_count_without_allocating() {
        let err = SlicePlan::compute(10, Some(usize::MAX), DEFAULT_MAX_SLICE_SIZE).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
        let err = SlicePlan::compute(10, Some(1 << 40), DEFAULT_MAX_SLICE_SIZE).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_empty_file() {
        let err = SlicePlan::compute(0, None, DEFAULT_MAX_SLICE_SIZE).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_zero_slice_count() {
        let err = SlicePlan::compute(10, Some(0), DEFAULT_MAX_SLICE_SIZE).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_zero_bound() {
        let err = SlicePlan::compute(10, None, 0).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    proptest! {
        #[test]
        fn slices_cover_the_file_exactly(total in 512u64..(1 << 40), count in 1usize..512) {
            let plan = SlicePlan::compute(total, Some(count), DEFAULT_MAX_SLICE_SIZE).unwrap();
            prop_assert_eq!(plan.len(), count);
            prop_assert_eq!(plan.lengths().iter().sum::<u64>(), total);

            let mut expected_offset = 0;
            for (i, slice) in plan.slices().iter().enumerate() {
                prop_assert_eq!(slice.index, i);
                prop_assert_eq!(slice.offset, expected_offset);
                expected_offset = slice.end();
            }
            prop_assert_eq!(expected_offset, total);
        }

        #[test]
        fn plan_is_deterministic(total in 1u64..(1 << 24), max in 1024u64..(1 << 20)) {
            let a = SlicePlan::compute(total, None, max).unwrap();
            let b = SlicePlan::compute(total, None, max).unwrap();
            prop_assert!(a.len() as u64 * max >= total);
            prop_assert_eq!(a, b);
        }
    }
}
