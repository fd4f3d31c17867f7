//! # Segmenter
//!
//! Computes the fixed-length time windows a decoded upload is cut into before
//! each window is encoded and transcribed on its own.
//!
//! ## Window Layout:
//! - Windows are half-open `[start_ms, end_ms)` and never overlap
//! - Together they cover `[0, total_ms)` with no gaps
//! - Only the final window may be shorter than the nominal length

use serde::Serialize;

/// Default window length: ten minutes.
pub const DEFAULT_WINDOW_MS: u64 = 10 * 60 * 1000;

/// One contiguous time window of the source audio.
///
/// ## Invariant:
/// `start_ms < end_ms`, and `index` is the window's position in the
/// sequence produced by [`segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Segment {
    /// Length of the window in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Split `total_ms` of audio into windows of `window_ms`.
///
/// ## Returns:
/// - Empty when `total_ms == 0`
/// - Otherwise `ceil(total_ms / window_ms)` segments, indexed `0..N-1`
///
/// `window_ms` must be positive; the configuration layer rejects zero before
/// a pipeline is ever built.
pub fn segment(total_ms: u64, window_ms: u64) -> Vec<Segment> {
    debug_assert!(window_ms > 0, "window length must be positive");

    if total_ms == 0 {
        return Vec::new();
    }

    let count = total_ms.div_ceil(window_ms) as usize;
    (0..count)
        .map(|index| {
            let start_ms = index as u64 * window_ms;
            Segment {
                index,
                start_ms,
                end_ms: (start_ms + window_ms).min(total_ms),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(total_ms: u64, window_ms: u64) {
        let segments = segment(total_ms, window_ms);
        assert_eq!(segments.len() as u64, total_ms.div_ceil(window_ms));

        let mut cursor = 0;
        for (expected_index, seg) in segments.iter().enumerate() {
            assert_eq!(seg.index, expected_index);
            assert_eq!(seg.start_ms, cursor, "gap or overlap before segment {}", seg.index);
            assert!(seg.start_ms < seg.end_ms);
            assert!(seg.duration_ms() <= window_ms);
            cursor = seg.end_ms;
        }
        assert_eq!(cursor, total_ms);
    }

    #[test]
    fn test_zero_duration_yields_no_segments() {
        assert!(segment(0, DEFAULT_WINDOW_MS).is_empty());
        assert!(segment(0, 1).is_empty());
    }

    #[test]
    fn test_twenty_five_minutes_in_ten_minute_windows() {
        let segments = segment(1_500_000, 600_000);
        assert_eq!(
            segments,
            vec![
                Segment { index: 0, start_ms: 0, end_ms: 600_000 },
                Segment { index: 1, start_ms: 600_000, end_ms: 1_200_000 },
                Segment { index: 2, start_ms: 1_200_000, end_ms: 1_500_000 },
            ]
        );
    }

    #[test]
    fn test_exact_multiple_has_no_short_tail() {
        let segments = segment(1_200_000, 600_000);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].duration_ms(), 600_000);
    }

    #[test]
    fn test_shorter_than_one_window() {
        let segments = segment(42, DEFAULT_WINDOW_MS);
        assert_eq!(segments, vec![Segment { index: 0, start_ms: 0, end_ms: 42 }]);
    }

    #[test]
    fn test_windows_partition_the_timeline() {
        for total_ms in [1, 2, 7, 999, 1_000, 1_001, 59_999, 3_600_000] {
            for window_ms in [1, 3, 1_000, 600_000] {
                assert_partition(total_ms, window_ms);
            }
        }
    }

    #[test]
    fn test_segmenting_is_deterministic() {
        assert_eq!(segment(1_234_567, 60_000), segment(1_234_567, 60_000));
    }
}
