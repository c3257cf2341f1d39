use tracing::debug;

use crate::error::{FrameError, Result};

/// Averaging parameters for bulk sample streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReducerConfig {
    /// Raw samples averaged into one output value (R).
    pub ratio: usize,
    /// Output values per emitted buffer (N).
    pub depth: usize,
}

impl Default for ReducerConfig {
    /// 64-sample board stream averaged by 4 into 16 values.
    fn default() -> Self {
        Self {
            ratio: 4,
            depth: 16,
        }
    }
}

/// Running average / downsampler over signed 16-bit samples.
///
/// Every `ratio` samples produce one value (`floor(sum / ratio)`) stored in the
/// next slot. When the slot index wraps, a copy of all `depth` values is
/// returned and filling continues in place.
#[derive(Debug, Clone)]
pub struct StreamReducer {
    config: ReducerConfig,
    slots: Vec<i16>,
    sum: i64,
    count: usize,
    index: usize,
}

impl StreamReducer {
    /// Create a reducer. Ratio and depth must both be non-zero.
    pub fn new(config: ReducerConfig) -> Result<Self> {
        if config.ratio == 0 || config.depth == 0 {
            return Err(FrameError::InvalidReducer {
                ratio: config.ratio,
                depth: config.depth,
            });
        }
        Ok(Self {
            config,
            slots: vec![0; config.depth],
            sum: 0,
            count: 0,
            index: 0,
        })
    }

    /// Add one raw sample. Returns a snapshot when the accumulator becomes full.
    pub fn push(&mut self, sample: i16) -> Option<Vec<i16>> {
        self.sum += i64::from(sample);
        self.count += 1;
        if self.count < self.config.ratio {
            return None;
        }

        // Mean of i16 values always fits back into i16.
        self.slots[self.index] = self.sum.div_euclid(self.config.ratio as i64) as i16;
        self.sum = 0;
        self.count = 0;
        self.index = (self.index + 1) % self.config.depth;

        (self.index == 0).then(|| self.slots.clone())
    }

    /// Reduce the payload of a bulk sample message (i16 LE samples).
    ///
    /// Returns every buffer completed while consuming the payload, oldest first.
    pub fn feed(&mut self, payload: &[u8]) -> Vec<Vec<i16>> {
        let mut ready = Vec::new();
        let mut samples = payload.chunks_exact(2);
        for pair in samples.by_ref() {
            if let Some(buffer) = self.push(i16::from_le_bytes([pair[0], pair[1]])) {
                ready.push(buffer);
            }
        }

        if !samples.remainder().is_empty() {
            debug!(len = payload.len(), "odd sample payload length; trailing byte ignored");
        }
        if !ready.is_empty() && (self.index != 0 || self.count != 0) {
            debug!(
                residual_slots = self.index,
                residual_samples = self.count,
                "sample buffer size mismatch"
            );
        }
        ready
    }

    /// Discard partial sums and start a fresh cycle.
    pub fn reset(&mut self) {
        self.slots.fill(0);
        self.sum = 0;
        self.count = 0;
        self.index = 0;
    }

    /// Reduction parameters.
    pub fn config(&self) -> ReducerConfig {
        self.config
    }

    /// Slots written in the current cycle.
    pub fn filled(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn reducer(ratio: usize, depth: usize) -> StreamReducer {
        StreamReducer::new(ReducerConfig { ratio, depth }).unwrap()
    }

    #[test]
    fn full_cycle_emits_group_means() {
        let (r, n) = (4, 16);
        let samples: Vec<i16> = (0..(r * n) as i16).map(|i| i * 3 - 50).collect();
        let mut red = reducer(r, n);

        let ready = red.feed(&payload(&samples));
        assert_eq!(ready.len(), 1);

        let expected: Vec<i16> = samples
            .chunks(r)
            .map(|g| (g.iter().map(|&v| i64::from(v)).sum::<i64>().div_euclid(r as i64)) as i16)
            .collect();
        assert_eq!(ready[0], expected);
        assert_eq!(red.filled(), 0);
    }

    #[test]
    fn negative_means_round_down() {
        let mut red = reducer(2, 1);
        assert_eq!(red.push(-1), None);
        assert_eq!(red.push(-2), Some(vec![-2]));
    }

    #[test]
    fn extremes_do_not_overflow() {
        let mut red = reducer(4, 2);
        let ready = red.feed(&payload(&[i16::MAX; 4]));
        assert!(ready.is_empty());
        let ready = red.feed(&payload(&[i16::MIN; 4]));
        assert_eq!(ready, vec![vec![i16::MAX, i16::MIN]]);
    }

    #[test]
    fn accumulation_spans_messages() {
        let mut red = reducer(4, 2);
        assert!(red.feed(&payload(&[4, 4, 4])).is_empty());
        assert!(red.feed(&payload(&[4, 8])).is_empty());
        assert_eq!(red.filled(), 1);
        let ready = red.feed(&payload(&[8, 8, 5]));
        assert_eq!(ready, vec![vec![4, 7]]);
    }

    #[test]
    fn ready_for_next_cycle_after_emit() {
        let mut red = reducer(1, 2);
        assert_eq!(red.feed(&payload(&[1, 2])), vec![vec![1, 2]]);
        assert_eq!(red.feed(&payload(&[3, 4])), vec![vec![3, 4]]);
    }

    #[test]
    fn one_message_can_fill_several_buffers() {
        let mut red = reducer(1, 2);
        let ready = red.feed(&payload(&[1, 2, 3, 4, 5]));
        assert_eq!(ready, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(red.filled(), 1);
    }

    #[test]
    fn trailing_odd_byte_is_ignored() {
        let mut red = reducer(1, 1);
        let mut bytes = payload(&[9]);
        bytes.push(0x7F);
        assert_eq!(red.feed(&bytes), vec![vec![9]]);
    }

    #[test]
    fn reset_discards_partial_cycle() {
        let mut red = reducer(2, 2);
        red.feed(&payload(&[10, 10, 10]));
        red.reset();
        assert_eq!(red.filled(), 0);
        assert_eq!(red.feed(&payload(&[2, 2, 4, 4])), vec![vec![2, 4]]);
    }

    #[test]
    fn zero_ratio_or_depth_rejected() {
        for (ratio, depth) in [(0, 16), (4, 0)] {
            let err = StreamReducer::new(ReducerConfig { ratio, depth }).unwrap_err();
            assert!(matches!(err, FrameError::InvalidReducer { .. }));
        }
    }
}
