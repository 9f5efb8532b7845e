//! Block-time predictor
//!
//! Rolling window of recent block timestamps per chain. Mean interval and
//! sample deviation drive a confidence label, a next-block prediction,
//! and the suggested submission delay that lands a transaction shortly
//! before the predicted block.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use std::collections::VecDeque;

/// How much the predictor trusts its own estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Target landing zone before the predicted block, milliseconds.
const LEAD_MIN_MS: u64 = 200;
const LEAD_MAX_MS: u64 = 500;

pub struct BlockTimePredictor {
    /// (block_number, wall-clock ms) samples, newest last.
    samples: VecDeque<(u64, u64)>,
    capacity: usize,
    /// Chain-configured fallback interval.
    default_interval_ms: u64,
}

impl BlockTimePredictor {
    pub fn new(default_interval_ms: u64) -> Self {
        Self::with_capacity(default_interval_ms, 50)
    }

    pub fn with_capacity(default_interval_ms: u64, capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
            default_interval_ms: default_interval_ms.max(1),
        }
    }

    /// Record a block arrival. Out-of-order or duplicate blocks are
    /// ignored.
    pub fn record_block(&mut self, block_number: u64, now_ms: u64) {
        if let Some(&(last_block, _)) = self.samples.back() {
            if block_number <= last_block {
                return;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((block_number, now_ms));
    }

    /// Mean observed interval, falling back to the configured default
    /// until two samples exist. Multi-block gaps are averaged out.
    pub fn average_interval_ms(&self) -> f64 {
        let Some((&(first_block, first_ms), &(last_block, last_ms))) =
            self.samples.front().zip(self.samples.back())
        else {
            return self.default_interval_ms as f64;
        };
        let blocks = last_block.saturating_sub(first_block);
        if blocks == 0 {
            return self.default_interval_ms as f64;
        }
        last_ms.saturating_sub(first_ms) as f64 / blocks as f64
    }

    /// Sample standard deviation of the per-block intervals.
    pub fn stddev_ms(&self) -> f64 {
        let intervals = self.intervals();
        if intervals.len() < 2 {
            return 0.0;
        }
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let var = intervals
            .iter()
            .map(|x| (x - mean) * (x - mean))
            .sum::<f64>()
            / (intervals.len() - 1) as f64;
        var.sqrt()
    }

    fn intervals(&self) -> Vec<f64> {
        self.samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .filter_map(|(&(b0, t0), &(b1, t1))| {
                let blocks = b1.saturating_sub(b0);
                if blocks == 0 {
                    None
                } else {
                    Some(t1.saturating_sub(t0) as f64 / blocks as f64)
                }
            })
            .collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// High needs a full-ish window and steady intervals; low means the
    /// estimate is mostly the configured default.
    pub fn confidence(&self) -> Confidence {
        if self.samples.len() < 10 {
            return Confidence::Low;
        }
        let avg = self.average_interval_ms();
        if avg <= 0.0 {
            return Confidence::Low;
        }
        let cv = self.stddev_ms() / avg;
        if cv < 0.2 && self.samples.len() >= 30 {
            Confidence::High
        } else if cv < 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Numeric stability in [0, 1] for the execution simulator.
    pub fn stability(&self) -> f64 {
        match self.confidence() {
            Confidence::High => 0.9,
            Confidence::Medium => 0.7,
            Confidence::Low => 0.4,
        }
    }

    /// Predicted arrival of the next block, wall-clock ms.
    pub fn predict_next_arrival(&self) -> Option<u64> {
        let &(_, last_ms) = self.samples.back()?;
        Some(last_ms + self.average_interval_ms().round() as u64)
    }

    /// Suggested delay from `now_ms` so that submission lands 200-500 ms
    /// before the predicted next block. Zero when already inside or past
    /// the window.
    pub fn optimal_submission_window(&self, now_ms: u64) -> u64 {
        let Some(arrival) = self.predict_next_arrival() else {
            return 0;
        };
        let lead = (LEAD_MIN_MS + LEAD_MAX_MS) / 2;
        let target = arrival.saturating_sub(lead);
        target.saturating_sub(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_predictor(interval_ms: u64, blocks: u64) -> BlockTimePredictor {
        let mut p = BlockTimePredictor::new(2_000);
        for i in 0..blocks {
            p.record_block(100 + i, 1_000_000 + i * interval_ms);
        }
        p
    }

    #[test]
    fn test_default_until_samples() {
        let p = BlockTimePredictor::new(12_000);
        assert_eq!(p.average_interval_ms(), 12_000.0);
        assert_eq!(p.confidence(), Confidence::Low);
        assert_eq!(p.optimal_submission_window(0), 0);
    }

    #[test]
    fn test_average_of_steady_chain() {
        let p = steady_predictor(2_000, 40);
        assert!((p.average_interval_ms() - 2_000.0).abs() < 1.0);
        assert!(p.stddev_ms() < 1.0);
        assert_eq!(p.confidence(), Confidence::High);
    }

    #[test]
    fn test_jittery_chain_lowers_confidence() {
        let mut p = BlockTimePredictor::new(2_000);
        let mut t = 1_000_000u64;
        for i in 0..40 {
            // Alternate 500 ms / 3500 ms intervals: cv well above 0.5.
            t += if i % 2 == 0 { 500 } else { 3_500 };
            p.record_block(100 + i, t);
        }
        assert_eq!(p.confidence(), Confidence::Low);
    }

    #[test]
    fn test_window_capacity_bounded() {
        let p = steady_predictor(2_000, 200);
        assert_eq!(p.sample_count(), 50);
    }

    #[test]
    fn test_out_of_order_blocks_ignored() {
        let mut p = BlockTimePredictor::new(2_000);
        p.record_block(100, 1_000);
        p.record_block(99, 2_000);
        p.record_block(100, 3_000);
        assert_eq!(p.sample_count(), 1);
    }

    #[test]
    fn test_submission_window_lands_before_block() {
        let p = steady_predictor(2_000, 40);
        let last_arrival = 1_000_000 + 39 * 2_000;
        let now = last_arrival + 100;
        let delay = p.optimal_submission_window(now);
        let landing = now + delay;
        let predicted = last_arrival + 2_000;
        let lead = predicted - landing;
        assert!(
            (LEAD_MIN_MS..=LEAD_MAX_MS).contains(&lead),
            "lead {} outside window",
            lead
        );
    }

    #[test]
    fn test_multi_block_gap_averaged() {
        let mut p = BlockTimePredictor::new(2_000);
        p.record_block(100, 0);
        // Missed logs for 4 blocks; 5 blocks in 10 s is still 2 s/block.
        p.record_block(105, 10_000);
        assert!((p.average_interval_ms() - 2_000.0).abs() < 1.0);
    }
}
