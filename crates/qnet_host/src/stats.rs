//! Fidelity statistics for simulation reports.
//!
//! Collects per-round fidelities into summary statistics and a histogram,
//! and derives the asymptotic E91 key fraction a link of that average
//! quality would support.

const BUCKETS: usize = 20;

/// Tracks fidelity statistics over many rounds.
///
/// Accumulates min, max, mean and a histogram of 20 equal buckets over
/// [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct FidelityStats {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
    pub buckets: [u64; BUCKETS],
}

impl Default for FidelityStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FidelityStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
            buckets: [0; BUCKETS],
        }
    }

    /// Statistics over `values`.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut stats = Self::new();
        for f in values {
            stats.update(f);
        }
        stats
    }

    /// Records one fidelity.
    pub fn update(&mut self, fidelity: f64) {
        self.min = self.min.min(fidelity);
        self.max = self.max.max(fidelity);
        self.sum += fidelity;
        self.count += 1;

        let idx = ((fidelity * BUCKETS as f64) as usize).min(BUCKETS - 1);
        self.buckets[idx] += 1;
    }

    /// Combines two trackers, as if every value had been recorded in one.
    pub fn merge(mut self, other: &FidelityStats) -> Self {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
        for (a, b) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *a += *b;
        }
        self
    }

    /// Mean fidelity, or 0.0 if nothing was recorded.
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Asymptotic E91 secret key fraction at the mean fidelity.
    ///
    /// Treats the shared state as Werner-like, so the quantum bit error rate
    /// is `Q = 2(1 - F)/3` in every basis, and returns `max(0, 1 - 2h(Q))`.
    pub fn key_fraction(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let qber = 2.0 * (1.0 - self.avg()) / 3.0;
        (1.0 - 2.0 * binary_entropy(qber)).max(0.0)
    }

    /// Prints a formatted report with a histogram of non-empty buckets.
    pub fn print_report(&self) {
        println!("Rounds: {}", self.count);
        if self.count == 0 {
            return;
        }
        println!("Min:    {:.4}", self.min);
        println!("Avg:    {:.4}", self.avg());
        println!("Max:    {:.4}", self.max);
        println!("Key fraction (E91): {:.4}", self.key_fraction());

        println!("Distribution (0.05 buckets):");
        for (i, &count) in self.buckets.iter().enumerate() {
            if count > 0 {
                let lower = i as f64 / BUCKETS as f64;
                let upper = (i + 1) as f64 / BUCKETS as f64;
                println!("[{lower:.2}-{upper:.2}]: {count}");
            }
        }
    }
}

/// Binary Shannon entropy in bits. Zero at both ends of [0, 1].
pub fn binary_entropy(x: f64) -> f64 {
    if x <= 0.0 || x >= 1.0 {
        return 0.0;
    }
    -x * x.log2() - (1.0 - x) * (1.0 - x).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_and_buckets() {
        let stats = FidelityStats::from_values([1.0, 0.5, 0.25, 0.26]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 0.25);
        assert_eq!(stats.max, 1.0);
        assert!((stats.avg() - 0.5025).abs() < 1e-12);
        // 1.0 falls in the last bucket rather than past the end.
        assert_eq!(stats.buckets[19], 1);
        assert_eq!(stats.buckets[10], 1);
        assert_eq!(stats.buckets[5], 2);
    }

    #[test]
    fn perfect_pairs_give_a_full_key() {
        let stats = FidelityStats::from_values([1.0; 8]);
        assert_eq!(stats.key_fraction(), 1.0);
    }

    #[test]
    fn poor_pairs_give_no_key() {
        let stats = FidelityStats::from_values([0.3; 8]);
        assert_eq!(stats.key_fraction(), 0.0);
        assert_eq!(FidelityStats::new().key_fraction(), 0.0);
    }

    #[test]
    fn merge_matches_single_tracker() {
        let a = FidelityStats::from_values([0.9, 0.8]);
        let b = FidelityStats::from_values([0.4]);
        let merged = a.merge(&b);
        assert_eq!(merged, FidelityStats::from_values([0.9, 0.8, 0.4]));
    }

    #[test]
    fn entropy_peaks_at_one_half() {
        assert_eq!(binary_entropy(0.0), 0.0);
        assert!((binary_entropy(0.5) - 1.0).abs() < 1e-12);
        assert!(binary_entropy(0.11) < 0.5 + 1e-3);
    }
}
