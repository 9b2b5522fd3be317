//! Batch sizing under memory pressure.

/// Picks a batch size from the current memory usage percentage.
///
/// Hosts can supply their own policy for environment-specific tuning. The processor clamps
/// whatever the policy returns to its configured minimum.
pub trait BatchSizePolicy: Send + Sync {
    fn batch_size(&self, mem_pct: f64, base: usize) -> usize;
}

/// Scale applied to the base batch size once usage exceeds `above_pct`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureTier {
    pub above_pct: f64,
    pub fraction: f64,
}

/// Step-wise shrink of the base batch size as memory fills up.
#[derive(Debug, Clone, PartialEq)]
pub struct TieredBatchPolicy {
    /// Above this percentage only the minimum batch size is used.
    pub minimum_above_pct: f64,
    pub min_batch_size: usize,
    /// Checked in order; the first tier whose threshold is exceeded wins.
    pub tiers: Vec<PressureTier>,
}

impl TieredBatchPolicy {
    pub fn new(min_batch_size: usize) -> Self {
        Self {
            minimum_above_pct: 80.0,
            min_batch_size,
            tiers: vec![
                PressureTier {
                    above_pct: 70.0,
                    fraction: 0.25,
                },
                PressureTier {
                    above_pct: 60.0,
                    fraction: 0.50,
                },
                PressureTier {
                    above_pct: 50.0,
                    fraction: 0.75,
                },
            ],
        }
    }
}

impl BatchSizePolicy for TieredBatchPolicy {
    fn batch_size(&self, mem_pct: f64, base: usize) -> usize {
        if mem_pct > self.minimum_above_pct {
            return self.min_batch_size;
        }

        let scaled = self
            .tiers
            .iter()
            .find(|tier| mem_pct > tier.above_pct)
            .map(|tier| (base as f64 * tier.fraction).floor() as usize)
            .unwrap_or(base);

        scaled.max(self.min_batch_size)
    }
}
