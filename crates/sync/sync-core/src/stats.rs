use std::time::{Duration, Instant};
use strata_core::Ticker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// Images released downstream.
    pub n_processed_images: u64,
    /// Released images with at least one module missing packets.
    pub n_incomplete_images: u64,
    /// Images given up on before all modules arrived.
    pub n_corrupted_images: u64,
    /// Module frames that could not be read back from their buffer.
    pub n_lost_frames: u64,
}

/// Statistics of the sync process, logged once per period.
pub struct SyncStats {
    detector_name: String,
    ticker: Ticker,
    current: SyncReport,
}

impl SyncStats {
    pub fn new(detector_name: impl Into<String>, period: Duration) -> Self {
        Self::starting_at(detector_name, period, Instant::now())
    }

    pub fn starting_at(detector_name: impl Into<String>, period: Duration, start: Instant) -> Self {
        Self {
            detector_name: detector_name.into(),
            ticker: Ticker::starting_at(period, start),
            current: SyncReport::default(),
        }
    }

    pub fn record_released(&mut self, n_missing_packets: u64) {
        self.current.n_processed_images += 1;
        if n_missing_packets > 0 {
            self.current.n_incomplete_images += 1;
        }
    }

    pub fn record_corrupted(&mut self, n: usize) {
        self.current.n_corrupted_images += n as u64;
    }

    pub fn record_lost(&mut self) {
        self.current.n_lost_frames += 1;
    }

    pub fn maybe_report(&mut self) -> Option<SyncReport> {
        self.maybe_report_at(Instant::now())
    }

    pub fn maybe_report_at(&mut self, now: Instant) -> Option<SyncReport> {
        self.ticker.tick_at(now)?;
        let report = std::mem::take(&mut self.current);
        tracing::info!(
            detector_name = %self.detector_name,
            n_processed_images = report.n_processed_images,
            n_incomplete_images = report.n_incomplete_images,
            n_corrupted_images = report.n_corrupted_images,
            n_lost_frames = report.n_lost_frames,
            "sync stats"
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_reset_every_period() {
        let start = Instant::now();
        let mut stats = SyncStats::starting_at("JF01", Duration::from_secs(5), start);
        stats.record_released(0);
        stats.record_released(2);
        stats.record_corrupted(3);
        stats.record_lost();

        assert_eq!(stats.maybe_report_at(start + Duration::from_secs(4)), None);
        assert_eq!(
            stats.maybe_report_at(start + Duration::from_secs(5)),
            Some(SyncReport {
                n_processed_images: 2,
                n_incomplete_images: 1,
                n_corrupted_images: 3,
                n_lost_frames: 1,
            })
        );
        assert_eq!(
            stats.maybe_report_at(start + Duration::from_secs(10)),
            Some(SyncReport::default())
        );
    }
}
