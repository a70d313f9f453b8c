use std::time::{Duration, Instant};
use strata_core::Ticker;

/// Counters of one reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub n_frames: u64,
    pub n_missed_packets: u64,
    pub n_corrupted_frames: u64,
    pub n_dropped_packets: u64,
    /// Frames per second over the period, rounded.
    pub repetition_rate: u64,
}

/// Per-module receive statistics, logged once per period.
pub struct FrameStats {
    detector_name: String,
    module_id: u16,
    ticker: Ticker,
    current: FrameReport,
}

impl FrameStats {
    pub fn new(detector_name: impl Into<String>, module_id: u16, period: Duration) -> Self {
        Self::starting_at(detector_name, module_id, period, Instant::now())
    }

    pub fn starting_at(
        detector_name: impl Into<String>,
        module_id: u16,
        period: Duration,
        start: Instant,
    ) -> Self {
        Self {
            detector_name: detector_name.into(),
            module_id,
            ticker: Ticker::starting_at(period, start),
            current: FrameReport::default(),
        }
    }

    /// Records one emitted frame.
    pub fn record_frame(&mut self, missing_packets: u64) {
        if missing_packets > 0 {
            self.current.n_missed_packets += missing_packets;
            self.current.n_corrupted_frames += 1;
        }
        self.current.n_frames += 1;
    }

    /// Records a packet that did not end up in any frame.
    pub fn record_dropped(&mut self) {
        self.current.n_dropped_packets += 1;
    }

    pub fn maybe_report(&mut self) -> Option<FrameReport> {
        self.maybe_report_at(Instant::now())
    }

    /// Logs and resets the counters if the period is over at `now`.
    pub fn maybe_report_at(&mut self, now: Instant) -> Option<FrameReport> {
        let elapsed = self.ticker.tick_at(now)?;
        let mut report = std::mem::take(&mut self.current);
        let millis = elapsed.as_millis().max(1) as u64;
        // +250 rounds rates truncated by whole-millisecond intervals.
        report.repetition_rate = (report.n_frames * 1000 + 250) / millis;

        tracing::info!(
            detector_name = %self.detector_name,
            module_id = self.module_id,
            n_missed_packets = report.n_missed_packets,
            n_corrupted_frames = report.n_corrupted_frames,
            n_dropped_packets = report.n_dropped_packets,
            repetition_rate = report.repetition_rate,
            "udp receive stats"
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_period_and_resets() {
        let start = Instant::now();
        let mut stats = FrameStats::starting_at("JF01", 0, Duration::from_secs(10), start);
        for missing in [0, 0, 3, 0, 1] {
            stats.record_frame(missing);
        }
        stats.record_dropped();

        assert_eq!(stats.maybe_report_at(start + Duration::from_secs(1)), None);

        let report = stats.maybe_report_at(start + Duration::from_secs(10)).unwrap();
        assert_eq!(report.n_frames, 5);
        assert_eq!(report.n_missed_packets, 4);
        assert_eq!(report.n_corrupted_frames, 2);
        assert_eq!(report.n_dropped_packets, 1);
        assert_eq!(report.repetition_rate, 0);

        for _ in 0..1000 {
            stats.record_frame(0);
        }
        let report = stats.maybe_report_at(start + Duration::from_secs(20)).unwrap();
        assert_eq!(report.n_missed_packets, 0);
        assert_eq!(report.repetition_rate, 100);
    }
}
