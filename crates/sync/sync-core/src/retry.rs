#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("streams desynchronized: {attempts} consecutive resync attempts failed (limit {limit})")]
    Desynchronized { attempts: u32, limit: u32 },
}

/// Ceiling on consecutive failed resynchronization attempts.
///
/// The synchronizers only report matches and drops; the caller decides what
/// counts as a failed attempt and records it here. Past the limit the streams
/// are considered desynchronized and the process has to be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: u32,
    attempts: u32,
}

impl RetryPolicy {
    pub fn new(limit: u32) -> Self {
        Self { limit, attempts: 0 }
    }

    pub fn record_failure(&mut self) -> Result<(), SyncError> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > self.limit {
            return Err(SyncError::Desynchronized {
                attempts: self.attempts,
                limit: self.limit,
            });
        }
        tracing::warn!(
            attempt = self.attempts,
            limit = self.limit,
            "resynchronizing streams"
        );
        Ok(())
    }

    pub fn record_success(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
