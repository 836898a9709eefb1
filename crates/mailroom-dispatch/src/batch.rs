use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mailroom_types::api::BatchConfigResponse;

use crate::error::DispatchError;

pub const DEFAULT_BATCH_SIZE: u32 = 50;
pub const DEFAULT_BATCH_INTERVAL_SECS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: u32,
    pub batch_interval_seconds: u32,
}

impl BatchSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.batch_interval_seconds))
    }

    fn pack(self) -> u64 {
        (u64::from(self.batch_size) << 32) | u64::from(self.batch_interval_seconds)
    }

    fn unpack(packed: u64) -> Self {
        Self {
            batch_size: (packed >> 32) as u32,
            batch_interval_seconds: packed as u32,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval_seconds: DEFAULT_BATCH_INTERVAL_SECS,
        }
    }
}

impl From<BatchSettings> for BatchConfigResponse {
    fn from(settings: BatchSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            batch_interval_seconds: settings.batch_interval_seconds,
        }
    }
}

/// Pacing parameters shared by every dispatch task.
///
/// Both values live in one `AtomicU64`, so an update replaces them together
/// and readers never observe a size from one update paired with an interval
/// from another. Reads take no lock.
#[derive(Debug)]
pub struct BatchConfig {
    packed: AtomicU64,
}

impl BatchConfig {
    pub fn new(settings: BatchSettings) -> Result<Self, DispatchError> {
        validate(i64::from(settings.batch_size), i64::from(settings.batch_interval_seconds))?;
        Ok(Self {
            packed: AtomicU64::new(settings.pack()),
        })
    }

    pub fn get(&self) -> BatchSettings {
        BatchSettings::unpack(self.packed.load(Ordering::Acquire))
    }

    /// Replaces both values, rejecting a size below 1 or a negative interval.
    pub fn update(
        &self,
        batch_size: i64,
        batch_interval_seconds: i64,
    ) -> Result<BatchSettings, DispatchError> {
        let settings = validate(batch_size, batch_interval_seconds)?;
        self.packed.store(settings.pack(), Ordering::Release);
        Ok(settings)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            packed: AtomicU64::new(BatchSettings::default().pack()),
        }
    }
}

fn validate(batch_size: i64, batch_interval_seconds: i64) -> Result<BatchSettings, DispatchError> {
    if batch_size < 1 {
        return Err(DispatchError::validation("Batch size must be greater than zero."));
    }
    if batch_interval_seconds < 0 {
        return Err(DispatchError::validation("Batch interval cannot be negative."));
    }

    let batch_size = u32::try_from(batch_size)
        .map_err(|_| DispatchError::validation("Batch size is too large."))?;
    let batch_interval_seconds = u32::try_from(batch_interval_seconds)
        .map_err(|_| DispatchError::validation("Batch interval is too large."))?;

    Ok(BatchSettings {
        batch_size,
        batch_interval_seconds,
    })
}
