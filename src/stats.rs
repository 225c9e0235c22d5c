//! Runtime stats attached to server notices.
//!
//! Stats are best-effort: the delivery pipeline waits a short while for the
//! provider and sends the notice without stats if it fails or is slow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Memory and load figures, as the collector expects them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Memory figures in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem: Option<MemoryStats>,
    /// Load averages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadStats>,
}

/// Memory figures in megabytes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Total memory.
    pub total: f64,
    /// Free memory.
    pub free: f64,
    /// Buffers.
    pub buffers: f64,
    /// Page cache.
    pub cached: f64,
    /// Free plus buffers plus cache.
    pub free_total: f64,
}

/// Load averages over 1, 5 and 15 minutes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    /// One-minute load average.
    pub one: f64,
    /// Five-minute load average.
    pub five: f64,
    /// Fifteen-minute load average.
    pub fifteen: f64,
}

/// Source of [`Stats`].
#[async_trait]
pub trait StatsProvider: Send + Sync + 'static {
    /// Collects the current stats.
    async fn stats(&self) -> Result<Stats, StatsError>;
}

/// Reads `/proc/meminfo` and `/proc/loadavg`.
///
/// Each file is optional: a missing one leaves the corresponding section
/// empty. Only when neither can be read is an error returned.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProcStats;

const MEMINFO: &str = "/proc/meminfo";
const LOADAVG: &str = "/proc/loadavg";

#[async_trait]
impl StatsProvider for ProcStats {
    async fn stats(&self) -> Result<Stats, StatsError> {
        let meminfo = tokio::fs::read_to_string(MEMINFO).await;
        let loadavg = tokio::fs::read_to_string(LOADAVG).await;

        if let (Err(error), Err(_)) = (&meminfo, &loadavg) {
            return Err(StatsError::Io {
                source_name: MEMINFO,
                error: std::io::Error::new(error.kind(), error.to_string()),
            });
        }

        Ok(Stats {
            mem: meminfo.ok().map(|text| parse_meminfo(&text)).transpose()?,
            load: loadavg.ok().map(|text| parse_loadavg(&text)).transpose()?,
        })
    }
}

fn parse_meminfo(text: &str) -> Result<MemoryStats, StatsError> {
    let field = |name: &str| -> Option<f64> {
        text.lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|kb| kb.parse::<f64>().ok())
            .map(|kb| kb / 1024.0)
    };

    let total = field("MemTotal").ok_or(StatsError::Parse(MEMINFO))?;
    let free = field("MemFree").ok_or(StatsError::Parse(MEMINFO))?;
    let buffers = field("Buffers").unwrap_or_default();
    let cached = field("Cached").unwrap_or_default();

    Ok(MemoryStats {
        total,
        free,
        buffers,
        cached,
        free_total: free + buffers + cached,
    })
}

fn parse_loadavg(text: &str) -> Result<LoadStats, StatsError> {
    let mut values = text
        .split_whitespace()
        .map(|value| value.parse::<f64>().map_err(|_| StatsError::Parse(LOADAVG)));
    let mut next = || values.next().unwrap_or(Err(StatsError::Parse(LOADAVG)));

    Ok(LoadStats {
        one: next()?,
        five: next()?,
        fifteen: next()?,
    })
}
