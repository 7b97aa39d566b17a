//! Collision-free channel names derived from the event start date.
//!
//! Names are probed sequentially (`D`, `D_2`, `D_3`, ...) against a lookup.
//! The probe and the later channel creation are not atomic, so allocation is
//! only sound with a single writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Upper bound on candidates tried before giving up.
pub const MAX_CHANNEL_NAME_PROBES: u32 = 1_000;

/// Answers whether a channel name is already in use.
#[async_trait]
pub trait ChannelNameLookup: Send + Sync {
    async fn is_channel_name_taken(&self, name: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Error)]
pub enum NameAllocationError {
    #[error("no free channel name for base '{base}' after {probes} probes")]
    Exhausted { base: String, probes: u32 },
    #[error("channel name lookup failed for '{name}': {message}")]
    Lookup { name: String, message: String },
}

pub fn base_channel_name(starts_at: DateTime<Utc>) -> String {
    starts_at.format("%Y-%m-%d").to_string()
}

/// `probe` 1 is the bare base name; later probes append `_<probe>`.
pub fn candidate_channel_name(base: &str, probe: u32) -> String {
    if probe <= 1 {
        base.to_string()
    } else {
        format!("{base}_{probe}")
    }
}

pub async fn allocate_channel_name(
    base: &str,
    lookup: &dyn ChannelNameLookup,
    max_probes: u32,
) -> Result<String, NameAllocationError> {
    let max_probes = max_probes.max(1);
    for probe in 1..=max_probes {
        let candidate = candidate_channel_name(base, probe);
        let taken = lookup
            .is_channel_name_taken(&candidate)
            .await
            .map_err(|error| NameAllocationError::Lookup {
                name: candidate.clone(),
                message: format!("{error:#}"),
            })?;
        if !taken {
            return Ok(candidate);
        }
    }
    Err(NameAllocationError::Exhausted {
        base: base.to_string(),
        probes: max_probes,
    })
}
