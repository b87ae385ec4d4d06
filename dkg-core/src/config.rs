//! Tunables of the retry loop and of the per-member DKG task.

use std::time::Duration;

/// Parameters of the DKG retry loop.
///
/// The delay and window values only change how fast the group reacts to
/// failures. All members of a group MUST use the same values, otherwise they
/// disagree on attempt start blocks and qualified members.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct RetryConfig {
    /// Number of blocks one DKG attempt takes in the worst case.
    pub protocol_blocks: u64,
    /// Fixed number of blocks between the expected end of an attempt and the
    /// start of the next one.
    pub delay_blocks: u64,
    /// Every attempt whose number is a multiple of this value waits
    /// `delay_blocks * delay_blocks_bump_factor` blocks instead.
    pub delay_blocks_bump_frequency: u32,
    /// See [`RetryConfig::delay_blocks_bump_frequency`].
    pub delay_blocks_bump_factor: u64,
    /// Number of first attempts during which members known to be inactive
    /// are excluded before falling back to random retries.
    pub inactivity_exclusion_window: u32,
    /// Minimum number of qualified seats for the inactivity exclusion to be
    /// used. Defaults to the chain's group quorum when unset.
    pub inactivity_exclusion_quorum: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            protocol_blocks: 150,
            delay_blocks: 5,
            delay_blocks_bump_frequency: 100,
            delay_blocks_bump_factor: 20,
            inactivity_exclusion_window: 5,
            inactivity_exclusion_quorum: None,
        }
    }
}

impl RetryConfig {
    /// Blocks to wait between the expected end of the previous attempt and
    /// the start of `attempt`.
    pub fn delay_blocks_for(&self, attempt: u32) -> u64 {
        if self.delay_blocks_bump_frequency != 0 && attempt % self.delay_blocks_bump_frequency == 0
        {
            self.delay_blocks * self.delay_blocks_bump_factor
        } else {
            self.delay_blocks
        }
    }
}

/// Configuration of a node taking part in DKG.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct Config {
    /// Retry loop parameters.
    pub retry: RetryConfig,
    /// How long a member may keep retrying DKG for one seed.
    pub dkg_timeout: Duration,
    /// Number of blocks between the end of DKG execution and the moment the
    /// first member may publish the result.
    pub pre_publication_blocks: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            dkg_timeout: Duration::from_secs(2 * 60 * 60),
            pre_publication_blocks: 10,
        }
    }
}
