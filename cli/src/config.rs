//! Configuration file for the beacon CLI.
//!
//! Every field has a default, so an empty (or missing) file is valid.
//!
//! ```yaml
//! chain:
//!   block_time_ms: 500
//! devnet:
//!   members: 5
//!   threshold: 3
//! relay:
//!   phase_duration: 5
//!   collection_period: 3
//!   submission_step: 2
//!   request_timeout_secs: 30
//! ```

use beacon_chain::local;
use beacon_relay::{dkg, genesis::genesis_entry, gjkr, result};
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, time::Duration};
use thiserror::Error;

/// Upper bound on any relay duration, in blocks.
const MAX_BLOCKS: u64 = 1_000_000;

/// Upper bound on the size of the devnet group.
const MAX_MEMBERS: usize = 1_000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Time between blocks of the in-process chain.
    pub block_time_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { block_time_ms: 500 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Number of members in the devnet group.
    pub members: usize,
    /// Number of members required to produce an entry.
    pub threshold: usize,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            members: 5,
            threshold: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Blocks in each key generation phase.
    pub phase_duration: u64,
    /// Blocks during which result submissions are collected.
    pub collection_period: u64,
    /// Blocks between consecutive result submitters.
    pub submission_step: u64,
    /// How long `relay request` waits for an entry.
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            phase_duration: 5,
            collection_period: 3,
            submission_step: 2,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: ChainConfig,
    pub devnet: DevnetConfig,
    pub relay: RelayConfig,
}

impl Config {
    /// Loads the configuration at `path`, or the defaults if there is none.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let config: Config = match path {
            Some(path) => serde_yaml::from_reader(File::open(path)?)?,
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.chain.block_time_ms == 0 {
            return Err(Error::Invalid("block time must be non-zero"));
        }
        if self.devnet.members > MAX_MEMBERS {
            return Err(Error::Invalid("too many members"));
        }
        if self.devnet.threshold == 0 || self.devnet.threshold >= self.devnet.members {
            return Err(Error::Invalid("threshold must be in [1, members)"));
        }
        if self.relay.phase_duration == 0 || self.relay.submission_step == 0 {
            return Err(Error::Invalid("phase duration and submission step must be non-zero"));
        }
        if [
            self.relay.phase_duration,
            self.relay.collection_period,
            self.relay.submission_step,
        ]
        .iter()
        .any(|blocks| *blocks > MAX_BLOCKS)
        {
            return Err(Error::Invalid("relay durations must be at most 1000000 blocks"));
        }
        Ok(())
    }

    /// Configuration of the in-process chain.
    pub fn chain(&self) -> local::Config {
        local::Config {
            block_time: Duration::from_millis(self.chain.block_time_ms),
            group_size: self.devnet.members,
            threshold: self.devnet.threshold,
            genesis_entry: genesis_entry(),
        }
    }

    /// Configuration of group creation.
    pub fn dkg(&self) -> dkg::Config {
        dkg::Config {
            gjkr: gjkr::Config {
                phase_duration: self.relay.phase_duration,
                ..Default::default()
            },
            result: result::Config {
                collection_period: self.relay.collection_period,
                submission_step: self.relay.submission_step,
            },
            timeout: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.dkg().gjkr.phase_duration, 5);
    }

    #[test]
    fn test_partial_file() {
        let config: Config = serde_yaml::from_str(
            "devnet:\n  members: 7\nrelay:\n  request_timeout_secs: 10\n",
        )
        .unwrap();
        assert_eq!(config.devnet.members, 7);
        assert_eq!(config.devnet.threshold, 3);
        assert_eq!(config.relay.request_timeout_secs, 10);
        assert_eq!(config.chain, ChainConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = Config::default();
        config.devnet.threshold = config.devnet.members;
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_durations_bounded() {
        let config: Config = serde_yaml::from_str(
            "relay:\n  phase_duration: 18446744073709551615\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let mut config = Config::default();
        config.relay.submission_step = MAX_BLOCKS + 1;
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        config.relay.submission_step = MAX_BLOCKS;
        config.relay.phase_duration = MAX_BLOCKS;
        config.relay.collection_period = MAX_BLOCKS;
        assert!(config.validate().is_ok());
    }
}
