//! Agree on, and publish, the outcome of a key generation run.
//!
//! After key generation every member signs its [DkgResult] and broadcasts
//! it. Submissions are tallied until the end of the collection period and
//! the result supported by a strict majority of them (or, without one, the
//! member's own) becomes the member's candidate. Members then take turns, in
//! an order chosen by a [policy::SubmissionPolicy], submitting the candidate
//! to the ledger. The ledger accepts the first valid result for a run, so at
//! most one result is ever published.
//!
//! [DkgResult]: beacon_chain::DkgResult

use thiserror::Error;

mod policy;
pub use policy::{Rotation, SubmissionPolicy};
mod publish;
pub use publish::publish;
mod tally;
pub use tally::{Rejected, Tally};
pub mod wire;

/// Errors that can occur while publishing a result.
#[derive(Debug, Error)]
pub enum Error {
    #[error("chain error: {0}")]
    Chain(beacon_chain::Error),
    #[error("unable to send: {0}")]
    Send(String),
    #[error("unable to receive: {0}")]
    Recv(String),
    #[error("operator is not a member of the group")]
    NotMember,
    #[error("no result published by block {0}")]
    Timeout(u64),
}

/// Configuration for result publication.
#[derive(Clone, Debug)]
pub struct Config {
    /// Blocks, after key generation ends, during which submissions are
    /// collected.
    pub collection_period: u64,

    /// Blocks between the first eligible block of consecutive submitters.
    pub submission_step: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_period: 3,
            submission_step: 2,
        }
    }
}

impl Config {
    /// Block at which collection ends for a run whose key generation ended at
    /// `dkg_end`.
    pub fn collection_end(&self, dkg_end: u64) -> u64 {
        dkg_end.saturating_add(self.collection_period)
    }

    /// First block at which the submitter at `position` may submit.
    pub fn eligible_block(&self, dkg_end: u64, position: usize) -> u64 {
        self.collection_end(dkg_end)
            .saturating_add((position as u64).saturating_mul(self.submission_step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows() {
        let config = Config::default();
        assert_eq!(config.collection_end(15), 18);
        assert_eq!(config.eligible_block(15, 0), 18);
        assert_eq!(config.eligible_block(15, 3), 24);

        let config = Config {
            collection_period: u64::MAX,
            submission_step: u64::MAX,
        };
        assert_eq!(config.collection_end(15), u64::MAX);
        assert_eq!(config.eligible_block(0, 2), u64::MAX);
    }
}
