//! Generate threshold relay entries.
//!
//! A group of operators jointly creates a BLS key with a distributed key
//! generation ([gjkr]), agrees on and publishes one canonical outcome
//! ([result]) and then signs each relay entry request with the resulting key
//! shares ([signer], [node]). [dkg] ties key generation and publication
//! together for a single member.
//!
//! # Phases
//!
//! Every deadline is a block height on the ledger's clock. Members process
//! whatever messages arrived before a deadline and move on, so a member that
//! stays silent can delay a run by at most one phase and can never stall it.
//!
//! ```txt
//! start                 ephemeral key exchange
//! start + 1 * phase     commitments and encrypted shares
//! start + 2 * phase     accusations
//! start + 3 * phase     resolution, key derivation, result broadcast
//! ... + collection      result submission (one member per window)
//! ```

use beacon_net::Channel;

pub mod dkg;
pub mod genesis;
pub mod gjkr;
pub mod group;
pub mod node;
pub mod result;
pub mod signer;

/// Channel carrying key generation messages.
pub const GJKR_CHANNEL: Channel = 0;

/// Channel carrying signed DKG results.
pub const RESULT_CHANNEL: Channel = 1;

/// Channel carrying partial signatures over relay entries.
pub const SIGNATURE_CHANNEL: Channel = 2;

#[cfg(test)]
mod mocks;
