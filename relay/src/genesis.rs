//! Constants that bootstrap the beacon before any group exists.

use beacon_chain::{Entry, RequestId};
use beacon_cryptography::bls12381::primitives::{
    group::Scalar,
    ops::{compute_public, sign},
};
use bytes::Bytes;

/// The entry the first relay request extends (the first digits of pi).
pub const GENESIS_ENTRY: [u8; 32] = [
    0x45, 0x74, 0xc8, 0xc7, 0x5d, 0x6e, 0x88, 0xac, 0xd2, 0x8f, 0x7e, 0x46, 0x7d, 0xac, 0x97,
    0xb5, 0xc6, 0x0c, 0x38, 0x38, 0xd9, 0xda, 0xd9, 0x93, 0x90, 0x0b, 0xdf, 0x40, 0x21, 0x52,
    0x22, 0x8e,
];

/// Well-known secret of the genesis group.
///
/// Anyone can produce the bootstrap entry with it. It must never sign
/// anything else.
pub const GENESIS_GROUP_SECRET: u32 = 123;

pub fn genesis_entry() -> Bytes {
    Bytes::from_static(&GENESIS_ENTRY)
}

/// Returns the entry that extends the genesis entry for `request_id`, signed
/// by the genesis group.
pub fn bootstrap_entry(request_id: RequestId) -> Entry {
    let secret = Scalar::from_u32(GENESIS_GROUP_SECRET);
    Entry {
        request_id,
        value: sign(&secret, &GENESIS_ENTRY),
        group_public_key: compute_public(&secret),
        previous_entry: genesis_entry(),
        seed: Bytes::new(),
        timestamp: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::verify;
    use beacon_chain::{local::Chain, ThresholdRelay};
    use beacon_cryptography::bls12381::primitives::group::Element;
    use std::time::Duration;

    #[test]
    fn test_bootstrap_entry_verifies() {
        let entry = bootstrap_entry(1);
        assert!(verify(&entry.group_public_key, &GENESIS_ENTRY, &entry.value));
        assert_eq!(entry, bootstrap_entry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_entry_accepted() {
        let chain = Chain::new(beacon_chain::local::Config {
            block_time: Duration::from_secs(1),
            group_size: 3,
            threshold: 2,
            genesis_entry: genesis_entry(),
        });
        let accepted = chain.submit_relay_entry(bootstrap_entry(1)).await.unwrap();
        assert_eq!(accepted.value, bootstrap_entry(1).value);
        assert_eq!(chain.last_entry().unwrap(), Bytes::from(accepted.value.serialize()));

        // Only once
        assert!(matches!(
            chain.submit_relay_entry(bootstrap_entry(1)).await,
            Err(beacon_chain::Error::EntryAlreadySubmitted(1))
        ));
    }
}
