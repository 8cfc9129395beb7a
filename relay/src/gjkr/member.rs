//! Per-member key generation state.
//!
//! [Member] performs no I/O: the driver in [super::execute] feeds it the
//! messages received before each deadline and broadcasts whatever it
//! produces. Messages may arrive before their phase starts (they are held
//! until it does) but are dropped once their phase has ended.

use super::{
    adjudicate::{adjudicate, verify_share, Evidence, Verdict},
    ephemeral,
    wire::{Accusation, Dealing, EncryptedShare, EphemeralKey, Message, Payload},
    Faults, Output,
};
use crate::group::{self, Group, MemberIndex};
use beacon_cryptography::{
    bls12381::primitives::{
        group::{Element, Private, Scalar, Share, G1},
        poly,
    },
    PublicKey,
};
use bytes::Bytes;
use rand::{rngs::StdRng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Namespace for deriving a member's randomness.
const SECRET_NAMESPACE: &[u8] = b"_BEACON_GJKR_SECRET_";

/// A dealing that passed the checks of its phase.
struct Dealt {
    commitment: poly::Public,
    ciphertexts: BTreeMap<MemberIndex, Bytes>,
}

/// State of one member over one key generation run.
pub struct Member<P: PublicKey> {
    me: MemberIndex,
    request_id: u64,
    group: Group<P>,
    faults: Faults,
    phase: u8,

    rng: StdRng,
    secret: poly::Private,
    ephemeral: BTreeMap<MemberIndex, Private>,

    published: BTreeMap<MemberIndex, BTreeMap<MemberIndex, G1>>,
    dealt: BTreeMap<MemberIndex, Dealt>,
    shares: BTreeMap<MemberIndex, Private>,

    received_keys: BTreeMap<MemberIndex, Vec<EphemeralKey>>,
    received_dealings: BTreeMap<MemberIndex, Dealing>,
    received_accusations: BTreeMap<MemberIndex, Vec<Accusation>>,
}

impl<P: PublicKey> Member<P> {
    /// Creates the state of member `me`.
    ///
    /// The member's secret polynomial (of degree `threshold - 1`) and its
    /// ephemeral keys are drawn from a generator seeded with the run's seed,
    /// the member's index and `entropy`.
    pub fn new(
        me: MemberIndex,
        group: Group<P>,
        request_id: u64,
        seed: &[u8],
        entropy: &[u8; 32],
        faults: Faults,
    ) -> Result<Self, group::Error> {
        me.validate(group.size())?;

        let mut hasher = Sha256::new();
        hasher.update(SECRET_NAMESPACE);
        hasher.update(seed);
        hasher.update(me.get().to_be_bytes());
        hasher.update(entropy);
        let mut rng = StdRng::from_seed(hasher.finalize().into());
        let secret = poly::new_from(group.threshold() as u32 - 1, &mut rng);

        Ok(Self {
            me,
            request_id,
            group,
            faults,
            phase: 1,

            rng,
            secret,
            ephemeral: BTreeMap::new(),

            published: BTreeMap::new(),
            dealt: BTreeMap::new(),
            shares: BTreeMap::new(),

            received_keys: BTreeMap::new(),
            received_dealings: BTreeMap::new(),
            received_accusations: BTreeMap::new(),
        })
    }

    pub fn index(&self) -> MemberIndex {
        self.me
    }

    pub fn group(&self) -> &Group<P> {
        &self.group
    }

    /// Every member other than this one.
    fn peers(&self) -> Vec<MemberIndex> {
        self.group.indices().filter(|i| *i != self.me).collect()
    }

    /// Resolves the peer that sent a message for `phase` of run `request_id`,
    /// if the message is still relevant.
    fn sender(&self, sender: &P, request_id: u64, phase: u8) -> Option<MemberIndex> {
        let Some(from) = self.group.index_of(sender) else {
            debug!(member = %self.me, %sender, "dropping message from non-member");
            return None;
        };
        if from == self.me {
            return None;
        }
        if request_id != self.request_id {
            debug!(
                member = %self.me,
                %from,
                request = request_id,
                "dropping message for another run"
            );
            return None;
        }
        if phase < self.phase {
            debug!(member = %self.me, %from, phase, "dropping late message");
            return None;
        }
        Some(from)
    }

    /// Records a message received from `sender`.
    pub fn receive(&mut self, sender: &P, message: Message) {
        let phase = message.payload.phase();
        let Some(from) = self.sender(sender, message.request_id, phase) else {
            return;
        };
        let duplicate = match message.payload {
            Payload::EphemeralKeys(keys) => self.received_keys.insert(from, keys).is_some(),
            Payload::Dealing(dealing) => self.received_dealings.insert(from, dealing).is_some(),
            Payload::Accusations(accusations) => self
                .received_accusations
                .insert(from, accusations)
                .is_some(),
        };
        if duplicate {
            debug!(member = %self.me, %from, phase, "replaced duplicate message");
        }
    }

    /// Disqualifies `sender` for broadcasting a message for `phase` of run
    /// `request_id` that could not be decoded.
    pub fn reject(&mut self, sender: &P, request_id: u64, phase: u8) {
        let Some(from) = self.sender(sender, request_id, phase) else {
            return;
        };
        warn!(member = %self.me, %from, phase, "disqualifying sender of malformed message");
        self.group.disqualify(from);
    }

    /// Generates one ephemeral key per peer.
    pub fn ephemeral_keys(&mut self) -> Payload {
        let mut keys = Vec::new();
        let mut published = BTreeMap::new();
        for peer in self.peers() {
            let private = Scalar::rand(&mut self.rng);
            let public = ephemeral::public(&private);
            self.ephemeral.insert(peer, private);
            published.insert(peer, public);
            keys.push(EphemeralKey {
                recipient: peer,
                key: public,
            });
        }
        self.published.insert(self.me, published);
        Payload::EphemeralKeys(keys)
    }

    /// Closes the ephemeral key exchange.
    ///
    /// Silent peers become inactive. Peers that did not publish exactly one key
    /// for every other member are disqualified.
    pub fn finish_ephemeral_keys(&mut self) {
        let size = self.group.size();
        for peer in self.peers() {
            let Some(keys) = self.received_keys.remove(&peer) else {
                warn!(member = %self.me, %peer, "no ephemeral keys received");
                self.group.mark_inactive(peer);
                continue;
            };
            let count = keys.len();
            let published = keys
                .into_iter()
                .filter(|k| k.recipient != peer && k.recipient.validate(size).is_ok())
                .map(|k| (k.recipient, k.key))
                .collect::<BTreeMap<_, _>>();
            if count != size - 1 || published.len() != size - 1 {
                warn!(member = %self.me, %peer, "malformed ephemeral keys");
                self.group.disqualify(peer);
                continue;
            }
            self.published.insert(peer, published);
        }
        self.received_keys.clear();
        self.phase = 2;
    }

    /// Commits to the secret polynomial and encrypts one share for every peer
    /// still operating.
    pub fn dealing(&mut self) -> Payload {
        let commitment = poly::Public::commit(&self.secret);
        let mut shares = Vec::new();
        let mut ciphertexts = BTreeMap::new();
        for peer in self.group.qualified() {
            if peer == self.me {
                let own = self.secret.evaluate(self.me.get()).value;
                self.shares.insert(self.me, own);
                continue;
            }
            let (Some(private), Some(public)) = (
                self.ephemeral.get(&peer),
                self.published.get(&peer).and_then(|k| k.get(&self.me)),
            ) else {
                continue;
            };
            let mut share = self.secret.evaluate(peer.get()).value;
            if self.faults.corrupt_shares.contains(&peer) {
                warn!(member = %self.me, %peer, "corrupting share");
                share.add(&Scalar::one());
            }
            let key = ephemeral::symmetric_key(self.request_id, self.me, peer, private, public);
            let ciphertext = Bytes::from(ephemeral::encrypt(&key, &share));
            share.zeroize();
            ciphertexts.insert(peer, ciphertext.clone());
            shares.push(EncryptedShare {
                recipient: peer,
                ciphertext,
            });
        }
        self.dealt.insert(
            self.me,
            Dealt {
                commitment: commitment.clone(),
                ciphertexts,
            },
        );
        Payload::Dealing(Dealing { commitment, shares })
    }

    /// Closes share distribution.
    ///
    /// Silent dealers become inactive. Dealers whose commitment has the wrong
    /// degree, or that left out an operating peer, are disqualified.
    pub fn finish_dealings(&mut self) {
        let operating = self.group.qualified();
        let degree = self.group.threshold() as u32 - 1;
        for dealer in operating.iter().copied().filter(|d| *d != self.me) {
            let Some(dealing) = self.received_dealings.remove(&dealer) else {
                warn!(member = %self.me, %dealer, "no dealing received");
                self.group.mark_inactive(dealer);
                continue;
            };
            if dealing.commitment.degree() != degree {
                warn!(
                    member = %self.me,
                    %dealer,
                    degree = dealing.commitment.degree(),
                    "commitment has wrong degree"
                );
                self.group.disqualify(dealer);
                continue;
            }
            let mut ciphertexts = BTreeMap::new();
            for share in dealing.shares {
                ciphertexts.entry(share.recipient).or_insert(share.ciphertext);
            }
            if let Some(peer) = operating
                .iter()
                .find(|r| **r != dealer && !ciphertexts.contains_key(*r))
            {
                warn!(member = %self.me, %dealer, %peer, "dealing is missing a share");
                self.group.disqualify(dealer);
                continue;
            }
            self.dealt.insert(
                dealer,
                Dealt {
                    commitment: dealing.commitment,
                    ciphertexts,
                },
            );
        }
        self.received_dealings.clear();
        self.phase = 3;
    }

    /// Decrypts and checks the share from every dealer, accusing those that
    /// sent an invalid one.
    pub fn accusations(&mut self) -> Payload {
        let mut accusations = Vec::new();
        for (dealer, dealt) in &self.dealt {
            if *dealer == self.me || !self.group.is_operating(*dealer) {
                continue;
            }
            let (Some(private), Some(public)) = (
                self.ephemeral.get(dealer),
                self.published.get(dealer).and_then(|k| k.get(&self.me)),
            ) else {
                continue;
            };
            let key = ephemeral::symmetric_key(self.request_id, *dealer, self.me, private, public);
            let share = dealt
                .ciphertexts
                .get(&self.me)
                .and_then(|ciphertext| ephemeral::decrypt(&key, ciphertext))
                .filter(|share| verify_share(&dealt.commitment, self.me, share));
            match share {
                Some(share) => {
                    self.shares.insert(*dealer, share);
                    if !self.faults.false_accusations.contains(dealer) {
                        continue;
                    }
                    warn!(member = %self.me, %dealer, "falsely accusing dealer");
                }
                None => {
                    warn!(member = %self.me, %dealer, "received invalid share");
                }
            }
            accusations.push(Accusation {
                dealer: *dealer,
                revealed: *private,
            });
        }
        self.received_accusations
            .insert(self.me, accusations.clone());
        Payload::Accusations(accusations)
    }

    /// Closes the accusation phase and resolves every accusation.
    ///
    /// Silent members become inactive. Each accusation disqualifies either
    /// the dealer or the accuser (see [adjudicate]). Accusations against
    /// members that have no accepted dealing are ignored.
    pub fn finish_accusations(&mut self) {
        let operating = self.group.qualified();
        for peer in operating.iter().copied().filter(|p| *p != self.me) {
            if !self.received_accusations.contains_key(&peer) {
                warn!(member = %self.me, %peer, "no accusations received");
                self.group.mark_inactive(peer);
            }
        }

        let received = std::mem::take(&mut self.received_accusations);
        for (accuser, accusations) in received {
            if !operating.contains(&accuser) {
                continue;
            }
            for accusation in accusations {
                let dealer = accusation.dealer;
                if dealer == accuser {
                    debug!(member = %self.me, %accuser, "ignoring self accusation");
                    continue;
                }
                let Some(dealt) = self.dealt.get(&dealer) else {
                    debug!(member = %self.me, %accuser, %dealer, "ignoring accusation against member without dealing");
                    continue;
                };
                let (Some(accuser_public), Some(dealer_public), Some(ciphertext)) = (
                    self.published.get(&accuser).and_then(|k| k.get(&dealer)),
                    self.published.get(&dealer).and_then(|k| k.get(&accuser)),
                    dealt.ciphertexts.get(&accuser),
                ) else {
                    debug!(member = %self.me, %accuser, %dealer, "ignoring accusation without evidence");
                    continue;
                };
                let verdict = adjudicate(&Evidence {
                    request_id: self.request_id,
                    dealer,
                    accuser,
                    revealed: &accusation.revealed,
                    accuser_public,
                    dealer_public,
                    commitment: &dealt.commitment,
                    ciphertext,
                });
                match verdict {
                    Verdict::Dealer => {
                        warn!(member = %self.me, %accuser, %dealer, "accusation upheld, disqualifying dealer");
                        self.group.disqualify(dealer);
                    }
                    Verdict::Accuser => {
                        warn!(member = %self.me, %accuser, %dealer, "accusation rejected, disqualifying accuser");
                        self.group.disqualify(accuser);
                    }
                }
            }
        }
        self.phase = 4;
    }

    /// Derives the group public polynomial and this member's share from the
    /// dealings of every qualified member.
    ///
    /// Fails (no public polynomial) if fewer than `threshold` members remain
    /// qualified. The share is absent if this member is not qualified.
    pub fn finalize(&self) -> Output<P> {
        let qualified = self.group.qualified();
        if qualified.len() < self.group.threshold() {
            return Output {
                group: self.group.clone(),
                public: None,
                share: None,
            };
        }

        let mut public = poly::Public::zero();
        for dealer in &qualified {
            if let Some(dealt) = self.dealt.get(dealer) {
                public.add(&dealt.commitment);
            }
        }

        let share = if self.group.is_operating(self.me) {
            let mut private = Private::zero();
            let mut complete = true;
            for dealer in &qualified {
                match self.shares.get(dealer) {
                    Some(share) => private.add(share),
                    None => complete = false,
                }
            }
            if complete {
                Some(Share {
                    index: self.me.get(),
                    private,
                })
            } else {
                warn!(member = %self.me, "missing share from a qualified dealer");
                None
            }
        } else {
            None
        };

        Output {
            group: self.group.clone(),
            public: Some(public),
            share,
        }
    }
}

impl<P: PublicKey> Drop for Member<P> {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.ephemeral.values_mut().for_each(Zeroize::zeroize);
        self.shares.values_mut().for_each(Zeroize::zeroize);
    }
}
