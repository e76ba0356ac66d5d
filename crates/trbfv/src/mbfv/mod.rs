//! The multiparty BFV protocols, as described by Christian Mouchet et
//! al., over a secret key additively shared among N parties.
//!
//! Every protocol follows the same data flow: each party generates a
//! share from its private state and the round's public inputs, shares
//! are broadcast and summed with [`Aggregate`], and the aggregate is
//! the round's artifact (a key, a ciphertext, or the next round's
//! input). A round is complete once every party's share has been
//! aggregated; rounds of the multi-round protocols are strictly
//! ordered.

mod aggregate;
mod crp;
mod prng;
mod public_key_gen;
mod public_key_switch;
mod refresh;
mod relin_key_gen;
mod secret_key_switch;
mod smudging;

pub use aggregate::{Aggregate, AggregateIter};
pub use crp::CommonRandomPoly;
pub use prng::KeyedPrng;
pub use public_key_gen::PublicKeyShare;
pub use public_key_switch::PublicKeySwitchShare;
pub use refresh::{MaskedTransform, RefreshShare};
pub use relin_key_gen::{
    RelinKeyGenerator, RelinKeyShare, Round, R1, R1Aggregated, R2, R2Aggregated, R3,
};
pub use secret_key_switch::{DecryptionShare, SecretKeySwitchShare};

pub(crate) use smudging::sample_smudging_error;
