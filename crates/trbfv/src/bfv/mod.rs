//! The BFV encryption scheme underlying the multiparty protocols.

mod ciphertext;
mod encoding;
mod keys;
mod ops;
mod parameters;
mod plaintext;

pub use ciphertext::Ciphertext;
pub use encoding::Encoding;
pub(crate) use encoding::EncodingEnum;
pub use keys::{KeySwitchingKey, PublicKey, RelinearizationKey, SecretKey};
pub use ops::Multiplicator;
pub use parameters::{BfvParameters, BfvParametersBuilder};
pub use plaintext::Plaintext;
