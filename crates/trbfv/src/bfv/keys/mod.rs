//! Keys of the BFV scheme.

mod key_switching_key;
mod public_key;
mod relinearization_key;
mod secret_key;

pub use key_switching_key::KeySwitchingKey;
pub use public_key::PublicKey;
pub use relinearization_key::RelinearizationKey;
pub use secret_key::SecretKey;
