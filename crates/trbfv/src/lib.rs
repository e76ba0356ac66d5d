#![warn(missing_docs, unused_imports)]

//! Threshold multiparty BFV homomorphic encryption.
//!
//! This crate implements the multiparty BFV protocols of Mouchet et
//! al. over a secret key additively shared among N parties:
//! collective public key generation, collective (public) key
//! switching, collective relinearization key generation, and
//! collective bootstrapping with an optional masked transform. The
//! [`bfv`] module provides the underlying single-party scheme; the
//! [`mbfv`] module provides the interactive protocols and the common
//! reference string subsystem.
//!
//! The library computes shares and combines them; transporting shares
//! between parties is the caller's responsibility.

mod errors;
pub use errors::{Error, Result};

pub mod bfv;
pub mod mbfv;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
