//! Common reference polynomials.

use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};

use crate::bfv::BfvParameters;
use crate::Result;

/// A polynomial sampled uniformly from public randomness, on which all
/// parties agree.
///
/// Drawing it from a [`KeyedPrng`](crate::mbfv::KeyedPrng) seeded with
/// the agreed `(key, seed)` pair yields the same polynomial on every
/// party; the substrate samples each residue by masked rejection, so
/// the draw is uniform and a deterministic function of the byte
/// stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonRandomPoly {
    pub(crate) poly: Poly,
    pub(crate) level: usize,
}

impl CommonRandomPoly {
    /// Sample a new CRP at level 0.
    pub fn new<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Result<Self> {
        Self::new_leveled(par, 0, rng)
    }

    /// Sample a new CRP at the given level.
    pub fn new_leveled<R: RngCore + CryptoRng>(
        par: &Arc<BfvParameters>,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        Ok(Self {
            poly: Poly::random(ctx, Representation::Ntt, rng),
            level,
        })
    }

    /// Sample a new CRP vector, one polynomial per RNS digit, as
    /// required by the relinearization key generation protocol.
    pub fn new_vec<R: RngCore + CryptoRng>(
        par: &Arc<BfvParameters>,
        rng: &mut R,
    ) -> Result<Vec<Self>> {
        (0..par.moduli().len()).map(|_| Self::new(par, rng)).collect()
    }
}
