//! Smudging noise: wide bounded masks hiding per-party contributions.

use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use rand::distr::{Distribution, Uniform};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Largest supported smudging bound, in bits.
pub(crate) const MAX_SMUDGING_BITS: usize = 60;

/// Sample a polynomial with coefficients uniform in `[-2^bits, 2^bits]`,
/// in the NTT domain.
///
/// The bound is chosen by the caller orders of magnitude above the
/// base error width, so that a single party's contribution is
/// statistically hidden in the aggregated share. It must stay within
/// the ciphertext noise budget.
pub(crate) fn sample_smudging_error<R: RngCore + CryptoRng>(
    ctx: &Arc<Context>,
    degree: usize,
    bits: usize,
    rng: &mut R,
) -> Result<Poly> {
    if bits == 0 || bits > MAX_SMUDGING_BITS {
        return Err(Error::InvalidParameters(format!(
            "the smudging bound must be between 1 and {MAX_SMUDGING_BITS} bits"
        )));
    }
    let bound = 1i64 << bits;
    let dist = Uniform::new_inclusive(-bound, bound).unwrap();
    let coeffs = Zeroizing::new(dist.sample_iter(&mut *rng).take(degree).collect::<Vec<i64>>());
    let mut e = Poly::try_convert_from(coeffs.as_slice(), ctx, false, Representation::PowerBasis)?;
    e.change_representation(Representation::Ntt);
    Ok(e)
}
