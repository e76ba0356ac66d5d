//! Parameters for the BFV encryption scheme.

use std::sync::Arc;

use fhe_math::{
    ntt::NttOperator,
    rns::{RnsContext, ScalingFactor},
    rq::{scaler::Scaler, Context},
    zq::{primes::generate_prime, Modulus},
};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::{Error, Result};

/// Parameters for the BFV encryption scheme.
#[derive(Debug)]
pub struct BfvParameters {
    /// Number of coefficients of the ring polynomials.
    polynomial_degree: usize,

    /// Modulus of the plaintext ring.
    pub plaintext: Modulus,

    /// Ciphertext moduli q_0, ..., q_{L-1}.
    pub(crate) moduli: Box<[u64]>,

    /// Bit sizes of the ciphertext moduli.
    moduli_sizes: Box<[usize]>,

    /// Variance of the centered binomial error distribution.
    pub(crate) variance: usize,

    /// Polynomial contexts, one per level.
    ctx: Vec<Arc<Context>>,

    /// NTT operator over the plaintext ring, when the plaintext modulus
    /// supports batching.
    op: Option<Arc<NttOperator>>,

    /// (-t)^-1 mod Q_l, one per level; used to lift plaintexts into R_Q.
    pub(crate) delta: Vec<BigUint>,

    /// Q_l mod t, one per level.
    pub(crate) q_mod_t: Vec<u64>,

    /// Rounded t/Q_l rescalers used at decryption, one per level.
    pub(crate) scalers: Vec<Scaler>,

    /// Bit-reversed slot ordering for the SIMD encoding.
    matrix_reps_index_map: Option<Box<[usize]>>,
}

impl PartialEq for BfvParameters {
    fn eq(&self, other: &Self) -> bool {
        self.polynomial_degree == other.polynomial_degree
            && self.plaintext == other.plaintext
            && self.moduli == other.moduli
            && self.variance == other.variance
    }
}

impl Eq for BfvParameters {}

impl BfvParameters {
    /// Returns the underlying polynomial degree.
    pub fn degree(&self) -> usize {
        self.polynomial_degree
    }

    /// Returns a reference to the ciphertext moduli.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Returns a reference to the ciphertext moduli sizes in bits.
    pub fn moduli_sizes(&self) -> &[usize] {
        &self.moduli_sizes
    }

    /// Returns the variance of the error distribution.
    pub fn variance(&self) -> usize {
        self.variance
    }

    /// Returns the maximum level allowed by these parameters.
    pub fn max_level(&self) -> usize {
        self.moduli.len() - 1
    }

    /// Returns the polynomial context at the given level.
    pub fn ctx_at_level(&self, level: usize) -> Result<&Arc<Context>> {
        self.ctx.get(level).ok_or(Error::LevelMismatch {
            expected: self.moduli.len() - 1,
            found: level,
        })
    }

    /// Returns the level of the given polynomial context.
    pub(crate) fn level_of_ctx(&self, ctx: &Arc<Context>) -> Result<usize> {
        self.ctx.iter().position(|c| c == ctx).ok_or_else(|| {
            Error::InvalidParameters(
                "the polynomial context does not belong to these parameters".to_string(),
            )
        })
    }

    /// Returns the plaintext NTT operator and slot ordering, when the
    /// plaintext modulus supports the SIMD encoding.
    pub(crate) fn simd_support(&self) -> Option<(&Arc<NttOperator>, &[usize])> {
        match (&self.op, &self.matrix_reps_index_map) {
            (Some(op), Some(map)) => Some((op, map)),
            _ => None,
        }
    }

    /// Default parameters for tests and examples: `num_moduli` moduli
    /// of 62 bits and a plaintext modulus of 1153.
    pub fn default(num_moduli: usize, degree: usize) -> Self {
        BfvParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(1153)
            .set_moduli_sizes(&vec![62usize; num_moduli])
            .build()
            .unwrap()
    }

    /// Default parameters in an [`Arc`].
    pub fn default_arc(num_moduli: usize, degree: usize) -> Arc<Self> {
        Arc::new(Self::default(num_moduli, degree))
    }
}

/// Builder for [`BfvParameters`].
#[derive(Debug, Clone, Default)]
pub struct BfvParametersBuilder {
    degree: usize,
    plaintext: u64,
    variance: usize,
    moduli: Vec<u64>,
    moduli_sizes: Vec<usize>,
}

impl BfvParametersBuilder {
    /// Creates a new builder with no degree, no plaintext modulus, no
    /// ciphertext moduli, and an error variance of 10.
    pub fn new() -> Self {
        Self {
            variance: 10,
            ..Default::default()
        }
    }

    /// Sets the polynomial degree; must be a power of two of at least 8.
    pub fn set_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    /// Sets the plaintext modulus.
    pub fn set_plaintext_modulus(mut self, plaintext: u64) -> Self {
        self.plaintext = plaintext;
        self
    }

    /// Sets the ciphertext moduli explicitly. Takes precedence over
    /// [`set_moduli_sizes`](Self::set_moduli_sizes).
    pub fn set_moduli(mut self, moduli: &[u64]) -> Self {
        self.moduli = moduli.to_vec();
        self
    }

    /// Sets the sizes in bits of ciphertext moduli to be generated.
    pub fn set_moduli_sizes(mut self, sizes: &[usize]) -> Self {
        self.moduli_sizes = sizes.to_vec();
        self
    }

    /// Sets the variance of the centered binomial error distribution;
    /// must be between 1 and 16.
    pub fn set_variance(mut self, variance: usize) -> Self {
        self.variance = variance;
        self
    }

    /// Generate NTT-friendly primes of the requested sizes.
    fn generate_moduli(moduli_sizes: &[usize], degree: usize) -> Result<Vec<u64>> {
        let mut moduli = Vec::with_capacity(moduli_sizes.len());
        for size in moduli_sizes {
            if !(10..=62).contains(size) {
                return Err(Error::InvalidParameters(
                    "the modulus sizes must be between 10 and 62 bits".to_string(),
                ));
            }
            let mut upper_bound = 1u64 << size;
            loop {
                match generate_prime(*size, 2 * degree as u64, upper_bound) {
                    Some(p) => {
                        if !moduli.contains(&p) {
                            moduli.push(p);
                            break;
                        }
                        upper_bound = p;
                    }
                    None => {
                        return Err(Error::InvalidParameters(
                            "could not generate enough ciphertext moduli of the given sizes"
                                .to_string(),
                        ))
                    }
                }
            }
        }
        Ok(moduli)
    }

    /// The bit-reversed 2 x (N/2) matrix ordering of the SIMD slots.
    fn matrix_reps_index_map(degree: usize) -> Box<[usize]> {
        let logn = degree.trailing_zeros() as usize;
        let row_size = degree >> 1;
        let m = (degree as u64) << 1;
        let gen = 3u64;
        let mut pos = 1u64;
        let mut map = vec![0usize; degree];
        for i in 0..row_size {
            let index1 = ((pos - 1) >> 1) as usize;
            let index2 = ((m - pos - 1) >> 1) as usize;
            map[i] = index1.reverse_bits() >> (usize::BITS as usize - logn);
            map[row_size | i] = index2.reverse_bits() >> (usize::BITS as usize - logn);
            pos *= gen;
            pos &= m - 1;
        }
        map.into_boxed_slice()
    }

    /// Builds the parameters, validating every precondition.
    pub fn build(&self) -> Result<BfvParameters> {
        if self.degree < 8 || !self.degree.is_power_of_two() {
            return Err(Error::InvalidParameters(
                "the degree must be a power of two of at least 8".to_string(),
            ));
        }
        if self.plaintext == 0 {
            return Err(Error::InvalidParameters(
                "the plaintext modulus is not set".to_string(),
            ));
        }
        if !(1..=16).contains(&self.variance) {
            return Err(Error::InvalidParameters(
                "the variance must be between 1 and 16".to_string(),
            ));
        }

        let moduli = if self.moduli.is_empty() {
            if self.moduli_sizes.is_empty() {
                return Err(Error::InvalidParameters(
                    "no ciphertext moduli specified".to_string(),
                ));
            }
            Self::generate_moduli(&self.moduli_sizes, self.degree)?
        } else {
            self.moduli.clone()
        };
        if moduli.iter().any(|&q| q <= self.plaintext) {
            return Err(Error::InvalidParameters(
                "the plaintext modulus must be smaller than every ciphertext modulus".to_string(),
            ));
        }
        let moduli_sizes = moduli
            .iter()
            .map(|m| 64 - m.leading_zeros() as usize)
            .collect::<Vec<_>>();

        let plaintext = Modulus::new(self.plaintext)?;
        let op = NttOperator::new(&plaintext, self.degree).map(Arc::new);
        let matrix_reps_index_map = op
            .is_some()
            .then(|| Self::matrix_reps_index_map(self.degree));

        let mut ctx = Vec::with_capacity(moduli.len());
        let mut delta = Vec::with_capacity(moduli.len());
        let mut q_mod_t = Vec::with_capacity(moduli.len());
        let mut scalers = Vec::with_capacity(moduli.len());
        for level in 0..moduli.len() {
            let moduli_at_level = &moduli[..moduli.len() - level];
            let ctx_l = Arc::new(Context::new(moduli_at_level, self.degree)?);
            let rns = RnsContext::new(moduli_at_level)?;

            // delta_l = (-t)^-1 mod Q_l, lifted through the garner basis.
            let mut delta_l = BigUint::zero();
            for (i, qi) in moduli_at_level.iter().enumerate() {
                let q = Modulus::new(*qi)?;
                let inv = q.inv(q.neg(self.plaintext)).ok_or_else(|| {
                    Error::InvalidParameters(
                        "the plaintext modulus must be invertible modulo every ciphertext modulus"
                            .to_string(),
                    )
                })?;
                delta_l += rns.get_garner(i).unwrap() * inv;
            }
            delta_l %= rns.modulus();

            q_mod_t.push((rns.modulus() % self.plaintext).to_u64().unwrap());
            scalers.push(Scaler::new(
                &ctx_l,
                &ctx_l,
                ScalingFactor::new(&BigUint::from(self.plaintext), rns.modulus()),
            )?);
            ctx.push(ctx_l);
            delta.push(delta_l);
        }

        Ok(BfvParameters {
            polynomial_degree: self.degree,
            plaintext,
            moduli: moduli.into_boxed_slice(),
            moduli_sizes: moduli_sizes.into_boxed_slice(),
            variance: self.variance,
            ctx,
            op,
            delta,
            q_mod_t,
            scalers,
            matrix_reps_index_map,
        })
    }

    /// Builds the parameters in an [`Arc`].
    pub fn build_arc(&self) -> Result<Arc<BfvParameters>> {
        self.build().map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::{BfvParameters, BfvParametersBuilder};
    use crate::Error;

    #[test]
    fn default_parameters() {
        for num_moduli in 1..=3 {
            let par = BfvParameters::default(num_moduli, 16);
            assert_eq!(par.degree(), 16);
            assert_eq!(par.moduli().len(), num_moduli);
            assert_eq!(*par.plaintext, 1153);
            assert_eq!(par.max_level(), num_moduli - 1);
            // 1153 = 1 mod 32, so batching is available at this degree.
            assert!(par.simd_support().is_some());
        }
    }

    #[test]
    fn invalid_parameters() {
        assert_eq!(
            BfvParametersBuilder::new()
                .set_degree(12)
                .set_plaintext_modulus(2)
                .set_moduli_sizes(&[62])
                .build()
                .unwrap_err(),
            Error::InvalidParameters("the degree must be a power of two of at least 8".to_string())
        );
        assert_eq!(
            BfvParametersBuilder::new()
                .set_degree(16)
                .set_moduli_sizes(&[62])
                .build()
                .unwrap_err(),
            Error::InvalidParameters("the plaintext modulus is not set".to_string())
        );
        assert_eq!(
            BfvParametersBuilder::new()
                .set_degree(16)
                .set_plaintext_modulus(2)
                .build()
                .unwrap_err(),
            Error::InvalidParameters("no ciphertext moduli specified".to_string())
        );
        assert_eq!(
            BfvParametersBuilder::new()
                .set_degree(16)
                .set_plaintext_modulus(2)
                .set_moduli_sizes(&[62])
                .set_variance(0)
                .build()
                .unwrap_err(),
            Error::InvalidParameters("the variance must be between 1 and 16".to_string())
        );
    }

    #[test]
    fn slot_ordering_is_a_bijection() {
        let map = BfvParametersBuilder::matrix_reps_index_map(16);
        let mut seen = vec![false; 16];
        for &i in map.iter() {
            assert!(!seen[i]);
            seen[i] = true;
        }
    }

    #[test]
    fn levels() {
        let par = BfvParameters::default(3, 16);
        assert!(par.ctx_at_level(0).is_ok());
        assert!(par.ctx_at_level(2).is_ok());
        assert_eq!(
            par.ctx_at_level(3).unwrap_err(),
            Error::LevelMismatch {
                expected: 2,
                found: 3
            }
        );
    }
}
