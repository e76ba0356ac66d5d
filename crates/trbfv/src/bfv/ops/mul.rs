//! Ciphertext multiplication.

use std::sync::Arc;

use fhe_math::{
    rns::ScalingFactor,
    rq::{scaler::Scaler, Context, Representation},
    zq::primes::generate_prime,
};
use num_bigint::BigUint;

use crate::bfv::{BfvParameters, Ciphertext, RelinearizationKey};
use crate::{Error, Result};

/// Multiplicator that implements a strategy for multiplying. In
/// particular, the following information can be specified:
/// - Whether `lhs` must be scaled;
/// - Whether `rhs` must be scaled;
/// - The basis at which the multiplication will occur;
/// - The scaling factor after multiplication;
/// - Whether relinearization should be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiplicator {
    par: Arc<BfvParameters>,
    pub(crate) extender_lhs: Scaler,
    pub(crate) extender_rhs: Scaler,
    pub(crate) down_scaler: Scaler,
    pub(crate) base_ctx: Arc<Context>,
    pub(crate) mul_ctx: Arc<Context>,
    rk: Option<RelinearizationKey>,
}

impl Multiplicator {
    /// Construct a multiplicator using custom scaling factors and an
    /// extended basis.
    pub fn new(
        lhs_scaling_factor: ScalingFactor,
        rhs_scaling_factor: ScalingFactor,
        extended_basis: &[u64],
        post_mul_scaling_factor: ScalingFactor,
        par: &Arc<BfvParameters>,
    ) -> Result<Self> {
        let base_ctx = par.ctx_at_level(0)?;
        let mul_ctx = Arc::new(Context::new(extended_basis, par.degree())?);
        let extender_lhs = Scaler::new(base_ctx, &mul_ctx, lhs_scaling_factor)?;
        let extender_rhs = Scaler::new(base_ctx, &mul_ctx, rhs_scaling_factor)?;
        let down_scaler = Scaler::new(&mul_ctx, base_ctx, post_mul_scaling_factor)?;
        Ok(Self {
            par: par.clone(),
            extender_lhs,
            extender_rhs,
            down_scaler,
            base_ctx: base_ctx.clone(),
            mul_ctx,
            rk: None,
        })
    }

    /// Default multiplication strategy using relinearization.
    pub fn default(rk: &RelinearizationKey) -> Result<Self> {
        let par = rk.ksk.par.clone();
        let ctx = par.ctx_at_level(0)?;

        let modulus_size = par.moduli_sizes().iter().sum::<usize>();
        let n_moduli = (modulus_size + 60).div_ceil(62);

        let mut extended_basis = Vec::with_capacity(ctx.moduli().len() + n_moduli);
        extended_basis.append(&mut ctx.moduli().to_vec());
        let mut upper_bound = 1 << 62;
        while extended_basis.len() != ctx.moduli().len() + n_moduli {
            upper_bound = generate_prime(62, 2 * par.degree() as u64, upper_bound).ok_or_else(
                || Error::InvalidParameters("could not generate an extended basis".to_string()),
            )?;
            if !extended_basis.contains(&upper_bound) {
                extended_basis.push(upper_bound)
            }
        }

        let mut multiplicator = Multiplicator::new(
            ScalingFactor::one(),
            ScalingFactor::one(),
            &extended_basis,
            ScalingFactor::new(&BigUint::from(*par.plaintext), ctx.modulus()),
            &par,
        )?;
        multiplicator.enable_relinearization(rk)?;
        Ok(multiplicator)
    }

    /// Enable relinearization after multiplication.
    pub fn enable_relinearization(&mut self, rk: &RelinearizationKey) -> Result<()> {
        let rk_ctx = self.par.ctx_at_level(rk.ksk.ksk_level)?;
        if rk_ctx != &self.base_ctx {
            return Err(Error::LevelMismatch {
                expected: 0,
                found: rk.ksk.ksk_level,
            });
        }
        self.rk = Some(rk.clone());
        Ok(())
    }

    /// Multiply two ciphertexts using the defined multiplication
    /// strategy.
    pub fn multiply(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        if lhs.par != self.par || rhs.par != self.par {
            return Err(Error::InvalidParameters(
                "the ciphertexts do not have the same parameters".to_string(),
            ));
        }
        if lhs.level != 0 || rhs.level != 0 {
            return Err(Error::LevelMismatch {
                expected: 0,
                found: lhs.level.max(rhs.level),
            });
        }
        if lhs.c.len() != 2 || rhs.c.len() != 2 {
            return Err(Error::ShapeMismatch(
                "multiplication can only be performed on ciphertexts of degree 1".to_string(),
            ));
        }

        // Extend into the multiplication basis.
        let c00 = lhs.c[0].scale(&self.extender_lhs)?;
        let c01 = lhs.c[1].scale(&self.extender_lhs)?;
        let c10 = rhs.c[0].scale(&self.extender_rhs)?;
        let c11 = rhs.c[1].scale(&self.extender_rhs)?;

        // Multiply.
        let mut c0 = &c00 * &c10;
        let mut c1 = &c00 * &c11;
        c1 += &(&c01 * &c10);
        let mut c2 = &c01 * &c11;
        c0.change_representation(Representation::PowerBasis);
        c1.change_representation(Representation::PowerBasis);
        c2.change_representation(Representation::PowerBasis);

        // Scale back down.
        let mut c0 = c0.scale(&self.down_scaler)?;
        let mut c1 = c1.scale(&self.down_scaler)?;
        let mut c2 = c2.scale(&self.down_scaler)?;

        if let Some(rk) = self.rk.as_ref() {
            c0.change_representation(Representation::Ntt);
            c1.change_representation(Representation::Ntt);
            let (c0r, c1r) = rk.relinearizes_poly(&c2)?;
            c0 += &c0r;
            c1 += &c1r;
            Ciphertext::new(vec![c0, c1], &self.par)
        } else {
            c0.change_representation(Representation::Ntt);
            c1.change_representation(Representation::Ntt);
            c2.change_representation(Representation::Ntt);
            Ciphertext::new(vec![c0, c1, c2], &self.par)
        }
    }
}
