//! Key switching under the garner-digit RNS decomposition.

use std::sync::Arc;

use fhe_math::rns::RnsContext;
use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, SecretKey};
use crate::{Error, Result};

/// A key switching a source secret into encryptions under another
/// secret, one digit per RNS modulus: `c0[i] + s * c1[i] = g_i * from
/// + e_i`, with `g_i` the garner basis element of digit `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySwitchingKey {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) c0: Box<[Poly]>,
    pub(crate) c1: Box<[Poly]>,
    /// The level of the polynomials this key switches.
    pub(crate) ciphertext_level: usize,
    pub(crate) ctx_ciphertext: Arc<Context>,
    /// The level of the key polynomials.
    pub(crate) ksk_level: usize,
    pub(crate) ctx_ksk: Arc<Context>,
}

impl KeySwitchingKey {
    /// Generate a key switching `from` (a polynomial in the NTT
    /// domain) to the secret key `sk`.
    pub(crate) fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        from: &Poly,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk.par.clone();
        let ctx = par.ctx_at_level(0)?;
        let rns = RnsContext::new(&par.moduli)?;
        let s = sk.to_poly(0)?;

        let mut c0 = Vec::with_capacity(par.moduli.len());
        let mut c1 = Vec::with_capacity(par.moduli.len());
        for i in 0..par.moduli.len() {
            let g = rns.get_garner(i).unwrap();
            let g_from = Zeroizing::new(g * from);
            let a = Poly::random(ctx, Representation::Ntt, rng);
            let e = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);

            let mut c0_i = -(&a * s.as_ref());
            c0_i += e.as_ref();
            c0_i += g_from.as_ref();
            c0.push(c0_i);
            c1.push(a);
        }

        let ctx_ciphertext = ctx.clone();
        let ctx_ksk = ctx.clone();
        Ok(Self {
            par,
            c0: c0.into_boxed_slice(),
            c1: c1.into_boxed_slice(),
            ciphertext_level: 0,
            ctx_ciphertext,
            ksk_level: 0,
            ctx_ksk,
        })
    }

    /// Switch a polynomial in the power basis: decompose it into its
    /// garner digits and combine them with the key polynomials.
    pub(crate) fn key_switch(&self, input: &Poly) -> Result<(Poly, Poly)> {
        if input.representation() != &Representation::PowerBasis {
            return Err(Error::DomainMismatch(
                "key switching expects a polynomial in the power basis".to_string(),
            ));
        }
        if input.ctx() != &self.ctx_ciphertext {
            return Err(Error::LevelMismatch {
                expected: self.ciphertext_level,
                found: self.par.level_of_ctx(input.ctx())?,
            });
        }

        let mut c0 = Poly::zero(&self.ctx_ksk, Representation::Ntt);
        let mut c1 = Poly::zero(&self.ctx_ksk, Representation::Ntt);
        for (i, digit) in input.coefficients().outer_iter().enumerate() {
            let mut d = Poly::try_convert_from(
                digit.as_slice().unwrap(),
                &self.ctx_ksk,
                false,
                Representation::PowerBasis,
            )?;
            d.change_representation(Representation::Ntt);
            c0 += &(&d * &self.c0[i]);
            c1 += &(&d * &self.c1[i]);
        }
        Ok((c0, c1))
    }
}
