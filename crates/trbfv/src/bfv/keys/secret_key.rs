//! Secret keys for the BFV encryption scheme.

use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use fhe_util::sample_vec_cbd;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use crate::bfv::{BfvParameters, Ciphertext, Plaintext};
use crate::{Error, Result};

/// A secret key, or one party's additive share of a collective secret
/// key. The coefficients are wiped when the key is dropped.
#[derive(Debug, PartialEq, Eq)]
pub struct SecretKey {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) coeffs: Box<[i64]>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl SecretKey {
    /// Generate a random secret key from the centered binomial
    /// distribution of the parameters' variance.
    pub fn random<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Self {
        let coeffs = sample_vec_cbd(par.degree(), par.variance, rng).unwrap();
        Self::new(coeffs, par)
    }

    /// Build a secret key from raw coefficients.
    pub fn new(coeffs: Vec<i64>, par: &Arc<BfvParameters>) -> Self {
        Self {
            par: par.clone(),
            coeffs: coeffs.into_boxed_slice(),
        }
    }

    /// The secret key polynomial in the given context, NTT domain.
    pub(crate) fn poly_in_ctx(&self, ctx: &Arc<Context>) -> Result<Zeroizing<Poly>> {
        let mut s = Zeroizing::new(Poly::try_convert_from(
            self.coeffs.as_ref(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        s.change_representation(Representation::Ntt);
        s.disallow_variable_time_computations();
        Ok(s)
    }

    /// The secret key polynomial at the given level, NTT domain.
    pub(crate) fn to_poly(&self, level: usize) -> Result<Zeroizing<Poly>> {
        self.poly_in_ctx(self.par.ctx_at_level(level)?)
    }

    /// An encryption of zero: `(-(a*s) + e, a)` with `a` uniform.
    pub(crate) fn encrypt_zero<R: RngCore + CryptoRng>(
        &self,
        level: usize,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let ctx = self.par.ctx_at_level(level)?;
        let s = self.to_poly(level)?;
        let a = Poly::random(ctx, Representation::Ntt, rng);
        let e = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);

        let mut c0 = -(&a * s.as_ref());
        c0 += e.as_ref();
        Ciphertext::new(vec![c0, a], &self.par)
    }

    /// Encrypt a plaintext under this secret key.
    pub fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if pt.par != self.par {
            return Err(Error::InvalidParameters(
                "the plaintext and the secret key have different parameters".to_string(),
            ));
        }
        let mut ct = self.encrypt_zero(pt.level, rng)?;
        let m = Zeroizing::new(pt.to_poly()?);
        ct.c[0] += m.as_ref();
        Ok(ct)
    }

    /// Decrypt a ciphertext under this secret key.
    pub fn try_decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        if ct.par != self.par {
            return Err(Error::InvalidParameters(
                "the ciphertext and the secret key have different parameters".to_string(),
            ));
        }
        let c = self.carrier(ct)?;
        Plaintext::try_from_carrier(c, &self.par, ct.level)
    }

    /// The carrier polynomial `sum_i c_i * s^i` of a ciphertext, NTT
    /// domain.
    fn carrier(&self, ct: &Ciphertext) -> Result<Zeroizing<Poly>> {
        let s = self.to_poly(ct.level)?;
        let mut c = Zeroizing::new(ct.c[0].clone());
        c.disallow_variable_time_computations();
        let mut s_power = Zeroizing::new(s.as_ref().clone());
        for i in 1..ct.c.len() {
            let term = Zeroizing::new(&ct.c[i] * s_power.as_ref());
            *c.as_mut() += term.as_ref();
            if i + 1 < ct.c.len() {
                *s_power.as_mut() *= s.as_ref();
            }
        }
        Ok(c)
    }

    /// Measure the noise of a ciphertext, in bits.
    ///
    /// # Safety
    ///
    /// Exposes information correlated with the secret key; test and
    /// diagnostics use only.
    pub unsafe fn measure_noise(&self, ct: &Ciphertext) -> Result<usize> {
        let pt = self.try_decrypt(ct)?;
        let m = Zeroizing::new(pt.to_poly()?);
        let mut c = self.carrier(ct)?;
        *c.as_mut() -= m.as_ref();
        c.change_representation(Representation::PowerBasis);

        let ctx = self.par.ctx_at_level(ct.level)?;
        let q: BigUint = ctx.modulus().clone();
        let mut noise = 0usize;
        for coeff in Vec::<BigUint>::from(c.as_ref()) {
            noise = noise.max(std::cmp::min(coeff.bits(), (&q - &coeff).bits()) as usize);
        }
        Ok(noise)
    }
}

#[cfg(test)]
mod tests {
    use super::SecretKey;
    use crate::bfv::{BfvParameters, Encoding, Plaintext};
    use rand::thread_rng;

    #[test]
    fn encrypt_decrypt() {
        let mut rng = thread_rng();
        for par in [
            BfvParameters::default_arc(1, 16),
            BfvParameters::default_arc(3, 16),
        ] {
            for _ in 0..20 {
                let sk = SecretKey::random(&par, &mut rng);
                let v = par.plaintext.random_vec(par.degree(), &mut rng);
                let pt = Plaintext::try_encode(&v, Encoding::poly(), &par).unwrap();
                let ct = sk.try_encrypt(&pt, &mut rng).unwrap();
                let pt2 = sk.try_decrypt(&ct).unwrap();
                assert_eq!(pt, pt2);
            }
        }
    }

    #[test]
    fn fresh_noise_is_small() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let pt = Plaintext::try_encode(&[1], Encoding::poly(), &par).unwrap();
        let ct = sk.try_encrypt(&pt, &mut rng).unwrap();
        let noise = unsafe { sk.measure_noise(&ct).unwrap() };
        assert!(noise < 30, "fresh noise too large: {noise} bits");
    }
}
