//! Public keys for the BFV encryption scheme.

use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, Plaintext, SecretKey};
use crate::{Error, Result};

/// A public key, possibly the aggregate of collective key shares. It
/// is an encryption of zero under the matching secret key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) c: Ciphertext,
}

impl PublicKey {
    /// Generate a public key from a secret key.
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Self {
        let c = sk
            .encrypt_zero(0, rng)
            .expect("parameters are valid by construction");
        Self {
            par: sk.par.clone(),
            c,
        }
    }

    /// Encrypt a plaintext under this public key.
    pub fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if pt.par != self.par {
            return Err(Error::InvalidParameters(
                "the plaintext and the public key have different parameters".to_string(),
            ));
        }
        if pt.level != self.c.level {
            return Err(Error::LevelMismatch {
                expected: self.c.level,
                found: pt.level,
            });
        }
        let ctx = self.par.ctx_at_level(pt.level)?;

        let u = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);
        let e0 = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);
        let e1 = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);
        let m = Zeroizing::new(pt.to_poly()?);

        let mut c0 = &self.c.c[0] * u.as_ref();
        c0 += e0.as_ref();
        c0 += m.as_ref();
        let mut c1 = &self.c.c[1] * u.as_ref();
        c1 += e1.as_ref();

        Ciphertext::new(vec![c0, c1], &self.par)
    }
}

#[cfg(test)]
mod tests {
    use super::PublicKey;
    use crate::bfv::{BfvParameters, Encoding, Plaintext, SecretKey};
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
                let pk = PublicKey::new(&sk, &mut rng);
                let v = par.plaintext.random_vec(par.degree(), &mut rng);
                let pt = Plaintext::try_encode(&v, Encoding::poly(), &par).unwrap();
                let ct = pk.try_encrypt(&pt, &mut rng).unwrap();
                let pt2 = sk.try_decrypt(&ct).unwrap();
                assert_eq!(pt, pt2);
            }
        }
    }
}
