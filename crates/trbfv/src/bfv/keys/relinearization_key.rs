//! Relinearization keys: degree reduction after multiplication.

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{Ciphertext, KeySwitchingKey, SecretKey};
use crate::{Error, Result};

/// A relinearization key: switches the `c2 * s^2` term of a degree-2
/// ciphertext back into a degree-1 encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelinearizationKey {
    pub(crate) ksk: KeySwitchingKey,
}

impl RelinearizationKey {
    /// Generate a relinearization key from a secret key.
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let s = sk.to_poly(0)?;
        let s2 = Zeroizing::new(s.as_ref() * s.as_ref());
        Ok(Self {
            ksk: KeySwitchingKey::new(sk, s2.as_ref(), rng)?,
        })
    }

    /// Relinearize a degree-2 ciphertext in place.
    pub fn relinearizes(&self, ct: &mut Ciphertext) -> Result<()> {
        if ct.c.len() != 3 {
            return Err(Error::ShapeMismatch(
                "relinearization expects a ciphertext of degree 2".to_string(),
            ));
        }
        if ct.level != self.ksk.ciphertext_level {
            return Err(Error::LevelMismatch {
                expected: self.ksk.ciphertext_level,
                found: ct.level,
            });
        }
        let mut c2 = ct.c[2].clone();
        c2.change_representation(Representation::PowerBasis);
        let (c0, c1) = self.relinearizes_poly(&c2)?;
        ct.c[0] += &c0;
        ct.c[1] += &c1;
        ct.c.truncate(2);
        Ok(())
    }

    /// The pair the `c2` polynomial (power basis) contributes to the
    /// relinearized ciphertext.
    pub fn relinearizes_poly(&self, c2: &Poly) -> Result<(Poly, Poly)> {
        self.ksk.key_switch(c2)
    }
}

#[cfg(test)]
mod tests {
    use super::RelinearizationKey;
    use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext, SecretKey};
    use fhe_math::rq::Representation;
    use rand::thread_rng;

    // Relinearize a naive degree-2 encryption of m under (1, s, s^2)
    // and check it still decrypts to m.
    #[test]
    fn relinearization() {
        let mut rng = thread_rng();
        for par in [
            BfvParameters::default_arc(2, 16),
            BfvParameters::default_arc(4, 16),
        ] {
            for _ in 0..10 {
                let sk = SecretKey::random(&par, &mut rng);
                let rk = RelinearizationKey::new(&sk, &mut rng).unwrap();

                let v = par.plaintext.random_vec(par.degree(), &mut rng);
                let pt = Plaintext::try_encode(&v, Encoding::poly(), &par).unwrap();
                let ct = sk.try_encrypt(&pt, &mut rng).unwrap();

                // Degree-2 encryption of the same plaintext: (c0, c1, 0).
                let ctx = par.ctx_at_level(0).unwrap();
                let zero = fhe_math::rq::Poly::zero(ctx, Representation::Ntt);
                let mut ct2 =
                    Ciphertext::new(vec![ct.c[0].clone(), ct.c[1].clone(), zero], &par).unwrap();

                rk.relinearizes(&mut ct2).unwrap();
                assert_eq!(ct2.c.len(), 2);
                let pt2 = sk.try_decrypt(&ct2).unwrap();
                assert_eq!(pt, pt2);
            }
        }
    }
}
