//! Ciphertexts and their additive arithmetic.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use itertools::izip;

use crate::bfv::BfvParameters;
use crate::{Error, Result};

/// A ciphertext: `deg + 1` polynomials in the NTT domain, all sharing
/// the same level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) c: Vec<Poly>,
    pub(crate) level: usize,
}

impl Ciphertext {
    /// Create a ciphertext from polynomials in NTT representation.
    pub fn new(c: Vec<Poly>, par: &Arc<BfvParameters>) -> Result<Self> {
        if c.is_empty() {
            return Err(Error::ShapeMismatch(
                "a ciphertext must contain at least one polynomial".to_string(),
            ));
        }
        let ctx = c[0].ctx();
        let level = par.level_of_ctx(ctx)?;
        for ci in &c {
            if ci.ctx() != ctx {
                return Err(Error::LevelMismatch {
                    expected: level,
                    found: par.level_of_ctx(ci.ctx())?,
                });
            }
            if ci.representation() != &Representation::Ntt {
                return Err(Error::DomainMismatch(
                    "ciphertext polynomials must be in the NTT domain".to_string(),
                ));
            }
        }
        Ok(Self {
            par: par.clone(),
            c,
            level,
        })
    }

    /// The empty ciphertext, absorbing element of the addition.
    pub fn zero(par: &Arc<BfvParameters>) -> Self {
        Self {
            par: par.clone(),
            c: vec![],
            level: 0,
        }
    }

    /// The level of this ciphertext.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The degree of this ciphertext, i.e. one less than the number of
    /// its polynomials.
    pub fn degree(&self) -> usize {
        self.c.len().saturating_sub(1)
    }
}

impl AddAssign<&Ciphertext> for Ciphertext {
    fn add_assign(&mut self, rhs: &Ciphertext) {
        if rhs.c.is_empty() {
            return;
        }
        if self.c.is_empty() {
            *self = rhs.clone();
            return;
        }
        assert_eq!(self.par, rhs.par);
        assert_eq!(self.level, rhs.level);
        assert_eq!(self.c.len(), rhs.c.len());
        izip!(self.c.iter_mut(), rhs.c.iter()).for_each(|(a, b)| *a += b);
    }
}

impl Add<&Ciphertext> for &Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: &Ciphertext) -> Ciphertext {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl SubAssign<&Ciphertext> for Ciphertext {
    fn sub_assign(&mut self, rhs: &Ciphertext) {
        if rhs.c.is_empty() {
            return;
        }
        if self.c.is_empty() {
            *self = -rhs;
            return;
        }
        assert_eq!(self.par, rhs.par);
        assert_eq!(self.level, rhs.level);
        assert_eq!(self.c.len(), rhs.c.len());
        izip!(self.c.iter_mut(), rhs.c.iter()).for_each(|(a, b)| *a -= b);
    }
}

impl Sub<&Ciphertext> for &Ciphertext {
    type Output = Ciphertext;

    fn sub(self, rhs: &Ciphertext) -> Ciphertext {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Neg for &Ciphertext {
    type Output = Ciphertext;

    fn neg(self) -> Ciphertext {
        Ciphertext {
            par: self.par.clone(),
            c: self.c.iter().map(|ci| -ci.clone()).collect(),
            level: self.level,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext, SecretKey};

    #[test]
    fn add_sub() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 16);
        let sk = SecretKey::random(&par, &mut rng);
        for _ in 0..20 {
            let a = par.plaintext.random_vec(par.degree(), &mut rng);
            let b = par.plaintext.random_vec(par.degree(), &mut rng);
            let mut expected = a.clone();
            par.plaintext.add_vec(&mut expected, &b);

            let pt_a = Plaintext::try_encode(&a, Encoding::poly(), &par).unwrap();
            let pt_b = Plaintext::try_encode(&b, Encoding::poly(), &par).unwrap();
            let ct_a = sk.try_encrypt(&pt_a, &mut rng).unwrap();
            let ct_b = sk.try_encrypt(&pt_b, &mut rng).unwrap();

            let ct_sum = &ct_a + &ct_b;
            let pt_sum = sk.try_decrypt(&ct_sum).unwrap();
            assert_eq!(pt_sum.try_decode(Encoding::poly()).unwrap(), expected);

            let ct_diff = &ct_sum - &ct_b;
            let pt_diff = sk.try_decrypt(&ct_diff).unwrap();
            assert_eq!(pt_diff.try_decode(Encoding::poly()).unwrap(), a);
        }
    }

    #[test]
    fn zero_is_absorbing() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let v = par.plaintext.random_vec(par.degree(), &mut rng);
        let pt = Plaintext::try_encode(&v, Encoding::poly(), &par).unwrap();
        let ct = sk.try_encrypt(&pt, &mut rng).unwrap();

        let mut sum = Ciphertext::zero(&par);
        sum += &ct;
        assert_eq!(sum, ct);
    }
}
