//! Collective key switching to a known public key.

use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, PublicKey, SecretKey};
use crate::mbfv::{sample_smudging_error, Aggregate};
use crate::{Error, Result};

/// A party's share of a collective public key switch: re-encrypts a
/// ciphertext under a known output public key, so its holder can
/// decrypt alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeySwitchShare {
    pub(crate) par: Arc<BfvParameters>,
    /// The first component of the input ciphertext.
    pub(crate) c0: Poly,
    pub(crate) h0_share: Poly,
    pub(crate) h1_share: Poly,
}

impl PublicKeySwitchShare {
    /// Generate a share of the public key switch, with noise drawn
    /// from the base error distribution.
    ///
    /// 1. *Private input*: the party's share of the input secret.
    /// 2. *Public input*: the output public key.
    /// 3. *Public input*: the ciphertext to switch.
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        public_key: &PublicKey,
        ct: &Arc<Ciphertext>,
        rng: &mut R,
    ) -> Result<Self> {
        Self::make(sk_share, public_key, ct, None, rng)
    }

    /// Generate a share of the public key switch with smudging noise
    /// uniform in `[-2^smudging_bits, 2^smudging_bits]`.
    pub fn new_with_smudging<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        public_key: &PublicKey,
        ct: &Arc<Ciphertext>,
        smudging_bits: usize,
        rng: &mut R,
    ) -> Result<Self> {
        Self::make(sk_share, public_key, ct, Some(smudging_bits), rng)
    }

    fn make<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        public_key: &PublicKey,
        ct: &Arc<Ciphertext>,
        smudging_bits: Option<usize>,
        rng: &mut R,
    ) -> Result<Self> {
        if sk_share.par != public_key.par || public_key.par != ct.par {
            return Err(Error::InvalidParameters(
                "the secret share, public key and ciphertext have different parameters"
                    .to_string(),
            ));
        }
        // The output key lives at level 0; the input must match it.
        if ct.level != public_key.c.level {
            return Err(Error::LevelMismatch {
                expected: public_key.c.level,
                found: ct.level,
            });
        }
        let par = sk_share.par.clone();
        let ctx = par.ctx_at_level(ct.level)?;

        let s = sk_share.to_poly(ct.level)?;
        let u = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);
        let (e0, e1) = match smudging_bits {
            Some(bits) => (
                Zeroizing::new(sample_smudging_error(ctx, par.degree(), bits, rng)?),
                Zeroizing::new(sample_smudging_error(ctx, par.degree(), bits, rng)?),
            ),
            None => (
                Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?),
                Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?),
            ),
        };

        // h0_i = u_i * pk0 + s_i * c1 + e0_i
        let mut h0 = public_key.c.c[0].clone();
        h0.disallow_variable_time_computations();
        h0 *= u.as_ref();
        let s_c1 = Zeroizing::new(s.as_ref() * &ct.c[1]);
        h0 += s_c1.as_ref();
        h0 += e0.as_ref();

        // h1_i = u_i * pk1 + e1_i
        let mut h1 = public_key.c.c[1].clone();
        h1.disallow_variable_time_computations();
        h1 *= u.as_ref();
        h1 += e1.as_ref();

        Ok(Self {
            par,
            c0: ct.c[0].clone(),
            h0_share: h0,
            h1_share: h1,
        })
    }
}

impl Aggregate for PublicKeySwitchShare {
    type Output = Ciphertext;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut shares = shares.into_iter();
        let share = shares
            .next()
            .ok_or_else(|| Error::AggregationOrder("no shares to aggregate".to_string()))?;
        let mut h0 = share.h0_share;
        let mut h1 = share.h1_share;
        for sh in shares {
            if sh.par != share.par || sh.c0 != share.c0 {
                return Err(Error::ShapeMismatch(
                    "the shares come from different protocol instances".to_string(),
                ));
            }
            h0 += &sh.h0_share;
            h1 += &sh.h1_share;
        }

        let c0 = &share.c0 + &h0;
        Ciphertext::new(vec![c0, h1], &share.par)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use itertools::Itertools;
    use rand::thread_rng;

    use super::PublicKeySwitchShare;
    use crate::bfv::{BfvParameters, Encoding, Plaintext, PublicKey, SecretKey};
    use crate::mbfv::{AggregateIter, CommonRandomPoly, PublicKeyShare};

    const NUM_PARTIES: usize = 5;

    // Scenario: encrypt under a 5-party collective key, switch to a
    // fresh non-threshold keypair, decrypt with its secret alone.
    #[test]
    fn collective_public_key_switch_roundtrip() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 4096);

        let sk_shares = (0..NUM_PARTIES)
            .map(|_| SecretKey::random(&par, &mut rng))
            .collect_vec();
        let crp = CommonRandomPoly::new(&par, &mut rng).unwrap();
        let pk = sk_shares
            .iter()
            .map(|sk| PublicKeyShare::new(sk, crp.clone(), &mut rng).unwrap())
            .aggregate()
            .unwrap();

        let values = (1..=par.degree() as u64 / 2).collect_vec();
        let pt = Plaintext::try_encode(&values, Encoding::poly(), &par).unwrap();
        let ct = Arc::new(pk.try_encrypt(&pt, &mut rng).unwrap());

        let sk_out = SecretKey::random(&par, &mut rng);
        let pk_out = PublicKey::new(&sk_out, &mut rng);

        let ct2 = sk_shares
            .iter()
            .map(|sk| {
                PublicKeySwitchShare::new_with_smudging(sk, &pk_out, &ct, 30, &mut rng).unwrap()
            })
            .aggregate()
            .unwrap();

        let pt2 = sk_out.try_decrypt(&ct2).unwrap();
        assert_eq!(pt, pt2);
    }

    // The output key lives at level 0, so a ciphertext at a deeper
    // level cannot be switched.
    #[test]
    fn level_mismatch_is_rejected() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let pt = Plaintext::try_encode(&[1], Encoding::poly_at_level(1), &par).unwrap();
        let ct = Arc::new(sk.try_encrypt(&pt, &mut rng).unwrap());

        let sk_out = SecretKey::random(&par, &mut rng);
        let pk_out = PublicKey::new(&sk_out, &mut rng);
        assert_eq!(
            PublicKeySwitchShare::new(&sk, &pk_out, &ct, &mut rng).unwrap_err(),
            crate::Error::LevelMismatch {
                expected: 0,
                found: 1
            }
        );
    }

    #[test]
    fn switch_from_single_keypair() {
        let mut rng = thread_rng();
        for par in [
            BfvParameters::default_arc(1, 16),
            BfvParameters::default_arc(3, 16),
        ] {
            for _ in 0..10 {
                let sk = SecretKey::random(&par, &mut rng);
                let values = par.plaintext.random_vec(par.degree(), &mut rng);
                let pt = Plaintext::try_encode(&values, Encoding::poly(), &par).unwrap();
                let ct = Arc::new(sk.try_encrypt(&pt, &mut rng).unwrap());

                let sk_out = SecretKey::random(&par, &mut rng);
                let pk_out = PublicKey::new(&sk_out, &mut rng);

                let ct2 = [PublicKeySwitchShare::new(&sk, &pk_out, &ct, &mut rng).unwrap()]
                    .into_iter()
                    .aggregate()
                    .unwrap();
                let pt2 = sk_out.try_decrypt(&ct2).unwrap();
                assert_eq!(pt, pt2);
            }
        }
    }
}
