//! Collective public key generation.

use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, PublicKey, SecretKey};
use crate::mbfv::{Aggregate, CommonRandomPoly};
use crate::{Error, Result};

/// A party's share of the collective public key.
///
/// Each party generates its share from its secret key share and the
/// agreed common random polynomial; the aggregation of all shares is a
/// public key under the summed secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyShare {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) crp: CommonRandomPoly,
    pub(crate) p0_share: Poly,
}

impl PublicKeyShare {
    /// Generate a share of the collective public key.
    ///
    /// 1. *Private input*: the party's secret key share.
    /// 2. *Public input*: the common random polynomial.
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> Result<Self> {
        if crp.level != 0 {
            return Err(Error::LevelMismatch {
                expected: 0,
                found: crp.level,
            });
        }
        let par = sk_share.par.clone();
        let ctx = par.ctx_at_level(0)?;

        let e = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);
        let s = sk_share.to_poly(0)?;

        // p0_i = e_i - s_i * crp
        let mut p0_share = -(&crp.poly * s.as_ref());
        p0_share += e.as_ref();

        Ok(Self { par, crp, p0_share })
    }
}

impl Aggregate for PublicKeyShare {
    type Output = PublicKey;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut shares = shares.into_iter();
        let share = shares
            .next()
            .ok_or_else(|| Error::AggregationOrder("no shares to aggregate".to_string()))?;
        let mut p0 = share.p0_share;
        for sh in shares {
            if sh.par != share.par || sh.crp != share.crp {
                return Err(Error::ShapeMismatch(
                    "the shares come from different protocol instances".to_string(),
                ));
            }
            p0 += &sh.p0_share;
        }

        let c = Ciphertext::new(vec![p0, share.crp.poly], &share.par)?;
        Ok(PublicKey { par: share.par, c })
    }
}

#[cfg(test)]
mod tests {
    use super::PublicKeyShare;
    use crate::bfv::{BfvParameters, Encoding, Plaintext, SecretKey};
    use crate::mbfv::{Aggregate, AggregateIter, CommonRandomPoly, KeyedPrng};
    use itertools::Itertools;
    use rand::thread_rng;

    const NUM_PARTIES: usize = 5;

    // Scenario: 5 parties, logN = 12, a minimal modulus chain, and the
    // CRP drawn from the seed "test". Encrypt [1, 2, ..., N/2] under
    // the collective key and decrypt under the summed secret.
    #[test]
    fn collective_keygen_roundtrip() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 4096);

        let mut prng = KeyedPrng::new();
        prng.seed(&[0x74, 0x65, 0x73, 0x74]);
        let crp = CommonRandomPoly::new(&par, &mut prng).unwrap();

        let sk_shares = (0..NUM_PARTIES)
            .map(|_| SecretKey::random(&par, &mut rng))
            .collect_vec();
        let pk = sk_shares
            .iter()
            .map(|sk| PublicKeyShare::new(sk, crp.clone(), &mut rng).unwrap())
            .aggregate()
            .unwrap();

        let values = (1..=par.degree() as u64 / 2).collect_vec();
        let pt = Plaintext::try_encode(&values, Encoding::poly(), &par).unwrap();
        let ct = pk.try_encrypt(&pt, &mut rng).unwrap();

        // The collective secret is the sum of the shares.
        let mut sk_coeffs = vec![0i64; par.degree()];
        for sk in &sk_shares {
            for (c, s) in sk_coeffs.iter_mut().zip(sk.coeffs.iter()) {
                *c += s;
            }
        }
        let sk = SecretKey::new(sk_coeffs, &par);

        let pt2 = sk.try_decrypt(&ct).unwrap();
        let mut expected = values;
        par.plaintext.reduce_vec(&mut expected);
        let decoded = pt2.try_decode(Encoding::poly()).unwrap();
        assert_eq!(&decoded[..expected.len()], &expected[..]);
        assert!(decoded[expected.len()..].iter().all(|vi| *vi == 0));
    }

    // Permuting the order in which shares are summed yields a
    // bit-identical aggregate.
    #[test]
    fn aggregation_is_commutative() {
        let mut rng = thread_rng();
        for par in [
            BfvParameters::default_arc(1, 16),
            BfvParameters::default_arc(3, 16),
        ] {
            let crp = CommonRandomPoly::new(&par, &mut rng).unwrap();
            let shares = (0..NUM_PARTIES)
                .map(|_| {
                    let sk = SecretKey::random(&par, &mut rng);
                    PublicKeyShare::new(&sk, crp.clone(), &mut rng).unwrap()
                })
                .collect_vec();

            let forward = PublicKeyShare::aggregate(shares.clone()).unwrap();
            let backward = PublicKeyShare::aggregate(shares.into_iter().rev()).unwrap();
            assert_eq!(forward, backward);
        }
    }

    #[test]
    fn empty_aggregation_fails() {
        assert!(PublicKeyShare::aggregate(std::iter::empty()).is_err());
    }

    #[test]
    fn mismatched_crps_fail() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 16);
        let crp1 = CommonRandomPoly::new(&par, &mut rng).unwrap();
        let crp2 = CommonRandomPoly::new(&par, &mut rng).unwrap();
        let sk1 = SecretKey::random(&par, &mut rng);
        let sk2 = SecretKey::random(&par, &mut rng);
        let sh1 = PublicKeyShare::new(&sk1, crp1, &mut rng).unwrap();
        let sh2 = PublicKeyShare::new(&sk2, crp2, &mut rng).unwrap();
        assert!(PublicKeyShare::aggregate([sh1, sh2]).is_err());
    }
}
