//! Collective key switching to another shared secret, and its
//! specialization to collective decryption.

use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Poly, Representation};
use itertools::izip;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, Plaintext, SecretKey};
use crate::mbfv::{sample_smudging_error, Aggregate};
use crate::{Error, Result};

/// A party's share of a collective key switch: re-encrypts a
/// ciphertext under a second shared secret without decrypting it.
///
/// The share is `(s_in_i - s_out_i) * c1 + e_i` at the ciphertext's
/// level; the noise `e_i` hides the party's contribution and should be
/// smudging-sized when the switched ciphertext is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeySwitchShare {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) ct: Arc<Ciphertext>,
    pub(crate) h_share: Poly,
}

impl SecretKeySwitchShare {
    /// Generate a share of the key switch, with noise drawn from the
    /// base error distribution.
    ///
    /// 1. *Private input*: the party's share of the input secret.
    /// 2. *Private input*: the party's share of the output secret.
    /// 3. *Public input*: the ciphertext to switch.
    pub fn new<R: RngCore + CryptoRng>(
        sk_in_share: &SecretKey,
        sk_out_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        rng: &mut R,
    ) -> Result<Self> {
        Self::make(sk_in_share, sk_out_share, ct, None, rng)
    }

    /// Generate a share of the key switch with smudging noise uniform
    /// in `[-2^smudging_bits, 2^smudging_bits]`.
    pub fn new_with_smudging<R: RngCore + CryptoRng>(
        sk_in_share: &SecretKey,
        sk_out_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        smudging_bits: usize,
        rng: &mut R,
    ) -> Result<Self> {
        Self::make(sk_in_share, sk_out_share, ct, Some(smudging_bits), rng)
    }

    fn make<R: RngCore + CryptoRng>(
        sk_in_share: &SecretKey,
        sk_out_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        smudging_bits: Option<usize>,
        rng: &mut R,
    ) -> Result<Self> {
        if sk_in_share.par != sk_out_share.par || sk_in_share.par != ct.par {
            return Err(Error::InvalidParameters(
                "the secret shares and the ciphertext have different parameters".to_string(),
            ));
        }
        let par = sk_in_share.par.clone();
        let ctx = par.ctx_at_level(ct.level)?;

        // delta_i = s_in_i - s_out_i
        let mut delta = Zeroizing::new(vec![0i64; par.degree()]);
        izip!(
            delta.iter_mut(),
            sk_in_share.coeffs.iter(),
            sk_out_share.coeffs.iter()
        )
        .for_each(|(d, a, b)| *d = *a - *b);
        let mut delta_poly = Zeroizing::new(Poly::try_convert_from(
            delta.as_slice(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        delta_poly.change_representation(Representation::Ntt);
        delta_poly.disallow_variable_time_computations();

        // h_i = delta_i * c1 + e_i
        let mut h = delta_poly.as_ref() * &ct.c[1];
        let e = match smudging_bits {
            Some(bits) => Zeroizing::new(sample_smudging_error(ctx, par.degree(), bits, rng)?),
            None => Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?),
        };
        h += e.as_ref();

        Ok(Self {
            par,
            ct: ct.clone(),
            h_share: h,
        })
    }
}

impl Aggregate for SecretKeySwitchShare {
    type Output = Ciphertext;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut shares = shares.into_iter();
        let share = shares
            .next()
            .ok_or_else(|| Error::AggregationOrder("no shares to aggregate".to_string()))?;
        let mut h = share.h_share;
        for sh in shares {
            if sh.par != share.par || sh.ct != share.ct {
                return Err(Error::ShapeMismatch(
                    "the shares come from different protocol instances".to_string(),
                ));
            }
            h += &sh.h_share;
        }

        let c0 = &share.ct.c[0] + &h;
        let c1 = share.ct.c[1].clone();
        Ciphertext::new(vec![c0, c1], &share.par)
    }
}

/// A party's share of a collective decryption: a key switch whose
/// output secret is zero. The aggregation of all shares recovers the
/// plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionShare {
    pub(crate) ss: SecretKeySwitchShare,
}

impl DecryptionShare {
    /// Generate a decryption share, with noise drawn from the base
    /// error distribution.
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        rng: &mut R,
    ) -> Result<Self> {
        let zero = SecretKey::new(vec![0i64; sk_share.par.degree()], &sk_share.par);
        Ok(Self {
            ss: SecretKeySwitchShare::new(sk_share, &zero, ct, rng)?,
        })
    }

    /// Generate a decryption share with smudging noise uniform in
    /// `[-2^smudging_bits, 2^smudging_bits]`.
    pub fn new_with_smudging<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        smudging_bits: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let zero = SecretKey::new(vec![0i64; sk_share.par.degree()], &sk_share.par);
        Ok(Self {
            ss: SecretKeySwitchShare::new_with_smudging(sk_share, &zero, ct, smudging_bits, rng)?,
        })
    }
}

impl Aggregate for DecryptionShare {
    type Output = Plaintext;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        // Switching to the zero key leaves c0 + sum(h_i) = Delta * m + e.
        let ct = SecretKeySwitchShare::aggregate(shares.into_iter().map(|sh| sh.ss))?;
        let c = Zeroizing::new(ct.c[0].clone());
        Plaintext::try_from_carrier(c, &ct.par, ct.level)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use itertools::Itertools;
    use rand::thread_rng;

    use super::{DecryptionShare, SecretKeySwitchShare};
    use crate::bfv::{BfvParameters, Encoding, Plaintext, SecretKey};
    use crate::mbfv::{AggregateIter, CommonRandomPoly, PublicKeyShare};

    const NUM_PARTIES: usize = 5;

    struct Party {
        sk_in: SecretKey,
        sk_out: SecretKey,
    }

    fn gen_parties(par: &Arc<BfvParameters>, n: usize) -> Vec<Party> {
        let mut rng = thread_rng();
        (0..n)
            .map(|_| Party {
                sk_in: SecretKey::random(par, &mut rng),
                sk_out: SecretKey::random(par, &mut rng),
            })
            .collect()
    }

    fn sum_secrets<'a>(
        keys: impl Iterator<Item = &'a SecretKey>,
        par: &Arc<BfvParameters>,
    ) -> SecretKey {
        let mut coeffs = vec![0i64; par.degree()];
        for sk in keys {
            for (c, s) in coeffs.iter_mut().zip(sk.coeffs.iter()) {
                *c += s;
            }
        }
        SecretKey::new(coeffs, par)
    }

    // Scenario: encrypt under a 5-party collective key, switch to a
    // second shared secret, decrypt under the second summed secret.
    #[test]
    fn collective_key_switch_roundtrip() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 4096);
        let parties = gen_parties(&par, NUM_PARTIES);

        let crp = CommonRandomPoly::new(&par, &mut rng).unwrap();
        let pk = parties
            .iter()
            .map(|p| PublicKeyShare::new(&p.sk_in, crp.clone(), &mut rng).unwrap())
            .aggregate()
            .unwrap();

        let values = (1..=par.degree() as u64 / 2).collect_vec();
        let pt = Plaintext::try_encode(&values, Encoding::poly(), &par).unwrap();
        let ct = Arc::new(pk.try_encrypt(&pt, &mut rng).unwrap());

        let ct2 = parties
            .iter()
            .map(|p| {
                SecretKeySwitchShare::new_with_smudging(&p.sk_in, &p.sk_out, &ct, 30, &mut rng)
                    .unwrap()
            })
            .aggregate()
            .unwrap();

        let sk_out = sum_secrets(parties.iter().map(|p| &p.sk_out), &par);
        let pt2 = sk_out.try_decrypt(&ct2).unwrap();
        assert_eq!(pt, pt2);
    }

    // With s_in_i = s_out_i for every party, the switch must preserve
    // the ciphertext up to the added smudging noise.
    #[test]
    fn null_switch_is_idempotent() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(1, 16);
        let parties = gen_parties(&par, NUM_PARTIES);

        let sk = sum_secrets(parties.iter().map(|p| &p.sk_in), &par);
        let values = par.plaintext.random_vec(par.degree(), &mut rng);
        let pt = Plaintext::try_encode(&values, Encoding::poly(), &par).unwrap();
        let ct = Arc::new(sk.try_encrypt(&pt, &mut rng).unwrap());

        let ct2 = parties
            .iter()
            .map(|p| {
                SecretKeySwitchShare::new_with_smudging(&p.sk_in, &p.sk_in, &ct, 20, &mut rng)
                    .unwrap()
            })
            .aggregate()
            .unwrap();

        // c1 is untouched, c0 changed only by the smudging noise.
        assert_eq!(ct2.c[1], ct.c[1]);
        let noise = unsafe { sk.measure_noise(&ct2).unwrap() };
        assert!(noise <= 20 + (NUM_PARTIES as f64).log2().ceil() as usize + 1);
        assert_eq!(sk.try_decrypt(&ct2).unwrap(), pt);
    }

    #[test]
    fn collective_decryption() {
        let mut rng = thread_rng();
        for par in [
            BfvParameters::default_arc(1, 16),
            BfvParameters::default_arc(3, 16),
        ] {
            let parties = gen_parties(&par, NUM_PARTIES);
            let sk = sum_secrets(parties.iter().map(|p| &p.sk_in), &par);

            let values = par.plaintext.random_vec(par.degree(), &mut rng);
            let pt = Plaintext::try_encode(&values, Encoding::poly(), &par).unwrap();
            let ct = Arc::new(sk.try_encrypt(&pt, &mut rng).unwrap());

            let pt2: Plaintext = parties
                .iter()
                .map(|p| DecryptionShare::new(&p.sk_in, &ct, &mut rng).unwrap())
                .aggregate()
                .unwrap();
            assert_eq!(pt2.try_decode(Encoding::poly()).unwrap(), values);
        }
    }
}
