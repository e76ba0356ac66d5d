//! Collective bootstrapping: refresh a ciphertext's noise and,
//! optionally, apply a masked transform to the hidden plaintext.
//!
//! The protocol composes two primitives over a per-party mask uniform
//! in the plaintext ring: encryption-to-share (a key switch toward
//! zero, minus the lifted mask) and share-to-encryption (a key switch
//! from zero under a fresh common random `c1`, plus the lifted mask).
//! Between the two, each party may apply the same additive transform
//! to its mask; the aggregation then yields an encryption of the
//! transformed plaintext with fresh noise.

use std::fmt;
use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use fhe_math::zq::Modulus;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext, SecretKey};
use crate::mbfv::{sample_smudging_error, Aggregate, CommonRandomPoly};
use crate::{Error, Result};

#[derive(Clone)]
enum TransformKind {
    /// out[i] = in[perm[i]].
    Permutation(Box<[usize]>),
    /// An arbitrary map, declared additive by the caller.
    Map(Arc<dyn Fn(&[u64], &Modulus) -> Vec<u64> + Send + Sync>),
}

/// A transform applied to the masked plaintext during a refresh.
///
/// Every party applies the transform to its own mask, and the
/// finalization applies it to the aggregated masked plaintext; the
/// results recombine into the transformed message only when the map
/// is additive over `Z_t^N`. Construction therefore accepts slot
/// permutations and caller-declared additive maps only.
///
/// The `decode`/`encode` flags select whether the map operates on
/// decoded SIMD slots (the mask is decoded before and re-encoded
/// after the call) or on raw ring coefficients.
#[derive(Clone)]
pub struct MaskedTransform {
    kind: TransformKind,
    decode: bool,
    encode: bool,
}

impl fmt::Debug for MaskedTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskedTransform")
            .field("decode", &self.decode)
            .field("encode", &self.encode)
            .finish_non_exhaustive()
    }
}

impl MaskedTransform {
    /// A permutation of the SIMD slots of the plaintext.
    pub fn slot_permutation(perm: &[usize]) -> Result<Self> {
        Self::validate_permutation(perm)?;
        Ok(Self {
            kind: TransformKind::Permutation(perm.to_vec().into_boxed_slice()),
            decode: true,
            encode: true,
        })
    }

    /// A permutation of the raw coefficients of the plaintext.
    pub fn coefficient_permutation(perm: &[usize]) -> Result<Self> {
        Self::validate_permutation(perm)?;
        Ok(Self {
            kind: TransformKind::Permutation(perm.to_vec().into_boxed_slice()),
            decode: false,
            encode: false,
        })
    }

    /// An arbitrary map over the plaintext values.
    ///
    /// `linear` is the caller's declaration that the map is additive
    /// over `Z_t^N`; a map declared nonlinear is rejected, since the
    /// aggregation identity does not hold for it.
    pub fn map<F>(f: F, linear: bool, decode: bool, encode: bool) -> Result<Self>
    where
        F: Fn(&[u64], &Modulus) -> Vec<u64> + Send + Sync + 'static,
    {
        if !linear {
            return Err(Error::UnsupportedTransform(
                "the masked transform must be additive over the plaintext ring".to_string(),
            ));
        }
        Ok(Self {
            kind: TransformKind::Map(Arc::new(f)),
            decode,
            encode,
        })
    }

    fn validate_permutation(perm: &[usize]) -> Result<()> {
        let mut seen = vec![false; perm.len()];
        for &i in perm {
            if i >= perm.len() || seen[i] {
                return Err(Error::UnsupportedTransform(
                    "the indices do not form a permutation".to_string(),
                ));
            }
            seen[i] = true;
        }
        Ok(())
    }

    /// Apply the raw map to a vector of plaintext values.
    fn apply(&self, v: &[u64], t: &Modulus) -> Result<Vec<u64>> {
        match &self.kind {
            TransformKind::Permutation(perm) => {
                if perm.len() != v.len() {
                    return Err(Error::ShapeMismatch(format!(
                        "the permutation has {} indices, the plaintext {} values",
                        perm.len(),
                        v.len()
                    )));
                }
                Ok(perm.iter().map(|&i| v[i]).collect())
            }
            TransformKind::Map(f) => {
                let mut out = f(v, t);
                if out.len() != v.len() {
                    return Err(Error::ShapeMismatch(format!(
                        "the transform returned {} values, expected {}",
                        out.len(),
                        v.len()
                    )));
                }
                t.reduce_vec(&mut out);
                Ok(out)
            }
        }
    }

    /// Apply the transform to a mask, honoring the decode/encode
    /// flags.
    fn apply_to_mask(
        &self,
        v: Vec<u64>,
        par: &Arc<BfvParameters>,
        level: usize,
    ) -> Result<Vec<u64>> {
        let mut w = v;
        if self.decode {
            let pt = Plaintext {
                par: par.clone(),
                value: w.into_boxed_slice(),
                encoding: None,
                level,
            };
            w = pt.try_decode(Encoding::simd_at_level(level))?;
        }
        let mut w = self.apply(&w, &par.plaintext)?;
        par.plaintext.reduce_vec(&mut w);
        if self.encode {
            let pt = Plaintext::try_encode(&w, Encoding::simd_at_level(level), par)?;
            w = pt.value.to_vec();
        }
        Ok(w)
    }
}

/// A party's share of a collective refresh.
///
/// It pairs the encryption-to-share sub-share `h_dec` with the
/// share-to-encryption sub-share `h_enc`, both built over the same
/// local mask. All parties of one protocol instance must supply the
/// same transform; the shares do not carry enough information to
/// verify this.
#[derive(Clone)]
pub struct RefreshShare {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) ct: Arc<Ciphertext>,
    pub(crate) crp: CommonRandomPoly,
    pub(crate) out_par: Arc<BfvParameters>,
    pub(crate) transform: Option<MaskedTransform>,
    pub(crate) h_dec: Poly,
    pub(crate) h_enc: Poly,
}

impl RefreshShare {
    /// Generate a refresh share, re-encrypting under the same
    /// parameters.
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> Result<Self> {
        let out_par = ct.par.clone();
        Self::new_switching(sk_share, ct, crp, &out_par, None, None, rng)
    }

    /// Generate a refresh share applying a masked transform to the
    /// plaintext.
    pub fn new_with_transform<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        crp: CommonRandomPoly,
        transform: MaskedTransform,
        rng: &mut R,
    ) -> Result<Self> {
        let out_par = ct.par.clone();
        Self::new_switching(sk_share, ct, crp, &out_par, Some(transform), None, rng)
    }

    /// Generate a refresh share re-encrypting into the (possibly
    /// different) output parameter set the common random polynomial
    /// was drawn from.
    ///
    /// 1. *Private input*: the party's secret key share, valid in both
    ///    rings.
    /// 2. *Public input*: the ciphertext to refresh.
    /// 3. *Public input*: a fresh common random polynomial over the
    ///    output parameters.
    pub fn new_switching<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        crp: CommonRandomPoly,
        out_par: &Arc<BfvParameters>,
        transform: Option<MaskedTransform>,
        smudging_bits: Option<usize>,
        rng: &mut R,
    ) -> Result<Self> {
        if sk_share.par != ct.par {
            return Err(Error::InvalidParameters(
                "the secret share and the ciphertext have different parameters".to_string(),
            ));
        }
        let par = sk_share.par.clone();
        if out_par.degree() != par.degree() {
            return Err(Error::ShapeMismatch(
                "the input and output rings have different degrees".to_string(),
            ));
        }
        if out_par.plaintext != par.plaintext {
            return Err(Error::InvalidParameters(
                "the input and output plaintext moduli differ".to_string(),
            ));
        }
        let ctx_in = par.ctx_at_level(ct.level)?;
        let ctx_out = out_par.ctx_at_level(crp.level)?;
        if crp.poly.ctx() != ctx_out {
            return Err(Error::InvalidParameters(
                "the common random polynomial does not belong to the output parameters"
                    .to_string(),
            ));
        }

        // The local mask, uniform in R_t.
        let mask = Zeroizing::new(par.plaintext.random_vec(par.degree(), rng));

        // Encryption-to-share: h_dec = s * c1 + e - lift(mask).
        let s_in = sk_share.to_poly(ct.level)?;
        let mut h_dec = s_in.as_ref() * &ct.c[1];
        let e_dec = match smudging_bits {
            Some(bits) => Zeroizing::new(sample_smudging_error(ctx_in, par.degree(), bits, rng)?),
            None => Zeroizing::new(Poly::small(ctx_in, Representation::Ntt, par.variance, rng)?),
        };
        h_dec += e_dec.as_ref();
        let mask_pt = Plaintext::try_encode(mask.as_slice(), Encoding::poly_at_level(ct.level), &par)?;
        let m_lift = Zeroizing::new(mask_pt.to_poly()?);
        h_dec -= m_lift.as_ref();

        // The transformed mask re-enters on the encryption side.
        let mask_out = match &transform {
            Some(t) => Zeroizing::new(t.apply_to_mask(mask.to_vec(), out_par, crp.level)?),
            None => Zeroizing::new(mask.to_vec()),
        };

        // Share-to-encryption: h_enc = -s * crp + e + lift(mask).
        let s_out = sk_share.poly_in_ctx(ctx_out)?;
        let mut h_enc = -(s_out.as_ref() * &crp.poly);
        let e_enc = Zeroizing::new(Poly::small(
            ctx_out,
            Representation::Ntt,
            out_par.variance,
            rng,
        )?);
        h_enc += e_enc.as_ref();
        let mask_pt_out = Plaintext::try_encode(
            mask_out.as_slice(),
            Encoding::poly_at_level(crp.level),
            out_par,
        )?;
        let m_lift_out = Zeroizing::new(mask_pt_out.to_poly()?);
        h_enc += m_lift_out.as_ref();

        Ok(Self {
            par,
            ct: ct.clone(),
            crp,
            out_par: out_par.clone(),
            transform,
            h_dec,
            h_enc,
        })
    }
}

impl Aggregate for RefreshShare {
    type Output = Ciphertext;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut shares = shares.into_iter();
        let share = shares
            .next()
            .ok_or_else(|| Error::AggregationOrder("no shares to aggregate".to_string()))?;
        let mut h_dec = share.h_dec;
        let mut h_enc = share.h_enc;
        for sh in shares {
            if sh.par != share.par
                || sh.ct != share.ct
                || sh.crp != share.crp
                || sh.out_par != share.out_par
            {
                return Err(Error::ShapeMismatch(
                    "the shares come from different protocol instances".to_string(),
                ));
            }
            h_dec += &sh.h_dec;
            h_enc += &sh.h_enc;
        }

        // Encryption-to-share finalization: the masked plaintext.
        let c = Zeroizing::new(&share.ct.c[0] + &h_dec);
        let masked = Plaintext::try_from_carrier(c, &share.par, share.ct.level)?;
        let mut v = masked.value.to_vec();
        if let Some(t) = &share.transform {
            v = t.apply_to_mask(v, &share.out_par, share.crp.level)?;
        }

        // Share-to-encryption finalization: lift the transformed
        // masked plaintext back in and attach the fresh c1.
        let pt = Plaintext::try_encode(&v, Encoding::poly_at_level(share.crp.level), &share.out_par)?;
        let m = Zeroizing::new(pt.to_poly()?);
        let mut c0 = h_enc;
        c0 += m.as_ref();
        Ciphertext::new(vec![c0, share.crp.poly.clone()], &share.out_par)
    }
}
