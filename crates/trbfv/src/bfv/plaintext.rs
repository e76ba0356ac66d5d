//! Plaintexts and their lifting into the ciphertext ring.

use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Poly, Representation};
use fhe_math::zq::Modulus;
use itertools::Itertools;
use zeroize::{Zeroize, Zeroizing};

use crate::bfv::{BfvParameters, Encoding, EncodingEnum};
use crate::{Error, Result};

/// A plaintext: a vector of coefficients modulo the plaintext modulus.
#[derive(Debug, Clone)]
pub struct Plaintext {
    pub(crate) par: Arc<BfvParameters>,
    /// The coefficients of the plaintext polynomial.
    pub(crate) value: Box<[u64]>,
    /// The encoding that produced the coefficients, when known.
    pub(crate) encoding: Option<Encoding>,
    /// The level of this plaintext.
    pub(crate) level: usize,
}

impl Plaintext {
    /// Encode a vector of values into a plaintext.
    ///
    /// Missing values are padded with zeros; encoding more values than
    /// the degree fails with `ShapeMismatch`.
    pub fn try_encode(value: &[u64], encoding: Encoding, par: &Arc<BfvParameters>) -> Result<Self> {
        if value.len() > par.degree() {
            return Err(Error::ShapeMismatch(format!(
                "cannot encode {} values into {} coefficients",
                value.len(),
                par.degree()
            )));
        }
        let level = encoding.level;
        par.ctx_at_level(level)?;

        let mut v = vec![0u64; par.degree()];
        v[..value.len()].copy_from_slice(value);
        par.plaintext.reduce_vec(&mut v);

        if encoding.encoding == EncodingEnum::Simd {
            let (op, map) = par.simd_support().ok_or_else(|| {
                Error::InvalidParameters(
                    "the plaintext modulus does not support the SIMD encoding".to_string(),
                )
            })?;
            let mut w = vec![0u64; par.degree()];
            for (i, vi) in v.iter().enumerate() {
                w[map[i]] = *vi;
            }
            op.backward(&mut w);
            v.zeroize();
            v = w;
        }

        Ok(Self {
            par: par.clone(),
            value: v.into_boxed_slice(),
            encoding: Some(encoding),
            level,
        })
    }

    /// Decode the plaintext under the given encoding.
    pub fn try_decode(&self, encoding: Encoding) -> Result<Vec<u64>> {
        if encoding.level != self.level {
            return Err(Error::LevelMismatch {
                expected: self.level,
                found: encoding.level,
            });
        }
        match encoding.encoding {
            EncodingEnum::Poly => Ok(self.value.to_vec()),
            EncodingEnum::Simd => {
                let (op, map) = self.par.simd_support().ok_or_else(|| {
                    Error::InvalidParameters(
                        "the plaintext modulus does not support the SIMD encoding".to_string(),
                    )
                })?;
                let mut w = self.value.to_vec();
                op.forward(&mut w);
                let v = (0..self.par.degree()).map(|i| w[map[i]]).collect_vec();
                Ok(v)
            }
        }
    }

    /// Lift the plaintext into R_Q, scaled for encryption: the result
    /// is `[value * (Q mod t)]_t * (-t)^-1 mod Q`, in the NTT domain.
    pub(crate) fn to_poly(&self) -> Result<Poly> {
        let ctx = self.par.ctx_at_level(self.level)?;
        let mut m_v = Zeroizing::new(self.value.to_vec());
        self.par
            .plaintext
            .scalar_mul_vec(&mut m_v, self.par.q_mod_t[self.level]);
        let mut m = Poly::try_convert_from(
            m_v.as_slice(),
            ctx,
            false,
            Representation::PowerBasis,
        )?;
        m.change_representation(Representation::Ntt);
        let m = &self.par.delta[self.level] * &m;
        Ok(m)
    }

    /// Round a noisy carrier polynomial `Delta * m + e` (NTT domain)
    /// down to the plaintext it encodes.
    pub(crate) fn try_from_carrier(
        mut c: Zeroizing<Poly>,
        par: &Arc<BfvParameters>,
        level: usize,
    ) -> Result<Self> {
        c.change_representation(Representation::PowerBasis);
        let d = Zeroizing::new(c.scale(&par.scalers[level])?);

        // The rescaled coefficients are small signed values; center
        // them by adding t before reducing modulo q_0, then modulo t.
        let v = Zeroizing::new(
            Vec::<u64>::from(d.as_ref())
                .iter()
                .map(|vi| *vi + *par.plaintext)
                .collect_vec(),
        );
        let mut w = v[..par.degree()].to_vec();
        let q = Modulus::new(par.moduli[0])?;
        q.reduce_vec(&mut w);
        par.plaintext.reduce_vec(&mut w);

        Ok(Self {
            par: par.clone(),
            value: w.into_boxed_slice(),
            encoding: None,
            level,
        })
    }
}

impl PartialEq for Plaintext {
    fn eq(&self, other: &Self) -> bool {
        self.par == other.par && self.value == other.value && self.level == other.level
    }
}

impl Eq for Plaintext {}

impl Zeroize for Plaintext {
    fn zeroize(&mut self) {
        self.value.zeroize();
    }
}
