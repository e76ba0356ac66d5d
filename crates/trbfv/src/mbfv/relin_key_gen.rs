//! Collective relinearization key generation.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use fhe_math::rns::RnsContext;
use fhe_math::rq::{Poly, Representation};
use itertools::izip;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, KeySwitchingKey, RelinearizationKey, SecretKey};
use crate::mbfv::{Aggregate, CommonRandomPoly};
use crate::{Error, Result};

/// A round of the relinearization key generation protocol.
pub trait Round: sealed::Sealed {}

/// Marks the shares produced in round one.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct R1;
/// Marks the aggregated shares of round one.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct R1Aggregated;
/// Marks the shares produced in round two.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct R2;
/// Marks the aggregated shares of round two.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct R2Aggregated;
/// Marks the shares produced in round three.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct R3;

impl Round for R1 {}
impl Round for R1Aggregated {}
impl Round for R2 {}
impl Round for R2Aggregated {}
impl Round for R3 {}

/// The publicly disclosed shares of one round of the protocol, one
/// entry per RNS digit.
///
/// Rounds one and three broadcast a single polynomial per digit,
/// carried in `h0`; round two broadcasts pairs, so `h1` is populated
/// in round two (and its aggregate) only. Round-three shares carry
/// the round-two aggregate, which finalization consumes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RelinKeyShare<R: Round = R1> {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) h0: Box<[Poly]>,
    pub(crate) h1: Box<[Poly]>,
    prev: Option<Box<RelinKeyShare<R2Aggregated>>>,
    _phantom_data: PhantomData<R>,
}

/// Each party uses a `RelinKeyGenerator` to produce its shares of the
/// three protocol rounds.
///
/// The ephemeral key `u` is sampled at construction, must stay with
/// the party across all three rounds, and is wiped when the generator
/// is dropped. Rounds are strictly ordered 1 -> 2 -> 3: the round `k`
/// share is generated from the round `k - 1` aggregate, and a round
/// counter rejects out-of-order calls.
#[derive(Debug)]
pub struct RelinKeyGenerator<'a, 'b> {
    sk_share: &'a SecretKey,
    crp: &'b [CommonRandomPoly],
    u: Zeroizing<Poly>,
    round: Cell<u8>,
}

impl<'a, 'b> RelinKeyGenerator<'a, 'b> {
    /// Create a new relinearization key generator for a given party.
    ///
    /// 1. *Private input*: the party's secret key share.
    /// 2. *Public input*: the common random polynomial vector, one
    ///    polynomial per RNS digit.
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &'a SecretKey,
        crp: &'b [CommonRandomPoly],
        rng: &mut R,
    ) -> Result<Self> {
        let par = &sk_share.par;
        if crp.len() != par.moduli().len() {
            return Err(Error::ShapeMismatch(format!(
                "expected {} common random polynomials, found {}",
                par.moduli().len(),
                crp.len()
            )));
        }
        let ctx = par.ctx_at_level(0)?;
        let u = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);
        Ok(Self {
            sk_share,
            crp,
            u,
            round: Cell::new(0),
        })
    }

    /// Generate this party's shares for round one.
    pub fn round_1<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<RelinKeyShare<R1>> {
        if self.round.get() != 0 {
            return Err(Error::AggregationOrder(
                "round one was already played".to_string(),
            ));
        }
        let share = RelinKeyShare::<R1>::new(self.sk_share, self.crp, &self.u, rng)?;
        self.round.set(1);
        Ok(share)
    }

    /// Generate this party's shares for round two from the round-one
    /// aggregate.
    pub fn round_2<R: RngCore + CryptoRng>(
        &self,
        r1: &RelinKeyShare<R1Aggregated>,
        rng: &mut R,
    ) -> Result<RelinKeyShare<R2>> {
        if self.round.get() != 1 {
            return Err(Error::AggregationOrder(
                "round two requires the round-one aggregate".to_string(),
            ));
        }
        let share = RelinKeyShare::<R2>::new(self.sk_share, self.crp, r1, rng)?;
        self.round.set(2);
        Ok(share)
    }

    /// Generate this party's shares for round three from the round-two
    /// aggregate.
    pub fn round_3<R: RngCore + CryptoRng>(
        &self,
        r2: &RelinKeyShare<R2Aggregated>,
        rng: &mut R,
    ) -> Result<RelinKeyShare<R3>> {
        if self.round.get() != 2 {
            return Err(Error::AggregationOrder(
                "round three requires the round-two aggregate".to_string(),
            ));
        }
        let share = RelinKeyShare::<R3>::new(self.sk_share, &self.u, r2, rng)?;
        self.round.set(3);
        Ok(share)
    }
}

impl RelinKeyShare<R1> {
    /// h_i = g_i * s - u * a_i + e_i, with g_i the garner weight of
    /// digit i.
    fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        crp: &[CommonRandomPoly],
        u: &Zeroizing<Poly>,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.par.clone();
        let ctx = par.ctx_at_level(0)?;
        let s = sk_share.to_poly(0)?;
        let rns = RnsContext::new(&par.moduli[..crp.len()])?;

        let h0 = crp
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let w = rns.get_garner(i).unwrap();
                let w_s = Zeroizing::new(w * s.as_ref());
                let e = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);

                let mut h = -(&a.poly * u.as_ref());
                h += w_s.as_ref();
                h += e.as_ref();
                Ok(h)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            par,
            h0: h0.into_boxed_slice(),
            h1: Box::default(),
            prev: None,
            _phantom_data: PhantomData,
        })
    }
}

impl Aggregate for RelinKeyShare<R1> {
    type Output = RelinKeyShare<R1Aggregated>;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut shares = shares.into_iter();
        let share = shares
            .next()
            .ok_or_else(|| Error::AggregationOrder("no shares to aggregate".to_string()))?;
        let mut h0 = share.h0;
        for sh in shares {
            if sh.par != share.par || sh.h0.len() != h0.len() {
                return Err(Error::ShapeMismatch(
                    "the shares come from different protocol instances".to_string(),
                ));
            }
            izip!(h0.iter_mut(), sh.h0.iter()).for_each(|(a, b)| *a += b);
        }
        Ok(RelinKeyShare {
            par: share.par,
            h0,
            h1: Box::default(),
            prev: None,
            _phantom_data: PhantomData,
        })
    }
}

impl RelinKeyShare<R2> {
    /// Per digit i: h0_i = s * agg1_i + e0_i and h1_i = s * a_i + e1_i.
    fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        crp: &[CommonRandomPoly],
        r1: &RelinKeyShare<R1Aggregated>,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.par.clone();
        let ctx = par.ctx_at_level(0)?;
        if r1.h0.len() != crp.len() {
            return Err(Error::ShapeMismatch(format!(
                "the round-one aggregate has {} digits, expected {}",
                r1.h0.len(),
                crp.len()
            )));
        }
        let s = sk_share.to_poly(0)?;

        let mut h0 = Vec::with_capacity(crp.len());
        let mut h1 = Vec::with_capacity(crp.len());
        for (agg1, a) in izip!(r1.h0.iter(), crp.iter()) {
            let e0 = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);
            let mut v0 = agg1 * s.as_ref();
            v0 += e0.as_ref();
            h0.push(v0);

            let e1 = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);
            let mut v1 = &a.poly * s.as_ref();
            v1 += e1.as_ref();
            h1.push(v1);
        }

        Ok(Self {
            par,
            h0: h0.into_boxed_slice(),
            h1: h1.into_boxed_slice(),
            prev: None,
            _phantom_data: PhantomData,
        })
    }
}

impl Aggregate for RelinKeyShare<R2> {
    type Output = RelinKeyShare<R2Aggregated>;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut shares = shares.into_iter();
        let share = shares
            .next()
            .ok_or_else(|| Error::AggregationOrder("no shares to aggregate".to_string()))?;
        let mut h0 = share.h0;
        let mut h1 = share.h1;
        for sh in shares {
            if sh.par != share.par || sh.h0.len() != h0.len() || sh.h1.len() != h1.len() {
                return Err(Error::ShapeMismatch(
                    "the shares come from different protocol instances".to_string(),
                ));
            }
            izip!(h0.iter_mut(), sh.h0.iter()).for_each(|(a, b)| *a += b);
            izip!(h1.iter_mut(), sh.h1.iter()).for_each(|(a, b)| *a += b);
        }
        Ok(RelinKeyShare {
            par: share.par,
            h0,
            h1,
            prev: None,
            _phantom_data: PhantomData,
        })
    }
}

impl RelinKeyShare<R3> {
    /// h_i = (u - s) * agg2_i.1 + e_i.
    fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        u: &Zeroizing<Poly>,
        r2: &RelinKeyShare<R2Aggregated>,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.par.clone();
        let ctx = par.ctx_at_level(0)?;
        let s = sk_share.to_poly(0)?;
        let u_s = Zeroizing::new(u.as_ref() - s.as_ref());

        let h0 = r2
            .h1
            .iter()
            .map(|b| {
                let e = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);
                let mut h = b * u_s.as_ref();
                h += e.as_ref();
                Ok(h)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            par,
            h0: h0.into_boxed_slice(),
            h1: Box::default(),
            prev: Some(Box::new(r2.clone())),
            _phantom_data: PhantomData,
        })
    }
}

impl Aggregate for RelinKeyShare<R3> {
    type Output = RelinearizationKey;

    fn aggregate<I>(shares: I) -> Result<Self::Output>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut shares = shares.into_iter();
        let share = shares
            .next()
            .ok_or_else(|| Error::AggregationOrder("no shares to aggregate".to_string()))?;
        let par = share.par;
        let mut agg3 = share.h0;
        let prev = share.prev;
        for sh in shares {
            if sh.par != par || sh.h0.len() != agg3.len() || sh.prev != prev {
                return Err(Error::ShapeMismatch(
                    "the shares come from different protocol instances".to_string(),
                ));
            }
            izip!(agg3.iter_mut(), sh.h0.iter()).for_each(|(a, b)| *a += b);
        }

        let r2 = prev.ok_or_else(|| {
            Error::AggregationOrder(
                "round-three shares must carry the round-two aggregate".to_string(),
            )
        })?;
        if r2.h0.len() != agg3.len() || r2.h1.len() != agg3.len() {
            return Err(Error::ShapeMismatch(
                "the round-two aggregate disagrees with the round-three shares".to_string(),
            ));
        }

        // rlk_i = (agg2_i.0 + agg3_i, agg2_i.1)
        let mut c0 = r2.h0;
        izip!(c0.iter_mut(), agg3.iter()).for_each(|(c, h)| *c += h);
        let c1 = r2.h1;

        let ctx = par.ctx_at_level(0)?.clone();
        let ksk = KeySwitchingKey {
            par,
            c0,
            c1,
            ciphertext_level: 0,
            ctx_ciphertext: ctx.clone(),
            ksk_level: 0,
            ctx_ksk: ctx,
        };
        Ok(RelinearizationKey { ksk })
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::R1 {}
    impl Sealed for super::R1Aggregated {}
    impl Sealed for super::R2 {}
    impl Sealed for super::R2Aggregated {}
    impl Sealed for super::R3 {}
}
