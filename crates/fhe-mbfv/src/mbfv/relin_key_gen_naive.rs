use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use itertools::izip;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::bfv::{BfvParameters, KeySwitchingKey, PublicKey, RelinearizationKey, SecretKey};
use crate::{Error, Result};

use super::relin_key_gen::{gadget_secret, key_switching_ctx};
use super::share::{impl_share, ShareData, ShareShape};
use super::{EphemeralKey, Phase, RoundTracker, ShareCombiner};

/// A party's share in the first round of the naive relinearization key
/// generation protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RkgNaiveShareRoundOne(pub(crate) ShareData);

impl_share!(RkgNaiveShareRoundOne, ShareShape::DigitPairs);

/// A party's share in the second round of the naive relinearization key
/// generation protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RkgNaiveShareRoundTwo(pub(crate) ShareData);

impl_share!(RkgNaiveShareRoundTwo, ShareShape::DigitPairs);

/// Two-round relinearization key generation from a collective public key.
///
/// With `(p0, p1)` the collective public key and `w_k` the gadget vector,
/// party `i` samples fresh ternary `u_ik` and `v_ik` for every digit `k` and
/// publishes:
///
/// 1. `n1[k] = (u_ik·p0 + s_i·w_k + e, u_ik·p1 + e)`, an encryption of
///    `s_i·w_k` under the public key
/// 2. `n2[k] = (s_i·N1[k].0 + v_ik·p0 + e, s_i·N1[k].1 + v_ik·p1 + e)`, with
///    `N1` the sum of the first round shares
///
/// The key is the sum `N2` of the second round shares. The second component
/// of the key is not uniformly random, which makes this construction weaker
/// than [`super::RkgProtocol`]; it saves one round of communication.
#[derive(Debug, Clone)]
pub struct RkgNaiveProtocol {
    par: Arc<BfvParameters>,
    level: usize,
    num_parties: usize,
    tracker: RoundTracker,
}

impl RkgNaiveProtocol {
    /// Start a protocol generating a relinearization key at level 0.
    pub fn new(par: &Arc<BfvParameters>, num_parties: usize) -> Result<Self> {
        Self::new_leveled(par, 0, num_parties)
    }

    /// Start a protocol generating a relinearization key for ciphertexts at a
    /// given level.
    pub fn new_leveled(par: &Arc<BfvParameters>, level: usize, num_parties: usize) -> Result<Self> {
        if num_parties == 0 {
            return Err(Error::TooFewValues(0, 1));
        }
        key_switching_ctx(par, level)?;
        warn!(
            level,
            num_parties, "naive relinearization key generation has weaker security guarantees"
        );
        Ok(Self {
            par: par.clone(),
            level,
            num_parties,
            tracker: RoundTracker::new(2),
        })
    }

    /// The current phase of the protocol.
    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    /// Start a new run of the protocol.
    pub fn reset(&mut self) {
        self.tracker.reset()
    }

    /// Allocate an empty share for the first round.
    pub fn allocate_share_round_one(&self) -> Result<RkgNaiveShareRoundOne> {
        Ok(RkgNaiveShareRoundOne(ShareData::zero(
            &self.par,
            self.level,
            RkgNaiveShareRoundOne::SHAPE,
        )?))
    }

    /// Allocate an empty share for the second round.
    pub fn allocate_share_round_two(&self) -> Result<RkgNaiveShareRoundTwo> {
        Ok(RkgNaiveShareRoundTwo(ShareData::zero(
            &self.par,
            self.level,
            RkgNaiveShareRoundTwo::SHAPE,
        )?))
    }

    /// Compute the first round share of a party.
    ///
    /// 1. *Private input*: BFV secret key share
    /// 2. *Public input*: collective public key
    pub fn gen_share_round_one<R: RngCore + CryptoRng>(
        &mut self,
        sk_share: &SecretKey,
        pk: &PublicKey,
        share: &mut RkgNaiveShareRoundOne,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par || pk.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        share.0.check_target(&self.par, self.level)?;
        let (p0, p1) = pk.polys_at_level(self.level)?;
        self.tracker.check(1, "gen_share_round_one")?;

        // One `u` per digit, otherwise it cancels in `n1[k] - n1[j]`.
        let ctx = self.par.ctx_at_level(self.level)?;
        let mut h0 = vec![];
        let mut h1 = vec![];
        for w_s_k in gadget_secret(sk_share, ctx)? {
            let u = EphemeralKey::random(&self.par, rng).poly_ntt(ctx)?;
            let mut h0_k = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
            h0_k += &(u.as_ref() * &p0);
            h0_k += w_s_k.as_ref();
            let mut h1_k = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
            h1_k += &(u.as_ref() * &p1);
            h0.push(h0_k);
            h1.push(h1_k);
        }
        share.0.set(h0, h1)?;
        self.tracker.enter(1, "gen_share_round_one")
    }

    /// Compute the second round share of a party, from the aggregation of
    /// all the first round shares.
    pub fn gen_share_round_two<R: RngCore + CryptoRng>(
        &mut self,
        aggregated_round_one: &RkgNaiveShareRoundOne,
        sk_share: &SecretKey,
        pk: &PublicKey,
        share: &mut RkgNaiveShareRoundTwo,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par || pk.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        self.check_aggregate(&aggregated_round_one.0, RkgNaiveShareRoundOne::SHAPE)?;
        share.0.check_target(&self.par, self.level)?;
        let (p0, p1) = pk.polys_at_level(self.level)?;
        self.tracker.check(2, "gen_share_round_two")?;

        let ctx = self.par.ctx_at_level(self.level)?;
        let s = sk_share.poly_ntt(ctx)?;
        let mut h0 = vec![];
        let mut h1 = vec![];
        for (n1_0, n1_1) in izip!(
            aggregated_round_one.0.p0.iter(),
            aggregated_round_one.0.p1.iter()
        ) {
            let v = EphemeralKey::random(&self.par, rng).poly_ntt(ctx)?;
            let mut h0_k = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
            h0_k += &(s.as_ref() * n1_0);
            h0_k += &(v.as_ref() * &p0);
            let mut h1_k = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
            h1_k += &(s.as_ref() * n1_1);
            h1_k += &(v.as_ref() * &p1);
            h0.push(h0_k);
            h1.push(h1_k);
        }
        share.0.set(h0, h1)?;
        self.tracker.enter(2, "gen_share_round_two")
    }

    /// Aggregate two first round shares.
    pub fn aggregate_shares_round_one(
        &mut self,
        a: &RkgNaiveShareRoundOne,
        b: &RkgNaiveShareRoundOne,
    ) -> Result<RkgNaiveShareRoundOne> {
        a.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "aggregate_shares_round_one")?;
        let aggregated = RkgNaiveShareRoundOne::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares_round_one")?;
        Ok(aggregated)
    }

    /// Aggregate a first round share into `dst`.
    pub fn aggregate_into_round_one(
        &mut self,
        dst: &mut RkgNaiveShareRoundOne,
        other: &RkgNaiveShareRoundOne,
    ) -> Result<()> {
        dst.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "aggregate_shares_round_one")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares_round_one")
    }

    /// Aggregate two second round shares.
    pub fn aggregate_shares_round_two(
        &mut self,
        a: &RkgNaiveShareRoundTwo,
        b: &RkgNaiveShareRoundTwo,
    ) -> Result<RkgNaiveShareRoundTwo> {
        a.0.check_target(&self.par, self.level)?;
        self.tracker.check(2, "aggregate_shares_round_two")?;
        let aggregated = RkgNaiveShareRoundTwo::combine(a, b)?;
        self.tracker.enter(2, "aggregate_shares_round_two")?;
        Ok(aggregated)
    }

    /// Aggregate a second round share into `dst`.
    pub fn aggregate_into_round_two(
        &mut self,
        dst: &mut RkgNaiveShareRoundTwo,
        other: &RkgNaiveShareRoundTwo,
    ) -> Result<()> {
        dst.0.check_target(&self.par, self.level)?;
        self.tracker.check(2, "aggregate_shares_round_two")?;
        dst.combine_assign(other)?;
        self.tracker.enter(2, "aggregate_shares_round_two")
    }

    /// Produce the relinearization key from the aggregation of the second
    /// round shares.
    pub fn finalize(
        &mut self,
        aggregated_round_two: &RkgNaiveShareRoundTwo,
    ) -> Result<RelinearizationKey> {
        self.tracker.check_final("finalize")?;
        self.check_aggregate(&aggregated_round_two.0, RkgNaiveShareRoundTwo::SHAPE)?;

        let ksk = KeySwitchingKey::from_parts(
            &self.par,
            aggregated_round_two.0.p0.clone(),
            aggregated_round_two.0.p1.clone(),
            self.level,
        )?;
        self.tracker.finish();
        debug!(
            level = self.level,
            digits = ksk.digits(),
            "naive collective relinearization key generated"
        );
        Ok(RelinearizationKey::from_key_switching_key(ksk))
    }

    fn check_aggregate(&self, aggregated: &ShareData, shape: ShareShape) -> Result<()> {
        aggregated.check_target(&self.par, self.level)?;
        aggregated.check_shape(shape)?;
        aggregated.check_complete(self.num_parties)
    }
}
