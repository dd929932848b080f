use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use itertools::izip;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::bfv::{
    gadget_products, BfvParameters, KeySwitchingKey, RelinearizationKey, SecretKey,
};
use crate::{Error, Result};

use super::crp::check_crp_vec;
use super::share::{impl_share, ShareData, ShareShape};
use super::{CommonRandomPoly, EphemeralKey, Phase, RoundTracker, ShareCombiner};

/// The context of a level, if its ciphertexts can be key switched.
pub(crate) fn key_switching_ctx(par: &Arc<BfvParameters>, level: usize) -> Result<&Arc<Context>> {
    let ctx = par.ctx_at_level(level)?;
    if ctx.moduli().len() == 1 {
        warn!(level, "key switching needs at least two moduli");
        return Err(Error::DefaultError(
            "These parameters do not support key switching".to_string(),
        ));
    }
    Ok(ctx)
}

/// The gadget products `w_k·s_i` of a secret key share, in Ntt representation.
pub(crate) fn gadget_secret(
    sk_share: &SecretKey,
    ctx: &Arc<Context>,
) -> Result<Vec<Zeroizing<Poly>>> {
    let s = Zeroizing::new(Poly::try_convert_from(
        sk_share.coeffs.as_ref(),
        ctx,
        false,
        Representation::PowerBasis,
    )?);
    gadget_products(&s)
}

/// A party's share in the first round of the relinearization key generation
/// protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RkgShareRoundOne(pub(crate) ShareData);

impl_share!(RkgShareRoundOne, ShareShape::Digits);

/// A party's share in the second round of the relinearization key generation
/// protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RkgShareRoundTwo(pub(crate) ShareData);

impl_share!(RkgShareRoundTwo, ShareShape::DigitPairs);

/// A party's share in the third round of the relinearization key generation
/// protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RkgShareRoundThree(pub(crate) ShareData);

impl_share!(RkgShareRoundThree, ShareShape::Digits);

/// Collective relinearization key generation.
///
/// A three-round variant of "Protocol 2: RelinKeyGen" of
/// [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p7), in which the
/// ephemeral key `u = Σ u_i` masks `s·a_k` until the last round. With `a_k`
/// the common random polynomials and `w_k` the gadget vector, party `i`
/// publishes:
///
/// 1. `r1[k] = -u_i·a_k + s_i·w_k + e`
/// 2. `r2[k] = (s_i·R1[k] + e, s_i·a_k + e)`, with `R1` the sum of the first
///    round shares
/// 3. `r3[k] = (u_i - s_i)·R2[k].1 + e`, with `R2` the sum of the second
///    round shares
///
/// The key is `(R2[k].0 + R3[k], R2[k].1)`. Each party must keep its
/// [`EphemeralKey`] from the first to the third round, and drop it afterwards.
#[derive(Debug, Clone)]
pub struct RkgProtocol {
    par: Arc<BfvParameters>,
    level: usize,
    num_parties: usize,
    tracker: RoundTracker,
}

impl RkgProtocol {
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
        debug!(level, num_parties, "new collective relinearization key generation");
        Ok(Self {
            par: par.clone(),
            level,
            num_parties,
            tracker: RoundTracker::new(3),
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
    pub fn allocate_share_round_one(&self) -> Result<RkgShareRoundOne> {
        Ok(RkgShareRoundOne(ShareData::zero(
            &self.par,
            self.level,
            RkgShareRoundOne::SHAPE,
        )?))
    }

    /// Allocate an empty share for the second round.
    pub fn allocate_share_round_two(&self) -> Result<RkgShareRoundTwo> {
        Ok(RkgShareRoundTwo(ShareData::zero(
            &self.par,
            self.level,
            RkgShareRoundTwo::SHAPE,
        )?))
    }

    /// Allocate an empty share for the third round.
    pub fn allocate_share_round_three(&self) -> Result<RkgShareRoundThree> {
        Ok(RkgShareRoundThree(ShareData::zero(
            &self.par,
            self.level,
            RkgShareRoundThree::SHAPE,
        )?))
    }

    /// Compute the first round share of a party.
    ///
    /// 1. *Private input*: BFV secret key share
    /// 2. *Private input*: ephemeral key of the party for this run
    /// 3. *Public input*: one common random polynomial per digit
    pub fn gen_share_round_one<R: RngCore + CryptoRng>(
        &mut self,
        sk_share: &SecretKey,
        u: &EphemeralKey,
        crps: &[CommonRandomPoly],
        share: &mut RkgShareRoundOne,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par || u.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        check_crp_vec(crps, &self.par, self.level)?;
        share.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "gen_share_round_one")?;

        let ctx = self.par.ctx_at_level(self.level)?;
        let u = u.poly_ntt(ctx)?;
        let w_s = gadget_secret(sk_share, ctx)?;
        let h = izip!(crps, w_s.iter())
            .map(|(crp, w_s_k)| {
                let mut h = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
                h -= &(u.as_ref() * &crp.poly);
                h += w_s_k.as_ref();
                Ok(h)
            })
            .collect::<Result<Vec<_>>>()?;
        share.0.set(h, vec![])?;
        self.tracker.enter(1, "gen_share_round_one")
    }

    /// Compute the second round share of a party, from the aggregation of
    /// all the first round shares.
    pub fn gen_share_round_two<R: RngCore + CryptoRng>(
        &mut self,
        aggregated_round_one: &RkgShareRoundOne,
        sk_share: &SecretKey,
        crps: &[CommonRandomPoly],
        share: &mut RkgShareRoundTwo,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        self.check_aggregate(&aggregated_round_one.0, RkgShareRoundOne::SHAPE)?;
        check_crp_vec(crps, &self.par, self.level)?;
        share.0.check_target(&self.par, self.level)?;
        self.tracker.check(2, "gen_share_round_two")?;

        let ctx = self.par.ctx_at_level(self.level)?;
        let s = sk_share.poly_ntt(ctx)?;
        let mut h0 = Vec::with_capacity(crps.len());
        let mut h1 = Vec::with_capacity(crps.len());
        for (r1_k, crp) in izip!(aggregated_round_one.0.p0.iter(), crps) {
            let mut h0_k = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
            h0_k += &(s.as_ref() * r1_k);
            let mut h1_k = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
            h1_k += &(s.as_ref() * &crp.poly);
            h0.push(h0_k);
            h1.push(h1_k);
        }
        share.0.set(h0, h1)?;
        self.tracker.enter(2, "gen_share_round_two")
    }

    /// Compute the third round share of a party, from the aggregation of all
    /// the second round shares.
    pub fn gen_share_round_three<R: RngCore + CryptoRng>(
        &mut self,
        aggregated_round_two: &RkgShareRoundTwo,
        u: &EphemeralKey,
        sk_share: &SecretKey,
        share: &mut RkgShareRoundThree,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par || u.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        self.check_aggregate(&aggregated_round_two.0, RkgShareRoundTwo::SHAPE)?;
        share.0.check_target(&self.par, self.level)?;
        self.tracker.check(3, "gen_share_round_three")?;

        let ctx = self.par.ctx_at_level(self.level)?;
        let mut u_minus_s = u.poly_ntt(ctx)?;
        *u_minus_s.as_mut() -= sk_share.poly_ntt(ctx)?.as_ref();
        let h = aggregated_round_two
            .0
            .p1
            .iter()
            .map(|r2_k| {
                let mut h = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
                h += &(u_minus_s.as_ref() * r2_k);
                Ok(h)
            })
            .collect::<Result<Vec<_>>>()?;
        share.0.set(h, vec![])?;
        self.tracker.enter(3, "gen_share_round_three")
    }

    /// Aggregate two first round shares.
    pub fn aggregate_shares_round_one(
        &mut self,
        a: &RkgShareRoundOne,
        b: &RkgShareRoundOne,
    ) -> Result<RkgShareRoundOne> {
        a.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "aggregate_shares_round_one")?;
        let aggregated = RkgShareRoundOne::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares_round_one")?;
        Ok(aggregated)
    }

    /// Aggregate a first round share into `dst`.
    pub fn aggregate_into_round_one(
        &mut self,
        dst: &mut RkgShareRoundOne,
        other: &RkgShareRoundOne,
    ) -> Result<()> {
        dst.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "aggregate_shares_round_one")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares_round_one")
    }

    /// Aggregate two second round shares.
    pub fn aggregate_shares_round_two(
        &mut self,
        a: &RkgShareRoundTwo,
        b: &RkgShareRoundTwo,
    ) -> Result<RkgShareRoundTwo> {
        a.0.check_target(&self.par, self.level)?;
        self.tracker.check(2, "aggregate_shares_round_two")?;
        let aggregated = RkgShareRoundTwo::combine(a, b)?;
        self.tracker.enter(2, "aggregate_shares_round_two")?;
        Ok(aggregated)
    }

    /// Aggregate a second round share into `dst`.
    pub fn aggregate_into_round_two(
        &mut self,
        dst: &mut RkgShareRoundTwo,
        other: &RkgShareRoundTwo,
    ) -> Result<()> {
        dst.0.check_target(&self.par, self.level)?;
        self.tracker.check(2, "aggregate_shares_round_two")?;
        dst.combine_assign(other)?;
        self.tracker.enter(2, "aggregate_shares_round_two")
    }

    /// Aggregate two third round shares.
    pub fn aggregate_shares_round_three(
        &mut self,
        a: &RkgShareRoundThree,
        b: &RkgShareRoundThree,
    ) -> Result<RkgShareRoundThree> {
        a.0.check_target(&self.par, self.level)?;
        self.tracker.check(3, "aggregate_shares_round_three")?;
        let aggregated = RkgShareRoundThree::combine(a, b)?;
        self.tracker.enter(3, "aggregate_shares_round_three")?;
        Ok(aggregated)
    }

    /// Aggregate a third round share into `dst`.
    pub fn aggregate_into_round_three(
        &mut self,
        dst: &mut RkgShareRoundThree,
        other: &RkgShareRoundThree,
    ) -> Result<()> {
        dst.0.check_target(&self.par, self.level)?;
        self.tracker.check(3, "aggregate_shares_round_three")?;
        dst.combine_assign(other)?;
        self.tracker.enter(3, "aggregate_shares_round_three")
    }

    /// Produce the relinearization key from the aggregations of the second
    /// and third round shares.
    pub fn finalize(
        &mut self,
        aggregated_round_two: &RkgShareRoundTwo,
        aggregated_round_three: &RkgShareRoundThree,
    ) -> Result<RelinearizationKey> {
        self.tracker.check_final("finalize")?;
        self.check_aggregate(&aggregated_round_two.0, RkgShareRoundTwo::SHAPE)?;
        self.check_aggregate(&aggregated_round_three.0, RkgShareRoundThree::SHAPE)?;

        let c0 = izip!(
            aggregated_round_two.0.p0.iter(),
            aggregated_round_three.0.p0.iter()
        )
        .map(|(r2_k, r3_k)| r2_k + r3_k)
        .collect();
        let c1 = aggregated_round_two.0.p1.clone();
        let ksk = KeySwitchingKey::from_parts(&self.par, c0, c1, self.level)?;
        self.tracker.finish();
        debug!(
            level = self.level,
            digits = ksk.digits(),
            "collective relinearization key generated"
        );
        Ok(RelinearizationKey::from_key_switching_key(ksk))
    }

    fn check_aggregate(&self, aggregated: &ShareData, shape: ShareShape) -> Result<()> {
        aggregated.check_target(&self.par, self.level)?;
        aggregated.check_shape(shape)?;
        aggregated.check_complete(self.num_parties)
    }
}
