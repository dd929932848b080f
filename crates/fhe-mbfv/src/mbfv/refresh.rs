use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, Plaintext, SecretKey};
use crate::{Error, Result};

use super::secret_key_switch::check_ciphertext;
use super::share::{impl_share, ShareData, ShareShape};
use super::{CommonRandomPoly, FloodingConfig, Phase, RoundTracker, ShareCombiner};

/// A party's share in the refresh protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RefreshShare(pub(crate) ShareData);

impl_share!(RefreshShare, ShareShape::Pair);

/// Collective refresh, "Protocol 5: Refresh" of
/// [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p9).
///
/// Replaces a ciphertext with a fresh encryption of the same plaintext, at the
/// same level and with a small noise, without decrypting it. Party `i` masks
/// its partial decryption with a uniformly random plaintext `M_i` and
/// publishes
///
/// `(s_i·c1 + e0_i - Δ·M_i, -s_i·a + e1_i + Δ·M_i)`
///
/// where `e0_i` is flooding noise and `a` a common random polynomial. The sum
/// of the first components decrypts to the masked plaintext `m - Σ M_i`,
/// which is re-encoded and unmasked by the sum of the second components.
///
/// The three steps are also available separately as [`Self::decrypt`],
/// [`Self::recode`] and [`Self::recrypt`].
#[derive(Debug, Clone)]
pub struct RefreshProtocol {
    par: Arc<BfvParameters>,
    num_parties: usize,
    flooding: FloodingConfig,
    tracker: RoundTracker,
}

impl RefreshProtocol {
    /// Start a new refresh protocol.
    pub fn new(
        par: &Arc<BfvParameters>,
        num_parties: usize,
        flooding: FloodingConfig,
    ) -> Result<Self> {
        if num_parties == 0 {
            return Err(Error::TooFewValues(0, 1));
        }
        flooding.validate_for(par, 0, num_parties)?;
        debug!(
            num_parties,
            statistical_security = flooding.statistical_security(),
            "new collective refresh"
        );
        Ok(Self {
            par: par.clone(),
            num_parties,
            flooding,
            tracker: RoundTracker::new(1),
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

    /// Allocate an empty share for a ciphertext at the given level.
    pub fn allocate_share(&self, level: usize) -> Result<RefreshShare> {
        Ok(RefreshShare(ShareData::zero(
            &self.par,
            level,
            RefreshShare::SHAPE,
        )?))
    }

    /// Compute the share of a party.
    ///
    /// 1. *Private input*: BFV secret key share
    /// 2. *Public input*: ciphertext to refresh
    /// 3. *Public input*: common random polynomial at the level of the
    ///    ciphertext
    pub fn gen_share<R: RngCore + CryptoRng>(
        &mut self,
        sk_share: &SecretKey,
        ct: &Ciphertext,
        crp: &CommonRandomPoly,
        share: &mut RefreshShare,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        check_ciphertext(&self.par, ct)?;
        crp.check_level(&self.par, ct.level)?;
        share.0.check_target(&self.par, ct.level)?;
        self.flooding
            .validate_for(&self.par, ct.level, self.num_parties)?;
        self.tracker.check(1, "gen_share")?;

        let ctx = ct.c[0].ctx();
        let s = sk_share.poly_ntt(ctx)?;
        let mask = Zeroizing::new(Plaintext::from_coefficients(
            self.par.plaintext.random_vec(self.par.degree(), rng),
            ct.level,
            &self.par,
        ));
        let mask = Zeroizing::new(mask.to_poly()?);
        let e0 = self.flooding.sample(&self.par, ctx, rng)?;
        let e1 = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);

        let mut h0 = s.as_ref() * &ct.c[1];
        h0 += e0.as_ref();
        h0 -= mask.as_ref();
        let mut h1 = -(s.as_ref() * &crp.poly);
        h1 += e1.as_ref();
        h1 += mask.as_ref();
        share.0.set(vec![h0], vec![h1])?;
        self.tracker.enter(1, "gen_share")
    }

    /// Aggregate two shares into a new one.
    pub fn aggregate_shares(
        &mut self,
        a: &RefreshShare,
        b: &RefreshShare,
    ) -> Result<RefreshShare> {
        self.tracker.check(1, "aggregate_shares")?;
        let aggregated = RefreshShare::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares")?;
        Ok(aggregated)
    }

    /// Aggregate a share into `dst`.
    pub fn aggregate_into(&mut self, dst: &mut RefreshShare, other: &RefreshShare) -> Result<()> {
        self.tracker.check(1, "aggregate_shares")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares")
    }

    /// The decryption phase `c0 + Σ h0_i` of the masked plaintext.
    pub fn decrypt(&self, ct: &Ciphertext, aggregated: &RefreshShare) -> Result<Poly> {
        check_ciphertext(&self.par, ct)?;
        self.check_aggregate(aggregated, ct.level)?;
        Ok(&ct.c[0] + &aggregated.0.p0[0])
    }

    /// Round a decryption phase to the masked plaintext `m - Σ M_i`.
    pub fn recode(&self, phase: &Poly) -> Result<Plaintext> {
        Plaintext::from_phase(phase, &self.par)
    }

    /// Encrypt the masked plaintext again and remove the masks, producing a
    /// fresh ciphertext `(Δ·(m - Σ M_i) + Σ h1_i, a)`.
    pub fn recrypt(
        &self,
        masked: &Plaintext,
        crp: &CommonRandomPoly,
        aggregated: &RefreshShare,
    ) -> Result<Ciphertext> {
        if masked.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        self.check_aggregate(aggregated, masked.level())?;
        crp.check_level(&self.par, masked.level())?;
        let mut c0 = masked.to_poly()?;
        c0 += &aggregated.0.p1[0];
        Ciphertext::new(vec![c0, crp.poly.clone()], &self.par)
    }

    /// Produce the refreshed ciphertext from the aggregation of the shares of
    /// all the parties.
    pub fn finalize(
        &mut self,
        ct: &Ciphertext,
        crp: &CommonRandomPoly,
        aggregated: &RefreshShare,
    ) -> Result<Ciphertext> {
        self.tracker.check_final("finalize")?;
        crp.check_level(&self.par, ct.level)?;
        let phase = Zeroizing::new(self.decrypt(ct, aggregated)?);
        let masked = Zeroizing::new(self.recode(&phase)?);
        let out = self.recrypt(&masked, crp, aggregated)?;
        self.tracker.finish();
        debug!(
            level = ct.level,
            parties = aggregated.parties(),
            "ciphertext refreshed"
        );
        Ok(out)
    }

    fn check_aggregate(&self, aggregated: &RefreshShare, level: usize) -> Result<()> {
        aggregated.0.check_target(&self.par, level)?;
        aggregated.0.check_shape(RefreshShare::SHAPE)?;
        aggregated.0.check_complete(self.num_parties)
    }
}
