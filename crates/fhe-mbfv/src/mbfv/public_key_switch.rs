use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, PublicKey, SecretKey};
use crate::{Error, Result};

use super::secret_key_switch::check_ciphertext;
use super::share::{impl_share, ShareData, ShareShape};
use super::{EphemeralKey, FloodingConfig, Phase, RoundTracker, ShareCombiner};

/// A party's share in the public key switch protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PcksShare(pub(crate) ShareData);

impl_share!(PcksShare, ShareShape::Pair);

/// Collective public key switching, "Protocol 4: PubKeySwitch" of
/// [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p8).
///
/// Switches a ciphertext under `s = Σ s_i` to a ciphertext under the secret
/// key of the owner of a public key `(p0, p1)`. Party `i` samples a fresh
/// ternary `u_i` and publishes
///
/// `(s_i·c1 + u_i·p0 + e0_i, u_i·p1 + e1_i)`,
///
/// where `e0_i` is flooding noise.
#[derive(Debug, Clone)]
pub struct PcksProtocol {
    par: Arc<BfvParameters>,
    num_parties: usize,
    flooding: FloodingConfig,
    tracker: RoundTracker,
}

impl PcksProtocol {
    /// Start a new public key switching protocol.
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
            sigma_bits = flooding.sigma_bits(),
            "new collective public key switching"
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
    pub fn allocate_share(&self, level: usize) -> Result<PcksShare> {
        Ok(PcksShare(ShareData::zero(&self.par, level, PcksShare::SHAPE)?))
    }

    /// Compute the share of a party.
    ///
    /// 1. *Private input*: BFV input secret key share
    /// 2. *Public input*: Public key of the recipient
    /// 3. *Public input*: Input ciphertext to keyswitch
    pub fn gen_share<R: RngCore + CryptoRng>(
        &mut self,
        sk_share: &SecretKey,
        pk: &PublicKey,
        ct: &Ciphertext,
        share: &mut PcksShare,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par || pk.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        check_ciphertext(&self.par, ct)?;
        share.0.check_target(&self.par, ct.level)?;
        self.flooding
            .validate_for(&self.par, ct.level, self.num_parties)?;
        let (p0, p1) = pk.polys_at_level(ct.level)?;
        self.tracker.check(1, "gen_share")?;

        let ctx = ct.c[0].ctx();
        let s = sk_share.poly_ntt(ctx)?;
        let u = EphemeralKey::random(&self.par, rng).poly_ntt(ctx)?;
        let e0 = self.flooding.sample(&self.par, ctx, rng)?;
        let e1 = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);

        let mut h0 = s.as_ref() * &ct.c[1];
        h0 += &(u.as_ref() * &p0);
        h0 += e0.as_ref();
        let mut h1 = u.as_ref() * &p1;
        h1 += e1.as_ref();
        share.0.set(vec![h0], vec![h1])?;
        self.tracker.enter(1, "gen_share")
    }

    /// Aggregate two shares into a new one.
    pub fn aggregate_shares(&mut self, a: &PcksShare, b: &PcksShare) -> Result<PcksShare> {
        self.tracker.check(1, "aggregate_shares")?;
        let aggregated = PcksShare::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares")?;
        Ok(aggregated)
    }

    /// Aggregate a share into `dst`.
    pub fn aggregate_into(&mut self, dst: &mut PcksShare, other: &PcksShare) -> Result<()> {
        self.tracker.check(1, "aggregate_shares")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares")
    }

    /// Produce the ciphertext `(c0 + Σ h0_i, Σ h1_i)` under the recipient's
    /// key.
    pub fn finalize(&mut self, aggregated: &PcksShare, ct: &Ciphertext) -> Result<Ciphertext> {
        self.tracker.check_final("finalize")?;
        check_ciphertext(&self.par, ct)?;
        aggregated.0.check_target(&self.par, ct.level)?;
        aggregated.0.check_shape(PcksShare::SHAPE)?;
        aggregated.0.check_complete(self.num_parties)?;

        let c0 = &ct.c[0] + &aggregated.0.p0[0];
        let c1 = aggregated.0.p1[0].clone();
        let out = Ciphertext::new(vec![c0, c1], &self.par)?;
        self.tracker.finish();
        debug!(
            level = ct.level,
            parties = aggregated.parties(),
            "ciphertext switched to a public key"
        );
        Ok(out)
    }
}
