use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use rand::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, PublicKey, SecretKey};
use crate::{Error, Result};

use super::share::{impl_share, ShareData, ShareShape};
use super::{CommonRandomPoly, Phase, RoundTracker, ShareCombiner};

/// A party's share in the public key generation protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CkgShare(pub(crate) ShareData);

impl_share!(CkgShare, ShareShape::Single);

/// Collective public key generation, "Protocol 1: EncKeyGen" of
/// [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p6).
///
/// Each party turns its secret key share `s_i` and the common random
/// polynomial `a` into the share `-(s_i·a + e_i)`. The sum of all the shares,
/// together with `a`, is an encryption of zero under `s = Σ s_i`, i.e. a
/// public key for `s`.
#[derive(Debug, Clone)]
pub struct CkgProtocol {
    par: Arc<BfvParameters>,
    level: usize,
    num_parties: usize,
    tracker: RoundTracker,
}

impl CkgProtocol {
    /// Start a protocol generating a public key at level 0.
    pub fn new(par: &Arc<BfvParameters>, num_parties: usize) -> Result<Self> {
        Self::new_leveled(par, 0, num_parties)
    }

    /// Start a protocol generating a public key at a given level.
    pub fn new_leveled(par: &Arc<BfvParameters>, level: usize, num_parties: usize) -> Result<Self> {
        if num_parties == 0 {
            return Err(Error::TooFewValues(0, 1));
        }
        par.ctx_at_level(level)?;
        debug!(level, num_parties, "new collective public key generation");
        Ok(Self {
            par: par.clone(),
            level,
            num_parties,
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

    /// Allocate an empty share.
    pub fn allocate_share(&self) -> Result<CkgShare> {
        Ok(CkgShare(ShareData::zero(&self.par, self.level, CkgShare::SHAPE)?))
    }

    /// Compute the share of a party.
    ///
    /// 1. *Private input*: BFV secret key share
    /// 2. *Public input*: common random polynomial
    pub fn gen_share<R: RngCore + CryptoRng>(
        &mut self,
        sk_share: &SecretKey,
        crp: &CommonRandomPoly,
        share: &mut CkgShare,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        crp.check_level(&self.par, self.level)?;
        share.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "gen_share")?;

        let ctx = self.par.ctx_at_level(self.level)?;
        let s = sk_share.poly_ntt(ctx)?;
        let e = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);

        let mut p0 = s.as_ref() * &crp.poly;
        p0 += e.as_ref();
        share.0.set(vec![-p0], vec![])?;
        self.tracker.enter(1, "gen_share")
    }

    /// Aggregate two shares into a new one.
    pub fn aggregate_shares(&mut self, a: &CkgShare, b: &CkgShare) -> Result<CkgShare> {
        a.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "aggregate_shares")?;
        let aggregated = CkgShare::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares")?;
        Ok(aggregated)
    }

    /// Aggregate a share into `dst`.
    pub fn aggregate_into(&mut self, dst: &mut CkgShare, other: &CkgShare) -> Result<()> {
        dst.0.check_target(&self.par, self.level)?;
        self.tracker.check(1, "aggregate_shares")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares")
    }

    /// Produce the collective public key from the aggregation of the shares of
    /// all the parties.
    pub fn finalize(&mut self, aggregated: &CkgShare, crp: &CommonRandomPoly) -> Result<PublicKey> {
        self.tracker.check_final("finalize")?;
        aggregated.0.check_target(&self.par, self.level)?;
        aggregated.0.check_shape(CkgShare::SHAPE)?;
        aggregated.0.check_complete(self.num_parties)?;
        crp.check_level(&self.par, self.level)?;

        let c = Ciphertext::new(
            vec![aggregated.0.p0[0].clone(), crp.poly.clone()],
            &self.par,
        )?;
        let pk = PublicKey::from_ciphertext(c)?;
        self.tracker.finish();
        debug!(
            level = self.level,
            parties = aggregated.parties(),
            "collective public key generated"
        );
        Ok(pk)
    }
}
