use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Poly, Representation, SubstitutionExponent};
use fhe_traits::{DeserializeParametrized, FheParametrized, Serialize};
use itertools::izip;
use prost::Message;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::bfv::{
    gadget_products, BfvParameters, GaloisKey, KeySwitchingKey, RotationDirection, SecretKey,
};
use crate::proto::mbfv::RotationShare as RotationShareProto;
use crate::{Error, Result};

use super::crp::check_crp_vec;
use super::relin_key_gen::key_switching_ctx;
use super::share::{ShareData, ShareShape};
use super::{CommonRandomPoly, Phase, RoundTracker, ShareCombiner};

/// A party's share in the rotation key generation protocol.
///
/// The share is bound to the Galois element of the rotation; shares of
/// different rotations cannot be combined.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RtgShare {
    pub(crate) data: ShareData,
    pub(crate) element: usize,
}

impl RtgShare {
    const SHAPE: ShareShape = ShareShape::Digits;

    /// The level of the share.
    pub fn level(&self) -> usize {
        self.data.level
    }

    /// The number of party contributions folded into the share.
    pub fn parties(&self) -> usize {
        self.data.parties
    }

    /// The Galois element of the rotation.
    pub fn element(&self) -> usize {
        self.element
    }
}

impl ShareCombiner for RtgShare {
    fn combine_assign(&mut self, other: &Self) -> Result<()> {
        if self.element != other.element {
            warn!(
                expected = self.element,
                found = other.element,
                "rotation shares for different Galois elements"
            );
            return Err(Error::DecompositionMismatch {
                expected: self.element,
                found: other.element,
            });
        }
        self.data.combine_assign(&other.data, Self::SHAPE)
    }
}

impl FheParametrized for RtgShare {
    type Parameters = BfvParameters;
}

impl Serialize for RtgShare {
    fn to_bytes(&self) -> Vec<u8> {
        RotationShareProto {
            share: Some(self.data.to_proto()),
            galois_element: self.element as u64,
        }
        .encode_to_vec()
    }
}

impl DeserializeParametrized for RtgShare {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<BfvParameters>) -> Result<Self> {
        let proto: RotationShareProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let share = proto.share.ok_or(Error::SerializationError)?;
        let data = ShareData::from_proto(&share, par, Self::SHAPE)?;
        let element = proto.galois_element as usize;
        SubstitutionExponent::new(par.ctx_at_level(data.level)?, element)?;
        Ok(Self { data, element })
    }
}

/// Collective rotation key generation, "Protocol 3: RotKeyGen" of
/// [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p7).
///
/// Generates the Galois key of a rotation, i.e. a key switching key from
/// `σ(s)` to `s` where `σ` is the automorphism of the rotation. With `a_k` the
/// common random polynomials and `w_k` the gadget vector, party `i` publishes
/// `g[k] = -a_k·s_i + e + w_k·σ(s_i)`; the key is `(Σ g[k], a_k)`.
#[derive(Debug, Clone)]
pub struct RtgProtocol {
    par: Arc<BfvParameters>,
    level: usize,
    num_parties: usize,
    direction: RotationDirection,
    element: usize,
    tracker: RoundTracker,
}

impl RtgProtocol {
    /// Start a protocol generating a rotation key at level 0.
    pub fn new(
        par: &Arc<BfvParameters>,
        num_parties: usize,
        direction: RotationDirection,
    ) -> Result<Self> {
        Self::new_leveled(par, 0, num_parties, direction)
    }

    /// Start a protocol generating a rotation key for ciphertexts at a given
    /// level.
    pub fn new_leveled(
        par: &Arc<BfvParameters>,
        level: usize,
        num_parties: usize,
        direction: RotationDirection,
    ) -> Result<Self> {
        if num_parties == 0 {
            return Err(Error::TooFewValues(0, 1));
        }
        let ctx = key_switching_ctx(par, level)?;
        let element = direction.galois_element(par.degree())?;
        SubstitutionExponent::new(ctx, element)?;
        debug!(
            level,
            num_parties,
            %direction,
            galois_element = element,
            "new collective rotation key generation"
        );
        Ok(Self {
            par: par.clone(),
            level,
            num_parties,
            direction,
            element,
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

    /// The rotation realized by the generated key.
    pub fn direction(&self) -> RotationDirection {
        self.direction
    }

    /// The Galois element of the generated key.
    pub fn element(&self) -> usize {
        self.element
    }

    /// Allocate an empty share.
    pub fn allocate_share(&self) -> Result<RtgShare> {
        Ok(RtgShare {
            data: ShareData::zero(&self.par, self.level, RtgShare::SHAPE)?,
            element: self.element,
        })
    }

    /// Compute the share of a party.
    ///
    /// 1. *Private input*: BFV secret key share
    /// 2. *Public input*: one common random polynomial per digit
    pub fn gen_share<R: RngCore + CryptoRng>(
        &mut self,
        sk_share: &SecretKey,
        crps: &[CommonRandomPoly],
        share: &mut RtgShare,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        check_crp_vec(crps, &self.par, self.level)?;
        self.check_share(share)?;
        self.tracker.check(1, "gen_share")?;

        let ctx = self.par.ctx_at_level(self.level)?;
        let sub = SubstitutionExponent::new(ctx, self.element)?;
        let s = Zeroizing::new(Poly::try_convert_from(
            sk_share.coeffs.as_ref(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        let w_s_sub = gadget_products(&Zeroizing::new(s.substitute(&sub)?))?;
        let s = sk_share.poly_ntt(ctx)?;

        let h = izip!(crps, w_s_sub.iter())
            .map(|(crp, w_s_sub_k)| {
                let mut h = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
                h -= &(s.as_ref() * &crp.poly);
                h += w_s_sub_k.as_ref();
                Ok(h)
            })
            .collect::<Result<Vec<_>>>()?;
        share.data.set(h, vec![])?;
        self.tracker.enter(1, "gen_share")
    }

    /// Aggregate two shares into a new one.
    pub fn aggregate_shares(&mut self, a: &RtgShare, b: &RtgShare) -> Result<RtgShare> {
        self.check_share(a)?;
        self.tracker.check(1, "aggregate_shares")?;
        let aggregated = RtgShare::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares")?;
        Ok(aggregated)
    }

    /// Aggregate a share into `dst`.
    pub fn aggregate_into(&mut self, dst: &mut RtgShare, other: &RtgShare) -> Result<()> {
        self.check_share(dst)?;
        self.tracker.check(1, "aggregate_shares")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares")
    }

    /// Produce the Galois key from the aggregation of the shares of all the
    /// parties.
    pub fn finalize(
        &mut self,
        aggregated: &RtgShare,
        crps: &[CommonRandomPoly],
    ) -> Result<GaloisKey> {
        self.tracker.check_final("finalize")?;
        self.check_share(aggregated)?;
        aggregated.data.check_shape(RtgShare::SHAPE)?;
        aggregated.data.check_complete(self.num_parties)?;
        check_crp_vec(crps, &self.par, self.level)?;

        let c1 = crps.iter().map(|crp| crp.poly.clone()).collect();
        let ksk =
            KeySwitchingKey::from_parts(&self.par, aggregated.data.p0.clone(), c1, self.level)?;
        let gk = GaloisKey::from_key_switching_key(self.element, ksk)?;
        self.tracker.finish();
        debug!(
            level = self.level,
            galois_element = self.element,
            parties = aggregated.parties(),
            "collective rotation key generated"
        );
        Ok(gk)
    }

    fn check_share(&self, share: &RtgShare) -> Result<()> {
        share.data.check_target(&self.par, self.level)?;
        if share.element != self.element {
            warn!(
                expected = self.element,
                found = share.element,
                "rotation share for another Galois element"
            );
            return Err(Error::DecompositionMismatch {
                expected: self.element,
                found: share.element,
            });
        }
        Ok(())
    }
}
