//! Storage shared by all the protocol shares.

use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeWithContext, Serialize};
use itertools::izip;
use tracing::warn;

use crate::bfv::BfvParameters;
use crate::proto::mbfv::Share as ShareProto;
use crate::{Error, Result};

/// Number of polynomials carried by a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShareShape {
    /// One polynomial.
    Single,
    /// Two polynomials.
    Pair,
    /// One polynomial per decomposition digit.
    Digits,
    /// Two polynomials per decomposition digit.
    DigitPairs,
}

impl ShareShape {
    fn lengths(self, digits: usize) -> (usize, usize) {
        match self {
            ShareShape::Single => (1, 0),
            ShareShape::Pair => (1, 1),
            ShareShape::Digits => (digits, 0),
            ShareShape::DigitPairs => (digits, digits),
        }
    }
}

/// The polynomials of a share, in Ntt representation at the context of
/// `level`, together with the number of contributions folded into them.
///
/// `parties` is a count, not a set of contributors: combining a share with
/// itself counts it twice, and a share decoded from bytes carries the count
/// declared by its sender. Checking that every party contributed exactly
/// once is left to the transport, which authenticates the senders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShareData {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) level: usize,
    pub(crate) parties: usize,
    pub(crate) p0: Vec<Poly>,
    pub(crate) p1: Vec<Poly>,
}

impl ShareData {
    /// An empty share.
    pub(crate) fn zero(par: &Arc<BfvParameters>, level: usize, shape: ShareShape) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        let (n0, n1) = shape.lengths(ctx.moduli().len());
        Ok(Self {
            par: par.clone(),
            level,
            parties: 0,
            p0: vec![Poly::zero(ctx, Representation::Ntt); n0],
            p1: vec![Poly::zero(ctx, Representation::Ntt); n1],
        })
    }

    /// Replace the content of the share by a single contribution.
    pub(crate) fn set(&mut self, mut p0: Vec<Poly>, mut p1: Vec<Poly>) -> Result<()> {
        if p0.len() != self.p0.len() || p1.len() != self.p1.len() {
            return Err(Error::MalformedShare(format!(
                "expected {} and {} polynomials, found {} and {}",
                self.p0.len(),
                self.p1.len(),
                p0.len(),
                p1.len()
            )));
        }
        p0.iter_mut()
            .chain(p1.iter_mut())
            .for_each(|p| p.disallow_variable_time_computations());
        self.p0 = p0;
        self.p1 = p1;
        self.parties = 1;
        Ok(())
    }

    /// Check that the share was allocated for these parameters and level.
    pub(crate) fn check_target(&self, par: &Arc<BfvParameters>, level: usize) -> Result<()> {
        if &self.par != par {
            warn!("share built for other parameters");
            return Err(Error::ParametersMismatch);
        }
        if self.level != level {
            warn!(expected = level, found = self.level, "share at another level");
            return Err(Error::LevelMismatch {
                expected: level,
                found: self.level,
            });
        }
        Ok(())
    }

    /// Check the number of polynomials and their context.
    pub(crate) fn check_shape(&self, shape: ShareShape) -> Result<()> {
        let ctx = self.par.ctx_at_level(self.level)?;
        let digits = ctx.moduli().len();
        let (n0, n1) = shape.lengths(digits);
        if self.p0.len() != n0 || self.p1.len() != n1 {
            warn!(
                expected = n0 + n1,
                found = self.p0.len() + self.p1.len(),
                "share with an unexpected number of polynomials"
            );
            return Err(match shape {
                ShareShape::Digits | ShareShape::DigitPairs => Error::DecompositionMismatch {
                    expected: digits,
                    found: self.p0.len(),
                },
                _ => Error::MalformedShare(format!(
                    "expected {n0} and {n1} polynomials, found {} and {}",
                    self.p0.len(),
                    self.p1.len()
                )),
            });
        }
        for p in self.p0.iter().chain(self.p1.iter()) {
            if p.ctx() != ctx || p.representation() != &Representation::Ntt {
                warn!("share polynomial outside of the share context");
                return Err(Error::MalformedShare(
                    "polynomial in an unexpected context or representation".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn combine_assign(&mut self, other: &Self, shape: ShareShape) -> Result<()> {
        other.check_target(&self.par, self.level)?;
        self.check_shape(shape)?;
        other.check_shape(shape)?;
        izip!(self.p0.iter_mut(), other.p0.iter()).for_each(|(a, b)| *a += b);
        izip!(self.p1.iter_mut(), other.p1.iter()).for_each(|(a, b)| *a += b);
        self.parties += other.parties;
        Ok(())
    }

    /// Check that the share folds as many contributions as there are
    /// parties.
    pub(crate) fn check_complete(&self, num_parties: usize) -> Result<()> {
        if self.parties != num_parties {
            warn!(
                found = self.parties,
                expected = num_parties,
                "finalizing an incomplete aggregation"
            );
            return Err(Error::IncompleteAggregation {
                found: self.parties,
                expected: num_parties,
            });
        }
        Ok(())
    }

    pub(crate) fn to_proto(&self) -> ShareProto {
        ShareProto {
            p0: self.p0.iter().map(|p| p.to_bytes()).collect(),
            p1: self.p1.iter().map(|p| p.to_bytes()).collect(),
            level: self.level as u32,
            parties: self.parties as u32,
        }
    }

    pub(crate) fn from_proto(
        proto: &ShareProto,
        par: &Arc<BfvParameters>,
        shape: ShareShape,
    ) -> Result<Self> {
        let level = proto.level as usize;
        let ctx = par.ctx_at_level(level)?;
        let decode = |bytes: &Vec<u8>| -> Result<Poly> {
            let mut p = Poly::from_bytes(bytes, ctx)?;
            p.disallow_variable_time_computations();
            Ok(p)
        };
        let share = Self {
            par: par.clone(),
            level,
            parties: proto.parties as usize,
            p0: proto.p0.iter().map(decode).collect::<Result<Vec<_>>>()?,
            p1: proto.p1.iter().map(decode).collect::<Result<Vec<_>>>()?,
        };
        share.check_shape(shape)?;
        Ok(share)
    }
}

/// Implements the share API, combination and serialization for a newtype
/// around [`ShareData`].
macro_rules! impl_share {
    ($share:ident, $shape:expr) => {
        impl $share {
            pub(crate) const SHAPE: $crate::mbfv::share::ShareShape = $shape;

            /// The level of the share.
            pub fn level(&self) -> usize {
                self.0.level
            }

            /// The number of party contributions folded into the share.
            pub fn parties(&self) -> usize {
                self.0.parties
            }
        }

        impl $crate::mbfv::ShareCombiner for $share {
            fn combine_assign(&mut self, other: &Self) -> $crate::Result<()> {
                self.0.combine_assign(&other.0, Self::SHAPE)
            }
        }

        impl fhe_traits::FheParametrized for $share {
            type Parameters = $crate::bfv::BfvParameters;
        }

        impl fhe_traits::Serialize for $share {
            fn to_bytes(&self) -> Vec<u8> {
                prost::Message::encode_to_vec(&self.0.to_proto())
            }
        }

        impl fhe_traits::DeserializeParametrized for $share {
            type Error = $crate::Error;

            fn from_bytes(
                bytes: &[u8],
                par: &std::sync::Arc<$crate::bfv::BfvParameters>,
            ) -> $crate::Result<Self> {
                let proto: $crate::proto::mbfv::Share = prost::Message::decode(bytes)
                    .map_err(|_| $crate::Error::SerializationError)?;
                Ok(Self($crate::mbfv::share::ShareData::from_proto(
                    &proto,
                    par,
                    Self::SHAPE,
                )?))
            }
        }
    };
}

pub(crate) use impl_share;
