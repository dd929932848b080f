//! Key-switching keys for the BFV encryption scheme
//!
//! A key-switching key from `s'` to `s` is a vector of RLWE encryptions under
//! `s` of `g_i · s'`, where `g_i` is the CRT (Garner) gadget element of the
//! i-th modulus of the key context. Switching a polynomial `p` decomposes it in
//! its RNS digits `[p]_{q_i}` and computes `Σ [p]_{q_i} · ksk_i`, an encryption
//! of `p · s'` under `s`.

use crate::bfv::{BfvParameters, SecretKey};
use crate::proto::bfv::KeySwitchingKey as KeySwitchingKeyProto;
use crate::{Error, Result};
use fhe_math::{
    rns::RnsContext,
    rq::{traits::TryConvertFrom, Poly, Representation},
};
use fhe_traits::{DeserializeWithContext, Serialize};
use itertools::izip;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Compute the products `g_i · p` for every gadget element `g_i` of the
/// context of `p`. The input must be in PowerBasis representation, the outputs
/// are in Ntt representation.
pub(crate) fn gadget_products(p: &Poly) -> Result<Vec<Zeroizing<Poly>>> {
    if p.representation() != &Representation::PowerBasis {
        return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
            p.representation().clone(),
            Representation::PowerBasis,
        )));
    }
    let rns = RnsContext::new(p.ctx().moduli())?;
    (0..p.ctx().moduli().len())
        .map(|i| {
            let gi = rns
                .get_garner(i)
                .ok_or(Error::DefaultError("Missing gadget element".to_string()))?;
            let mut g_i_p = Zeroizing::new(p * gi);
            g_i_p.change_representation(Representation::Ntt);
            Ok(g_i_p)
        })
        .collect()
}

/// Key switching key for the BFV encryption scheme.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct KeySwitchingKey {
    /// The parameters of the underlying BFV encryption scheme.
    pub(crate) par: Arc<BfvParameters>,

    /// The key switching elements c0.
    pub(crate) c0: Box<[Poly]>,

    /// The key switching elements c1.
    pub(crate) c1: Box<[Poly]>,

    /// The level of the key, which is also the level of the ciphertexts it
    /// applies to.
    pub(crate) level: usize,
}

impl KeySwitchingKey {
    /// Generate a [`KeySwitchingKey`] to this [`SecretKey`] from a polynomial
    /// `from`, given in PowerBasis representation at the key level.
    pub fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        from: &Poly,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let ctx = sk.par.ctx_at_level(level)?;
        if ctx.moduli().len() == 1 {
            return Err(Error::DefaultError(
                "These parameters do not support key switching".to_string(),
            ));
        }
        if from.ctx() != ctx {
            return Err(Error::MathError(fhe_math::Error::InvalidContext));
        }

        let s = sk.poly_ntt(ctx)?;
        let g_from = gadget_products(from)?;

        let mut c0 = Vec::with_capacity(g_from.len());
        let mut c1 = Vec::with_capacity(g_from.len());
        for g_i_from in g_from.iter() {
            let mut a = Poly::random(ctx, Representation::Ntt, rng);
            let a_s = Zeroizing::new(&a * s.as_ref());
            let mut b = Poly::small(ctx, Representation::Ntt, sk.par.variance, rng)?;
            b -= &a_s;
            b += g_i_from.as_ref();
            unsafe {
                a.allow_variable_time_computations();
                b.allow_variable_time_computations();
            }
            c0.push(b);
            c1.push(a);
        }

        Ok(Self {
            par: sk.par.clone(),
            c0: c0.into_boxed_slice(),
            c1: c1.into_boxed_slice(),
            level,
        })
    }

    /// Assemble a key from its components, checking that they all live in the
    /// context of the key level.
    pub(crate) fn from_parts(
        par: &Arc<BfvParameters>,
        c0: Vec<Poly>,
        c1: Vec<Poly>,
        level: usize,
    ) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        let digits = ctx.moduli().len();
        if c0.len() != digits || c1.len() != digits {
            return Err(Error::DecompositionMismatch {
                expected: digits,
                found: c0.len().min(c1.len()),
            });
        }
        for p in c0.iter().chain(c1.iter()) {
            if p.ctx() != ctx {
                return Err(Error::MathError(fhe_math::Error::InvalidContext));
            }
            if p.representation() != &Representation::Ntt {
                return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
                    p.representation().clone(),
                    Representation::Ntt,
                )));
            }
        }
        Ok(Self {
            par: par.clone(),
            c0: c0.into_boxed_slice(),
            c1: c1.into_boxed_slice(),
            level,
        })
    }

    /// The level of the key.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The number of decomposition digits of the key.
    pub fn digits(&self) -> usize {
        self.c0.len()
    }

    /// Key switch a polynomial in PowerBasis representation, returning the
    /// pair `(d0, d1)` in Ntt representation.
    pub fn key_switch(&self, p: &Poly) -> Result<(Poly, Poly)> {
        let ctx = self.par.ctx_at_level(self.level)?;
        if p.ctx() != ctx {
            return Err(Error::LevelMismatch {
                expected: self.level,
                found: self.par.level_of_ctx(p.ctx())?,
            });
        }
        if p.representation() != &Representation::PowerBasis {
            return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
                p.representation().clone(),
                Representation::PowerBasis,
            )));
        }

        let mut c0 = Poly::zero(ctx, Representation::Ntt);
        let mut c1 = Poly::zero(ctx, Representation::Ntt);
        for (digit, c0_i, c1_i) in izip!(
            p.coefficients().outer_iter(),
            self.c0.iter(),
            self.c1.iter()
        ) {
            let mut d = Poly::try_convert_from(
                &digit.to_vec(),
                ctx,
                true,
                Representation::PowerBasis,
            )?;
            d.change_representation(Representation::Ntt);
            c0 += &(&d * c0_i);
            d *= c1_i;
            c1 += &d;
        }
        Ok((c0, c1))
    }
}

impl KeySwitchingKey {
    pub(crate) fn to_proto(&self) -> KeySwitchingKeyProto {
        KeySwitchingKeyProto {
            c0: self.c0.iter().map(|p| p.to_bytes()).collect(),
            c1: self.c1.iter().map(|p| p.to_bytes()).collect(),
            level: self.level as u32,
        }
    }

    pub(crate) fn from_proto(
        proto: &KeySwitchingKeyProto,
        par: &Arc<BfvParameters>,
    ) -> Result<Self> {
        let level = proto.level as usize;
        let ctx = par.ctx_at_level(level)?;
        let decode = |polys: &[Vec<u8>]| {
            polys
                .iter()
                .map(|b| Poly::from_bytes(b, ctx).map_err(Error::MathError))
                .collect::<Result<Vec<Poly>>>()
        };
        Self::from_parts(par, decode(&proto.c0)?, decode(&proto.c1)?, level)
    }
}
