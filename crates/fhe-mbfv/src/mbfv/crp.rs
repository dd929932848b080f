use std::sync::Arc;

use crate::bfv::BfvParameters;
use crate::proto::mbfv::CommonRandomPoly as CommonRandomPolyProto;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeParametrized, DeserializeWithContext, FheParametrized, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

/// A polynomial sampled from a random _common reference string_.
///
/// All the parties of a protocol run must use the same common random
/// polynomials; they are public.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CommonRandomPoly {
    pub(crate) poly: Poly,
    pub(crate) level: usize,
}

impl CommonRandomPoly {
    /// Generate a new random CRP.
    pub fn new<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Result<Self> {
        Self::new_leveled(par, 0, rng)
    }

    /// Generate a new CRP from a shared deterministic seed.
    pub fn new_deterministic(
        par: &Arc<BfvParameters>,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        Self::new_leveled_deterministic(par, 0, seed)
    }

    /// Generate a new random CRP vector.
    ///
    /// The size of the vector is equal to the number of ciphertext moduli at
    /// the level, as required for the relinearization and rotation key
    /// generation protocols.
    pub fn new_vec<R: RngCore + CryptoRng>(
        par: &Arc<BfvParameters>,
        level: usize,
        rng: &mut R,
    ) -> Result<Vec<Self>> {
        (0..par.digits_at_level(level)?)
            .map(|_| Self::new_leveled(par, level, rng))
            .collect()
    }

    /// Generate a new random leveled CRP.
    pub fn new_leveled<R: RngCore + CryptoRng>(
        par: &Arc<BfvParameters>,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        let poly = Poly::random(ctx, Representation::Ntt, rng);
        Ok(Self { poly, level })
    }

    /// Generate a new deterministic leveled CRP.
    pub fn new_leveled_deterministic(
        par: &Arc<BfvParameters>,
        level: usize,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        let poly = Poly::random_from_seed(ctx, Representation::Ntt, seed);
        Ok(Self { poly, level })
    }

    /// The level of the CRP.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The polynomial, in Ntt representation.
    pub fn poly(&self) -> &Poly {
        &self.poly
    }

    pub(crate) fn check_level(&self, par: &Arc<BfvParameters>, level: usize) -> Result<()> {
        if self.level != level || self.poly.ctx() != par.ctx_at_level(level)? {
            warn!(expected = level, found = self.level, "CRP at another level");
            return Err(Error::LevelMismatch {
                expected: level,
                found: self.level,
            });
        }
        Ok(())
    }
}

/// Check a vector of CRPs against the decomposition of a level.
pub(crate) fn check_crp_vec(
    crps: &[CommonRandomPoly],
    par: &Arc<BfvParameters>,
    level: usize,
) -> Result<()> {
    let digits = par.digits_at_level(level)?;
    if crps.len() != digits {
        warn!(expected = digits, found = crps.len(), "wrong number of CRPs");
        return Err(Error::DecompositionMismatch {
            expected: digits,
            found: crps.len(),
        });
    }
    crps.iter().try_for_each(|crp| crp.check_level(par, level))
}

impl FheParametrized for CommonRandomPoly {
    type Parameters = BfvParameters;
}

impl Serialize for CommonRandomPoly {
    fn to_bytes(&self) -> Vec<u8> {
        CommonRandomPolyProto {
            poly: self.poly.to_bytes(),
            level: self.level as u32,
        }
        .encode_to_vec()
    }
}

impl DeserializeParametrized for CommonRandomPoly {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<BfvParameters>) -> Result<Self> {
        let proto: CommonRandomPolyProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let level = proto.level as usize;
        let poly = Poly::from_bytes(&proto.poly, par.ctx_at_level(level)?)?;
        if poly.representation() != &Representation::Ntt {
            return Err(Error::SerializationError);
        }
        Ok(Self { poly, level })
    }
}

/// Deterministic stream of common random polynomials.
///
/// Parties seeded with the same public 32-byte seed draw the same sequence of
/// polynomials, so that a whole protocol session can agree on its CRPs by
/// agreeing on a single seed.
#[derive(Debug, Clone)]
pub struct CrpGenerator {
    par: Arc<BfvParameters>,
    rng: ChaCha8Rng,
}

impl CrpGenerator {
    /// Create a generator from a public seed.
    pub fn new(par: &Arc<BfvParameters>, seed: <ChaCha8Rng as SeedableRng>::Seed) -> Self {
        debug!(degree = par.degree(), "new CRP generator");
        Self {
            par: par.clone(),
            rng: ChaCha8Rng::from_seed(seed),
        }
    }

    /// The next CRP, at level 0.
    pub fn next_crp(&mut self) -> Result<CommonRandomPoly> {
        self.next_crp_at_level(0)
    }

    /// The next CRP, at a given level.
    pub fn next_crp_at_level(&mut self, level: usize) -> Result<CommonRandomPoly> {
        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        self.rng.fill_bytes(&mut seed);
        CommonRandomPoly::new_leveled_deterministic(&self.par, level, seed)
    }

    /// The next vector of CRPs, one per decomposition digit of the level.
    pub fn next_crp_vec(&mut self, level: usize) -> Result<Vec<CommonRandomPoly>> {
        (0..self.par.digits_at_level(level)?)
            .map(|_| self.next_crp_at_level(level))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{CommonRandomPoly, CrpGenerator};
    use crate::bfv::BfvParameters;
    use fhe_traits::{DeserializeParametrized, Serialize};
    use rand::thread_rng;
    use std::error::Error;

    #[test]
    fn deterministic() -> Result<(), Box<dyn Error>> {
        let par = BfvParameters::default_arc(3, 8);
        let mut g1 = CrpGenerator::new(&par, [1u8; 32]);
        let mut g2 = CrpGenerator::new(&par, [1u8; 32]);
        let mut g3 = CrpGenerator::new(&par, [2u8; 32]);

        let a = g1.next_crp()?;
        assert_eq!(a, g2.next_crp()?);
        assert_ne!(a, g3.next_crp()?);
        assert_ne!(a, g1.next_crp()?);

        let v1 = g1.next_crp_vec(1)?;
        g2.next_crp()?;
        let v2 = g2.next_crp_vec(1)?;
        assert_eq!(v1.len(), 2);
        assert_eq!(v1, v2);
        assert!(v1.iter().all(|crp| crp.level() == 1));
        assert_ne!(v1[0], v1[1]);

        assert!(g1.next_crp_at_level(3).is_err());
        Ok(())
    }

    #[test]
    fn random() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 8);
        let crps = CommonRandomPoly::new_vec(&par, 0, &mut rng)?;
        assert_eq!(crps.len(), 3);
        assert_eq!(
            CommonRandomPoly::new_deterministic(&par, [3u8; 32])?,
            CommonRandomPoly::new_deterministic(&par, [3u8; 32])?
        );
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 8);
        for level in 0..=par.max_level() {
            let crp = CommonRandomPoly::new_leveled(&par, level, &mut rng)?;
            let decoded = CommonRandomPoly::from_bytes(&crp.to_bytes(), &par)?;
            assert_eq!(decoded, crp);
        }
        assert!(CommonRandomPoly::from_bytes(&[1, 2, 3], &par).is_err());
        Ok(())
    }
}
