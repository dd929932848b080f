use crate::bfv::BfvParameters;
use crate::proto::bfv::Ciphertext as CiphertextProto;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{
    DeserializeParametrized, DeserializeWithContext, FheCiphertext, FheParametrized, Serialize,
};
use prost::Message;
use std::sync::Arc;

/// A BFV ciphertext `(c0, c1, ..., ck)`, decrypting to `c0 + c1·s + ... + ck·s^k`.
///
/// Ciphertexts produced by the protocols have two polynomials; tensoring
/// without relinearization yields three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    pub(crate) par: Arc<BfvParameters>,

    /// Polynomials in Ntt representation, all in the context of `level`.
    pub c: Vec<Poly>,

    /// Number of moduli dropped from the full ciphertext modulus.
    pub level: usize,
}

impl Ciphertext {
    /// Assemble a ciphertext, inferring its level from the context of the
    /// polynomials.
    pub fn new(c: Vec<Poly>, par: &Arc<BfvParameters>) -> Result<Self> {
        if c.len() < 2 {
            return Err(Error::TooFewValues(c.len(), 2));
        }
        let ctx = c[0].ctx();
        let level = par.level_of_ctx(ctx)?;
        if let Some(p) = c.iter().find(|p| p.representation() != &Representation::Ntt) {
            return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
                p.representation().clone(),
                Representation::Ntt,
            )));
        }
        if c.iter().any(|p| p.ctx() != ctx) {
            return Err(Error::MathError(fhe_math::Error::InvalidContext));
        }
        Ok(Self {
            par: par.clone(),
            c,
            level,
        })
    }

    /// Drop the last modulus of the current level, rounding the polynomials.
    /// Does nothing at the last level.
    pub fn mod_switch_to_next_level(&mut self) -> Result<()> {
        if self.level == self.par.max_level() {
            return Ok(());
        }
        for p in self.c.iter_mut() {
            p.change_representation(Representation::PowerBasis);
            p.mod_switch_down_next()?;
            p.change_representation(Representation::Ntt);
        }
        self.level += 1;
        Ok(())
    }

    /// A copy of the ciphertext switched down to `level`.
    pub(crate) fn at_level(&self, level: usize) -> Result<Self> {
        if level < self.level || level > self.par.max_level() {
            return Err(Error::LevelMismatch {
                expected: self.level,
                found: level,
            });
        }
        let mut ct = self.clone();
        while ct.level < level {
            ct.mod_switch_to_next_level()?;
        }
        Ok(ct)
    }

    /// The `i`-th polynomial.
    pub fn get(&self, i: usize) -> Option<&Poly> {
        self.c.get(i)
    }

    /// The parameters the ciphertext was produced under.
    pub fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }

    pub(crate) fn to_proto(&self) -> CiphertextProto {
        CiphertextProto {
            c: self.c.iter().map(|p| p.to_bytes()).collect(),
            level: self.level as u32,
        }
    }

    pub(crate) fn from_proto(proto: &CiphertextProto, par: &Arc<BfvParameters>) -> Result<Self> {
        let level = proto.level as usize;
        if level > par.max_level() {
            return Err(Error::LevelMismatch {
                expected: par.max_level(),
                found: level,
            });
        }
        let ctx = par.ctx_at_level(level)?;
        let c = proto
            .c
            .iter()
            .map(|bytes| Poly::from_bytes(bytes, ctx).map_err(Error::MathError))
            .collect::<Result<Vec<_>>>()?;
        Self::new(c, par)
    }
}

impl FheCiphertext for Ciphertext {}

impl FheParametrized for Ciphertext {
    type Parameters = BfvParameters;
}

impl Serialize for Ciphertext {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }
}

impl DeserializeParametrized for Ciphertext {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<BfvParameters>) -> Result<Self> {
        let proto = CiphertextProto::decode(bytes).map_err(|_| Error::SerializationError)?;
        Ciphertext::from_proto(&proto, par)
    }
}
