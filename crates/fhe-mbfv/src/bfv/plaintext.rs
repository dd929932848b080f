//! Plaintext type in the BFV encryption scheme.

use crate::bfv::BfvParameters;
use crate::{Error, Result};
use fhe_math::{
    rq::{traits::TryConvertFrom, Poly, Representation},
    zq::Modulus,
};
use fhe_traits::{FheDecoder, FheEncoder, FheParametrized, FhePlaintext, FhePlaintextEncoding};
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EncodingEnum {
    Poly,
    Simd,
}

/// An encoding for the plaintext.
///
/// `poly` places the values in the coefficients of the plaintext polynomial,
/// while `simd` places them in the evaluation slots, so that homomorphic
/// multiplications act component-wise and rotations permute the two rows of
/// slots cyclically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub(crate) encoding: EncodingEnum,
    pub(crate) level: usize,
}

impl Encoding {
    /// A Poly encoding encodes a vector as coefficients of a polynomial;
    /// homomorphic operations are therefore polynomial operations.
    pub fn poly() -> Self {
        Self {
            encoding: EncodingEnum::Poly,
            level: 0,
        }
    }

    /// A Simd encoding encodes a vector so that homomorphic operations are
    /// component-wise operations on the coefficients of the underlying vectors.
    /// The Simd encoding require that the plaintext modulus is congruent to 1
    /// modulo the degree of the underlying polynomial.
    pub fn simd() -> Self {
        Self {
            encoding: EncodingEnum::Simd,
            level: 0,
        }
    }

    /// A poly encoding at a specific level.
    pub fn poly_at_level(level: usize) -> Self {
        Self {
            encoding: EncodingEnum::Poly,
            level,
        }
    }

    /// A simd encoding at a specific level.
    pub fn simd_at_level(level: usize) -> Self {
        Self {
            encoding: EncodingEnum::Simd,
            level,
        }
    }
}

impl FhePlaintextEncoding for Encoding {}

/// A plaintext object, that encodes a vector according to a specific encoding.
#[derive(Debug, Clone, Eq)]
pub struct Plaintext {
    /// The parameters of the underlying BFV encryption scheme.
    pub(crate) par: Arc<BfvParameters>,
    /// The value after encoding, reduced modulo the plaintext modulus.
    pub(crate) value: Box<[u64]>,
    /// The encoding of the plaintext, if known
    pub(crate) encoding: Option<Encoding>,
    /// The level of the plaintext
    pub(crate) level: usize,
}

impl FheParametrized for Plaintext {
    type Parameters = BfvParameters;
}

impl FhePlaintext for Plaintext {
    type Encoding = Encoding;
}

impl PartialEq for Plaintext {
    fn eq(&self, other: &Self) -> bool {
        let mut eq = self.par == other.par;
        eq &= self.value == other.value;
        eq &= self.level == other.level;
        if self.encoding.is_some() && other.encoding.is_some() {
            eq &= self.encoding == other.encoding
        }
        eq
    }
}

impl Zeroize for Plaintext {
    fn zeroize(&mut self) {
        self.value.zeroize();
    }
}

impl Plaintext {
    /// Returns the level of this plaintext.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Generate a zero plaintext.
    pub fn zero(encoding: Encoding, par: &Arc<BfvParameters>) -> Result<Self> {
        par.ctx_at_level(encoding.level)?;
        Ok(Self {
            par: par.clone(),
            value: vec![0u64; par.degree()].into_boxed_slice(),
            encoding: Some(encoding),
            level: encoding.level,
        })
    }

    /// Build a plaintext directly from coefficients reduced modulo the
    /// plaintext modulus.
    pub(crate) fn from_coefficients(
        value: Vec<u64>,
        level: usize,
        par: &Arc<BfvParameters>,
    ) -> Self {
        Self {
            par: par.clone(),
            value: value.into_boxed_slice(),
            encoding: None,
            level,
        }
    }

    /// Returns the polynomial `Δ·m` in Ntt representation, at the level of the
    /// plaintext.
    pub(crate) fn to_poly(&self) -> Result<Poly> {
        let level = self.par.level(self.level)?;
        let mut m_v = Zeroizing::new(self.value.to_vec());
        self.par.plaintext.scalar_mul_vec(&mut m_v, level.q_mod_t);
        let mut m = Poly::try_convert_from(
            m_v.as_slice(),
            &level.ctx,
            false,
            Representation::PowerBasis,
        )?;
        m.change_representation(Representation::Ntt);
        m *= &level.delta;
        Ok(m)
    }

    /// Recover the plaintext from a decryption phase `c0 + c1·s`.
    ///
    /// The phase is scaled by `t/Q` and rounded, then reduced first modulo the
    /// first ciphertext modulus and finally modulo `t`.
    pub(crate) fn from_phase(phase: &Poly, par: &Arc<BfvParameters>) -> Result<Self> {
        let level = par.level_of_ctx(phase.ctx())?;
        let mut c = Zeroizing::new(phase.clone());
        c.disallow_variable_time_computations();
        c.change_representation(Representation::PowerBasis);
        let d = Zeroizing::new(c.scale(&par.level(level)?.decryption_scaler)?);
        let mut w = Zeroizing::new(
            Vec::<u64>::from(d.as_ref())
                .iter()
                .map(|vi| *vi + par.plaintext.modulus())
                .collect::<Vec<u64>>(),
        );
        w.truncate(par.degree());
        let q = Modulus::new(par.moduli[0])?;
        q.reduce_vec(&mut w);
        par.plaintext.reduce_vec(&mut w);
        Ok(Self::from_coefficients(w.to_vec(), level, par))
    }
}

impl<'a> FheEncoder<&'a [u64]> for Plaintext {
    type Error = Error;

    fn try_encode(value: &'a [u64], encoding: Encoding, par: &Arc<BfvParameters>) -> Result<Self> {
        if value.len() > par.degree() {
            return Err(Error::TooManyValues(value.len(), par.degree()));
        }
        par.ctx_at_level(encoding.level)?;

        let mut v = vec![0u64; par.degree()];
        match encoding.encoding {
            EncodingEnum::Poly => {
                v[..value.len()].copy_from_slice(value);
                par.plaintext.reduce_vec(&mut v);
            }
            EncodingEnum::Simd => {
                let simd = par.simd.as_ref().ok_or(Error::UnspecifiedInput(
                    "The plaintext does not allow for SIMD encoding".to_string(),
                ))?;
                for (vi, &j) in value.iter().zip(simd.positions.iter()) {
                    v[j] = par.plaintext.reduce(*vi);
                }
                simd.ntt.backward(&mut v);
            }
        }

        Ok(Self {
            par: par.clone(),
            value: v.into_boxed_slice(),
            encoding: Some(encoding),
            level: encoding.level,
        })
    }
}

impl<'a> FheEncoder<&'a Vec<u64>> for Plaintext {
    type Error = Error;

    fn try_encode(
        value: &'a Vec<u64>,
        encoding: Encoding,
        par: &Arc<BfvParameters>,
    ) -> Result<Self> {
        Plaintext::try_encode(value.as_slice(), encoding, par)
    }
}

impl FheDecoder<Plaintext> for Vec<u64> {
    type Error = Error;

    fn try_decode<O>(pt: &Plaintext, encoding: O) -> Result<Vec<u64>>
    where
        O: Into<Option<Encoding>>,
    {
        let encoding = match (encoding.into(), pt.encoding) {
            (None, None) => {
                return Err(Error::UnspecifiedInput("No encoding specified".to_string()))
            }
            (Some(e), Some(f)) if e.encoding != f.encoding => {
                return Err(Error::UnspecifiedInput(format!(
                    "Mismatched encodings: {:?} and {:?}",
                    e.encoding, f.encoding
                )))
            }
            (Some(e), _) => e,
            (None, Some(f)) => f,
        };

        let mut w = pt.value.to_vec();
        match encoding.encoding {
            EncodingEnum::Poly => Ok(w),
            EncodingEnum::Simd => {
                let simd = pt.par.simd.as_ref().ok_or(Error::UnspecifiedInput(
                    "The plaintext does not allow for SIMD encoding".to_string(),
                ))?;
                simd.ntt.forward(&mut w);
                let out = simd.positions.iter().map(|&j| w[j]).collect();
                w.zeroize();
                Ok(out)
            }
        }
    }
}
