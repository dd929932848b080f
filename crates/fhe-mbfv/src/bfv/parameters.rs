//! Parameter sets.
//!
//! Every party of a session must build its [`BfvParameters`] from the same
//! degree, plaintext modulus and ciphertext moduli; shares produced under
//! different parameters are rejected by the protocols.

use crate::proto::bfv::Parameters;
use crate::{Error, ParametersError, Result};
use fhe_math::{
    rns::{RnsContext, ScalingFactor},
    rq::{scaler::Scaler, traits::TryConvertFrom, Context, Poly, Representation},
    zq::{ntt::NttOperator, primes::generate_prime, Modulus},
};
use fhe_traits::{Deserialize, FheParameters, Serialize};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use prost::Message;
use std::fmt::Debug;
use std::sync::Arc;

const MIN_MODULUS_BITS: usize = 10;
const MAX_MODULUS_BITS: usize = 62;

/// Precomputations for ciphertexts at one level, i.e. with the last `level`
/// moduli dropped.
#[derive(PartialEq, Eq)]
pub(crate) struct LevelContext {
    pub(crate) ctx: Arc<Context>,
    /// `-t^{-1} mod Q`, in NttShoup representation. Multiplied by
    /// `[Q]_t · m` it yields `⌊Q/t⌉·m` up to a small error.
    pub(crate) delta: Poly,
    /// `Q mod t`.
    pub(crate) q_mod_t: u64,
    /// Scales a decryption phase by `t/Q`.
    pub(crate) decryption_scaler: Scaler,
    pub(crate) tensor: TensorContext,
}

/// Extended basis used to tensor two ciphertexts without wrapping around `Q`.
#[derive(PartialEq, Eq)]
pub(crate) struct TensorContext {
    pub(crate) ctx: Arc<Context>,
    pub(crate) extender: Scaler,
    pub(crate) down_scaler: Scaler,
}

/// Map from SIMD slots to plaintext coefficients, when `t ≡ 1 mod 2n`.
#[derive(PartialEq, Eq)]
pub(crate) struct SimdLayout {
    pub(crate) ntt: NttOperator,
    /// Slot `i` lives in coefficient `positions[i]` of the Ntt of the
    /// plaintext.
    pub(crate) positions: Box<[usize]>,
}

/// Parameters of the BFV scheme, shared by all the parties of a session.
#[derive(PartialEq, Eq)]
pub struct BfvParameters {
    polynomial_degree: usize,
    plaintext_modulus: u64,
    pub(crate) moduli: Box<[u64]>,
    moduli_sizes: Box<[usize]>,
    /// Variance of the centered binomial error distribution.
    pub(crate) variance: usize,
    pub(crate) plaintext: Modulus,
    pub(crate) levels: Box<[LevelContext]>,
    pub(crate) simd: Option<SimdLayout>,
}

impl Debug for BfvParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BfvParameters")
            .field("polynomial_degree", &self.polynomial_degree)
            .field("plaintext_modulus", &self.plaintext_modulus)
            .field("moduli", &self.moduli)
            .field("variance", &self.variance)
            .finish()
    }
}

impl FheParameters for BfvParameters {}

impl BfvParameters {
    /// Degree `n` of the polynomials.
    pub const fn degree(&self) -> usize {
        self.polynomial_degree
    }

    /// Ciphertext moduli `q_0, ..., q_L`.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Bit sizes of the ciphertext moduli.
    pub fn moduli_sizes(&self) -> &[usize] {
        &self.moduli_sizes
    }

    /// Plaintext modulus `t`.
    pub const fn plaintext(&self) -> u64 {
        self.plaintext_modulus
    }

    /// Variance of the fresh encryption noise.
    pub const fn variance(&self) -> usize {
        self.variance
    }

    /// Last level, at which a single modulus remains.
    pub fn max_level(&self) -> usize {
        self.moduli.len() - 1
    }

    pub(crate) fn level(&self, level: usize) -> Result<&LevelContext> {
        self.levels.get(level).ok_or(Error::LevelMismatch {
            expected: self.max_level(),
            found: level,
        })
    }

    /// Polynomial context of the ciphertexts at `level`.
    pub fn ctx_at_level(&self, level: usize) -> Result<&Arc<Context>> {
        Ok(&self.level(level)?.ctx)
    }

    pub(crate) fn level_of_ctx(&self, ctx: &Arc<Context>) -> Result<usize> {
        self.levels
            .iter()
            .position(|l| &l.ctx == ctx)
            .ok_or(Error::MathError(fhe_math::Error::InvalidContext))
    }

    /// Number of key switching digits at `level`, one per remaining modulus.
    pub fn digits_at_level(&self, level: usize) -> Result<usize> {
        Ok(self.ctx_at_level(level)?.moduli().len())
    }

    #[cfg(test)]
    #[allow(missing_docs)]
    pub fn default_arc(num_moduli: usize, degree: usize) -> Arc<Self> {
        BfvParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(1153)
            .set_moduli_sizes(&vec![62usize; num_moduli])
            .build_arc()
            .expect("test parameters are valid")
    }
}

/// Builder for [`BfvParameters`].
///
/// The ciphertext moduli are given either explicitly with
/// [`set_moduli`](Self::set_moduli) or as bit sizes with
/// [`set_moduli_sizes`](Self::set_moduli_sizes), in which case the largest
/// NTT-friendly primes of these sizes are picked deterministically, so that
/// every party derives the same moduli.
#[derive(Debug)]
pub struct BfvParametersBuilder {
    degree: usize,
    plaintext: u64,
    variance: usize,
    ciphertext_moduli: Vec<u64>,
    ciphertext_moduli_sizes: Vec<usize>,
}

impl BfvParametersBuilder {
    /// A builder with the default variance of 10 and nothing else set.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            degree: 0,
            plaintext: 0,
            variance: 10,
            ciphertext_moduli: vec![],
            ciphertext_moduli_sizes: vec![],
        }
    }

    /// Polynomial degree, a power of two of at least 8.
    pub fn set_degree(&mut self, degree: usize) -> &mut Self {
        self.degree = degree;
        self
    }

    /// Plaintext modulus.
    pub fn set_plaintext_modulus(&mut self, plaintext: u64) -> &mut Self {
        self.plaintext = plaintext;
        self
    }

    /// Bit sizes of the ciphertext moduli, between 10 and 62.
    pub fn set_moduli_sizes(&mut self, sizes: &[usize]) -> &mut Self {
        self.ciphertext_moduli_sizes = sizes.to_owned();
        self
    }

    /// Explicit ciphertext moduli.
    pub fn set_moduli(&mut self, moduli: &[u64]) -> &mut Self {
        self.ciphertext_moduli = moduli.to_owned();
        self
    }

    /// Variance of the error distribution, between 1 and 16.
    pub fn set_variance(&mut self, variance: usize) -> &mut Self {
        self.variance = variance;
        self
    }

    /// Build the parameters behind an [`Arc`], as consumed by the rest of the
    /// crate.
    pub fn build_arc(&self) -> Result<Arc<BfvParameters>> {
        self.build().map(Arc::new)
    }

    /// Validate the configuration and precompute every level.
    pub fn build(&self) -> Result<BfvParameters> {
        if self.degree < 8 || !self.degree.is_power_of_two() {
            return Err(Error::ParametersError(ParametersError::InvalidDegree(
                self.degree,
            )));
        }
        // Bounds of the centered binomial sampler.
        if !(1..=16).contains(&self.variance) {
            return Err(Error::ParametersError(ParametersError::InvalidVariance(
                self.variance,
                1,
                16,
            )));
        }
        let plaintext = Modulus::new(self.plaintext).map_err(|e| {
            Error::ParametersError(ParametersError::InvalidPlaintext(e.to_string()))
        })?;

        let moduli = match (
            self.ciphertext_moduli.is_empty(),
            self.ciphertext_moduli_sizes.is_empty(),
        ) {
            (false, false) => {
                return Err(Error::ParametersError(ParametersError::TooManySpecified(
                    "Set either the ciphertext moduli or their sizes, not both".to_string(),
                )))
            }
            (true, true) => {
                return Err(Error::ParametersError(ParametersError::TooFewSpecified(
                    "Set either the ciphertext moduli or their sizes".to_string(),
                )))
            }
            (false, true) => self.ciphertext_moduli.clone(),
            (true, false) => generate_moduli(&self.ciphertext_moduli_sizes, self.degree)?,
        };
        let moduli_sizes: Vec<usize> = moduli
            .iter()
            .map(|q| 64 - q.leading_zeros() as usize)
            .collect();

        let extension = extension_primes(&moduli, self.degree)?;
        let plaintext_ctx = Arc::new(Context::new(&moduli[..1], self.degree)?);
        let neg_t_inv = moduli
            .iter()
            .map(|&q| {
                let q = Modulus::new(q)?;
                q.inv(q.neg(plaintext.modulus())).ok_or_else(|| {
                    Error::ParametersError(ParametersError::InvalidPlaintext(format!(
                        "The plaintext modulus is not invertible modulo {}",
                        q.modulus()
                    )))
                })
            })
            .collect::<Result<Vec<u64>>>()?;

        let levels = (0..moduli.len())
            .map(|level| {
                let remaining = moduli.len() - level;
                level_context(
                    &moduli[..remaining],
                    &moduli_sizes[..remaining],
                    &neg_t_inv[..remaining],
                    &extension,
                    &plaintext,
                    &plaintext_ctx,
                    self.degree,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let simd = NttOperator::new(&plaintext, self.degree).map(|ntt| SimdLayout {
            ntt,
            positions: slot_positions(self.degree),
        });

        Ok(BfvParameters {
            polynomial_degree: self.degree,
            plaintext_modulus: self.plaintext,
            moduli: moduli.into_boxed_slice(),
            moduli_sizes: moduli_sizes.into_boxed_slice(),
            variance: self.variance,
            plaintext,
            levels: levels.into_boxed_slice(),
            simd,
        })
    }
}

/// Largest distinct NTT-friendly primes of the requested sizes.
fn generate_moduli(sizes: &[usize], degree: usize) -> Result<Vec<u64>> {
    let mut moduli: Vec<u64> = Vec::with_capacity(sizes.len());
    for &size in sizes {
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&size) {
            return Err(Error::ParametersError(ParametersError::InvalidModulusSize(
                size,
                MIN_MODULUS_BITS,
                MAX_MODULUS_BITS,
            )));
        }
        let mut bound = 1u64 << size;
        let prime = loop {
            let p = generate_prime(size, 2 * degree as u64, bound).ok_or(
                Error::ParametersError(ParametersError::NotEnoughPrimes(size, degree)),
            )?;
            if !moduli.contains(&p) {
                break p;
            }
            bound = p;
        };
        moduli.push(prime);
    }
    Ok(moduli)
}

/// `L + 2` primes of 62 bits, disjoint from the ciphertext moduli, enough to
/// extend any level by about 60 bits.
fn extension_primes(moduli: &[u64], degree: usize) -> Result<Vec<u64>> {
    let mut primes = Vec::with_capacity(moduli.len() + 1);
    let mut bound = 1u64 << MAX_MODULUS_BITS;
    while primes.len() <= moduli.len() {
        bound = generate_prime(MAX_MODULUS_BITS, 2 * degree as u64, bound).ok_or(
            Error::ParametersError(ParametersError::NotEnoughPrimes(MAX_MODULUS_BITS, degree)),
        )?;
        if !moduli.contains(&bound) {
            primes.push(bound)
        }
    }
    Ok(primes)
}

fn level_context(
    moduli: &[u64],
    moduli_sizes: &[usize],
    neg_t_inv: &[u64],
    extension: &[u64],
    plaintext: &Modulus,
    plaintext_ctx: &Arc<Context>,
    degree: usize,
) -> Result<LevelContext> {
    let rns = RnsContext::new(moduli)?;
    let ctx = Arc::new(Context::new(moduli, degree)?);
    let t = BigUint::from(plaintext.modulus());

    let mut delta = Poly::try_convert_from(
        &[rns.lift(neg_t_inv.into())],
        &ctx,
        true,
        Representation::PowerBasis,
    )?;
    delta.change_representation(Representation::NttShoup);

    let q_mod_t = (rns.modulus() % &t)
        .to_u64()
        .ok_or(Error::DefaultError("Q mod t does not fit in 64 bits".to_string()))?;

    let decryption_scaler = Scaler::new(
        &ctx,
        plaintext_ctx,
        ScalingFactor::new(&t, rns.modulus()),
    )?;

    let extra = (moduli_sizes.iter().sum::<usize>() + 60).div_ceil(MAX_MODULUS_BITS);
    let tensor_moduli = [moduli, &extension[..extra]].concat();
    let tensor_ctx = Arc::new(Context::new(&tensor_moduli, degree)?);
    let tensor = TensorContext {
        extender: Scaler::new(&ctx, &tensor_ctx, ScalingFactor::one())?,
        down_scaler: Scaler::new(&tensor_ctx, &ctx, ScalingFactor::new(&t, ctx.modulus()))?,
        ctx: tensor_ctx,
    };

    Ok(LevelContext {
        ctx,
        delta,
        q_mod_t,
        decryption_scaler,
        tensor,
    })
}

/// Slot `i` of the first row is the evaluation at `ζ^{3^i}`, and slot `i` of
/// the second row the evaluation at `ζ^{-3^i}`, where `ζ` is a primitive
/// `2n`-th root of unity mod t. The Ntt lists the evaluations in bit-reversed
/// order of `(k - 1) / 2` for the odd exponent `k`.
fn slot_positions(degree: usize) -> Box<[usize]> {
    let shift = degree.leading_zeros() + 1;
    let bit_reversed = |k: usize| ((k - 1) >> 1).reverse_bits() >> shift;
    let two_n = 2 * degree;
    let mut positions = vec![0usize; degree];
    let (first, second) = positions.split_at_mut(degree / 2);
    let mut power = 1usize;
    for (a, b) in first.iter_mut().zip(second.iter_mut()) {
        *a = bit_reversed(power);
        *b = bit_reversed(two_n - power);
        power = (power * 3) % two_n;
    }
    positions.into_boxed_slice()
}

impl Serialize for BfvParameters {
    fn to_bytes(&self) -> Vec<u8> {
        Parameters {
            degree: self.polynomial_degree as u32,
            plaintext: self.plaintext_modulus,
            moduli: self.moduli.to_vec(),
            variance: self.variance as u32,
        }
        .encode_to_vec()
    }
}

impl Deserialize for BfvParameters {
    type Error = Error;

    fn try_deserialize(bytes: &[u8]) -> Result<Self> {
        let proto = Parameters::decode(bytes).map_err(|_| Error::SerializationError)?;
        BfvParametersBuilder::new()
            .set_degree(proto.degree as usize)
            .set_plaintext_modulus(proto.plaintext)
            .set_moduli(&proto.moduli)
            .set_variance(proto.variance as usize)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::{slot_positions, BfvParameters, BfvParametersBuilder};
    use crate::{Error, ParametersError};
    use fhe_traits::{Deserialize, Serialize};

    #[test]
    fn levels() -> Result<(), Box<dyn std::error::Error>> {
        let par = BfvParameters::default_arc(3, 16);
        assert_eq!(par.degree(), 16);
        assert_eq!(par.moduli().len(), 3);
        assert_eq!(par.max_level(), 2);
        for level in 0..=par.max_level() {
            let ctx = par.ctx_at_level(level)?;
            assert_eq!(par.digits_at_level(level)?, 3 - level);
            assert_eq!(ctx.moduli(), &par.moduli()[..3 - level]);
            assert_eq!(par.level_of_ctx(ctx)?, level);
            // The tensoring basis extends the level by at least 60 bits.
            let extension = par.level(level)?.tensor.ctx.moduli().len() - ctx.moduli().len();
            assert!(62 * extension >= 62 * (3 - level) + 60);
        }
        assert!(matches!(
            par.ctx_at_level(3),
            Err(Error::LevelMismatch {
                expected: 2,
                found: 3
            })
        ));
        Ok(())
    }

    #[test]
    fn moduli_from_sizes() -> Result<(), Box<dyn std::error::Error>> {
        let sizes = [62, 62, 62, 61, 60, 11];
        let expected = [
            4611686018427387761,
            4611686018427387617,
            4611686018427387409,
            2305843009213693921,
            1152921504606846577,
            2017,
        ];
        let par = BfvParametersBuilder::new()
            .set_degree(8)
            .set_plaintext_modulus(2)
            .set_moduli_sizes(&sizes)
            .build()?;
        assert_eq!(par.moduli(), &expected);

        let par = BfvParametersBuilder::new()
            .set_degree(8)
            .set_plaintext_modulus(2)
            .set_moduli(&expected)
            .build()?;
        assert_eq!(par.moduli_sizes(), &sizes);
        Ok(())
    }

    #[test]
    fn slots_are_a_permutation() {
        for degree in [8, 16, 1024] {
            let mut positions = slot_positions(degree).to_vec();
            positions.sort_unstable();
            assert_eq!(positions, (0..degree).collect::<Vec<_>>());
        }
    }

    #[test]
    fn simd_needs_ntt_friendly_plaintext() -> Result<(), Box<dyn std::error::Error>> {
        let builder = |t| {
            BfvParametersBuilder::new()
                .set_degree(16)
                .set_plaintext_modulus(t)
                .set_moduli_sizes(&[62])
                .build()
        };
        assert!(builder(1153)?.simd.is_some());
        assert!(builder(1000)?.simd.is_none());
        Ok(())
    }

    #[test]
    fn invalid_parameters() {
        let build = |degree, sizes: &[usize], moduli: &[u64], variance| {
            BfvParametersBuilder::new()
                .set_degree(degree)
                .set_plaintext_modulus(1153)
                .set_moduli_sizes(sizes)
                .set_moduli(moduli)
                .set_variance(variance)
                .build()
        };
        assert!(matches!(
            build(6, &[62], &[], 10),
            Err(Error::ParametersError(ParametersError::InvalidDegree(6)))
        ));
        assert!(matches!(
            build(8, &[62], &[], 17),
            Err(Error::ParametersError(ParametersError::InvalidVariance(
                17, 1, 16
            )))
        ));
        assert!(matches!(
            build(8, &[], &[], 10),
            Err(Error::ParametersError(ParametersError::TooFewSpecified(_)))
        ));
        assert!(matches!(
            build(8, &[62], &[4611686018427387761], 10),
            Err(Error::ParametersError(ParametersError::TooManySpecified(_)))
        ));
        assert!(matches!(
            build(8, &[63], &[], 10),
            Err(Error::ParametersError(ParametersError::InvalidModulusSize(
                63, 10, 62
            )))
        ));
        assert!(matches!(
            build(8, &[9], &[], 10),
            Err(Error::ParametersError(ParametersError::InvalidModulusSize(
                9, 10, 62
            )))
        ));
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn std::error::Error>> {
        let par = BfvParametersBuilder::new()
            .set_degree(16)
            .set_plaintext_modulus(1153)
            .set_moduli_sizes(&[62, 60, 50])
            .set_variance(4)
            .build()?;
        assert_eq!(BfvParameters::try_deserialize(&par.to_bytes())?, par);
        assert!(BfvParameters::try_deserialize(&[0xff]).is_err());
        Ok(())
    }
}
