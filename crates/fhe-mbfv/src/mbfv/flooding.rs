//! Flooding noise for the protocols that reveal partial decryptions.

use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use rand::{CryptoRng, Rng, RngCore};
use rand_distr::{Distribution, Normal};
use tracing::warn;
use zeroize::Zeroizing;

use crate::bfv::BfvParameters;
use crate::{Error, Result};

/// Smallest accepted statistical security parameter.
pub const MIN_STATISTICAL_SECURITY: usize = 32;

/// Largest bit size of a flooding sample.
const MAX_BOUND_BITS: usize = 62;

/// Bits of a tail-cut of 8 standard deviations.
const TAIL_CUT_BITS: usize = 3;

/// Mantissa bits of an `f64` sample.
const MANTISSA_BITS: usize = 52;

/// Configuration of the flooding noise of CKS, PCKS and Refresh.
///
/// The noise added to a share must statistically hide the secret-dependent
/// noise it masks. With `λ` the statistical security parameter and `2^b` a
/// bound on the masked noise, the flooding noise is a discrete Gaussian of
/// standard deviation `σ = 2^(λ + b)`, tail-cut at `8σ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodingConfig {
    statistical_security: usize,
    noise_bound_bits: usize,
}

impl Default for FloodingConfig {
    /// `λ = 40` and a masked noise of at most 16 bits.
    fn default() -> Self {
        Self {
            statistical_security: 40,
            noise_bound_bits: 16,
        }
    }
}

impl FloodingConfig {
    /// Create a configuration from the statistical security parameter and
    /// the bit size of the noise to hide.
    pub fn new(statistical_security: usize, noise_bound_bits: usize) -> Result<Self> {
        if statistical_security < MIN_STATISTICAL_SECURITY {
            warn!(statistical_security, "statistical security too low");
            return Err(Error::SecurityParameter(format!(
                "statistical security {statistical_security} is below {MIN_STATISTICAL_SECURITY}"
            )));
        }
        let config = Self {
            statistical_security,
            noise_bound_bits,
        };
        if config.bound_bits() > MAX_BOUND_BITS {
            warn!(
                bound_bits = config.bound_bits(),
                "flooding noise exceeds the sampler range"
            );
            return Err(Error::SecurityParameter(format!(
                "flooding noise of {} bits exceeds {MAX_BOUND_BITS} bits",
                config.bound_bits()
            )));
        }
        Ok(config)
    }

    /// The statistical security parameter `λ`.
    pub fn statistical_security(&self) -> usize {
        self.statistical_security
    }

    /// The bit size `b` of the hidden noise.
    pub fn noise_bound_bits(&self) -> usize {
        self.noise_bound_bits
    }

    /// `log2(σ)`.
    pub fn sigma_bits(&self) -> usize {
        self.statistical_security + self.noise_bound_bits
    }

    /// Bit size of the largest sample.
    pub fn bound_bits(&self) -> usize {
        self.sigma_bits() + TAIL_CUT_BITS
    }

    /// Check that the sum of the flooding noise of `num_parties` parties
    /// stays below `Δ/2` at the given level, so that decryption remains
    /// correct.
    pub fn validate_for(
        &self,
        par: &Arc<BfvParameters>,
        level: usize,
        num_parties: usize,
    ) -> Result<()> {
        let ctx = par.ctx_at_level(level)?;
        let q_bits = ctx.modulus().bits() as usize;
        let t_bits = 64 - par.plaintext().leading_zeros() as usize;
        let parties_bits = num_parties.max(1).next_power_of_two().trailing_zeros() as usize;
        let available = q_bits.saturating_sub(t_bits + 1);
        let needed = self.bound_bits() + parties_bits;
        if needed >= available {
            warn!(
                needed,
                available, level, num_parties, "flooding noise too large for the ring"
            );
            return Err(Error::SecurityParameter(format!(
                "flooding noise of {needed} bits does not fit below Δ/2 ({available} bits) at level {level}"
            )));
        }
        Ok(())
    }

    /// Sample a flooding polynomial in Ntt representation.
    pub(crate) fn sample<R: RngCore + CryptoRng>(
        &self,
        par: &Arc<BfvParameters>,
        ctx: &Arc<Context>,
        rng: &mut R,
    ) -> Result<Zeroizing<Poly>> {
        let sigma = (self.sigma_bits() as f64).exp2();
        let bound = 8.0 * sigma;
        let normal =
            Normal::new(0.0, sigma).map_err(|e| Error::SecurityParameter(e.to_string()))?;
        let low_bits = self.bound_bits().saturating_sub(MANTISSA_BITS) as u32;
        let slack = dither_bound(low_bits) as f64;

        let mut coeffs = Zeroizing::new(Vec::with_capacity(par.degree()));
        while coeffs.len() < par.degree() {
            let x: f64 = normal.sample(rng);
            if x.abs() + slack > bound {
                continue;
            }
            coeffs.push(x.round() as i64 + dither(low_bits, rng));
        }

        let mut p = Zeroizing::new(Poly::try_convert_from(
            coeffs.as_slice(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        p.change_representation(Representation::Ntt);
        Ok(p)
    }
}

fn dither_bound(low_bits: u32) -> i64 {
    if low_bits > 0 {
        1i64 << (low_bits - 1)
    } else {
        0
    }
}

/// Centered noise filling the bits below the precision of an `f64` sample.
fn dither<R: RngCore>(low_bits: u32, rng: &mut R) -> i64 {
    let half = dither_bound(low_bits);
    rng.gen_range(-half..=half)
}

#[cfg(test)]
mod tests {
    use super::{dither, FloodingConfig};
    use crate::bfv::{BfvParameters, BfvParametersBuilder};
    use crate::Error;
    use fhe_math::rq::Representation;
    use num_bigint::BigUint;
    use rand::thread_rng;

    #[test]
    fn construction() {
        let config = FloodingConfig::default();
        assert_eq!(config.statistical_security(), 40);
        assert_eq!(config.sigma_bits(), 56);
        assert_eq!(config.bound_bits(), 59);
        assert!(FloodingConfig::new(32, 0).is_ok());
        assert!(matches!(
            FloodingConfig::new(31, 16),
            Err(Error::SecurityParameter(_))
        ));
        assert!(matches!(
            FloodingConfig::new(40, 20),
            Err(Error::SecurityParameter(_))
        ));
        assert!(FloodingConfig::new(40, 19).is_ok());
    }

    #[test]
    fn validate_for_ring() {
        let config = FloodingConfig::default();
        let par = BfvParameters::default_arc(2, 8);
        config.validate_for(&par, 0, 3).unwrap();
        // A single 62-bit modulus leaves no room for the flooding noise.
        assert!(config.validate_for(&par, 1, 3).is_err());
        assert!(config.validate_for(&par, 2, 3).is_err());
        // Many parties add up.
        assert!(config.validate_for(&par, 0, 1 << 60).is_err());

        let small = FloodingConfig::new(32, 0).unwrap();
        small.validate_for(&par, 1, 3).unwrap();

        let par = BfvParametersBuilder::new()
            .set_degree(8)
            .set_plaintext_modulus(1 << 20)
            .set_moduli_sizes(&[50, 30])
            .build_arc()
            .unwrap();
        assert!(config.validate_for(&par, 0, 2).is_err());
        small.validate_for(&par, 0, 2).unwrap();
        assert!(small.validate_for(&par, 1, 2).is_err());
    }

    #[test]
    fn sample_is_bounded() {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let ctx = par.ctx_at_level(0).unwrap();
        for config in [
            FloodingConfig::default(),
            FloodingConfig::new(32, 0).unwrap(),
        ] {
            let mut p = config.sample(&par, ctx, &mut rng).unwrap();
            assert_eq!(p.representation(), &Representation::Ntt);
            p.change_representation(Representation::PowerBasis);
            let q = ctx.modulus();
            let mut largest = 0;
            let mut nonzero = 0;
            for c in Vec::<BigUint>::from(p.as_ref()) {
                let centered = std::cmp::min(c.clone(), q - &c);
                largest = largest.max(centered.bits() as usize);
                if centered > BigUint::from(0u64) {
                    nonzero += 1
                }
            }
            assert!(largest <= config.bound_bits());
            assert!(largest >= config.sigma_bits() - 8);
            assert!(nonzero > 0);
        }
    }

    #[test]
    fn dither_is_centered() {
        let mut rng = thread_rng();
        assert_eq!(dither(0, &mut rng), 0);
        let n = 100_000;
        let samples: Vec<i64> = (0..n).map(|_| dither(7, &mut rng)).collect();
        assert!(samples.iter().all(|d| (-64..=64).contains(d)));
        assert!(samples.iter().any(|d| *d < 0));
        let mean = samples.iter().sum::<i64>() as f64 / n as f64;
        assert!(mean.abs() < 2.0);
    }
}
