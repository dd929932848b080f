//! Secret key shares.

use crate::bfv::{BfvParameters, Ciphertext, Plaintext};
use crate::{Error, Result};
use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use fhe_traits::{FheDecrypter, FheEncrypter, FheParametrized};
use num_bigint::BigUint;
use rand::{CryptoRng, Rng, RngCore};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Sample a vector of ternary coefficients uniformly in {-1, 0, 1}.
pub(crate) fn sample_ternary<R: RngCore + CryptoRng>(degree: usize, rng: &mut R) -> Vec<i64> {
    (0..degree).map(|_| rng.gen_range(-1i64..=1)).collect()
}

/// A BFV secret key.
///
/// In the multiparty setting every party holds one of these as its additive
/// share `s_i` of the collective key `s = Σ s_i`; the collective key itself is
/// never materialized outside of tests.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SecretKey {
    pub(crate) par: Arc<BfvParameters>,
    /// Signed coefficients of `s_i`.
    pub coeffs: Box<[i64]>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl SecretKey {
    /// Sample a fresh ternary key share.
    pub fn random<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Self {
        Self::new(sample_ternary(par.degree(), rng), par)
    }

    /// Wrap explicit coefficients.
    pub fn new(coeffs: Vec<i64>, par: &Arc<BfvParameters>) -> Self {
        Self {
            par: par.clone(),
            coeffs: coeffs.into_boxed_slice(),
        }
    }

    /// Parameters the key was sampled for.
    pub fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }

    /// Lift the key into `ctx`, in Ntt representation.
    pub(crate) fn poly_ntt(&self, ctx: &Arc<Context>) -> Result<Zeroizing<Poly>> {
        let mut s = Zeroizing::new(Poly::try_convert_from(
            self.coeffs.as_ref(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        s.change_representation(Representation::Ntt);
        Ok(s)
    }

    /// Fold another share into this one.
    ///
    /// Summing every party's share yields the collective key, which the
    /// protocol tests use as a reference decryptor.
    pub fn add_assign_share(&mut self, other: &SecretKey) -> Result<()> {
        if self.par != other.par {
            return Err(Error::ParametersMismatch);
        }
        for (a, b) in self.coeffs.iter_mut().zip(other.coeffs.iter()) {
            *a += *b
        }
        Ok(())
    }

    /// Evaluate `c0 + c1·s + c2·s^2 + ...` in constant time.
    fn phase(&self, ct: &Ciphertext) -> Result<Zeroizing<Poly>> {
        let ctx = ct.c[0].ctx();
        let s = self.poly_ntt(ctx)?;
        let mut power = s.clone();
        let mut acc = Zeroizing::new(ct.c[0].clone());
        acc.disallow_variable_time_computations();
        for (i, ci) in ct.c.iter().enumerate().skip(1) {
            let mut term = Zeroizing::new(ci.clone());
            term.disallow_variable_time_computations();
            *term.as_mut() *= power.as_ref();
            *acc.as_mut() += term.as_ref();
            if i + 1 < ct.c.len() {
                *power.as_mut() *= s.as_ref();
            }
        }
        Ok(acc)
    }

    /// Size in bits of the largest centered coefficient of the decryption
    /// error of `ct`.
    ///
    /// # Safety
    ///
    /// Runs in time that depends on the noise.
    pub unsafe fn measure_noise(&self, ct: &Ciphertext) -> Result<usize> {
        let m = Zeroizing::new(self.try_decrypt(ct)?.to_poly()?);
        let mut err = self.phase(ct)?;
        *err.as_mut() -= m.as_ref();
        err.change_representation(Representation::PowerBasis);

        let q = err.ctx().modulus();
        Ok(Vec::<BigUint>::from(err.as_ref())
            .iter()
            .map(|c| c.bits().min((q - c).bits()) as usize)
            .max()
            .unwrap_or_default())
    }

    /// Encrypt `m`, given in Ntt representation, as `(-a·s + e + m, a)`.
    pub(crate) fn encrypt_poly<R: RngCore + CryptoRng>(
        &self,
        m: &Poly,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if m.representation() != &Representation::Ntt {
            return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
                m.representation().clone(),
                Representation::Ntt,
            )));
        }
        let ctx = m.ctx();
        let s = self.poly_ntt(ctx)?;
        let mut a = Poly::random(ctx, Representation::Ntt, rng);
        let mut b = Poly::small(ctx, Representation::Ntt, self.par.variance, rng)?;
        b -= &(&a * s.as_ref());
        b += m;
        unsafe {
            a.allow_variable_time_computations();
            b.allow_variable_time_computations()
        }
        Ciphertext::new(vec![b, a], &self.par)
    }
}

impl FheParametrized for SecretKey {
    type Parameters = BfvParameters;
}

impl FheEncrypter<Plaintext, Ciphertext> for SecretKey {
    type Error = Error;

    fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if self.par != pt.par {
            return Err(Error::ParametersMismatch);
        }
        let m = Zeroizing::new(pt.to_poly()?);
        self.encrypt_poly(m.as_ref(), rng)
    }
}

impl FheDecrypter<Plaintext, Ciphertext> for SecretKey {
    type Error = Error;

    fn try_decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        if self.par != ct.par {
            return Err(Error::ParametersMismatch);
        }
        Plaintext::from_phase(self.phase(ct)?.as_ref(), &self.par)
    }
}
