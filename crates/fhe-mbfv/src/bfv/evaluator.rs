//! Capability traits for homomorphic evaluation.
//!
//! Code that only needs to combine ciphertexts depends on these traits rather
//! than on a concrete scheme type. [`BfvEvaluator`] implements all of them for
//! BFV ciphertexts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bfv::ops::{check_compatible, tensor};
use crate::bfv::{BfvParameters, Ciphertext, GaloisKey, RelinearizationKey, RotationDirection};
use crate::{Error, Result};

/// Homomorphic addition.
pub trait HomomorphicAdd<C> {
    /// Add two ciphertexts.
    fn try_add(&self, lhs: &C, rhs: &C) -> Result<C>;
}

/// Homomorphic subtraction and negation.
pub trait HomomorphicSub<C> {
    /// Subtract `rhs` from `lhs`.
    fn try_sub(&self, lhs: &C, rhs: &C) -> Result<C>;

    /// Negate a ciphertext.
    fn try_neg(&self, ct: &C) -> Result<C>;
}

/// Homomorphic multiplication, without relinearization.
pub trait HomomorphicMul<C> {
    /// Multiply two ciphertexts. The output has a higher degree than the
    /// inputs.
    fn try_mul(&self, lhs: &C, rhs: &C) -> Result<C>;
}

/// Reduction of the degree of a ciphertext after a multiplication.
pub trait Relinearize<C> {
    /// Relinearize a ciphertext in place.
    fn try_relinearize(&self, ct: &mut C) -> Result<()>;
}

/// Switch a ciphertext to the next, smaller, modulus.
pub trait Rescale<C> {
    /// Rescale a ciphertext in place.
    fn try_rescale(&self, ct: &mut C) -> Result<()>;
}

/// Permutation of the encrypted slots.
pub trait Rotate<C> {
    /// Rotate the slots of a ciphertext.
    fn try_rotate(&self, ct: &C, direction: RotationDirection) -> Result<C>;
}

/// All the evaluation capabilities at once.
pub trait Evaluator<C>:
    HomomorphicAdd<C>
    + HomomorphicSub<C>
    + HomomorphicMul<C>
    + Relinearize<C>
    + Rescale<C>
    + Rotate<C>
{
    /// Multiply and relinearize.
    fn try_mul_relin(&self, lhs: &C, rhs: &C) -> Result<C> {
        let mut ct = self.try_mul(lhs, rhs)?;
        self.try_relinearize(&mut ct)?;
        Ok(ct)
    }
}

impl<C, E> Evaluator<C> for E where
    E: HomomorphicAdd<C>
        + HomomorphicSub<C>
        + HomomorphicMul<C>
        + Relinearize<C>
        + Rescale<C>
        + Rotate<C>
{
}

/// Evaluator for BFV ciphertexts, holding the evaluation keys it may need.
#[derive(Debug, Clone)]
pub struct BfvEvaluator {
    par: Arc<BfvParameters>,
    rk: Option<RelinearizationKey>,
    gk: HashMap<usize, GaloisKey>,
}

impl BfvEvaluator {
    /// Create an evaluator without evaluation keys.
    pub fn new(par: &Arc<BfvParameters>) -> Self {
        Self {
            par: par.clone(),
            rk: None,
            gk: HashMap::new(),
        }
    }

    /// Use a relinearization key.
    pub fn with_relinearization_key(mut self, rk: RelinearizationKey) -> Result<Self> {
        if rk.ksk.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        self.rk = Some(rk);
        Ok(self)
    }

    /// Add a Galois key. A key with the same Galois element is replaced.
    pub fn with_galois_key(mut self, gk: GaloisKey) -> Result<Self> {
        if gk.ksk.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        self.gk.insert(gk.element(), gk);
        Ok(self)
    }

    fn check_parameters(&self, ct: &Ciphertext) -> Result<()> {
        if ct.par != self.par {
            Err(Error::ParametersMismatch)
        } else {
            Ok(())
        }
    }
}

impl HomomorphicAdd<Ciphertext> for BfvEvaluator {
    fn try_add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        self.check_parameters(lhs)?;
        check_compatible(lhs, rhs)?;
        Ok(lhs + rhs)
    }
}

impl HomomorphicSub<Ciphertext> for BfvEvaluator {
    fn try_sub(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        self.check_parameters(lhs)?;
        check_compatible(lhs, rhs)?;
        Ok(lhs - rhs)
    }

    fn try_neg(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_parameters(ct)?;
        Ok(-ct)
    }
}

impl HomomorphicMul<Ciphertext> for BfvEvaluator {
    fn try_mul(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        self.check_parameters(lhs)?;
        tensor(lhs, rhs)
    }
}

impl Relinearize<Ciphertext> for BfvEvaluator {
    fn try_relinearize(&self, ct: &mut Ciphertext) -> Result<()> {
        self.check_parameters(ct)?;
        match self.rk.as_ref() {
            Some(rk) => rk.relinearizes(ct),
            None => Err(Error::DefaultError(
                "No relinearization key available".to_string(),
            )),
        }
    }
}

impl Rescale<Ciphertext> for BfvEvaluator {
    fn try_rescale(&self, ct: &mut Ciphertext) -> Result<()> {
        self.check_parameters(ct)?;
        if ct.level == self.par.max_level() {
            return Err(Error::DefaultError(
                "Cannot modulo switch as this is already the last level".to_string(),
            ));
        }
        ct.mod_switch_to_next_level()
    }
}

impl Rotate<Ciphertext> for BfvEvaluator {
    fn try_rotate(&self, ct: &Ciphertext, direction: RotationDirection) -> Result<Ciphertext> {
        self.check_parameters(ct)?;
        let element = direction.galois_element(self.par.degree())?;
        match self.gk.get(&element) {
            Some(gk) => gk.relinearize(ct),
            None => Err(Error::DefaultError(format!(
                "No Galois key available for rotation {direction}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BfvEvaluator, Evaluator, HomomorphicAdd, HomomorphicSub, Rescale, Rotate};
    use crate::bfv::{
        BfvParameters, Ciphertext, Encoding, GaloisKey, Plaintext, RelinearizationKey,
        RotationDirection, SecretKey,
    };
    use fhe_traits::{FheDecoder, FheDecrypter, FheEncoder, FheEncrypter};
    use rand::thread_rng;
    use std::error::Error;

    // Only relies on the capability traits.
    fn square_plus_input<E: Evaluator<Ciphertext>>(
        evaluator: &E,
        ct: &Ciphertext,
    ) -> crate::Result<Ciphertext> {
        let sq = evaluator.try_mul_relin(ct, ct)?;
        evaluator.try_add(&sq, ct)
    }

    #[test]
    fn generic_evaluation() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 8);
        let sk = SecretKey::random(&par, &mut rng);
        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        let gk = GaloisKey::new_rotation(&sk, RotationDirection::Left(1), 0, &mut rng)?;
        let evaluator = BfvEvaluator::new(&par)
            .with_relinearization_key(rk)?
            .with_galois_key(gk)?;

        let v = par.plaintext.random_vec(par.degree(), &mut rng);
        let mut expected = v.clone();
        par.plaintext.mul_vec(&mut expected, &v);
        par.plaintext.add_vec(&mut expected, &v);

        let pt = Plaintext::try_encode(&v, Encoding::simd(), &par)?;
        let ct = sk.try_encrypt(&pt, &mut rng)?;
        let out = square_plus_input(&evaluator, &ct)?;
        assert_eq!(out.c.len(), 2);
        let w = Vec::<u64>::try_decode(&sk.try_decrypt(&out)?, Encoding::simd())?;
        assert_eq!(w, expected);

        let doubled = evaluator.try_add(&ct, &ct)?;
        let mut expected_doubled = v.clone();
        par.plaintext.add_vec(&mut expected_doubled, &v);
        let w = Vec::<u64>::try_decode(&sk.try_decrypt(&doubled)?, Encoding::simd())?;
        assert_eq!(w, expected_doubled);

        let diff = evaluator.try_sub(&out, &out)?;
        let w = Vec::<u64>::try_decode(&sk.try_decrypt(&diff)?, Encoding::simd())?;
        assert_eq!(w, vec![0u64; par.degree()]);

        let neg = evaluator.try_neg(&ct)?;
        let mut expected_neg = v.clone();
        par.plaintext.neg_vec(&mut expected_neg);
        let w = Vec::<u64>::try_decode(&sk.try_decrypt(&neg)?, Encoding::simd())?;
        assert_eq!(w, expected_neg);

        let rotated = evaluator.try_rotate(&ct, RotationDirection::Right(3))?;
        let w = Vec::<u64>::try_decode(&sk.try_decrypt(&rotated)?, Encoding::simd())?;
        let row_size = par.degree() / 2;
        for i in 0..row_size {
            assert_eq!(w[i], v[(i + 1) % row_size]);
            assert_eq!(w[row_size + i], v[row_size + (i + 1) % row_size]);
        }
        Ok(())
    }

    #[test]
    fn mul_relin_at_every_level() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(4, 16);
        let sk = SecretKey::random(&par, &mut rng);
        for level in 0..par.max_level() {
            let rk = RelinearizationKey::new_leveled(&sk, level, &mut rng)?;
            let evaluator = BfvEvaluator::new(&par).with_relinearization_key(rk)?;

            let a = par.plaintext.random_vec(par.degree(), &mut rng);
            let b = par.plaintext.random_vec(par.degree(), &mut rng);
            let mut expected = a.clone();
            par.plaintext.mul_vec(&mut expected, &b);
            let ct_a: Ciphertext = sk.try_encrypt(
                &Plaintext::try_encode(&a, Encoding::simd_at_level(level), &par)?,
                &mut rng,
            )?;
            let ct_b: Ciphertext = sk.try_encrypt(
                &Plaintext::try_encode(&b, Encoding::simd_at_level(level), &par)?,
                &mut rng,
            )?;

            let product = evaluator.try_mul_relin(&ct_a, &ct_b)?;
            assert_eq!(product.level, level);
            assert_eq!(product.c.len(), 2);
            let w = Vec::<u64>::try_decode(&sk.try_decrypt(&product)?, Encoding::simd())?;
            assert_eq!(w, expected);

            // The key only relinearizes at its own level.
            let mut lower = ct_a.clone();
            lower.mod_switch_to_next_level()?;
            assert!(evaluator.try_mul_relin(&lower, &lower).is_err());
        }
        Ok(())
    }

    #[test]
    fn missing_keys() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 8);
        let sk = SecretKey::random(&par, &mut rng);
        let evaluator = BfvEvaluator::new(&par);
        let pt = Plaintext::try_encode(&[1u64, 2, 3] as &[u64], Encoding::simd(), &par)?;
        let ct = sk.try_encrypt(&pt, &mut rng)?;

        assert!(evaluator.try_mul_relin(&ct, &ct).is_err());
        assert!(evaluator
            .try_rotate(&ct, RotationDirection::Left(1))
            .is_err());

        let other = BfvParameters::default_arc(3, 8);
        let other_sk = SecretKey::random(&other, &mut rng);
        assert!(evaluator
            .with_relinearization_key(RelinearizationKey::new(&other_sk, &mut rng)?)
            .is_err());
        Ok(())
    }

    #[test]
    fn rescale() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 8);
        let sk = SecretKey::random(&par, &mut rng);
        let evaluator = BfvEvaluator::new(&par);
        let v = par.plaintext.random_vec(par.degree(), &mut rng);
        let pt = Plaintext::try_encode(&v, Encoding::poly(), &par)?;
        let mut ct: Ciphertext = sk.try_encrypt(&pt, &mut rng)?;

        evaluator.try_rescale(&mut ct)?;
        assert_eq!(ct.level, 1);
        let w = Vec::<u64>::try_decode(&sk.try_decrypt(&ct)?, Encoding::poly())?;
        assert_eq!(w, v);
        assert!(evaluator.try_rescale(&mut ct).is_err());
        Ok(())
    }
}
