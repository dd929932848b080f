use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext};
use crate::proto::bfv::PublicKey as PublicKeyProto;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeParametrized, FheEncrypter, FheParametrized, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::SecretKey;

/// A BFV public key `(p0, p1) = (-a·s + e, a)`.
///
/// The collective public key output by [`crate::mbfv::CkgProtocol`] has the
/// same form with `s = Σ s_i`, so it encrypts exactly like a single-party key.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublicKey {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) c: Ciphertext,
}

impl PublicKey {
    /// Derive a public key from a secret key.
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let zero = Plaintext::zero(Encoding::poly(), &sk.par)?;
        Self::from_ciphertext(sk.try_encrypt(&zero, rng)?)
    }

    /// Wrap an encryption of zero.
    pub(crate) fn from_ciphertext(mut c: Ciphertext) -> Result<Self> {
        if c.c.len() != 2 {
            return Err(Error::UnspecifiedInput(format!(
                "A public key has 2 polynomials, found {}",
                c.c.len()
            )));
        }
        for p in c.c.iter_mut() {
            p.disallow_variable_time_computations()
        }
        Ok(Self {
            par: c.par.clone(),
            c,
        })
    }

    /// Level of `p0` and `p1`.
    pub fn level(&self) -> usize {
        self.c.level
    }

    /// The pair `(p0, p1)`.
    pub fn polys(&self) -> (&Poly, &Poly) {
        (&self.c.c[0], &self.c.c[1])
    }

    /// `(p0, p1)` switched down to `level`, in constant time.
    pub(crate) fn polys_at_level(&self, level: usize) -> Result<(Poly, Poly)> {
        let mut c = self.c.at_level(level)?.c;
        for p in c.iter_mut() {
            p.disallow_variable_time_computations()
        }
        let p1 = c.pop();
        let p0 = c.pop();
        p0.zip(p1)
            .ok_or_else(|| Error::DefaultError("Invalid public key".to_string()))
    }
}

impl FheParametrized for PublicKey {
    type Parameters = BfvParameters;
}

impl FheEncrypter<Plaintext, Ciphertext> for PublicKey {
    type Error = Error;

    /// Encrypt as `(u·p0 + e0 + m, u·p1 + e1)`, at the level of `pt`.
    fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if self.par != pt.par {
            return Err(Error::ParametersMismatch);
        }
        let (p0, p1) = self.polys_at_level(pt.level)?;
        let ctx = p0.ctx().clone();
        let small = |rng: &mut R| -> Result<Zeroizing<Poly>> {
            Ok(Zeroizing::new(Poly::small(
                &ctx,
                Representation::Ntt,
                self.par.variance,
                rng,
            )?))
        };
        let u = small(rng)?;
        let e0 = small(rng)?;
        let e1 = small(rng)?;
        let m = Zeroizing::new(pt.to_poly()?);

        let mut c0 = u.as_ref() * &p0;
        c0 += e0.as_ref();
        c0 += m.as_ref();
        let mut c1 = u.as_ref() * &p1;
        c1 += e1.as_ref();
        unsafe {
            c0.allow_variable_time_computations();
            c1.allow_variable_time_computations()
        }
        Ciphertext::new(vec![c0, c1], &self.par)
    }
}

impl Serialize for PublicKey {
    fn to_bytes(&self) -> Vec<u8> {
        PublicKeyProto {
            c: Some(self.c.to_proto()),
        }
        .encode_to_vec()
    }
}

impl DeserializeParametrized for PublicKey {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<Self::Parameters>) -> Result<Self> {
        let proto = PublicKeyProto::decode(bytes).map_err(|_| Error::SerializationError)?;
        let c = proto.c.as_ref().ok_or(Error::SerializationError)?;
        PublicKey::from_ciphertext(Ciphertext::from_proto(c, par)?)
    }
}

#[cfg(test)]
mod tests {
    use super::PublicKey;
    use crate::bfv::{BfvParameters, Encoding, Plaintext, SecretKey};
    use crate::Error;
    use fhe_traits::{DeserializeParametrized, FheDecrypter, FheEncoder, FheEncrypter, Serialize};
    use rand::thread_rng;

    #[test]
    fn encrypts_zero() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        assert_eq!(pk.level(), 0);
        assert_eq!(sk.try_decrypt(&pk.c)?, Plaintext::zero(Encoding::poly(), &par)?);
        Ok(())
    }

    #[test]
    fn encrypt_decrypt_at_every_level() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(4, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        for level in 0..=par.max_level() {
            let pt = Plaintext::try_encode(
                &par.plaintext.random_vec(par.degree(), &mut rng),
                Encoding::simd_at_level(level),
                &par,
            )?;
            let ct = pk.try_encrypt(&pt, &mut rng)?;
            assert_eq!(ct.level, level);
            assert_eq!(sk.try_decrypt(&ct)?, pt);
        }
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 16);
        let pk = PublicKey::new(&SecretKey::random(&par, &mut rng), &mut rng)?;
        assert_eq!(pk, PublicKey::from_bytes(&pk.to_bytes(), &par)?);
        assert!(matches!(
            PublicKey::from_bytes(&[], &par),
            Err(Error::SerializationError)
        ));
        Ok(())
    }

    #[test]
    fn rejects_foreign_plaintext() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let other = BfvParameters::default_arc(2, 32);
        let pk = PublicKey::new(&SecretKey::random(&par, &mut rng), &mut rng)?;
        let pt = Plaintext::try_encode(&[1u64] as &[u64], Encoding::poly(), &other)?;
        assert!(matches!(
            pk.try_encrypt(&pt, &mut rng),
            Err(Error::ParametersMismatch)
        ));
        Ok(())
    }
}
