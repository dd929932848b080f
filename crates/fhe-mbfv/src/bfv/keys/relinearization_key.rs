//! Relinearization keys.
//!
//! A relinearization key switches from `s^2` to `s` with the CRT gadget of
//! [`KeySwitchingKey`], following the RNS variant of
//! [Halevi, Polyakov and Shoup](https://eprint.iacr.org/2018/117.pdf). The
//! multiparty protocols produce the same key for `s = Σ s_i`.

use std::sync::Arc;

use crate::bfv::{BfvParameters, Ciphertext, KeySwitchingKey, SecretKey};
use crate::proto::bfv::RelinearizationKey as RelinearizationKeyProto;
use crate::{Error, Result};
use fhe_math::rq::Representation;
use fhe_traits::{DeserializeParametrized, FheParametrized, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Key switching key from `s^2` to `s`, at a fixed level.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RelinearizationKey {
    pub(crate) ksk: KeySwitchingKey,
}

impl RelinearizationKey {
    /// Single-party key for ciphertexts at level 0.
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        Self::new_leveled(sk, 0, rng)
    }

    /// Single-party key for ciphertexts at `level`.
    pub fn new_leveled<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let s = sk.poly_ntt(sk.par.ctx_at_level(level)?)?;
        let mut s2 = Zeroizing::new(s.as_ref() * s.as_ref());
        s2.change_representation(Representation::PowerBasis);
        Ok(Self {
            ksk: KeySwitchingKey::new(sk, &s2, level, rng)?,
        })
    }

    pub(crate) fn from_key_switching_key(ksk: KeySwitchingKey) -> Self {
        Self { ksk }
    }

    /// Level of the ciphertexts this key applies to.
    pub fn level(&self) -> usize {
        self.ksk.level
    }

    /// The key switching key from `s^2` to `s`.
    pub fn key_switching_key(&self) -> &KeySwitchingKey {
        &self.ksk
    }

    /// Fold the `c2` term of a three-polynomial ciphertext into `c0` and `c1`.
    pub fn relinearizes(&self, ct: &mut Ciphertext) -> Result<()> {
        if ct.c.len() != 3 {
            return Err(Error::UnspecifiedInput(format!(
                "Relinearization expects 3 polynomials, found {}",
                ct.c.len()
            )));
        }
        if ct.level != self.ksk.level {
            return Err(Error::LevelMismatch {
                expected: self.ksk.level,
                found: ct.level,
            });
        }
        let Some(mut c2) = ct.c.pop() else {
            return Err(Error::TooFewValues(0, 3));
        };
        c2.change_representation(Representation::PowerBasis);
        let (d0, d1) = self.ksk.key_switch(&c2)?;
        ct.c[0] += &d0;
        ct.c[1] += &d1;
        Ok(())
    }
}

impl FheParametrized for RelinearizationKey {
    type Parameters = BfvParameters;
}

impl Serialize for RelinearizationKey {
    fn to_bytes(&self) -> Vec<u8> {
        RelinearizationKeyProto {
            ksk: Some(self.ksk.to_proto()),
        }
        .encode_to_vec()
    }
}

impl DeserializeParametrized for RelinearizationKey {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<Self::Parameters>) -> Result<Self> {
        let proto =
            RelinearizationKeyProto::decode(bytes).map_err(|_| Error::SerializationError)?;
        let ksk = proto.ksk.as_ref().ok_or(Error::SerializationError)?;
        Ok(Self {
            ksk: KeySwitchingKey::from_proto(ksk, par)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RelinearizationKey;
    use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext, SecretKey};
    use crate::Error;
    use fhe_traits::{
        DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter, Serialize,
    };
    use rand::thread_rng;

    #[test]
    fn relinearizes_products_at_every_level() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(4, 16);
        let sk = SecretKey::random(&par, &mut rng);
        for level in 0..par.max_level() {
            let rk = RelinearizationKey::new_leveled(&sk, level, &mut rng)?;
            assert_eq!(rk.level(), level);

            let v = par.plaintext.random_vec(par.degree(), &mut rng);
            let mut expected = v.clone();
            par.plaintext.mul_vec(&mut expected, &v);
            let pt = Plaintext::try_encode(&v, Encoding::simd_at_level(level), &par)?;
            let ct: Ciphertext = sk.try_encrypt(&pt, &mut rng)?;

            let mut product = &ct * &ct;
            rk.relinearizes(&mut product)?;
            assert_eq!(product.c.len(), 2);
            let w = Vec::<u64>::try_decode(&sk.try_decrypt(&product)?, Encoding::simd())?;
            assert_eq!(w, expected);
        }
        Ok(())
    }

    #[test]
    fn rejects_wrong_inputs() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        let pt = Plaintext::try_encode(&[1u64, 2, 3] as &[u64], Encoding::poly(), &par)?;
        let ct: Ciphertext = sk.try_encrypt(&pt, &mut rng)?;

        let mut fresh = ct.clone();
        assert!(rk.relinearizes(&mut fresh).is_err());
        assert_eq!(fresh, ct);

        let mut lower = &ct * &ct;
        lower.mod_switch_to_next_level()?;
        assert!(matches!(
            rk.relinearizes(&mut lower),
            Err(Error::LevelMismatch {
                expected: 0,
                found: 1
            })
        ));
        assert_eq!(lower.c.len(), 3);
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        let mut decoded = RelinearizationKey::from_bytes(&rk.to_bytes(), &par)?;
        decoded
            .ksk
            .c0
            .iter_mut()
            .chain(decoded.ksk.c1.iter_mut())
            .for_each(|p| unsafe { p.allow_variable_time_computations() });
        assert_eq!(rk, decoded);
        assert!(RelinearizationKey::from_bytes(&[], &par).is_err());
        Ok(())
    }
}
