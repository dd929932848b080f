//! Galois keys for the BFV encryption scheme

use crate::bfv::{BfvParameters, Ciphertext, KeySwitchingKey, SecretKey};
use crate::proto::bfv::GaloisKey as GaloisKeyProto;
use crate::{Error, Result};
use fhe_math::rq::{traits::TryConvertFrom, Poly, Representation, SubstitutionExponent};
use fhe_traits::{DeserializeParametrized, FheParametrized, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use std::fmt::Display;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Direction of a rotation of the SIMD slots.
///
/// The slots are laid out as two rows of `N/2` values. Column rotations act
/// cyclically on both rows at once; the row rotation swaps the two rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationDirection {
    /// Rotate the columns to the left: slot `j` receives the value of slot
    /// `j + k`.
    Left(usize),
    /// Rotate the columns to the right: slot `j + k` receives the value of
    /// slot `j`.
    Right(usize),
    /// Swap the two rows.
    Row,
}

impl Display for RotationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationDirection::Left(k) => write!(f, "left by {k}"),
            RotationDirection::Right(k) => write!(f, "right by {k}"),
            RotationDirection::Row => write!(f, "row swap"),
        }
    }
}

impl RotationDirection {
    /// The Galois element realizing this rotation for polynomials of the
    /// given degree. Column steps are reduced modulo `degree / 2`; a step
    /// reducing to zero is rejected.
    pub fn galois_element(&self, degree: usize) -> Result<usize> {
        let m = 2 * degree;
        let row_size = degree >> 1;
        let step = match self {
            RotationDirection::Row => return Ok(m - 1),
            RotationDirection::Left(k) => k % row_size,
            RotationDirection::Right(k) => (row_size - k % row_size) % row_size,
        };
        if step == 0 {
            return Err(Error::UnspecifiedInput(format!(
                "Rotation {self} reduces to the identity modulo {row_size}"
            )));
        }
        let mut element = 1usize;
        for _ in 0..step {
            element = (element * 3) % m;
        }
        Ok(element)
    }
}

/// Galois key for the BFV encryption scheme.
///
/// A Galois key is a key switching key from `σ(s)` to `s`, where `σ` is the
/// automorphism `X -> X^g` of the Galois element `g`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GaloisKey {
    pub(crate) element: usize,
    pub(crate) ksk: KeySwitchingKey,
}

impl GaloisKey {
    /// Generate a [`GaloisKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        exponent: usize,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let ctx = sk.par.ctx_at_level(level)?;
        let sub = SubstitutionExponent::new(ctx, exponent)?;

        let s = Zeroizing::new(Poly::try_convert_from(
            sk.coeffs.as_ref(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        let s_sub = Zeroizing::new(s.substitute(&sub)?);

        let ksk = KeySwitchingKey::new(sk, &s_sub, level, rng)?;
        Ok(Self {
            element: exponent,
            ksk,
        })
    }

    /// Generate the [`GaloisKey`] realizing a rotation.
    pub fn new_rotation<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        direction: RotationDirection,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let exponent = direction.galois_element(sk.par.degree())?;
        Self::new(sk, exponent, level, rng)
    }

    /// Wrap a key switching key from `σ(s)` to `s`.
    pub(crate) fn from_key_switching_key(exponent: usize, ksk: KeySwitchingKey) -> Result<Self> {
        let ctx = ksk.par.ctx_at_level(ksk.level)?;
        SubstitutionExponent::new(ctx, exponent)?;
        Ok(Self {
            element: exponent,
            ksk,
        })
    }

    /// The Galois element of this key.
    pub fn element(&self) -> usize {
        self.element
    }

    /// The level of the ciphertexts this key applies to.
    pub fn level(&self) -> usize {
        self.ksk.level
    }

    /// Relinearize a [`Ciphertext`] using the [`GaloisKey`]
    pub fn relinearize(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        if ct.c.len() != 2 {
            return Err(Error::TooManyValues(ct.c.len(), 2));
        }
        if ct.level != self.ksk.level {
            return Err(Error::LevelMismatch {
                expected: self.ksk.level,
                found: ct.level,
            });
        }

        let sub = SubstitutionExponent::new(ct.c[0].ctx(), self.element)?;
        let mut c2 = ct.c[1].substitute(&sub)?;
        c2.change_representation(Representation::PowerBasis);
        let (mut c0, c1) = self.ksk.key_switch(&c2)?;
        c0 += &ct.c[0].substitute(&sub)?;

        Ciphertext::new(vec![c0, c1], &ct.par)
    }
}

impl Serialize for GaloisKey {
    fn to_bytes(&self) -> Vec<u8> {
        GaloisKeyProto {
            ksk: Some(self.ksk.to_proto()),
            exponent: self.element as u32,
        }
        .encode_to_vec()
    }
}

impl FheParametrized for GaloisKey {
    type Parameters = BfvParameters;
}

impl DeserializeParametrized for GaloisKey {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<Self::Parameters>) -> Result<Self> {
        let proto = GaloisKeyProto::decode(bytes).map_err(|_| Error::SerializationError)?;
        let ksk = proto.ksk.as_ref().ok_or(Error::SerializationError)?;
        GaloisKey::from_key_switching_key(
            proto.exponent as usize,
            KeySwitchingKey::from_proto(ksk, par)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{GaloisKey, RotationDirection};
    use crate::bfv::{BfvParameters, Encoding, Plaintext, SecretKey};
    use fhe_traits::{
        DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter, Serialize,
    };
    use rand::thread_rng;
    use std::error::Error;

    #[test]
    fn galois_elements() {
        assert_eq!(RotationDirection::Left(1).galois_element(8).unwrap(), 3);
        assert_eq!(RotationDirection::Left(2).galois_element(8).unwrap(), 9);
        assert_eq!(RotationDirection::Left(5).galois_element(8).unwrap(), 3);
        assert_eq!(RotationDirection::Right(3).galois_element(8).unwrap(), 3);
        assert_eq!(RotationDirection::Right(1).galois_element(8).unwrap(), 11);
        assert_eq!(RotationDirection::Row.galois_element(8).unwrap(), 15);
        assert!(RotationDirection::Left(0).galois_element(8).is_err());
        assert!(RotationDirection::Left(4).galois_element(8).is_err());
        assert!(RotationDirection::Right(8).galois_element(8).is_err());
    }

    fn expected_rotation(v: &[u64], direction: RotationDirection) -> Vec<u64> {
        let row_size = v.len() / 2;
        match direction {
            RotationDirection::Row => [&v[row_size..], &v[..row_size]].concat(),
            RotationDirection::Left(k) | RotationDirection::Right(k) => {
                let k = match direction {
                    RotationDirection::Left(_) => k % row_size,
                    _ => row_size - k % row_size,
                };
                let mut out = vec![0u64; v.len()];
                for i in 0..row_size {
                    out[i] = v[(i + k) % row_size];
                    out[row_size + i] = v[row_size + (i + k) % row_size];
                }
                out
            }
        }
    }

    #[test]
    fn rotations() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        for params in [
            BfvParameters::default_arc(2, 8),
            BfvParameters::default_arc(3, 16),
        ] {
            let row_size = params.degree() >> 1;
            let sk = SecretKey::random(&params, &mut rng);
            let v = params.plaintext.random_vec(params.degree(), &mut rng);
            let pt = Plaintext::try_encode(&v, Encoding::simd(), &params)?;
            let ct = sk.try_encrypt(&pt, &mut rng)?;

            let mut directions = vec![RotationDirection::Row];
            for k in 1..row_size {
                directions.push(RotationDirection::Left(k));
                directions.push(RotationDirection::Right(k));
            }
            for direction in directions {
                let gk = GaloisKey::new_rotation(&sk, direction, 0, &mut rng)?;
                let ct2 = gk.relinearize(&ct)?;
                println!("Noise: {}", unsafe { sk.measure_noise(&ct2)? });
                let w = Vec::<u64>::try_decode(&sk.try_decrypt(&ct2)?, Encoding::simd())?;
                assert_eq!(w, expected_rotation(&v, direction), "{direction}");
            }
        }
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let params = BfvParameters::default_arc(3, 8);
        let sk = SecretKey::random(&params, &mut rng);
        let gk = GaloisKey::new_rotation(&sk, RotationDirection::Left(1), 0, &mut rng)?;
        let mut decoded = GaloisKey::from_bytes(&gk.to_bytes(), &params)?;
        decoded
            .ksk
            .c0
            .iter_mut()
            .chain(decoded.ksk.c1.iter_mut())
            .for_each(|p| unsafe { p.allow_variable_time_computations() });
        assert_eq!(gk, decoded);
        assert_eq!(decoded.element(), 3);
        Ok(())
    }
}
