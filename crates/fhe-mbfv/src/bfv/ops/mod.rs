//! Arithmetic over ciphertexts.

use crate::bfv::Ciphertext;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use itertools::izip;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Check that two ciphertexts can be combined coefficient-wise.
pub(crate) fn check_compatible(lhs: &Ciphertext, rhs: &Ciphertext) -> Result<()> {
    if lhs.par != rhs.par {
        return Err(Error::ParametersMismatch);
    }
    if lhs.level != rhs.level {
        return Err(Error::LevelMismatch {
            expected: lhs.level,
            found: rhs.level,
        });
    }
    if lhs.c.len() != rhs.c.len() {
        return Err(Error::UnspecifiedInput(format!(
            "Ciphertexts of different sizes: {} and {}",
            lhs.c.len(),
            rhs.c.len()
        )));
    }
    Ok(())
}

/// Tensor two ciphertexts using the multiplication parameters of their level.
/// The output has `lhs.c.len() + rhs.c.len() - 1` polynomials and is not
/// relinearized.
pub(crate) fn tensor(lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
    if lhs.par != rhs.par {
        return Err(Error::ParametersMismatch);
    }
    if lhs.level != rhs.level {
        return Err(Error::LevelMismatch {
            expected: lhs.level,
            found: rhs.level,
        });
    }
    if lhs.c.is_empty() || rhs.c.is_empty() {
        return Err(Error::TooFewValues(0, 2));
    }

    let tc = &lhs.par.level(lhs.level)?.tensor;
    let extend = |ct: &Ciphertext| {
        ct.c.iter()
            .map(|ci| ci.scale(&tc.extender).map_err(Error::MathError))
            .collect::<Result<Vec<Poly>>>()
    };
    let lhs_c = extend(lhs)?;
    let rhs_c = extend(rhs)?;

    let mut c = vec![Poly::zero(&tc.ctx, Representation::Ntt); lhs_c.len() + rhs_c.len() - 1];
    for (i, lhs_ci) in lhs_c.iter().enumerate() {
        for (j, rhs_cj) in rhs_c.iter().enumerate() {
            c[i + j] += &(lhs_ci * rhs_cj);
        }
    }

    // Back to the level, scaled by t/Q.
    let c = c
        .iter_mut()
        .map(|ci| {
            ci.change_representation(Representation::PowerBasis);
            let mut ci = ci.scale(&tc.down_scaler)?;
            ci.change_representation(Representation::Ntt);
            Ok(ci)
        })
        .collect::<Result<Vec<Poly>>>()?;

    Ciphertext::new(c, &lhs.par)
}

impl AddAssign<&Ciphertext> for Ciphertext {
    /// # Panics
    ///
    /// Panics if the ciphertexts have different parameters, levels or sizes.
    fn add_assign(&mut self, rhs: &Ciphertext) {
        if let Err(e) = check_compatible(self, rhs) {
            panic!("{e}")
        }
        izip!(&mut self.c, &rhs.c).for_each(|(c1i, c2i)| *c1i += c2i);
    }
}

impl Add<&Ciphertext> for &Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: &Ciphertext) -> Ciphertext {
        let mut self_clone = self.clone();
        self_clone += rhs;
        self_clone
    }
}

impl SubAssign<&Ciphertext> for Ciphertext {
    /// # Panics
    ///
    /// Panics if the ciphertexts have different parameters, levels or sizes.
    fn sub_assign(&mut self, rhs: &Ciphertext) {
        if let Err(e) = check_compatible(self, rhs) {
            panic!("{e}")
        }
        izip!(&mut self.c, &rhs.c).for_each(|(c1i, c2i)| *c1i -= c2i);
    }
}

impl Sub<&Ciphertext> for &Ciphertext {
    type Output = Ciphertext;

    fn sub(self, rhs: &Ciphertext) -> Ciphertext {
        let mut self_clone = self.clone();
        self_clone -= rhs;
        self_clone
    }
}

impl Neg for &Ciphertext {
    type Output = Ciphertext;

    fn neg(self) -> Ciphertext {
        let c = self.c.iter().map(|c1i| -c1i).collect();
        Ciphertext {
            par: self.par.clone(),
            c,
            level: self.level,
        }
    }
}

impl Mul<&Ciphertext> for &Ciphertext {
    type Output = Ciphertext;

    /// # Panics
    ///
    /// Panics if the ciphertexts have different parameters or levels.
    fn mul(self, rhs: &Ciphertext) -> Ciphertext {
        match tensor(self, rhs) {
            Ok(ct) => ct,
            Err(e) => panic!("{e}"),
        }
    }
}
