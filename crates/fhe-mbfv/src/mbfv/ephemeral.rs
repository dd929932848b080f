use std::fmt::Debug;
use std::sync::Arc;

use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

use crate::bfv::{sample_ternary, BfvParameters};
use crate::Result;

/// A short-lived secret, sampled from the secret key distribution.
///
/// The relinearization key generation protocol needs one per party and per
/// run: it must be kept between the first and the third round, and dropped
/// afterwards. The coefficients are erased on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EphemeralKey {
    #[zeroize(skip)]
    pub(crate) par: Arc<BfvParameters>,
    coeffs: Box<[i64]>,
}

impl Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKey").finish_non_exhaustive()
    }
}

impl EphemeralKey {
    /// Sample a new ephemeral key.
    pub fn random<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Self {
        Self {
            par: par.clone(),
            coeffs: sample_ternary(par.degree(), rng).into_boxed_slice(),
        }
    }

    pub(crate) fn poly_ntt(&self, ctx: &Arc<Context>) -> Result<Zeroizing<Poly>> {
        let mut u = Zeroizing::new(Poly::try_convert_from(
            self.coeffs.as_ref(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        u.change_representation(Representation::Ntt);
        Ok(u)
    }
}
