use std::sync::Arc;

use fhe_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, Plaintext, SecretKey};
use crate::{Error, Result};

use super::share::{impl_share, ShareData, ShareShape};
use super::{FloodingConfig, Phase, RoundTracker, ShareCombiner};

/// Check that a ciphertext can be key switched with these parameters.
pub(crate) fn check_ciphertext(par: &Arc<BfvParameters>, ct: &Ciphertext) -> Result<()> {
    if &ct.par != par {
        return Err(Error::ParametersMismatch);
    }
    // M-BFV only supports ciphertexts of length 2
    match ct.c.len() {
        2 => Ok(()),
        n if n < 2 => Err(Error::TooFewValues(n, 2)),
        n => {
            warn!(size = n, "key switching requires a relinearized ciphertext");
            Err(Error::TooManyValues(n, 2))
        }
    }
}

/// The share `(s_in - s_out)·c1 + e`, with flooding noise `e`.
fn switch_share<R: RngCore + CryptoRng>(
    sk_input_share: &SecretKey,
    sk_output_share: Option<&SecretKey>,
    ct: &Ciphertext,
    flooding: &FloodingConfig,
    rng: &mut R,
) -> Result<Poly> {
    let ctx = ct.c[0].ctx();
    let mut s = sk_input_share.poly_ntt(ctx)?;
    if let Some(sk_output_share) = sk_output_share {
        *s.as_mut() -= sk_output_share.poly_ntt(ctx)?.as_ref();
    }
    let e = flooding.sample(&ct.par, ctx, rng)?;

    let mut h = s.as_ref() * &ct.c[1];
    h += e.as_ref();
    Ok(h)
}

/// A party's share in the secret key switch protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CksShare(pub(crate) ShareData);

impl_share!(CksShare, ShareShape::Single);

/// Collective key switching, "Protocol 3: KeySwitch" of
/// [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p7).
///
/// Switches a ciphertext under `s = Σ s_i` to a ciphertext under
/// `s' = Σ s'_i`, where party `i` holds both `s_i` and `s'_i`.
#[derive(Debug, Clone)]
pub struct CksProtocol {
    par: Arc<BfvParameters>,
    num_parties: usize,
    flooding: FloodingConfig,
    tracker: RoundTracker,
}

impl CksProtocol {
    /// Start a new key switching protocol.
    ///
    /// The flooding configuration is checked against the ciphertext modulus
    /// at level 0, and again at the level of each ciphertext.
    pub fn new(
        par: &Arc<BfvParameters>,
        num_parties: usize,
        flooding: FloodingConfig,
    ) -> Result<Self> {
        if num_parties == 0 {
            return Err(Error::TooFewValues(0, 1));
        }
        flooding.validate_for(par, 0, num_parties)?;
        debug!(
            num_parties,
            statistical_security = flooding.statistical_security(),
            sigma_bits = flooding.sigma_bits(),
            "new collective key switching"
        );
        Ok(Self {
            par: par.clone(),
            num_parties,
            flooding,
            tracker: RoundTracker::new(1),
        })
    }

    /// The current phase of the protocol.
    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    /// Start a new run of the protocol.
    pub fn reset(&mut self) {
        self.tracker.reset()
    }

    /// Allocate an empty share for a ciphertext at the given level.
    pub fn allocate_share(&self, level: usize) -> Result<CksShare> {
        Ok(CksShare(ShareData::zero(&self.par, level, CksShare::SHAPE)?))
    }

    /// Compute the share of a party.
    ///
    /// 1. *Private input*: BFV input secret key share
    /// 2. *Private input*: BFV output secret key share
    /// 3. *Public input*: Input ciphertext to keyswitch
    pub fn gen_share<R: RngCore + CryptoRng>(
        &mut self,
        sk_input_share: &SecretKey,
        sk_output_share: &SecretKey,
        ct: &Ciphertext,
        share: &mut CksShare,
        rng: &mut R,
    ) -> Result<()> {
        if sk_input_share.par != self.par || sk_output_share.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        check_ciphertext(&self.par, ct)?;
        share.0.check_target(&self.par, ct.level)?;
        self.flooding
            .validate_for(&self.par, ct.level, self.num_parties)?;
        self.tracker.check(1, "gen_share")?;

        let h = switch_share(
            sk_input_share,
            Some(sk_output_share),
            ct,
            &self.flooding,
            rng,
        )?;
        share.0.set(vec![h], vec![])?;
        self.tracker.enter(1, "gen_share")
    }

    /// Aggregate two shares into a new one.
    pub fn aggregate_shares(&mut self, a: &CksShare, b: &CksShare) -> Result<CksShare> {
        self.tracker.check(1, "aggregate_shares")?;
        let aggregated = CksShare::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares")?;
        Ok(aggregated)
    }

    /// Aggregate a share into `dst`.
    pub fn aggregate_into(&mut self, dst: &mut CksShare, other: &CksShare) -> Result<()> {
        self.tracker.check(1, "aggregate_shares")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares")
    }

    /// Produce the key switched ciphertext `(c0 + Σ h_i, c1)`.
    pub fn finalize(&mut self, aggregated: &CksShare, ct: &Ciphertext) -> Result<Ciphertext> {
        self.tracker.check_final("finalize")?;
        check_ciphertext(&self.par, ct)?;
        aggregated.0.check_target(&self.par, ct.level)?;
        aggregated.0.check_shape(CksShare::SHAPE)?;
        aggregated.0.check_complete(self.num_parties)?;

        let c0 = &ct.c[0] + &aggregated.0.p0[0];
        let c1 = ct.c[1].clone();
        let out = Ciphertext::new(vec![c0, c1], &self.par)?;
        self.tracker.finish();
        debug!(
            level = ct.level,
            parties = aggregated.parties(),
            "ciphertext key switched"
        );
        Ok(out)
    }
}

/// A party's share in the decryption protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DecryptionShare(pub(crate) ShareData);

impl_share!(DecryptionShare, ShareShape::Single);

/// Collective decryption.
///
/// This is the key switching protocol with an output key of zero: the
/// aggregated shares reveal `c0 + c1·s`, from which the plaintext is decoded.
#[derive(Debug, Clone)]
pub struct DecryptionProtocol {
    par: Arc<BfvParameters>,
    num_parties: usize,
    flooding: FloodingConfig,
    tracker: RoundTracker,
}

impl DecryptionProtocol {
    /// Start a new decryption protocol.
    pub fn new(
        par: &Arc<BfvParameters>,
        num_parties: usize,
        flooding: FloodingConfig,
    ) -> Result<Self> {
        if num_parties == 0 {
            return Err(Error::TooFewValues(0, 1));
        }
        flooding.validate_for(par, 0, num_parties)?;
        debug!(num_parties, "new collective decryption");
        Ok(Self {
            par: par.clone(),
            num_parties,
            flooding,
            tracker: RoundTracker::new(1),
        })
    }

    /// The current phase of the protocol.
    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    /// Start a new run of the protocol.
    pub fn reset(&mut self) {
        self.tracker.reset()
    }

    /// Allocate an empty share for a ciphertext at the given level.
    pub fn allocate_share(&self, level: usize) -> Result<DecryptionShare> {
        Ok(DecryptionShare(ShareData::zero(
            &self.par,
            level,
            DecryptionShare::SHAPE,
        )?))
    }

    /// Compute the decryption share `s_i·c1 + e` of a party.
    pub fn gen_share<R: RngCore + CryptoRng>(
        &mut self,
        sk_share: &SecretKey,
        ct: &Ciphertext,
        share: &mut DecryptionShare,
        rng: &mut R,
    ) -> Result<()> {
        if sk_share.par != self.par {
            return Err(Error::ParametersMismatch);
        }
        check_ciphertext(&self.par, ct)?;
        share.0.check_target(&self.par, ct.level)?;
        self.flooding
            .validate_for(&self.par, ct.level, self.num_parties)?;
        self.tracker.check(1, "gen_share")?;

        let h = switch_share(sk_share, None, ct, &self.flooding, rng)?;
        share.0.set(vec![h], vec![])?;
        self.tracker.enter(1, "gen_share")
    }

    /// Aggregate two shares into a new one.
    pub fn aggregate_shares(
        &mut self,
        a: &DecryptionShare,
        b: &DecryptionShare,
    ) -> Result<DecryptionShare> {
        self.tracker.check(1, "aggregate_shares")?;
        let aggregated = DecryptionShare::combine(a, b)?;
        self.tracker.enter(1, "aggregate_shares")?;
        Ok(aggregated)
    }

    /// Aggregate a share into `dst`.
    pub fn aggregate_into(
        &mut self,
        dst: &mut DecryptionShare,
        other: &DecryptionShare,
    ) -> Result<()> {
        self.tracker.check(1, "aggregate_shares")?;
        dst.combine_assign(other)?;
        self.tracker.enter(1, "aggregate_shares")
    }

    /// Decode the plaintext from the aggregated shares.
    pub fn finalize(&mut self, aggregated: &DecryptionShare, ct: &Ciphertext) -> Result<Plaintext> {
        self.tracker.check_final("finalize")?;
        check_ciphertext(&self.par, ct)?;
        aggregated.0.check_target(&self.par, ct.level)?;
        aggregated.0.check_shape(DecryptionShare::SHAPE)?;
        aggregated.0.check_complete(self.num_parties)?;

        let phase = Zeroizing::new(&ct.c[0] + &aggregated.0.p0[0]);
        let pt = Plaintext::from_phase(&phase, &self.par)?;
        self.tracker.finish();
        debug!(
            level = ct.level,
            parties = aggregated.parties(),
            "ciphertext collectively decrypted"
        );
        Ok(pt)
    }
}
