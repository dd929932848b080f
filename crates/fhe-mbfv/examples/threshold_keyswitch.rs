// A committee of parties generates a joint public key and relinearization
// key, computes a product on encrypted inputs, and hands the result over to a
// recipient with collective public key switching.

use std::{env, error::Error, process::exit, sync::Arc, time::Instant};

use console::style;
use fhe_mbfv::{
    bfv::{
        BfvEvaluator, BfvParameters, BfvParametersBuilder, Ciphertext, Encoding, Evaluator,
        Plaintext, PublicKey, SecretKey,
    },
    mbfv::{
        aggregate_tree, CkgProtocol, CrpGenerator, EphemeralKey, FloodingConfig, PcksProtocol,
        RkgProtocol,
    },
};
use fhe_traits::{FheDecoder, FheDecrypter, FheEncoder, FheEncrypter};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::OsRng, thread_rng, RngCore};

macro_rules! timeit {
    ($name:expr, $code:expr) => {{
        let start = Instant::now();
        let r = $code;
        println!(
            "{} {}",
            style(format!("⏱  {:?}", start.elapsed())).dim(),
            $name
        );
        r
    }};
}

fn print_notice_and_exit(error: Option<String>) {
    println!(
        "{} Threshold key switching between a committee and a recipient",
        style("  overview:").magenta().bold()
    );
    println!(
        "{} threshold_keyswitch [-h] [--help] [--num_parties=<value>]",
        style("     usage:").magenta().bold()
    );
    println!(
        "{} {} must be at least 1",
        style("constraints:").magenta().bold(),
        style("num_parties").blue(),
    );
    if let Some(error) = error {
        println!("{} {}", style("     error:").red().bold(), error);
    }
    exit(0);
}

fn progress(len: usize, message: &'static str) -> Result<ProgressBar, Box<dyn Error>> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:<28} [{bar:30.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    Ok(pb)
}

fn main() -> Result<(), Box<dyn Error>> {
    let degree = 4096;
    let plaintext_modulus: u64 = 65537;
    let moduli_sizes = [62, 62, 62];

    let args: Vec<String> = env::args().skip(1).collect();
    if args.contains(&"-h".to_string()) || args.contains(&"--help".to_string()) {
        print_notice_and_exit(None)
    }

    let mut num_parties = 5;
    for arg in &args {
        if arg.starts_with("--num_parties") {
            let parts: Vec<&str> = arg.rsplit('=').collect();
            if parts.len() != 2 || parts[0].parse::<usize>().is_err() {
                print_notice_and_exit(Some("Invalid `--num_parties` argument".to_string()))
            } else {
                num_parties = parts[0].parse::<usize>()?
            }
        } else {
            print_notice_and_exit(Some(format!("Unrecognized argument: {arg}")))
        }
    }
    if num_parties == 0 {
        print_notice_and_exit(Some("The committee cannot be empty".to_string()))
    }

    println!("# Threshold key switching");
    println!("\tnum_parties = {num_parties}");
    println!("\tdegree = {degree}, t = {plaintext_modulus}");

    let par: Arc<BfvParameters> = timeit!(
        "Parameters generation",
        BfvParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(plaintext_modulus)
            .set_moduli_sizes(&moduli_sizes)
            .build_arc()?
    );

    // The session agrees on a single public seed for all its CRPs.
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let mut crps = CrpGenerator::new(&par, seed);

    let committee: Vec<SecretKey> = (0..num_parties)
        .map(|_| SecretKey::random(&par, &mut OsRng))
        .collect();

    println!("\n## Key generation");
    let pk = timeit!("Collective public key", {
        let crp = crps.next_crp()?;
        let mut ckg = CkgProtocol::new(&par, num_parties)?;
        let pb = progress(num_parties, "public key shares")?;
        let mut shares = Vec::with_capacity(num_parties);
        for sk in &committee {
            let mut share = ckg.allocate_share()?;
            ckg.gen_share(sk, &crp, &mut share, &mut thread_rng())?;
            shares.push(share);
            pb.inc(1);
        }
        pb.finish_and_clear();
        ckg.finalize(&aggregate_tree(&shares)?, &crp)?
    });

    let rlk = timeit!("Collective relinearization key", {
        let crp_vec = crps.next_crp_vec(0)?;
        let mut rkg = RkgProtocol::new(&par, num_parties)?;
        let ephemeral: Vec<EphemeralKey> = committee
            .iter()
            .map(|_| EphemeralKey::random(&par, &mut OsRng))
            .collect();
        let pb = progress(3 * num_parties, "relinearization shares")?;

        let mut r1 = Vec::with_capacity(num_parties);
        for (sk, u) in committee.iter().zip(&ephemeral) {
            let mut share = rkg.allocate_share_round_one()?;
            rkg.gen_share_round_one(sk, u, &crp_vec, &mut share, &mut thread_rng())?;
            r1.push(share);
            pb.inc(1);
        }
        let r1 = aggregate_tree(&r1)?;

        let mut r2 = Vec::with_capacity(num_parties);
        for sk in &committee {
            let mut share = rkg.allocate_share_round_two()?;
            rkg.gen_share_round_two(&r1, sk, &crp_vec, &mut share, &mut thread_rng())?;
            r2.push(share);
            pb.inc(1);
        }
        let r2 = aggregate_tree(&r2)?;

        let mut r3 = Vec::with_capacity(num_parties);
        for (sk, u) in committee.iter().zip(&ephemeral) {
            let mut share = rkg.allocate_share_round_three()?;
            rkg.gen_share_round_three(&r2, u, sk, &mut share, &mut thread_rng())?;
            r3.push(share);
            pb.inc(1);
        }
        pb.finish_and_clear();
        rkg.finalize(&r2, &aggregate_tree(&r3)?)?
    });

    println!("\n## Computation");
    let a: Vec<u64> = (0..degree as u64).map(|i| i % 256).collect();
    let b: Vec<u64> = (0..degree as u64).map(|i| (i * 7 + 3) % 256).collect();
    let expected: Vec<u64> = a
        .iter()
        .zip(&b)
        .map(|(x, y)| (x * y) % plaintext_modulus)
        .collect();

    let product: Ciphertext = timeit!("Encrypted product", {
        let ct_a: Ciphertext =
            pk.try_encrypt(&Plaintext::try_encode(&a, Encoding::simd(), &par)?, &mut OsRng)?;
        let ct_b: Ciphertext =
            pk.try_encrypt(&Plaintext::try_encode(&b, Encoding::simd(), &par)?, &mut OsRng)?;
        BfvEvaluator::new(&par)
            .with_relinearization_key(rlk)?
            .try_mul_relin(&ct_a, &ct_b)?
    });

    println!("\n## Hand-over");
    let recipient = SecretKey::random(&par, &mut OsRng);
    let recipient_pk = PublicKey::new(&recipient, &mut OsRng)?;
    let switched = timeit!("Collective public key switching", {
        let mut pcks = PcksProtocol::new(&par, num_parties, FloodingConfig::default())?;
        let pb = progress(num_parties, "key switching shares")?;
        let mut shares = Vec::with_capacity(num_parties);
        for sk in &committee {
            let mut share = pcks.allocate_share(product.level)?;
            pcks.gen_share(sk, &recipient_pk, &product, &mut share, &mut thread_rng())?;
            shares.push(share);
            pb.inc(1);
        }
        pb.finish_and_clear();
        pcks.finalize(&aggregate_tree(&shares)?, &product)?
    });

    let result = Vec::<u64>::try_decode(&recipient.try_decrypt(&switched)?, Encoding::simd())?;
    if result == expected {
        println!(
            "{}",
            style("The recipient decrypts the expected product")
                .green()
                .bold()
        );
    } else {
        println!("{}", style("The recipient decrypted a wrong result").red().bold());
        exit(1);
    }
    Ok(())
}
