use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fhe_mbfv::bfv::{
    BfvParameters, BfvParametersBuilder, Ciphertext, Encoding, Plaintext, PublicKey,
    RotationDirection, SecretKey,
};
use fhe_mbfv::mbfv::{
    aggregate_all, CkgProtocol, CksProtocol, CrpGenerator, EphemeralKey, FloodingConfig,
    PcksProtocol, RefreshProtocol, RkgNaiveProtocol, RkgProtocol, RtgProtocol,
};
use fhe_traits::{FheDecrypter, FheEncoder, FheEncrypter};
use rand::thread_rng;
use std::sync::Arc;
use std::time::Duration;

/// A parameter set of the benchmark harness.
struct BenchConfig {
    degree: usize,
    plaintext: u64,
    moduli_sizes: &'static [usize],
    parties: usize,
}

const CONFIGS: &[BenchConfig] = &[
    BenchConfig {
        degree: 1024,
        plaintext: 65537,
        moduli_sizes: &[62, 62],
        parties: 3,
    },
    BenchConfig {
        degree: 4096,
        plaintext: 65537,
        moduli_sizes: &[62, 62, 62],
        parties: 5,
    },
];

impl BenchConfig {
    fn parameters(&self) -> Arc<BfvParameters> {
        BfvParametersBuilder::new()
            .set_degree(self.degree)
            .set_plaintext_modulus(self.plaintext)
            .set_moduli_sizes(self.moduli_sizes)
            .build_arc()
            .unwrap()
    }

    fn name(&self) -> String {
        format!(
            "n={}/log(q)={}/parties={}",
            self.degree,
            self.moduli_sizes.iter().sum::<usize>(),
            self.parties
        )
    }
}

struct Session {
    par: Arc<BfvParameters>,
    sk_shares: Vec<SecretKey>,
    sk: SecretKey,
    ct: Ciphertext,
}

fn session(config: &BenchConfig) -> Session {
    let mut rng = thread_rng();
    let par = config.parameters();
    let sk_shares: Vec<SecretKey> = (0..config.parties)
        .map(|_| SecretKey::random(&par, &mut rng))
        .collect();
    let mut sk = SecretKey::new(vec![0; par.degree()], &par);
    for share in &sk_shares {
        sk.add_assign_share(share).unwrap();
    }
    let v: Vec<u64> = (0..par.degree() as u64)
        .map(|i| i % par.plaintext())
        .collect();
    let pt = Plaintext::try_encode(&v, Encoding::simd(), &par).unwrap();
    let ct = sk.try_encrypt(&pt, &mut rng).unwrap();
    Session {
        par,
        sk_shares,
        sk,
        ct,
    }
}

pub fn ckg_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("ckg");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    let mut rng = thread_rng();

    for config in CONFIGS {
        let s = session(config);
        let crp = CrpGenerator::new(&s.par, [0u8; 32]).next_crp().unwrap();
        let mut protocol = CkgProtocol::new(&s.par, config.parties).unwrap();
        let mut share = protocol.allocate_share().unwrap();

        group.bench_function(BenchmarkId::new("gen", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share(&s.sk_shares[0], &crp, &mut share, &mut rng)
                    .unwrap()
            });
        });

        let shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share().unwrap();
                protocol.gen_share(sk, &crp, &mut share, &mut rng).unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg", config.name()), |b| {
            b.iter(|| aggregate_all(&shares).unwrap());
        });

        let aggregated = aggregate_all(&shares).unwrap();
        group.bench_function(BenchmarkId::new("finalize", config.name()), |b| {
            b.iter(|| protocol.clone().finalize(&aggregated, &crp).unwrap());
        });
    }
    group.finish();
}

pub fn cks_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cks");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    let mut rng = thread_rng();

    for config in CONFIGS {
        let s = session(config);
        let sk_out = SecretKey::random(&s.par, &mut rng);
        let mut protocol =
            CksProtocol::new(&s.par, config.parties, FloodingConfig::default()).unwrap();
        let mut share = protocol.allocate_share(0).unwrap();

        group.bench_function(BenchmarkId::new("gen", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share(&s.sk_shares[0], &sk_out, &s.ct, &mut share, &mut rng)
                    .unwrap()
            });
        });

        let shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share(0).unwrap();
                protocol
                    .gen_share(sk, &sk_out, &s.ct, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg", config.name()), |b| {
            b.iter(|| aggregate_all(&shares).unwrap());
        });

        let aggregated = aggregate_all(&shares).unwrap();
        group.bench_function(BenchmarkId::new("finalize", config.name()), |b| {
            b.iter(|| protocol.clone().finalize(&aggregated, &s.ct).unwrap());
        });
    }
    group.finish();
}

pub fn pcks_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcks");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    let mut rng = thread_rng();

    for config in CONFIGS {
        let s = session(config);
        let pk = PublicKey::new(&SecretKey::random(&s.par, &mut rng), &mut rng).unwrap();
        let mut protocol =
            PcksProtocol::new(&s.par, config.parties, FloodingConfig::default()).unwrap();
        let mut share = protocol.allocate_share(0).unwrap();

        group.bench_function(BenchmarkId::new("gen", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share(&s.sk_shares[0], &pk, &s.ct, &mut share, &mut rng)
                    .unwrap()
            });
        });

        let shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share(0).unwrap();
                protocol
                    .gen_share(sk, &pk, &s.ct, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg", config.name()), |b| {
            b.iter(|| aggregate_all(&shares).unwrap());
        });

        let aggregated = aggregate_all(&shares).unwrap();
        group.bench_function(BenchmarkId::new("finalize", config.name()), |b| {
            b.iter(|| protocol.clone().finalize(&aggregated, &s.ct).unwrap());
        });
    }
    group.finish();
}

pub fn rkg_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rkg");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    let mut rng = thread_rng();

    for config in CONFIGS {
        let s = session(config);
        let crps = CrpGenerator::new(&s.par, [1u8; 32]).next_crp_vec(0).unwrap();
        let ephemeral: Vec<EphemeralKey> = s
            .sk_shares
            .iter()
            .map(|_| EphemeralKey::random(&s.par, &mut rng))
            .collect();
        let mut protocol = RkgProtocol::new(&s.par, config.parties).unwrap();

        let mut r1 = protocol.allocate_share_round_one().unwrap();
        group.bench_function(BenchmarkId::new("gen_round_one", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share_round_one(&s.sk_shares[0], &ephemeral[0], &crps, &mut r1, &mut rng)
                    .unwrap()
            });
        });
        let r1_shares: Vec<_> = s
            .sk_shares
            .iter()
            .zip(&ephemeral)
            .map(|(sk, u)| {
                let mut share = protocol.allocate_share_round_one().unwrap();
                protocol
                    .gen_share_round_one(sk, u, &crps, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg_round_one", config.name()), |b| {
            b.iter(|| aggregate_all(&r1_shares).unwrap());
        });
        let r1 = aggregate_all(&r1_shares).unwrap();

        let mut r2 = protocol.allocate_share_round_two().unwrap();
        group.bench_function(BenchmarkId::new("gen_round_two", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share_round_two(&r1, &s.sk_shares[0], &crps, &mut r2, &mut rng)
                    .unwrap()
            });
        });
        let r2_shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share_round_two().unwrap();
                protocol
                    .gen_share_round_two(&r1, sk, &crps, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg_round_two", config.name()), |b| {
            b.iter(|| aggregate_all(&r2_shares).unwrap());
        });
        let r2 = aggregate_all(&r2_shares).unwrap();

        let mut r3 = protocol.allocate_share_round_three().unwrap();
        group.bench_function(BenchmarkId::new("gen_round_three", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share_round_three(&r2, &ephemeral[0], &s.sk_shares[0], &mut r3, &mut rng)
                    .unwrap()
            });
        });
        let r3_shares: Vec<_> = s
            .sk_shares
            .iter()
            .zip(&ephemeral)
            .map(|(sk, u)| {
                let mut share = protocol.allocate_share_round_three().unwrap();
                protocol
                    .gen_share_round_three(&r2, u, sk, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg_round_three", config.name()), |b| {
            b.iter(|| aggregate_all(&r3_shares).unwrap());
        });
        let r3 = aggregate_all(&r3_shares).unwrap();

        group.bench_function(BenchmarkId::new("finalize", config.name()), |b| {
            b.iter(|| protocol.clone().finalize(&r2, &r3).unwrap());
        });
    }
    group.finish();
}

pub fn rkg_naive_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rkg_naive");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    let mut rng = thread_rng();

    for config in CONFIGS {
        let s = session(config);
        let pk = PublicKey::new(&s.sk, &mut rng).unwrap();
        let mut protocol = RkgNaiveProtocol::new(&s.par, config.parties).unwrap();

        let mut n1 = protocol.allocate_share_round_one().unwrap();
        group.bench_function(BenchmarkId::new("gen_round_one", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share_round_one(&s.sk_shares[0], &pk, &mut n1, &mut rng)
                    .unwrap()
            });
        });
        let n1_shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share_round_one().unwrap();
                protocol
                    .gen_share_round_one(sk, &pk, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg_round_one", config.name()), |b| {
            b.iter(|| aggregate_all(&n1_shares).unwrap());
        });
        let n1 = aggregate_all(&n1_shares).unwrap();

        let mut n2 = protocol.allocate_share_round_two().unwrap();
        group.bench_function(BenchmarkId::new("gen_round_two", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share_round_two(&n1, &s.sk_shares[0], &pk, &mut n2, &mut rng)
                    .unwrap()
            });
        });
        let n2_shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share_round_two().unwrap();
                protocol
                    .gen_share_round_two(&n1, sk, &pk, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg_round_two", config.name()), |b| {
            b.iter(|| aggregate_all(&n2_shares).unwrap());
        });
        let n2 = aggregate_all(&n2_shares).unwrap();

        group.bench_function(BenchmarkId::new("finalize", config.name()), |b| {
            b.iter(|| protocol.clone().finalize(&n2).unwrap());
        });
    }
    group.finish();
}

pub fn rtg_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtg");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    let mut rng = thread_rng();

    for config in CONFIGS {
        let s = session(config);
        let crps = CrpGenerator::new(&s.par, [2u8; 32]).next_crp_vec(0).unwrap();
        let mut protocol =
            RtgProtocol::new(&s.par, config.parties, RotationDirection::Left(1)).unwrap();
        let mut share = protocol.allocate_share().unwrap();

        group.bench_function(BenchmarkId::new("gen", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share(&s.sk_shares[0], &crps, &mut share, &mut rng)
                    .unwrap()
            });
        });

        let shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share().unwrap();
                protocol.gen_share(sk, &crps, &mut share, &mut rng).unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg", config.name()), |b| {
            b.iter(|| aggregate_all(&shares).unwrap());
        });

        let aggregated = aggregate_all(&shares).unwrap();
        group.bench_function(BenchmarkId::new("finalize", config.name()), |b| {
            b.iter(|| protocol.clone().finalize(&aggregated, &crps).unwrap());
        });
    }
    group.finish();
}

pub fn refresh_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    let mut rng = thread_rng();

    for config in CONFIGS {
        let s = session(config);
        let crp = CrpGenerator::new(&s.par, [3u8; 32]).next_crp().unwrap();
        let mut protocol =
            RefreshProtocol::new(&s.par, config.parties, FloodingConfig::default()).unwrap();
        let mut share = protocol.allocate_share(0).unwrap();

        group.bench_function(BenchmarkId::new("gen", config.name()), |b| {
            b.iter(|| {
                protocol
                    .gen_share(&s.sk_shares[0], &s.ct, &crp, &mut share, &mut rng)
                    .unwrap()
            });
        });

        let shares: Vec<_> = s
            .sk_shares
            .iter()
            .map(|sk| {
                let mut share = protocol.allocate_share(0).unwrap();
                protocol
                    .gen_share(sk, &s.ct, &crp, &mut share, &mut rng)
                    .unwrap();
                share
            })
            .collect();
        group.bench_function(BenchmarkId::new("agg", config.name()), |b| {
            b.iter(|| aggregate_all(&shares).unwrap());
        });

        let aggregated = aggregate_all(&shares).unwrap();
        group.bench_function(BenchmarkId::new("finalize", config.name()), |b| {
            b.iter(|| protocol.clone().finalize(&s.ct, &crp, &aggregated).unwrap());
        });

        // The refreshed ciphertext still decrypts under the joint key.
        let refreshed = protocol.clone().finalize(&s.ct, &crp, &aggregated).unwrap();
        assert_eq!(
            s.sk.try_decrypt(&refreshed).unwrap(),
            s.sk.try_decrypt(&s.ct).unwrap()
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    ckg_benchmark,
    cks_benchmark,
    pcks_benchmark,
    rkg_benchmark,
    rkg_naive_benchmark,
    rtg_benchmark,
    refresh_benchmark
);
criterion_main!(benches);
