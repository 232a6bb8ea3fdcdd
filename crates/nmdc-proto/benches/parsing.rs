use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nmdc_proto::{identify, lock_to_key, BufferChain, FieldLimits, MyInfo};

const MYINFO: &[u8] =
    b"$MyINFO $ALL alice some files<++ V:0.868,M:A,H:1/0/2,S:3,O:2>$ $DSL\x01$a@b.c$1073741824$";

fn bench_identify(c: &mut Criterion) {
    let tokens: [&[u8]; 5] = [
        b"<alice> hello",
        b"$Search Hub:alice F?T?0?9?TTH:AAAA",
        MYINFO,
        b"$ConnectToMe bob 1.2.3.4:412",
        b"$GetNickList",
    ];
    c.bench_function("identify", |b| {
        b.iter(|| {
            for t in tokens {
                black_box(identify(black_box(t)));
            }
        })
    });
}

fn bench_myinfo(c: &mut Criterion) {
    let limits = FieldLimits::default();
    c.bench_function("myinfo_parse_rebuild", |b| {
        b.iter(|| {
            let info = MyInfo::parse(black_box(MYINFO)).unwrap();
            black_box(info.rebuild(&limits, false).unwrap())
        })
    });
}

fn bench_split(c: &mut Criterion) {
    let stream: Vec<u8> = (0..200)
        .flat_map(|i| format!("<user{i}> some chat text|").into_bytes())
        .collect();
    c.bench_function("split_on_delimiter", |b| {
        b.iter(|| {
            let mut chain = BufferChain::new();
            for chunk in stream.chunks(1460) {
                chain.push_slice(chunk);
                while let Some(token) = chain.split_on_delimiter(b"|") {
                    black_box(token);
                }
            }
        })
    });
}

fn bench_key(c: &mut Criterion) {
    c.bench_function("lock_to_key", |b| {
        b.iter(|| black_box(lock_to_key(black_box(b"EXTENDEDPROTOCOLabcdefghijkl"))))
    });
}

criterion_group!(benches, bench_identify, bench_myinfo, bench_split, bench_key);
criterion_main!(benches);
