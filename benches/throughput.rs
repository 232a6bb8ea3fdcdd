use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use futures_util::{SinkExt, StreamExt};
use nmdc_proto::{encode, NmdcCodec};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Framed};

// Chat lines as a hub would emit them on one flush, chained into a single
// write per recipient.

fn flush_batch(lines: usize) -> BytesMut {
    let mut batch = BytesMut::new();
    for i in 0..lines {
        batch.extend_from_slice(&encode::chat(&format!("user{i}"), b"some chat text for the hub"));
    }
    batch
}

fn codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let batch = flush_batch(500);
    group.throughput(Throughput::Bytes(batch.len() as u64));

    group.bench_function("decode_flush_batch", |b| {
        b.iter_batched(
            || batch.clone(),
            |mut src| {
                let mut codec = NmdcCodec::new();
                let mut count = 0;
                while let Ok(Some(_)) = codec.decode(&mut src) {
                    count += 1;
                }
                count
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("encode_flush_batch", |b| b.iter(|| flush_batch(500)));
    group.finish();
}

fn loopback_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (client, server) = runtime.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (
            Framed::new(client.unwrap(), NmdcCodec::new()),
            Framed::new(accepted.unwrap().0, NmdcCodec::new()),
        )
    });
    let client = std::cell::RefCell::new(client);
    let server = std::cell::RefCell::new(server);

    let batch = flush_batch(100).freeze();
    let mut group = c.benchmark_group("loopback");
    group.throughput(Throughput::Elements(100));
    group.bench_function("send_and_split_100_lines", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut server = server.borrow_mut();
            let mut client = client.borrow_mut();
            server.send(batch.clone()).await.unwrap();
            for _ in 0..100 {
                client.next().await.unwrap().unwrap();
            }
        })
    });
    group.finish();
}

criterion_group!(benches, codec_benchmark, loopback_benchmark);
criterion_main!(benches);
