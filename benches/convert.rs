use criterion::{black_box, criterion_group, criterion_main, Criterion};

use boxforge::profile;

fn clash_subscription(nodes: usize) -> String {
    let mut text = String::from("proxies:\n");
    for i in 0..nodes {
        text.push_str(&format!(
            "  - name: \"node-{i}\"\n    type: ss\n    server: 10.0.{}.{}\n    port: 8388\n    cipher: aes-256-gcm\n    password: pw{i}\n",
            i / 256,
            i % 256,
        ));
    }
    text.push_str("rules:\n");
    for i in 0..50 {
        text.push_str(&format!("  - DOMAIN-SUFFIX,site{i}.example.com,Proxy\n"));
    }
    text.push_str("  - GEOSITE,cn,DIRECT\n  - MATCH,Proxy\n");
    text
}

fn bench_convert(c: &mut Criterion) {
    let small = clash_subscription(10);
    let large = clash_subscription(100);

    c.bench_function("convert_clash_10_nodes", |b| {
        b.iter(|| {
            black_box(boxforge::convert(black_box(&small)).unwrap());
        });
    });

    c.bench_function("convert_clash_100_nodes", |b| {
        b.iter(|| {
            black_box(boxforge::convert(black_box(&large)).unwrap());
        });
    });
}

fn bench_normalize(c: &mut Criterion) {
    let compiled = boxforge::convert(&clash_subscription(100)).unwrap().profile;
    let encoded = profile::encode_json(&compiled).unwrap();

    // 已规范的文档走完检查但不回写，是最常见路径
    c.bench_function("normalize_text_noop_100_nodes", |b| {
        b.iter(|| {
            black_box(profile::normalize_text(black_box(&encoded)));
        });
    });
}

criterion_group!(benches, bench_convert, bench_normalize);
criterion_main!(benches);
