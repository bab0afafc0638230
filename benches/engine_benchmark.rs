use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use periscope::cipher;
use periscope::fragments::{FragmentBuffer, FragmentOutcome};
use periscope::morse;

fn bench_xor_decrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cipher");
    let payload = cipher::xor_encrypt(
        r#"{"name":"Nautilus","country":"FR","captain":"Nemo","type":"attack","color":"#00ff00"}"#,
        42,
    );
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("xor_decrypt_profile", |b| {
        b.iter(|| black_box(cipher::xor_decrypt(black_box(&payload), 42)))
    });

    group.finish();
}

fn bench_morse_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("Morse");
    // a realistic intercepted line
    let line = ".... --- .-..    .- -- .. --. ---   ... --- ...";
    group.throughput(Throughput::Bytes(line.len() as u64));

    group.bench_function("decode_line", |b| {
        b.iter(|| black_box(morse::decode(black_box(line))))
    });

    group.finish();
}

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("Fragments");
    let parts: Vec<String> = (0..16).map(|i| format!("fragment-{i:02}-payload")).collect();
    group.throughput(Throughput::Elements(parts.len() as u64));

    group.bench_function("assemble_16_parts_reversed", |b| {
        b.iter(|| {
            let mut buf = FragmentBuffer::new(parts.len() as u32);
            let mut result = None;
            for n in (1..=parts.len() as u32).rev() {
                if let FragmentOutcome::Complete(text) =
                    buf.insert(n, &parts[n as usize - 1])
                {
                    result = Some(text);
                }
            }
            black_box(result)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_xor_decrypt, bench_morse_decode, bench_reassembly);
criterion_main!(benches);
