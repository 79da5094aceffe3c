//! Generation throughput benchmarks.
//!
//! Runs the full tokenize → evaluate → sample → detokenize loop on small
//! synthetic models, plus the tokenizer on its own.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use llm_bridge::engine::{generate, GenerationControl, InferenceContext};
use llm_bridge::models::gguf::TensorType;
use llm_bridge::models::synth::SynthSpec;
use llm_bridge::models::{Model, ModelLoader};
use llm_bridge::{ContextParams, GenerationRequest, SamplingParams};

fn bench_model(dir: &tempfile::TempDir, ty: TensorType) -> Arc<Model> {
    let spec = SynthSpec {
        n_embd: 128,
        n_head: 8,
        n_head_kv: 4,
        n_ff: 256,
        n_layer: 4,
        n_ctx_train: 512,
        weight_type: ty,
        ..SynthSpec::default()
    };
    let path = dir.path().join(format!("bench-{}.gguf", ty.name()));
    spec.write_to(&path).unwrap();
    Arc::new(Model::load(&ModelLoader::new(None), &path).unwrap())
}

fn bench_generation(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("generation");
    group.sample_size(20);

    let tokens = 32;
    for ty in [TensorType::F32, TensorType::F16, TensorType::Q8_0] {
        let model = bench_model(&dir, ty);
        let params = ContextParams { window_size: 256, n_threads: 1, ..ContextParams::default() };
        let mut ctx = InferenceContext::new(model, &params).unwrap();
        let sampling = SamplingParams { ignore_eos: true, ..SamplingParams::default() };
        let request = GenerationRequest::new("the quick brown fox", tokens).with_sampling(sampling);

        group.throughput(Throughput::Elements(tokens as u64));
        group.bench_function(BenchmarkId::new("tokens_32", ty.name()), |b| {
            b.iter(|| {
                ctx.reset();
                let result =
                    generate(&mut ctx, &request, &GenerationControl::default(), |_| {}).unwrap();
                black_box(result.tokens.len())
            })
        });
    }

    group.finish();
}

fn bench_prompt_evaluation(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let model = bench_model(&dir, TensorType::F32);
    let mut group = c.benchmark_group("prompt_evaluation");

    for n in [16usize, 64, 128] {
        let tokens: Vec<u32> = (0..n as u32).map(|i| 300 + i % 60).collect();
        let params = ContextParams { window_size: 256, n_threads: 1, ..ContextParams::default() };
        let mut ctx = InferenceContext::new(model.clone(), &params).unwrap();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(BenchmarkId::new("tokens", n), |b| {
            b.iter(|| {
                ctx.reset();
                ctx.evaluate(black_box(&tokens)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_tokenizer(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let model = bench_model(&dir, TensorType::F32);
    let tokenizer = model.tokenizer();
    let text = "The quick brown fox jumps over the lazy dog, and then naïvely into the café. "
        .repeat(20);

    let mut group = c.benchmark_group("tokenizer");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("encode", |b| b.iter(|| tokenizer.encode(black_box(&text)).unwrap()));

    let ids = tokenizer.encode(&text).unwrap();
    group.bench_function("decode", |b| b.iter(|| tokenizer.decode(black_box(&ids)).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_generation, bench_prompt_evaluation, bench_tokenizer);
criterion_main!(benches);
