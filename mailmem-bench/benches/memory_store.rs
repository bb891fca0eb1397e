//! mailmem benchmark suite.
//!
//! Targets on a laptop-class CPU:
//!   store_put_indexed ................ < 50μs
//!   store_search_top5_from_500 ....... < 2ms
//!   few_shot_retrieve_top5_from_200 .. < 1ms
//!   triage_prompt_render ............. < 20μs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use mailmem_bench::{email, label, stores};
use mailmem_core::procedural::ProceduralMemory;
use mailmem_core::semantic::{canonicalize, SemanticMemory};
use mailmem_core::{MemoryStore, Namespace};
use mailmem_llm::prompt::{PromptEngine, PromptId};
use serde_json::json;

/// Benchmark: one indexed write (embedding included).
fn bench_store_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_put_indexed");
    for (backend, store) in stores() {
        let ns = Namespace::episodic("bench", "tenant").expect("namespace");
        let mut i = 0usize;
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| {
                i += 1;
                store
                    .put(&ns, &format!("note-{}", i % 1000), json!({ "content": canonicalize(&email(i)) }))
                    .expect("put");
            });
        });
    }
    group.finish();
}

/// Benchmark: top-5 similarity search over 500 records.
fn bench_store_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_search_top5_from_500");
    for (backend, store) in stores() {
        let ns = Namespace::episodic("bench", "tenant").expect("namespace");
        for i in 0..500 {
            store
                .put(&ns, &format!("note-{i}"), json!({ "content": canonicalize(&email(i)) }))
                .expect("seed");
        }
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| {
                let hits = store
                    .search(black_box(&ns), black_box("build failed last night"), 5)
                    .expect("search");
                black_box(hits);
            });
        });
    }
    group.finish();
}

/// Benchmark: few-shot retrieval as triage does it.
fn bench_few_shot(c: &mut Criterion) {
    let mut group = c.benchmark_group("few_shot_retrieve_top5_from_200");
    for (backend, store) in stores() {
        let semantic = SemanticMemory::new(store, "email_assistant");
        for i in 0..200 {
            semantic
                .add_example("john", &format!("ex-{i}"), &email(i), label(i))
                .expect("seed");
        }
        let query = email(7);
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| {
                let examples = semantic
                    .retrieve_similar("john", black_box(&query), 5)
                    .expect("retrieve");
                black_box(examples);
            });
        });
    }
    group.finish();
}

/// Benchmark: rule lookup plus triage template rendering.
fn bench_prompt_render(c: &mut Criterion) {
    let (_, store) = stores().swap_remove(0);
    let procedural = ProceduralMemory::new(store);
    let engine = PromptEngine::builtin();
    let examples = "Here are some previous examples:\n\n".repeat(5);

    c.bench_function("triage_prompt_render", |b| {
        b.iter(|| {
            let rule = procedural
                .get_or_init("john", "respond_rule", "Direct questions from team members")
                .expect("rule");
            let rendered = engine
                .render(
                    PromptId::Triage,
                    &[
                        ("name", "John"),
                        ("full_name", "John Doe"),
                        ("user_profile_background", "Senior software engineer"),
                        ("triage_no", "Marketing newsletters"),
                        ("triage_notify", "Build notifications"),
                        ("triage_email", rule.as_str()),
                        ("examples", examples.as_str()),
                        ("author", "sarah.lee@company.com"),
                        ("to", "john.doe@company.com"),
                        ("subject", "Q3 slides"),
                        ("email_thread", "Could you resend the slides?"),
                    ],
                )
                .expect("render");
            black_box(rendered);
        });
    });
}

criterion_group!(
    benches,
    bench_store_put,
    bench_store_search,
    bench_few_shot,
    bench_prompt_render,
);
criterion_main!(benches);
