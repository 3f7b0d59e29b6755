//! Latency benchmarks for the per-message hot path
//!
//! Classification runs inline on the message read loop, so tokenize,
//! classify, and the full pipeline should each stay well under a millisecond.
//!
//! Run with: cargo bench -p spamwall-classifiers

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

use spamwall_classifiers::{
    build_engine_from_config, BayesModel, Classifier, ClassifierConfig, RuleBasedPreFilter,
    Tokenizer,
};
use spamwall_core::{
    ClassifierState, InboundMessage, ScopeId, SenderSnapshot, Target, TrainingClass,
};
use spamwall_store::{MemoryStore, StateStore};

const SAMPLES: [(&str, &str); 5] = [
    ("short_latin", "let's have lunch tomorrow"),
    ("short_cjk", "合-约*报@单群组"),
    ("mixed", "这人简-介挂的 合-约-报单群组挺牛的ETH500点，大饼5200点！ + @BTCETHl6666"),
    ("spaced_cjk", "想 赚 钱 的 朋 友 加 我"),
    (
        "long_latin",
        "Hello everyone, I wanted to share a quick update about the meetup next week. \
         We will start at noon, bring your laptops, and we will pair on borrow checker puzzles.",
    ),
];

fn trained_state(model: &BayesModel) -> ClassifierState {
    let mut state = ClassifierState::empty(ScopeId(-1), "bench", Target::Content);
    let spam = [
        "cheap viagra for sale",
        "合约报单群组稳赚不亏",
        "free crypto airdrop join now",
        "私聊我 带你赚钱",
    ];
    let ham = [
        "let's have lunch tomorrow",
        "the build is green again",
        "今天天气很好",
        "anyone tried the new async traits?",
    ];
    for _ in 0..50 {
        for text in spam {
            model.train_text(&mut state, TrainingClass::Spam, text);
        }
        for text in ham {
            model.train_text(&mut state, TrainingClass::Ham, text);
        }
    }
    state
}

/// Benchmark normalization plus segmentation
fn benchmark_tokenizer(c: &mut Criterion) {
    let tokenizer = Tokenizer::new().expect("Failed to create tokenizer");

    let mut group = c.benchmark_group("Tokenizer");
    group.sample_size(100);

    for (name, text) in SAMPLES {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &text, |b, text| {
            b.iter(|| tokenizer.tokenize(black_box(text)));
        });
    }

    group.finish();
}

/// Benchmark Bayes scoring against an in-memory state
fn benchmark_bayes(c: &mut Criterion) {
    let model = BayesModel::new(Arc::new(Tokenizer::new().unwrap()), 0.94, Some(15));
    let state = trained_state(&model);

    let mut group = c.benchmark_group("NaiveBayes");
    group.sample_size(100);

    for (name, text) in SAMPLES {
        group.bench_with_input(BenchmarkId::new("classify", name), &text, |b, text| {
            b.iter(|| model.classify(&state, black_box(text)));
        });
    }

    group.finish();
}

/// Benchmark the rule pre-filter
fn benchmark_rules(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let filter = RuleBasedPreFilter::default();

    let mut group = c.benchmark_group("RulePreFilter");
    for (name, text) in SAMPLES {
        group.bench_with_input(BenchmarkId::new("classify", name), &text, |b, text| {
            b.iter(|| rt.block_on(async { filter.classify(black_box(text)).await.unwrap() }));
        });
    }
    group.finish();
}

/// Benchmark the whole pipeline on clean messages (every stage runs)
fn benchmark_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine =
        build_engine_from_config(&ClassifierConfig::default(), store.clone(), store.clone())
            .unwrap();

    let state = trained_state(engine.classifier.model());
    rt.block_on(async { store.put_state(state).await.unwrap() });

    let message = InboundMessage::new(
        ScopeId(-1),
        SenderSnapshot::new(1, "Ann"),
        "anyone up for lunch tomorrow?",
    );

    c.bench_function("pipeline_clean_message", |b| {
        b.iter(|| {
            rt.block_on(async { engine.pipeline.process(black_box(&message)).await.unwrap() })
        });
    });
}

criterion_group!(
    benches,
    benchmark_tokenizer,
    benchmark_bayes,
    benchmark_rules,
    benchmark_pipeline
);
criterion_main!(benches);
