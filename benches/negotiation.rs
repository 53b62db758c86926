use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use smartnego::agents::RuleBasedAgent;
use smartnego::domain::NewItem;
use smartnego::negotiation::{NegotiationEngine, NegotiationSettings};
use smartnego::persistence::InMemoryStore;
use std::sync::Arc;
use tokio::runtime::Runtime;

const SELLER: &str = "seller";
const BUYER: &str = "buyer";

fn create_engine(rt: &Runtime, items: usize) -> Arc<NegotiationEngine> {
    let engine = NegotiationEngine::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(RuleBasedAgent::default()),
        NegotiationSettings::default(),
    );
    rt.block_on(async {
        for i in 0..items {
            engine
                .register_item(
                    SELLER,
                    NewItem {
                        id: format!("item-{}", i),
                        seller_id: SELLER.to_string(),
                        name: format!("Item {}", i),
                        price: 10_000,
                        min_price: Some(7_000),
                        negotiation_enabled: true,
                    },
                )
                .await
                .unwrap();
        }
    });
    Arc::new(engine)
}

fn benchmark_append_with_draft(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = create_engine(&rt, 1);

    c.bench_function("append_with_draft", |b| {
        b.to_async(&rt).iter(|| async {
            let outcome = engine
                .append("item-0", BUYER, "Would you take 8000?", None)
                .await
                .unwrap();
            black_box(outcome)
        });
    });
}

fn benchmark_seller_message(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = create_engine(&rt, 1);

    c.bench_function("append_seller_message", |b| {
        b.to_async(&rt).iter(|| async {
            let outcome = engine
                .append("item-0", SELLER, "Price is firm", None)
                .await
                .unwrap();
            black_box(outcome)
        });
    });
}

fn benchmark_view(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("view");

    for messages in [10usize, 100, 500] {
        let engine = create_engine(&rt, 1);
        rt.block_on(async {
            for i in 0..messages {
                engine
                    .append("item-0", SELLER, &format!("note {}", i), None)
                    .await
                    .unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(messages), &messages, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(engine.view("item-0", BUYER).await.unwrap())
            });
        });
    }

    group.finish();
}

fn benchmark_concurrent_items(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = create_engine(&rt, 16);

    c.bench_function("concurrent_append_16_items", |b| {
        b.to_async(&rt).iter(|| {
            let engine = engine.clone();
            async move {
                let tasks: Vec<_> = (0..16)
                    .map(|i| {
                        let engine = engine.clone();
                        tokio::spawn(async move {
                            engine
                                .append(&format!("item-{}", i), BUYER, "8500?", None)
                                .await
                                .unwrap()
                        })
                    })
                    .collect();
                for task in futures::future::join_all(tasks).await {
                    black_box(task.unwrap());
                }
            }
        });
    });
}

criterion_group!(
    benches,
    benchmark_append_with_draft,
    benchmark_seller_message,
    benchmark_view,
    benchmark_concurrent_items
);
criterion_main!(benches);
