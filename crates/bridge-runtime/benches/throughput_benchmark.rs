use bridge_runtime::{Dispatcher, HandleRegistry, ModuleRegistry, Request, SimpleModule};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn throughput_module() -> Arc<dyn bridge_runtime::HandlerModule> {
    Arc::new(SimpleModule::new("throughput").with_function(
        "process",
        Arc::new(|params: serde_json::Map<String, serde_json::Value>, _handles| async move {
            let id = params.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
            Ok(serde_json::json!({"id": id, "processed": true}))
        }),
    ))
}

fn request(id: u64) -> Request {
    serde_json::from_value(serde_json::json!({
        "module": "throughput",
        "function": "process",
        "params": {"id": id, "data": format!("payload_{id}")},
    }))
    .unwrap()
}

fn sequential_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("sequential_throughput");

    for size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut registry = ModuleRegistry::new();
            registry.register(throughput_module());
            let handles = Arc::new(HandleRegistry::new(dir.path()));
            let dispatcher = Dispatcher::new(Arc::new(registry), handles);

            b.to_async(&rt).iter(|| async {
                for i in 0..size {
                    let response = dispatcher.dispatch(request(i)).await;
                    black_box(response);
                }
            });
        });
    }

    group.finish();
}

fn concurrent_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();

    let mut group = c.benchmark_group("concurrent_throughput");

    for num_tasks in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*num_tasks));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_tasks),
            num_tasks,
            |b, &num_tasks| {
                let mut registry = ModuleRegistry::new();
                registry.register(throughput_module());
                let handles = Arc::new(HandleRegistry::new(dir.path()));
                let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), handles));

                b.to_async(&rt).iter(|| {
                    let dispatcher = dispatcher.clone();
                    async move {
                        let mut tasks = Vec::new();
                        for i in 0..num_tasks {
                            let dispatcher = dispatcher.clone();
                            tasks.push(tokio::spawn(async move {
                                black_box(dispatcher.dispatch(request(i)).await);
                            }));
                        }
                        for task in tasks {
                            task.await.unwrap();
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

fn payload_size_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("payload_size");

    for size_kb in [1, 10, 100].iter() {
        let size_bytes = size_kb * 1024;
        group.throughput(Throughput::Bytes(size_bytes as u64));

        group.bench_with_input(
            BenchmarkId::new("dispatch", format!("{size_kb}KB")),
            size_kb,
            |b, &_size_kb| {
                let mut registry = ModuleRegistry::new();
                registry.register(throughput_module());
                let handles = Arc::new(HandleRegistry::new(dir.path()));
                let dispatcher = Dispatcher::new(Arc::new(registry), handles);

                let payload = "x".repeat(size_bytes);
                let request: Request = serde_json::from_value(serde_json::json!({
                    "module": "throughput",
                    "function": "process",
                    "params": {"id": 1, "data": payload},
                }))
                .unwrap();

                b.to_async(&rt).iter(|| async {
                    black_box(dispatcher.dispatch(request.clone()).await);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    sequential_throughput,
    concurrent_throughput,
    payload_size_benchmark
);
criterion_main!(benches);
