//! Behavioural tests for the background processor.

use std::cell::RefCell;

use firewatch_core::{BoundingBox, EventRecord, QueryParams, test_support::events_in};
use firewatch_data::{
    BackgroundProcessor, ProcessOutput, ProcessingPath, WorkerConfig, worker::parse_and_filter,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

struct WorkerWorld {
    runtime: tokio::runtime::Runtime,
    processor: RefCell<Option<BackgroundProcessor>>,
    expected: RefCell<Vec<EventRecord>>,
    output: RefCell<Option<ProcessOutput<Vec<EventRecord>>>>,
}

#[fixture]
fn world() -> WorkerWorld {
    WorkerWorld {
        runtime: tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime"),
        processor: RefCell::new(None),
        expected: RefCell::new(Vec::new()),
        output: RefCell::new(None),
    }
}

fn corners(text: &str) -> [f64; 4] {
    let values: Vec<f64> = text
        .split(',')
        .map(|part| part.trim().parse().expect("numeric corner"))
        .collect();
    values.try_into().expect("four corners")
}

#[given("a background processor with threshold {threshold}")]
fn given_processor(world: &WorkerWorld, threshold: usize) {
    let processor = BackgroundProcessor::new(WorkerConfig::default().with_threshold(threshold));
    assert!(world.runtime.block_on(processor.init()));
    *world.processor.borrow_mut() = Some(processor);
}

#[given("the worker has been destroyed")]
fn given_destroyed(world: &WorkerWorld) {
    let processor = world.processor.borrow();
    processor.as_ref().expect("processor").destroy();
}

#[when("I process {count} events over {area} within {scope}")]
fn when_process(world: &WorkerWorld, count: u32, area: String, scope: String) {
    let raw = serde_json::to_string(&events_in(count, corners(&area))).expect("serialise");
    let bbox = BoundingBox::try_from(corners(&scope)).expect("valid box");
    let params = QueryParams::default().with_bbox(bbox);
    *world.expected.borrow_mut() = parse_and_filter(&raw, &params).expect("inline parse");
    let processor = world.processor.borrow();
    let output = world
        .runtime
        .block_on(processor.as_ref().expect("processor").process(&raw, &params))
        .expect("process");
    *world.output.borrow_mut() = Some(output);
}

#[then("the result matches inline processing")]
fn then_matches(world: &WorkerWorld) {
    let output = world.output.borrow();
    let output = output.as_ref().expect("processed");
    assert_eq!(output.data, *world.expected.borrow());
    assert_eq!(output.metrics.output_count, output.data.len());
}

#[then("the work ran on the worker")]
fn then_worker(world: &WorkerWorld) {
    let output = world.output.borrow();
    assert_eq!(
        output.as_ref().expect("processed").metrics.path,
        ProcessingPath::Worker
    );
}

#[then("the work ran inline")]
fn then_inline(world: &WorkerWorld) {
    let output = world.output.borrow();
    assert_eq!(
        output.as_ref().expect("processed").metrics.path,
        ProcessingPath::Synchronous
    );
}

#[scenario(path = "tests/features/worker.feature", index = 0)]
fn large_on_worker(world: WorkerWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/worker.feature", index = 1)]
fn small_inline(world: WorkerWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/worker.feature", index = 2)]
fn destroyed_falls_back(world: WorkerWorld) {
    let _ = world;
}
