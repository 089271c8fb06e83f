//! Aggregation runs against an in-memory LIMS

use std::sync::Arc;
use std::time::Duration;

use lims_publisher::aggregator::{AggregatorError, PipelineConfig, RequestAggregator, RunState};
use lims_publisher::date_range::resolve;
use lims_publisher::lims::LimsError;
use lims_publisher::{RequestId, SampleId};

use crate::support::{day, event_log, CollectingPublisher, FakeSource};

fn config(chunk_size: usize, processing: usize, fetch: usize) -> PipelineConfig {
    PipelineConfig {
        chunk_size,
        processing_pool_width: processing,
        fetch_pool_width: fetch,
    }
}

#[tokio::test]
async fn january_run_drops_late_request_and_reports_failed_sample() {
    let source = Arc::new(
        FakeSource::new()
            .delivered("R1", day(5), &["S1", "S2"])
            .delivered("R2", day(45), &["S3"])
            .failing_sample("S2"),
    );
    let interval = resolve("2024/01/01", Some("2024/01/31")).unwrap();
    let publisher = CollectingPublisher::new();

    let aggregator = RequestAggregator::new(source.clone(), PipelineConfig::default());
    let summary = aggregator.run(&interval, &publisher).await.unwrap();

    let results = publisher.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].request_id, RequestId::from("R1"));
    assert_eq!(results[0].len(), 1);
    assert_eq!(results[0].manifests[0].sample_id(), Some("S1"));

    assert_eq!(summary.requests_total, 1);
    assert_eq!(summary.requests_published, 1);
    assert_eq!(summary.samples_failed, 1);
    assert_eq!(
        summary.ledger.failed_samples(&RequestId::from("R1")),
        Some(&[SampleId::from("S2")][..])
    );
    assert_eq!(summary.ledger.failed_samples(&RequestId::from("R2")), None);

    let report = summary.ledger.render();
    assert!(report.contains("Request: R1, errors: 1"));
    assert!(report.contains("S2"));
    assert_eq!(aggregator.state(), RunState::Done);
    // R2 was filtered out before any sample traffic.
    assert_eq!(source.manifest_calls(), 2);
}

#[tokio::test]
async fn failed_manifests_are_dropped_and_recorded_in_order() {
    let samples: Vec<String> = (0..12).map(|i| format!("S{i}")).collect();
    let refs: Vec<&str> = samples.iter().map(String::as_str).collect();
    let source = FakeSource::new()
        .delivered("R1", day(2), &refs)
        .failing_sample("S1")
        .failing_sample("S5")
        .failing_sample("S9");
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    let summary = RequestAggregator::new(Arc::new(source), config(10, 10, 3))
        .run(&interval, &publisher)
        .await
        .unwrap();

    let resolved: Vec<_> = publisher.results()[0]
        .manifests
        .iter()
        .map(|m| m.sample_id().unwrap().to_string())
        .collect();
    assert_eq!(
        resolved,
        vec!["S0", "S2", "S3", "S4", "S6", "S7", "S8", "S10", "S11"]
    );
    assert_eq!(
        summary.ledger.failed_samples(&RequestId::from("R1")).unwrap(),
        &[SampleId::from("S1"), SampleId::from("S5"), SampleId::from("S9")]
    );
    assert_eq!(summary.samples_failed, 3);
}

#[tokio::test]
async fn request_with_every_sample_failed_is_still_published_empty() {
    let source = FakeSource::new()
        .delivered("R1", day(2), &["S1", "S2"])
        .failing_sample("S1")
        .failing_sample("S2");
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    let summary = RequestAggregator::new(Arc::new(source), PipelineConfig::default())
        .run(&interval, &publisher)
        .await
        .unwrap();

    assert_eq!(publisher.results().len(), 1);
    assert!(publisher.results()[0].is_empty());
    assert_eq!(summary.samples_failed, 2);
}

#[tokio::test]
async fn open_ended_range_keeps_every_request_in_order() {
    let source = FakeSource::new()
        .delivered("R3", day(400), &["A"])
        .delivered("R1", day(2), &["B"])
        .delivered("R2", day(90), &["C"]);
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    RequestAggregator::new(Arc::new(source), PipelineConfig::default())
        .run(&interval, &publisher)
        .await
        .unwrap();

    assert_eq!(publisher.request_ids(), vec!["R3", "R1", "R2"]);
}

#[tokio::test]
async fn sample_listing_failure_skips_request_and_continues() {
    let source = FakeSource::new()
        .delivered("R1", day(2), &["S1"])
        .delivered("R2", day(3), &["S2"])
        .delivered("R3", day(4), &["S3"])
        .failing_request("R2");
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    let summary = RequestAggregator::new(Arc::new(source), PipelineConfig::default())
        .run(&interval, &publisher)
        .await
        .unwrap();

    assert_eq!(publisher.request_ids(), vec!["R1", "R3"]);
    assert_eq!(summary.requests_failed, 1);
    let failure = &summary.ledger.request_failures()[0];
    assert_eq!(failure.request_id, RequestId::from("R2"));
    assert!(failure.reason.contains("server error 500"));
    assert!(summary.ledger.render().contains("REQUEST FAILURES"));
    assert!(!summary.is_clean());
}

#[tokio::test]
async fn request_listing_failure_fails_the_run() {
    let source = FakeSource::new()
        .delivered("R1", day(2), &["S1"])
        .failing_listing(LimsError::SourceUnavailable("connection refused".into()));
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    let aggregator = RequestAggregator::new(Arc::new(source), PipelineConfig::default());
    let err = aggregator.run(&interval, &publisher).await.unwrap_err();

    assert!(matches!(err, AggregatorError::RequestIds(_)));
    assert_eq!(aggregator.state(), RunState::Failed);
    assert!(publisher.results().is_empty());
}

#[tokio::test]
async fn publisher_rejection_fails_the_run() {
    let source = FakeSource::new()
        .delivered("R1", day(2), &["S1"])
        .delivered("R2", day(3), &["S2"]);
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new().rejecting("R2");

    let aggregator = RequestAggregator::new(Arc::new(source), PipelineConfig::default());
    let err = aggregator.run(&interval, &publisher).await.unwrap_err();

    assert!(matches!(err, AggregatorError::Publish(_)));
    assert_eq!(aggregator.state(), RunState::Failed);
    assert_eq!(publisher.request_ids(), vec!["R1"]);
}

#[tokio::test]
async fn results_published_in_request_order_one_flush_per_chunk() {
    let source = FakeSource::new()
        .with_requests(25, 2)
        .with_delay(Duration::from_millis(2));
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    let summary = RequestAggregator::new(Arc::new(source), config(10, 4, 3))
        .run(&interval, &publisher)
        .await
        .unwrap();

    let expected: Vec<String> = (0..25).map(|r| format!("R{r}")).collect();
    assert_eq!(publisher.request_ids(), expected);
    assert_eq!(summary.chunks_total, 3);
    assert_eq!(summary.chunks_processed, 3);
    assert_eq!(publisher.flushes(), 3);
    assert!(summary.is_clean());
}

#[tokio::test]
async fn fetch_pool_bounds_concurrent_manifest_calls() {
    let source = Arc::new(
        FakeSource::new()
            .with_requests(5, 6)
            .with_delay(Duration::from_millis(10)),
    );
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    RequestAggregator::new(source.clone(), config(10, 5, 2))
        .run(&interval, &publisher)
        .await
        .unwrap();

    assert_eq!(source.manifest_calls(), 30);
    assert!(source.max_in_flight() <= 2, "saw {}", source.max_in_flight());
    assert!(source.max_in_flight() >= 1);
}

#[tokio::test]
async fn processing_pool_bounds_concurrent_requests() {
    let source = Arc::new(
        FakeSource::new()
            .with_requests(12, 1)
            .with_delay(Duration::from_millis(10)),
    );
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    RequestAggregator::new(source.clone(), config(12, 3, 5))
        .run(&interval, &publisher)
        .await
        .unwrap();

    assert_eq!(publisher.results().len(), 12);
    assert!(
        source.max_requests_in_flight() <= 3,
        "saw {}",
        source.max_requests_in_flight()
    );
    assert!(source.max_requests_in_flight() >= 2);
}

#[tokio::test]
async fn slow_head_request_does_not_hold_back_the_chunk() {
    let log = event_log();
    let source = FakeSource::new()
        .with_requests(4, 1)
        .with_delay(Duration::from_millis(20))
        .slow_listing("R0", Duration::from_millis(400))
        .with_log(log.clone());
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    RequestAggregator::new(Arc::new(source), config(4, 2, 4))
        .run(&interval, &publisher)
        .await
        .unwrap();

    // R2 and R3 take the worker R1 frees while R0 is still listing.
    let events = log.lock().clone();
    let at = |event: &str| {
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing {event} in {events:?}"))
    };
    assert!(at("start:R2") < at("listed:R0"), "{events:?}");
    assert!(at("start:R3") < at("listed:R0"), "{events:?}");

    // Publication still follows request order.
    assert_eq!(publisher.request_ids(), vec!["R0", "R1", "R2", "R3"]);
}

#[tokio::test]
async fn unidentified_samples_are_reported_without_fetching() {
    let source = Arc::new(
        FakeSource::new()
            .delivered("R1", day(5), &["S1", "S2"])
            .unidentified_samples("R1", &[1]),
    );
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    let summary = RequestAggregator::new(source.clone(), PipelineConfig::default())
        .run(&interval, &publisher)
        .await
        .unwrap();

    let results = publisher.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 2);
    assert_eq!(source.manifest_calls(), 2);

    assert_eq!(summary.samples_failed, 1);
    assert!(!summary.is_clean());
    assert_eq!(
        summary.ledger.failed_samples(&RequestId::from("R1")),
        Some(&[SampleId::from("<missing igoSampleId #1>")][..])
    );
    let report = summary.ledger.render();
    assert!(report.contains("Request: R1, errors: 1"));
    assert!(report.contains("<missing igoSampleId #1>"));
}

#[tokio::test]
async fn repeated_runs_publish_identical_results() {
    let source = Arc::new(
        FakeSource::new()
            .with_requests(7, 3)
            .failing_sample("R4-S1"),
    );
    let interval = resolve("2024/01/01", None).unwrap();
    let aggregator = RequestAggregator::new(source, config(3, 2, 2));

    let first = CollectingPublisher::new();
    let second = CollectingPublisher::new();
    let summary_a = aggregator.run(&interval, &first).await.unwrap();
    let summary_b = aggregator.run(&interval, &second).await.unwrap();

    assert_eq!(first.results(), second.results());
    assert_eq!(summary_a, summary_b);
}

#[tokio::test]
async fn empty_range_publishes_nothing() {
    let interval = resolve("2024/01/01", Some("2024/01/31")).unwrap();
    let publisher = CollectingPublisher::new();

    let summary = RequestAggregator::new(Arc::new(FakeSource::new()), PipelineConfig::default())
        .run(&interval, &publisher)
        .await
        .unwrap();

    assert_eq!(summary.requests_total, 0);
    assert_eq!(summary.chunks_total, 0);
    assert_eq!(publisher.flushes(), 0);
    assert!(summary.ledger.render().contains("No errors."));
}

#[tokio::test]
async fn zero_width_pool_rejected_before_any_call() {
    let source = Arc::new(FakeSource::new().with_requests(2, 1));
    let interval = resolve("2024/01/01", None).unwrap();
    let publisher = CollectingPublisher::new();

    let err = RequestAggregator::new(source.clone(), config(10, 0, 5))
        .run(&interval, &publisher)
        .await
        .unwrap_err();

    assert!(matches!(err, AggregatorError::InvalidConfig(_)));
    assert_eq!(source.manifest_calls(), 0);
}
