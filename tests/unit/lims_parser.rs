//! Unit tests for LIMS response parsing on recorded fixtures

use lims_publisher::date_range::resolve;
use lims_publisher::lims::{LimsError, LimsParser};
use lims_publisher::{RequestId, SampleId};
use serde_json::json;

use crate::support::day;

fn deliveries_fixture() -> serde_json::Value {
    json!([
        {"request": "09641_B", "deliveryDate": day(3), "investigator": "smith"},
        {"request": "09702", "deliveryDate": day(31) as f64},
        {"request": "09703_C", "deliveryDate": day(31) + 1},
        {"request": "09650", "deliveryDate": day(12)},
    ])
}

fn ids(ids: &[RequestId]) -> Vec<&str> {
    ids.iter().map(RequestId::as_str).collect()
}

#[test]
fn open_range_keeps_all_in_source_order() {
    let interval = resolve("2024/01/01", None).unwrap();
    let deliveries = LimsParser::parse_deliveries(deliveries_fixture()).unwrap();

    let selected = LimsParser::select_request_ids(deliveries, &interval);
    assert_eq!(ids(&selected), vec!["09641_B", "09702", "09703_C", "09650"]);
}

#[test]
fn bounded_range_keeps_deliveries_up_to_end_inclusive() {
    let interval = resolve("2024/01/01", Some("2024/01/31")).unwrap();
    let deliveries = LimsParser::parse_deliveries(deliveries_fixture()).unwrap();

    let selected = LimsParser::select_request_ids(deliveries, &interval);
    // 09702 lands exactly on the end instant; 09703_C is 1 ms past it.
    assert_eq!(ids(&selected), vec!["09641_B", "09702", "09650"]);
}

#[test]
fn sample_ids_keep_response_order() {
    let body = json!({
        "requestId": "09641_B",
        "samples": [
            {"igoSampleId": "09641_B_3", "investigatorSampleId": "P-3"},
            {"igoSampleId": "09641_B_1"},
            {"investigatorSampleId": "orphan"},
            {"igoSampleId": "09641_B_2"},
        ]
    });

    let listing = LimsParser::parse_sample_ids(&body).unwrap();
    assert_eq!(
        listing.sample_ids,
        vec![
            SampleId::from("09641_B_3"),
            SampleId::from("09641_B_1"),
            SampleId::from("09641_B_2"),
        ]
    );
    // The orphan entry is kept by position, not dropped.
    assert_eq!(listing.unidentified, vec![2]);
}

#[test]
fn empty_sample_list_is_not_an_error() {
    let listing = LimsParser::parse_sample_ids(&json!({"samples": []})).unwrap();
    assert!(listing.is_empty());
}

#[test]
fn manifest_array_uses_first_record_untouched() {
    let body = json!([
        {
            "igoSampleId": "09641_B_1",
            "cmoPatientId": "C-ABC123",
            "libraries": [{"barcodeId": "DUAL_IDT_LIB_01"}],
        },
        {"igoSampleId": "09641_B_1", "stale": true},
    ]);

    let manifest = LimsParser::parse_manifest(body).unwrap();
    assert_eq!(manifest.sample_id(), Some("09641_B_1"));
    assert_eq!(
        manifest.get("libraries"),
        Some(&json!([{"barcodeId": "DUAL_IDT_LIB_01"}]))
    );
    assert!(manifest.get("stale").is_none());
}

#[test]
fn empty_manifest_array_is_malformed() {
    let err = LimsParser::parse_manifest(json!([])).unwrap_err();
    assert_eq!(
        err,
        LimsError::MalformedResponse("manifest response is empty".into())
    );
}
