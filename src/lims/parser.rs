//! LIMS response parser
//!
//! Stateless functions turning LimsRest JSON bodies into request ids, sample
//! ids, and manifests. Only the fields this crate needs are interpreted.

use serde_json::Value;
use tracing::{debug, warn};

use super::{LimsError, LimsResult, SampleListing};
use crate::{Manifest, RequestId, SampleId, TimeInterval, SAMPLE_ID_FIELD};

/// Request id field of a delivery record
pub const REQUEST_FIELD: &str = "request";
/// Delivery timestamp field (epoch milliseconds)
pub const DELIVERY_DATE_FIELD: &str = "deliveryDate";
/// Sample list field of a request samples response
pub const SAMPLES_FIELD: &str = "samples";

/// One entry of the request deliveries listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// Delivered request
    pub request_id: RequestId,
    /// Delivery time in epoch milliseconds
    pub delivered_at_ms: i64,
}

/// Stateless parser for LimsRest responses
pub struct LimsParser;

impl LimsParser {
    /// Parse the request deliveries listing.
    ///
    /// Records missing a request id or delivery date are skipped with a
    /// warning. The delivery date may be encoded as an integer or a float.
    ///
    /// # Errors
    /// Returns [`LimsError::MalformedResponse`] if the body is not an array.
    pub fn parse_deliveries(body: Value) -> LimsResult<Vec<DeliveryRecord>> {
        let records = match body {
            Value::Array(records) => records,
            other => {
                return Err(LimsError::MalformedResponse(format!(
                    "expected an array of deliveries, got {}",
                    json_type(&other)
                )))
            }
        };

        let mut deliveries = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let request_id = record.get(REQUEST_FIELD).and_then(Value::as_str);
            let delivered_at_ms = record.get(DELIVERY_DATE_FIELD).and_then(Self::epoch_millis);

            match (request_id, delivered_at_ms) {
                (Some(request_id), Some(delivered_at_ms)) => deliveries.push(DeliveryRecord {
                    request_id: RequestId::new(request_id),
                    delivered_at_ms,
                }),
                _ => warn!(
                    index,
                    record = %record,
                    "Skipping delivery record without request id or delivery date"
                ),
            }
        }

        Ok(deliveries)
    }

    /// Keep the request ids whose delivery falls within `interval`, in order
    pub fn select_request_ids(
        deliveries: Vec<DeliveryRecord>,
        interval: &TimeInterval,
    ) -> Vec<RequestId> {
        deliveries
            .into_iter()
            .filter_map(|record| {
                if interval.admits_delivery(record.delivered_at_ms) {
                    Some(record.request_id)
                } else {
                    debug!(
                        request_id = %record.request_id,
                        delivered_at_ms = record.delivered_at_ms,
                        "Request delivered after end of range, skipping"
                    );
                    None
                }
            })
            .collect()
    }

    /// Extract sample ids from a request samples response.
    ///
    /// Entries without a string sample id are listed by position in
    /// [`SampleListing::unidentified`] so the caller can report them.
    ///
    /// # Errors
    /// Returns [`LimsError::MalformedResponse`] if the body has no `samples`
    /// array.
    pub fn parse_sample_ids(body: &Value) -> LimsResult<SampleListing> {
        let samples = body
            .get(SAMPLES_FIELD)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                LimsError::MalformedResponse(format!(
                    "request samples response has no '{SAMPLES_FIELD}' array"
                ))
            })?;

        let mut listing = SampleListing::new(Vec::with_capacity(samples.len()));
        for (index, sample) in samples.iter().enumerate() {
            match sample.get(SAMPLE_ID_FIELD).and_then(Value::as_str) {
                Some(id) => listing.sample_ids.push(SampleId::new(id)),
                None => {
                    warn!(index, "Sample entry without '{}'", SAMPLE_ID_FIELD);
                    listing.unidentified.push(index);
                }
            }
        }

        Ok(listing)
    }

    /// Parse a sample manifest response.
    ///
    /// The service answers with an array holding the manifest; a bare object
    /// is accepted too.
    ///
    /// # Errors
    /// Returns [`LimsError::MalformedResponse`] for an empty array or a
    /// non-object manifest.
    pub fn parse_manifest(body: Value) -> LimsResult<Manifest> {
        let manifest = match body {
            Value::Array(items) => {
                let count = items.len();
                if count > 1 {
                    warn!(count, "Manifest response holds several records, using the first");
                }
                items.into_iter().next().ok_or_else(|| {
                    LimsError::MalformedResponse("manifest response is empty".to_string())
                })?
            }
            other => other,
        };

        match manifest {
            Value::Object(fields) => Ok(Manifest::new(fields)),
            other => Err(LimsError::MalformedResponse(format!(
                "expected a manifest object, got {}",
                json_type(&other)
            ))),
        }
    }

    fn epoch_millis(value: &Value) -> Option<i64> {
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
