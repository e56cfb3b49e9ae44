//! Multi-format payload decoding.
//!
//! Encodings are tried in a fixed priority order: single binary
//! record, binary batch, then JSON with a numeric `ltp` field. A
//! payload that defeats all three is logged and dropped; decoding
//! never fails the caller.

use log::warn;
use prost::Message;
use serde_json::Value;
use thiserror::Error;

use crate::wire::{MarketData, MarketDataBatch};

#[derive(Debug, Error)]
enum DecodeError {
    #[error("protobuf decode error: {0}")]
    Proto(#[from] prost::DecodeError),
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),
}

type DecodeFn = fn(&[u8]) -> Result<Vec<f64>, DecodeError>;

const STRATEGIES: [DecodeFn; 3] = [decode_single, decode_batch, decode_json];

/// Decode a raw payload into zero or more prices. Entries without a
/// well-formed price are filtered, never fatal.
pub fn decode_payload(topic: &str, payload: &[u8]) -> Vec<f64> {
    let mut last_err = None;
    for decode in STRATEGIES {
        match decode(payload) {
            Ok(prices) => return prices,
            Err(err) => last_err = Some(err),
        }
    }
    if let Some(err) = last_err {
        warn!("dropping undecodable message on {}: {}", topic, err);
    }
    Vec::new()
}

fn decode_single(payload: &[u8]) -> Result<Vec<f64>, DecodeError> {
    let record = MarketData::decode(payload)?;
    Ok(if record.ltp.is_finite() {
        vec![record.ltp]
    } else {
        Vec::new()
    })
}

fn decode_batch(payload: &[u8]) -> Result<Vec<f64>, DecodeError> {
    let batch = MarketDataBatch::decode(payload)?;
    Ok(batch
        .data
        .iter()
        .map(|record| record.ltp)
        .filter(|ltp| ltp.is_finite())
        .collect())
}

fn decode_json(payload: &[u8]) -> Result<Vec<f64>, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    Ok(value
        .get("ltp")
        .and_then(Value::as_f64)
        .filter(|ltp| ltp.is_finite())
        .into_iter()
        .collect())
}
