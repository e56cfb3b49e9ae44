//! Binary wire messages carried on tick topics.

/// Single tick record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarketData {
    #[prost(double, tag = "1")]
    pub ltp: f64,
}

/// Batch of tick records.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarketDataBatch {
    #[prost(message, repeated, tag = "1")]
    pub data: Vec<MarketData>,
}
