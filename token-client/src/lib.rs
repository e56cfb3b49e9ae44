//! HTTP client resolving (index, expiry, option type, strike) to an
//! instrument token via the external token API.

use async_trait::async_trait;
use core_types::types::OptionType;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected response status {0}")]
    Status(reqwest::StatusCode),
    #[error("no token in response for {index} {option_type} {strike}")]
    MissingToken {
        index: String,
        option_type: OptionType,
        strike: i64,
    },
}

/// Seam over token resolution so the expansion state machine can be
/// exercised without the network.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(
        &self,
        index: &str,
        expiry_date: &str,
        option_type: OptionType,
        strike: i64,
    ) -> Result<String, TokenError>;
}

pub struct HttpTokenResolver {
    client: Client,
    base_url: String,
}

impl HttpTokenResolver {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn build_url(
        &self,
        index: &str,
        expiry_date: &str,
        option_type: OptionType,
        strike: i64,
    ) -> Result<Url, TokenError> {
        let mut url = Url::parse(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("index", index)
            .append_pair("expiryDate", expiry_date)
            .append_pair("optionType", option_type.as_str())
            .append_pair("strikePrice", &strike.to_string());
        Ok(url)
    }
}

#[async_trait]
impl TokenResolver for HttpTokenResolver {
    async fn resolve(
        &self,
        index: &str,
        expiry_date: &str,
        option_type: OptionType,
        strike: i64,
    ) -> Result<String, TokenError> {
        let url = self.build_url(index, expiry_date, option_type, strike)?;
        debug!("resolving token: {}", url);
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(TokenError::Status(resp.status()));
        }
        let body: TokenResponse = resp.json().await?;
        extract_token(body).ok_or_else(|| TokenError::MissingToken {
            index: index.to_string(),
            option_type,
            strike,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: Option<TokenValue>,
}

/// The API serves the token as either a number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenValue {
    Number(i64),
    Text(String),
}

fn extract_token(body: TokenResponse) -> Option<String> {
    match body.data?.token? {
        TokenValue::Number(n) => Some(n.to_string()),
        TokenValue::Text(s) => Some(s),
    }
}
