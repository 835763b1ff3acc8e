//! Authenticated sailing-search client.
//!
//! One POST per availability check. An unauthorized response forces a
//! token refresh and exactly one retry before the failure surfaces as a
//! transient query error.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use sailwatch_core::config::ApiConfig;
use sailwatch_core::error::{Result, SailwatchError};
use sailwatch_core::types::{PollRequest, SailingRecord, SailingStatus};

use crate::poller::SailingSource;
use crate::token::TokenCache;

/// Human-friendly terminal names accepted on the CLI. Anything not
/// listed passes through uppercased as a raw terminal code.
const TERMINAL_ALIASES: &[(&str, &str)] = &[
    ("departure_bay", "NAN"),
    ("departure bay", "NAN"),
    ("horseshoe_bay", "HSB"),
    ("horseshoe bay", "HSB"),
    ("tsawwassen", "TSA"),
    ("swartz_bay", "SWB"),
    ("swartz bay", "SWB"),
    ("duke_point", "DUK"),
    ("duke point", "DUK"),
    ("nanaimo", "NAN"),
    ("vancouver", "HSB"),
    ("victoria", "SWB"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "sailingResults", default)]
    sailing_results: Option<SailingResults>,
}

#[derive(Debug, Deserialize)]
struct SailingResults {
    #[serde(rename = "sailingDetails", default)]
    sailing_details: Vec<SailingDetail>,
}

#[derive(Debug, Deserialize)]
struct SailingDetail {
    #[serde(rename = "departureTime", default)]
    departure_time: String,
    #[serde(rename = "sailingPrice", default)]
    sailing_price: Option<SailingPrice>,
}

#[derive(Debug, Deserialize)]
struct SailingPrice {
    #[serde(default)]
    status: String,
    #[serde(rename = "fromPrice", default)]
    from_price: Option<serde_json::Value>,
}

/// Authenticated client for the sailing-search endpoint.
pub struct ApiClient {
    config: ApiConfig,
    client: reqwest::Client,
    token: TokenCache,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        let token = TokenCache::new(config.clone());
        Self {
            config,
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Resolve a terminal name or code to its wire code.
    pub fn terminal_code(name: &str) -> String {
        let key = name.trim().to_lowercase();
        TERMINAL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, code)| (*code).to_string())
            .unwrap_or_else(|| name.trim().to_uppercase())
    }

    fn search_payload(req: &PollRequest) -> serde_json::Value {
        let mut passengers = Vec::new();
        for (code, quantity) in [
            ("adult", req.adults),
            ("child", req.children),
            ("senior", req.seniors),
            ("infant", req.infants),
        ] {
            if quantity > 0 {
                passengers.push(json!({"code": code, "quantity": quantity}));
            }
        }

        json!({
            "routeDetails": {
                "departureLocation": Self::terminal_code(&req.departure),
                "arrivalLocation": Self::terminal_code(&req.arrival),
                "departureDate": req.date,
                "tripType": "SINGLE",
            },
            "passengerDetails": {
                "passengers": passengers,
                "travellingAsWalkOn": !req.vehicle,
                "allowTAP": false,
                "allowVoucher": false,
                "carryingDangerousGoods": false,
            },
            "vehicleDetails": {
                "vehicleTypeCode": "UH",
                "height": 0,
                "length": 0,
                "carryingDangerousGoods": false,
                "vehicleWithSidecarOrTrailer": false,
                "carryingLivestock": false,
            },
        })
    }

    async fn post_search(
        &self,
        url: &str,
        token: &str,
        payload: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(payload);
        if !self.config.partner_auth.is_empty() {
            request = request.header("x-hybris-auth", &self.config.partner_auth);
        }
        request.send().await
    }

    async fn try_search(
        &self,
        url: &str,
        token: &str,
        payload: &serde_json::Value,
    ) -> Result<Vec<SailingRecord>> {
        let response = self
            .post_search(url, token, payload)
            .await
            .map_err(|e| SailwatchError::query(format!("search request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SailwatchError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(SailwatchError::query(format!(
                "search endpoint returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SailwatchError::query(format!("invalid search response: {e}")))?;

        Ok(parse_records(body))
    }

    /// Query all slots for the requested route/date. An unauthorized
    /// rejection forces one token refresh and one retry; a second
    /// rejection surfaces as a transient query error.
    pub async fn search_sailings(&mut self, req: &PollRequest) -> Result<Vec<SailingRecord>> {
        let url = format!("{}{}", self.config.base_url, self.config.search_path);
        let payload = Self::search_payload(req);

        let token = self.token.get_token(false).await?;
        match self.try_search(&url, &token, &payload).await {
            Err(SailwatchError::Unauthorized) => {
                tracing::warn!("🔒 Source rejected token; forcing refresh and retrying once");
                let token = self.token.get_token(true).await?;
                match self.try_search(&url, &token, &payload).await {
                    Err(SailwatchError::Unauthorized) => Err(SailwatchError::query(
                        "still unauthorized after token refresh",
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }
}

fn parse_records(body: SearchResponse) -> Vec<SailingRecord> {
    body.sailing_results
        .map(|r| r.sailing_details)
        .unwrap_or_default()
        .into_iter()
        .map(|detail| {
            let (status, price) = match detail.sailing_price {
                Some(p) => (SailingStatus::parse(&p.status), format_price(p.from_price)),
                None => (SailingStatus::Unknown, None),
            };
            SailingRecord {
                departure_time: detail.departure_time,
                status,
                price,
            }
        })
        .collect()
}

fn format_price(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl SailingSource for ApiClient {
    async fn search(&mut self, req: &PollRequest) -> Result<Vec<SailingRecord>> {
        self.search_sailings(req).await
    }
}
