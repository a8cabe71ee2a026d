use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{slippage_floor, Aggregator, Quote, QuoteRequest};
use crate::error::{RelayError, Stage};

const NO_ROUTE_CODES: [&str; 3] = [
    "COULD_NOT_FIND_ANY_ROUTE",
    "NO_ROUTES_FOUND",
    "TOKEN_NOT_TRADABLE",
];

/// Jupiter v6 swap API.
pub struct JupiterClient {
    http: Client,
    base_url: String,
    max_accounts: usize,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody {
    in_amount: String,
    out_amount: String,
    other_amount_threshold: Option<String>,
    #[serde(default)]
    route_plan: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapBody {
    swap_transaction: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: Option<String>,
    error_code: Option<String>,
}

impl JupiterClient {
    pub fn new(base_url: &str, max_accounts: usize, timeout: Duration) -> Result<Self, RelayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_accounts,
            timeout,
        })
    }

    fn transport_error(&self, stage: Stage, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::Timeout {
                stage,
                after: self.timeout,
            }
        } else {
            RelayError::UpstreamUnavailable(err.to_string())
        }
    }
}

/// Maps a `/quote` response to a [`Quote`] or the matching upstream error.
pub fn parse_quote(
    request: &QuoteRequest,
    status: StatusCode,
    body: &str,
) -> Result<Quote, RelayError> {
    let no_route = || RelayError::NoRoute {
        input: request.input_mint,
        output: request.output_mint,
    };

    if status.is_server_error() {
        return Err(RelayError::UpstreamUnavailable(format!("{status}: {body}")));
    }
    if status.is_client_error() {
        let error: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let code_says_no_route = error
            .error_code
            .as_deref()
            .is_some_and(|code| NO_ROUTE_CODES.contains(&code));
        let text_says_no_route = error
            .error
            .as_deref()
            .is_some_and(|text| text.to_lowercase().contains("route"));
        if code_says_no_route || text_says_no_route {
            return Err(no_route());
        }
        return Err(RelayError::UnexpectedResponse(format!("{status}: {body}")));
    }

    let route: Value = serde_json::from_str(body)
        .map_err(|e| RelayError::UnexpectedResponse(format!("quote is not JSON: {e}")))?;
    let parsed: QuoteBody = serde_json::from_value(route.clone())
        .map_err(|e| RelayError::UnexpectedResponse(format!("quote shape: {e}")))?;
    if parsed.route_plan.is_empty() {
        return Err(no_route());
    }

    let amount_in = parse_amount("inAmount", &parsed.in_amount)?;
    let amount_out = parse_amount("outAmount", &parsed.out_amount)?;
    let min_amount_out = match parsed.other_amount_threshold.as_deref() {
        Some(threshold) => parse_amount("otherAmountThreshold", threshold)?,
        None => slippage_floor(amount_out, request.slippage_bps),
    };

    Ok(Quote {
        input_mint: request.input_mint,
        output_mint: request.output_mint,
        amount_in,
        amount_out,
        min_amount_out,
        slippage_bps: request.slippage_bps,
        route,
        fetched_at: Instant::now(),
    })
}

/// Decodes the base64 container out of a `/swap` response.
pub fn parse_swap_response(status: StatusCode, body: &str) -> Result<Vec<u8>, RelayError> {
    if status.is_server_error() {
        return Err(RelayError::UpstreamUnavailable(format!("{status}: {body}")));
    }
    if !status.is_success() {
        return Err(RelayError::UnexpectedResponse(format!("{status}: {body}")));
    }
    let parsed: SwapBody = serde_json::from_str(body)
        .map_err(|e| RelayError::UnexpectedResponse(format!("swap shape: {e}")))?;
    STANDARD
        .decode(parsed.swap_transaction.as_bytes())
        .map_err(|e| RelayError::UnexpectedResponse(format!("swapTransaction base64: {e}")))
}

fn parse_amount(field: &str, value: &str) -> Result<u64, RelayError> {
    u64::from_str(value)
        .map_err(|_| RelayError::UnexpectedResponse(format!("{field} is not a u64: {value:?}")))
}

#[async_trait]
impl Aggregator for JupiterClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, RelayError> {
        let url = format!("{}/quote", self.base_url);
        let mut query = vec![
            ("inputMint", request.input_mint.to_string()),
            ("outputMint", request.output_mint.to_string()),
            ("amount", request.amount.to_string()),
            ("slippageBps", request.slippage_bps.to_string()),
            ("asLegacyTransaction", "true".to_string()),
        ];
        if self.max_accounts > 0 {
            query.push(("maxAccounts", self.max_accounts.to_string()));
        }

        debug!(target: "aggregator", input = %request.input_mint, output = %request.output_mint, amount = request.amount, "requesting quote");
        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.transport_error(Stage::Quote, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(Stage::Quote, e))?;
        parse_quote(request, status, &body)
    }

    async fn swap_transaction(
        &self,
        quote: &Quote,
        signer: &Pubkey,
        wrap_native: bool,
    ) -> Result<Vec<u8>, RelayError> {
        let url = format!("{}/swap", self.base_url);
        let payload = json!({
            "quoteResponse": quote.route,
            "userPublicKey": signer.to_string(),
            "wrapAndUnwrapSol": wrap_native,
            "asLegacyTransaction": true,
        });

        debug!(target: "aggregator", signer = %signer, wrap_native, "requesting route transaction");
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(Stage::RouteInstruction, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(Stage::RouteInstruction, e))?;
        parse_swap_response(status, &body)
    }
}
