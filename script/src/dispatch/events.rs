//! Normalization of deposit notifications into [`Deposit`] tuples.

use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    /// Source transaction signature.
    pub signature: String,
    pub destination: Pubkey,
    pub asset: Pubkey,
    pub amount: u64,
}

impl Deposit {
    /// Idempotency key: `signature:destination:asset`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.signature, self.destination, self.asset)
    }
}

impl fmt::Display for Deposit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} to {} ({})",
            self.amount, self.asset, self.destination, self.signature
        )
    }
}

/// Accepts a JSON array of events or a single event object.
pub fn normalize_batch(payload: &Value) -> Vec<Deposit> {
    match payload {
        Value::Array(events) => events.iter().flat_map(normalize_event).collect(),
        Value::Object(_) => normalize_event(payload),
        _ => {
            warn!(target: "dispatch", "notification payload is neither an object nor an array");
            Vec::new()
        }
    }
}

/// Token deposits carried by one event. Native transfers are ignored.
pub fn normalize_event(event: &Value) -> Vec<Deposit> {
    let Some(signature) = event.get("signature").and_then(Value::as_str) else {
        warn!(target: "dispatch", "event without signature dropped");
        return Vec::new();
    };

    let credits = match event.get("type").and_then(Value::as_str) {
        Some("TRANSFER") => transfer_credits(event),
        _ => balance_change_credits(event),
    };

    // One deposit per (destination, asset) in a transaction.
    let mut merged: BTreeMap<(Pubkey, Pubkey), u64> = BTreeMap::new();
    for (destination, asset, amount) in credits {
        let entry = merged.entry((destination, asset)).or_default();
        *entry = entry.saturating_add(amount);
    }

    merged
        .into_iter()
        .map(|((destination, asset), amount)| Deposit {
            signature: signature.to_string(),
            destination,
            asset,
            amount,
        })
        .collect()
}

fn transfer_credits(event: &Value) -> Vec<(Pubkey, Pubkey, u64)> {
    let balance_changes = balance_change_credits(event);
    let transfers = event
        .get("tokenTransfers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    transfers
        .iter()
        .filter_map(|transfer| {
            let destination = pubkey_field(transfer, "toUserAccount")?;
            let asset = pubkey_field(transfer, "mint")?;
            let raw = transfer
                .get("rawTokenAmount")
                .and_then(|raw| raw.get("tokenAmount"))
                .and_then(parse_raw_amount);
            let amount = match raw {
                Some(amount) => amount,
                None => {
                    let fallback = balance_changes
                        .iter()
                        .find(|(d, a, _)| *d == destination && *a == asset)
                        .map(|(_, _, amount)| *amount);
                    match fallback {
                        Some(amount) => amount,
                        None => {
                            warn!(target: "dispatch", destination = %destination, mint = %asset, "transfer without raw amount dropped");
                            return None;
                        }
                    }
                }
            };
            Some((destination, asset, amount))
        })
        .collect()
}

fn balance_change_credits(event: &Value) -> Vec<(Pubkey, Pubkey, u64)> {
    let accounts = event
        .get("accountData")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    accounts
        .iter()
        .filter_map(|account| account.get("tokenBalanceChanges").and_then(Value::as_array))
        .flatten()
        .filter_map(|change| {
            let destination = pubkey_field(change, "userAccount")?;
            let asset = pubkey_field(change, "mint")?;
            let delta = change
                .get("rawTokenAmount")
                .and_then(|raw| raw.get("tokenAmount"))
                .and_then(parse_signed_amount)?;
            (delta > 0).then(|| (destination, asset, u64::try_from(delta).unwrap_or(u64::MAX)))
        })
        .collect()
}

fn pubkey_field(value: &Value, field: &str) -> Option<Pubkey> {
    let raw = value.get(field).and_then(Value::as_str)?;
    match Pubkey::from_str(raw) {
        Ok(key) => Some(key),
        Err(_) => {
            warn!(target: "dispatch", field, value = raw, "unparseable address dropped");
            None
        }
    }
}

fn parse_raw_amount(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => u64::from_str(s).ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn parse_signed_amount(value: &Value) -> Option<i128> {
    let parsed = match value {
        Value::String(s) => i128::from_str(s).ok(),
        Value::Number(n) => n.as_i64().map(i128::from),
        _ => None,
    };
    if parsed.is_none() {
        warn!(target: "dispatch", amount = %value, "unparseable amount dropped");
    }
    parsed
}
