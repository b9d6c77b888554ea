use alloy_primitives::U256;
use chrono::{DateTime, SecondsFormat};
use tracing::warn;

use crate::indexer::ChainReader;
use crate::models::events::{DecodedEvent, EnrichedEvent, NOT_AVAILABLE};

/// Adds block timestamp, gas price and transaction fee to a decoded event.
///
/// Never fails: any lookup that does not succeed degrades its field(s) to
/// [`NOT_AVAILABLE`] and the event is still returned.
pub async fn enrich<C: ChainReader>(chain: &C, decoded: DecodedEvent) -> EnrichedEvent {
    let timestamp = block_timestamp(chain, decoded.block_number).await;
    let (gas_price, transaction_fee) = gas_and_fee(chain, &decoded).await;

    EnrichedEvent {
        decoded,
        timestamp,
        gas_price,
        transaction_fee,
    }
}

async fn block_timestamp<C: ChainReader>(chain: &C, block_number: u64) -> String {
    match chain.block_timestamp(block_number).await {
        Ok(Some(seconds)) => format_timestamp(seconds),
        Ok(None) => {
            warn!("Block {} not found, timestamp unavailable", block_number);
            NOT_AVAILABLE.to_string()
        }
        Err(e) => {
            warn!("Failed to fetch block {}: {}", block_number, e);
            NOT_AVAILABLE.to_string()
        }
    }
}

async fn gas_and_fee<C: ChainReader>(chain: &C, decoded: &DecodedEvent) -> (String, String) {
    let hash = decoded.transaction_hash;
    let unavailable = || (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string());

    let transaction = match chain.transaction(hash).await {
        Ok(Some(transaction)) => transaction,
        Ok(None) => {
            warn!("Transaction {} not found, gas price and fee unavailable", hash);
            return unavailable();
        }
        Err(e) => {
            warn!("Failed to fetch transaction {}: {}", hash, e);
            return unavailable();
        }
    };

    let Some(gas_price) = transaction.gas_price else {
        return unavailable();
    };
    let gas_price_text = gas_price.to_string();

    if transaction.pending {
        return (gas_price_text, NOT_AVAILABLE.to_string());
    }

    let fee = match chain.receipt(hash).await {
        Ok(Some(receipt)) => (U256::from(receipt.gas_used) * U256::from(gas_price)).to_string(),
        Ok(None) => {
            warn!("Receipt for {} not found, fee unavailable", hash);
            NOT_AVAILABLE.to_string()
        }
        Err(e) => {
            warn!("Failed to fetch receipt for {}: {}", hash, e);
            NOT_AVAILABLE.to_string()
        }
    };

    (gas_price_text, fee)
}

/// RFC 3339 in UTC with second precision, e.g. `2024-03-01T12:00:00Z`.
pub fn format_timestamp(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_unix_seconds_as_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_timestamp(1_709_294_400), "2024-03-01T12:00:00Z");
    }

    #[test]
    fn out_of_range_timestamp_is_unavailable() {
        assert_eq!(format_timestamp(u64::MAX), NOT_AVAILABLE);
    }
}
