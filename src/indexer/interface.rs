use std::future::Future;
use std::time::Duration;

use alloy_primitives::Address;
use serde::Deserialize;
use tracing::{info, warn};

use crate::models::errors::InterfaceError;
use crate::models::interface::InterfaceDefinition;
use crate::utils::strip_html;

/// Somewhere a verified contract's ABI can be fetched from.
pub trait InterfaceSource {
    /// Returns the raw ABI JSON document for `address`.
    fn fetch_abi(&self, address: Address) -> impl Future<Output = Result<String, InterfaceError>> + Send;
}

/// Block-explorer `getabi` endpoint (Etherscan and compatible APIs).
pub struct EtherscanSource {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

impl EtherscanSource {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, InterfaceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InterfaceError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

impl InterfaceSource for EtherscanSource {
    async fn fetch_abi(&self, address: Address) -> Result<String, InterfaceError> {
        let address_text = address.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address_text.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| InterfaceError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InterfaceError::Unreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(InterfaceError::Unreachable(format!(
                "HTTP {}: {}",
                status,
                strip_html(&body)
            )));
        }

        parse_explorer_response(&body, address)
    }
}

/// Extracts the ABI document from an explorer response envelope.
/// A status other than `"1"` means the explorer has no ABI for the contract.
pub fn parse_explorer_response(body: &str, address: Address) -> Result<String, InterfaceError> {
    let response: ExplorerResponse =
        serde_json::from_str(body).map_err(|e| InterfaceError::Malformed {
            reason: format!("invalid explorer response: {e}"),
        })?;

    if response.status != "1" {
        let detail = match &response.result {
            serde_json::Value::String(text) if !text.is_empty() => text.clone(),
            _ => response.message.clone(),
        };
        return Err(InterfaceError::NotFound {
            address: address.to_string(),
            message: detail,
        });
    }

    match response.result {
        serde_json::Value::String(abi) => Ok(abi),
        other => Err(InterfaceError::Malformed {
            reason: format!("expected ABI string in result, got {other}"),
        }),
    }
}

/// Fetches and parses the interface of `address`. Any failure is fatal to startup.
pub async fn resolve_interface<S: InterfaceSource>(
    source: &S,
    address: Address,
) -> Result<InterfaceDefinition, InterfaceError> {
    let abi = source.fetch_abi(address).await?;
    let interface = InterfaceDefinition::from_json(&abi)?;

    if interface.is_empty() {
        warn!("Contract {} declares no events; nothing will be published", address);
    } else {
        info!(
            "Loaded {} events for contract {}: {}",
            interface.len(),
            address,
            interface.event_names().join(", ")
        );
    }
    Ok(interface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const CONTRACT: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

    struct StaticSource(Result<&'static str, &'static str>);

    impl InterfaceSource for StaticSource {
        async fn fetch_abi(&self, _address: Address) -> Result<String, InterfaceError> {
            self.0
                .map(str::to_string)
                .map_err(|e| InterfaceError::Unreachable(e.to_string()))
        }
    }

    #[test]
    fn extracts_abi_from_successful_response() {
        let body = r#"{"status":"1","message":"OK","result":"[{\"type\":\"event\",\"name\":\"Ping\",\"anonymous\":false,\"inputs\":[]}]"}"#;
        let abi = parse_explorer_response(body, CONTRACT).unwrap();
        assert!(abi.starts_with("[{"));
    }

    #[test]
    fn unverified_contract_is_not_found() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Contract source code not verified"}"#;
        let err = parse_explorer_response(body, CONTRACT).unwrap_err();
        assert!(
            matches!(err, InterfaceError::NotFound { message, .. } if message == "Contract source code not verified")
        );
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_explorer_response("<html>oops</html>", CONTRACT).unwrap_err();
        assert!(matches!(err, InterfaceError::Malformed { .. }));
    }

    #[tokio::test]
    async fn resolves_events_from_source() {
        let source = StaticSource(Ok(
            r#"[{"type":"event","name":"Ping","anonymous":false,"inputs":[]}]"#,
        ));
        let interface = resolve_interface(&source, CONTRACT).await.unwrap();
        assert_eq!(interface.event_names(), ["Ping"]);
    }

    #[tokio::test]
    async fn unreachable_source_fails() {
        let source = StaticSource(Err("connection refused"));
        let err = resolve_interface(&source, CONTRACT).await.unwrap_err();
        assert!(matches!(err, InterfaceError::Unreachable(_)));
    }

    #[tokio::test]
    async fn malformed_abi_fails() {
        let source = StaticSource(Ok("{not an abi"));
        let err = resolve_interface(&source, CONTRACT).await.unwrap_err();
        assert!(matches!(err, InterfaceError::Malformed { .. }));
    }
}
