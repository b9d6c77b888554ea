use std::collections::BTreeMap;

use alloy_dyn_abi::{DynSolType, DynSolValue};
use serde_json::Value;

use crate::indexer::values;
use crate::models::errors::DecodeError;
use crate::models::events::{DecodedEvent, RawLogRecord};
use crate::models::interface::{EventDefinition, InterfaceDefinition};

/// Decodes a log record against the contract interface.
///
/// Topic 0 selects the event. Non-indexed parameters come from the data
/// payload, indexed ones from topics 1.. in declaration order.
pub fn decode(
    record: &RawLogRecord,
    interface: &InterfaceDefinition,
) -> Result<DecodedEvent, DecodeError> {
    let signature = record.topics.first().ok_or(DecodeError::MissingSignature)?;
    let event = interface
        .get(signature)
        .ok_or(DecodeError::UnknownEvent {
            signature: *signature,
        })?;

    let mut parameters = decode_data(event, &record.data)?;

    let indexed = event.params.iter().enumerate().filter(|(_, p)| p.indexed);
    for (topic_index, (position, param)) in (1..).zip(indexed) {
        let topic = record
            .topics
            .get(topic_index)
            .ok_or_else(|| DecodeError::MissingTopic {
                param: param.name.clone(),
                index: topic_index,
            })?;
        parameters.insert(
            param_key(position, &param.name),
            values::topic_to_json(topic, &param.ty),
        );
    }

    Ok(DecodedEvent {
        event_name: event.name.clone(),
        parameters,
        block_number: record.block_number,
        transaction_hash: record.transaction_hash,
    })
}

fn decode_data(
    event: &EventDefinition,
    data: &[u8],
) -> Result<BTreeMap<String, Value>, DecodeError> {
    let params: Vec<_> = event
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.indexed)
        .collect();
    let mut parameters = BTreeMap::new();
    if params.is_empty() {
        return Ok(parameters);
    }

    let tuple = DynSolType::Tuple(params.iter().map(|(_, p)| p.ty.clone()).collect());
    let decoded = tuple
        .abi_decode_sequence(data)
        .map_err(|e| DecodeError::InvalidData {
            event: event.name.clone(),
            reason: e.to_string(),
        })?;

    let decoded_values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };
    if decoded_values.len() != params.len() {
        return Err(DecodeError::InvalidData {
            event: event.name.clone(),
            reason: format!(
                "expected {} values, decoded {}",
                params.len(),
                decoded_values.len()
            ),
        });
    }

    for ((position, param), value) in params.iter().zip(decoded_values.iter()) {
        parameters.insert(param_key(*position, &param.name), values::to_json(value));
    }
    Ok(parameters)
}

/// Unnamed parameters are keyed by their declaration position.
fn param_key(position: usize, name: &str) -> String {
    if name.is_empty() {
        format!("arg{position}")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, Bytes, U256, address, b256, keccak256};
    use serde_json::json;

    const ABI: &str = r#"[
        {"type":"event","name":"Transfer","anonymous":false,"inputs":[
            {"name":"from","type":"address","indexed":true},
            {"name":"to","type":"address","indexed":true},
            {"name":"value","type":"uint256","indexed":false}]},
        {"type":"event","name":"Named","anonymous":false,"inputs":[
            {"name":"label","type":"string","indexed":true},
            {"name":"note","type":"string","indexed":false},
            {"name":"amounts","type":"uint256[]","indexed":false}]}
    ]"#;

    const FROM: Address = address!("0x1111111111111111111111111111111111111111");
    const TO: Address = address!("0x2222222222222222222222222222222222222222");

    fn record(topics: Vec<B256>, data: Vec<u8>) -> RawLogRecord {
        RawLogRecord {
            address: Address::ZERO,
            topics,
            data: Bytes::from(data),
            block_number: 500,
            transaction_hash: b256!(
                "0x00000000000000000000000000000000000000000000000000000000000000ab"
            ),
            log_index: Some(0),
            removed: false,
        }
    }

    fn transfer_record(value: u64) -> RawLogRecord {
        let data = DynSolValue::Uint(U256::from(value), 256).abi_encode();
        record(
            vec![
                keccak256("Transfer(address,address,uint256)"),
                FROM.into_word(),
                TO.into_word(),
            ],
            data,
        )
    }

    #[test]
    fn decodes_indexed_and_data_parameters() {
        let interface = InterfaceDefinition::from_json(ABI).unwrap();
        let event = decode(&transfer_record(1_000), &interface).unwrap();

        assert_eq!(event.event_name, "Transfer");
        assert_eq!(event.block_number, 500);
        assert_eq!(event.parameters.len(), 3);
        assert_eq!(event.parameters["from"], json!(FROM.to_string()));
        assert_eq!(event.parameters["to"], json!(TO.to_string()));
        assert_eq!(event.parameters["value"], json!(1_000));
    }

    #[test]
    fn dynamic_data_and_hashed_indexed_string() {
        let interface = InterfaceDefinition::from_json(ABI).unwrap();
        let label_hash = keccak256("vault");
        let data = DynSolValue::Tuple(vec![
            DynSolValue::String("hello".to_string()),
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1u64), 256),
                DynSolValue::Uint(U256::from(2u64), 256),
            ]),
        ])
        .abi_encode_params();
        let log = record(
            vec![keccak256("Named(string,string,uint256[])"), label_hash],
            data,
        );

        let event = decode(&log, &interface).unwrap();
        assert_eq!(event.parameters["label"], json!(label_hash.to_string()));
        assert_eq!(event.parameters["note"], json!("hello"));
        assert_eq!(event.parameters["amounts"], json!([1, 2]));
    }

    #[test]
    fn unknown_signature_is_rejected() {
        let interface = InterfaceDefinition::from_json(ABI).unwrap();
        let log = record(vec![keccak256("Other()")], vec![]);
        assert!(matches!(
            decode(&log, &interface),
            Err(DecodeError::UnknownEvent { .. })
        ));
    }

    #[test]
    fn log_without_topics_is_rejected() {
        let interface = InterfaceDefinition::from_json(ABI).unwrap();
        assert!(matches!(
            decode(&record(vec![], vec![]), &interface),
            Err(DecodeError::MissingSignature)
        ));
    }

    #[test]
    fn missing_indexed_topic_is_rejected() {
        let interface = InterfaceDefinition::from_json(ABI).unwrap();
        let mut log = transfer_record(1);
        log.topics.truncate(2);
        assert!(matches!(
            decode(&log, &interface),
            Err(DecodeError::MissingTopic { index: 2, .. })
        ));
    }

    #[test]
    fn truncated_data_is_rejected() {
        let interface = InterfaceDefinition::from_json(ABI).unwrap();
        let mut log = transfer_record(1);
        log.data = Bytes::from(vec![0u8; 4]);
        assert!(matches!(
            decode(&log, &interface),
            Err(DecodeError::InvalidData { .. })
        ));
    }
}
