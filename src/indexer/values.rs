use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{B256, hex};
use serde_json::{Number, Value};

/// Converts a decoded ABI value into a JSON value.
///
/// Integers of every width are JSON numbers carrying all their digits, so a
/// field keeps one JSON type whatever its value. Byte values are 0x-prefixed hex.
pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Uint(n, _) => number(n.to_string()),
        DynSolValue::Int(n, _) => number(n.to_string()),
        DynSolValue::Address(address) => Value::String(address.to_string()),
        DynSolValue::Function(function) => Value::String(hex::encode_prefixed(function.as_slice())),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(hex::encode_prefixed(&word.as_slice()[..*size]))
        }
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(to_json).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::String(format!("{other:?}")),
    }
}

// Decimal digits always parse with `arbitrary_precision`; the string arm is unreachable in practice.
fn number(digits: String) -> Value {
    match digits.parse::<Number>() {
        Ok(number) => Value::Number(number),
        Err(_) => Value::String(digits),
    }
}

/// Converts an indexed parameter's topic into a JSON value.
///
/// Value types are stored in the topic itself and are decoded. Reference types
/// (strings, bytes, arrays, tuples) are stored as their keccak hash, which is
/// all the log carries, so the hash is emitted as hex.
pub fn topic_to_json(topic: &B256, ty: &DynSolType) -> Value {
    let hashed = || Value::String(topic.to_string());

    match ty {
        DynSolType::Bool
        | DynSolType::Int(_)
        | DynSolType::Uint(_)
        | DynSolType::Address
        | DynSolType::Function
        | DynSolType::FixedBytes(_) => ty
            .abi_decode(topic.as_slice())
            .map(|value| to_json(&value))
            .unwrap_or_else(|_| hashed()),
        _ => hashed(),
    }
}
