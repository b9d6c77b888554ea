use std::collections::HashMap;

use alloy_dyn_abi::{DynSolType, Specifier};
use alloy_json_abi::JsonAbi;
use alloy_primitives::B256;
use tracing::warn;

use crate::models::errors::InterfaceError;

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    /// Canonical ABI type string, e.g. `uint256` or `tuple(address,uint256)`
    pub type_name: String,
    pub ty: DynSolType,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    pub name: String,
    pub params: Vec<ParamDescriptor>,
}

impl EventDefinition {
    pub fn indexed_params(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.params.iter().filter(|p| p.indexed)
    }

    pub fn data_params(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.params.iter().filter(|p| !p.indexed)
    }
}

/// Events of one contract keyed by signature hash (topic 0). Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct InterfaceDefinition {
    events: HashMap<B256, EventDefinition>,
}

impl InterfaceDefinition {
    pub fn from_abi(abi: &JsonAbi) -> Result<Self, InterfaceError> {
        let mut events = HashMap::new();

        for event in abi.events() {
            // Anonymous events carry no signature topic and cannot be matched.
            if event.anonymous {
                warn!("Ignoring anonymous event '{}'", event.name);
                continue;
            }

            let params = event
                .inputs
                .iter()
                .map(|input| {
                    let ty = input.resolve().map_err(|e| InterfaceError::Malformed {
                        reason: format!(
                            "event '{}' parameter '{}' has unsupported type {}: {}",
                            event.name, input.name, input.ty, e
                        ),
                    })?;
                    Ok(ParamDescriptor {
                        name: input.name.clone(),
                        type_name: ty.sol_type_name().into_owned(),
                        ty,
                        indexed: input.indexed,
                    })
                })
                .collect::<Result<Vec<_>, InterfaceError>>()?;

            events.insert(
                event.selector(),
                EventDefinition {
                    name: event.name.clone(),
                    params,
                },
            );
        }

        Ok(Self { events })
    }

    pub fn from_json(abi_json: &str) -> Result<Self, InterfaceError> {
        let abi: JsonAbi =
            serde_json::from_str(abi_json).map_err(|e| InterfaceError::Malformed {
                reason: format!("invalid ABI JSON: {e}"),
            })?;
        Self::from_abi(&abi)
    }

    pub fn get(&self, signature: &B256) -> Option<&EventDefinition> {
        self.events.get(signature)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.events.values().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}
