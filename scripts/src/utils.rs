//! Utilities for the deploy scripts.

use std::{fs, path::Path, str::FromStr};

use alloy_primitives::Address;
use serde_json::{Map, Value};

use crate::{
    constants::{CONTRACT_KEY_SUFFIX, DEPLOYMENTS_KEY, PROXY_CONTRACT_KEY_SUFFIX},
    errors::DeployError,
    executor::DeployedModule,
    network::Network,
    plan::ContractFamily,
};

/// Parse an address supplied for the given role.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase or
/// all-uppercase input is accepted as-is. The zero address is never valid
pub fn parse_address(role: &str, value: &str) -> Result<Address, DeployError> {
    let value = value.trim();
    let address = Address::from_str(value)
        .map_err(|e| DeployError::config(format!("{role}: `{value}` is not an address: {e}")))?;

    let hex = value.strip_prefix("0x").unwrap_or(value);
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        Address::parse_checksummed(value, None /* chain_id */)
            .map_err(|_| DeployError::config(format!("{role}: `{value}` has a bad checksum")))?;
    }

    if address.is_zero() {
        return Err(DeployError::config(format!("{role}: the zero address is not allowed")));
    }

    Ok(address)
}

/// Read a JSON file, treating a missing file as an empty object
fn read_json_or_empty(path: &Path) -> Result<Value, DeployError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| DeployError::config(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| DeployError::config(format!("parsing {}: {e}", path.display())))
}

/// View a JSON value as an object, failing with the value's location otherwise
fn as_object<'a>(
    value: &'a mut Value,
    location: &str,
) -> Result<&'a mut Map<String, Value>, DeployError> {
    value
        .as_object_mut()
        .ok_or_else(|| DeployError::config(format!("{location} is not a JSON object")))
}

/// The object under `key`, inserting an empty one if the key is absent
fn child_object<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
    location: &str,
) -> Result<&'a mut Map<String, Value>, DeployError> {
    let child = parent
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    as_object(child, location)
}

/// Record a deployed module's addresses in the deployments file, under
/// `deployments.<network>.<family>_contract` and `..._proxy_contract`.
///
/// Other entries in the file are left untouched
pub fn write_deployed_module(
    path: &Path,
    network: Network,
    family: ContractFamily,
    module: &DeployedModule,
) -> Result<(), DeployError> {
    let mut parsed_json = read_json_or_empty(path)?;
    let root = as_object(&mut parsed_json, &path.display().to_string())?;
    let deployments = child_object(root, DEPLOYMENTS_KEY, DEPLOYMENTS_KEY)?;
    let network_key = network.to_string();
    let network_deployments = child_object(
        deployments,
        &network_key,
        &format!("{DEPLOYMENTS_KEY}.{network_key}"),
    )?;

    let entries = [
        (CONTRACT_KEY_SUFFIX, module.implementation),
        (PROXY_CONTRACT_KEY_SUFFIX, module.proxy),
    ];
    for (suffix, address) in entries {
        if let Some(address) = address {
            let key = format!("{}_{}", family.deployment_key(), suffix);
            network_deployments.insert(key, Value::String(format!("{address:#x}")));
        }
    }

    let contents = serde_json::to_string_pretty(&parsed_json)
        .map_err(|e| DeployError::config(format!("serializing deployments: {e}")))?;
    fs::write(path, contents)
        .map_err(|e| DeployError::config(format!("writing {}: {e}", path.display())))
}
