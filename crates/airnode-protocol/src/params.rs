// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tagged parameter ABI.
//!
//! Request parameters travel on-chain as an ABI-encoded array of
//! `(bytes32 name, bytes32 kind, bytes value)` tuples, where `kind` names
//! one of the supported Solidity types and `value` is the ABI encoding of a
//! single value of that type. Decoded parameters are kept in a [BTreeMap]
//! so iteration order is the canonical (sorted) key order everywhere.

use std::collections::BTreeMap;

use alloy::{sol, sol_types::SolValue};
use alloy_primitives::{Address, Bytes, B256, I256, U256};
use thiserror::Error;

sol! {
    #![sol(all_derives)]

    struct TaggedParameter {
        bytes32 name;
        bytes32 kind;
        bytes value;
    }
}

/// The closed set of value types a tagged parameter may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Bytes32,
    Address,
    Uint256,
    Int256,
    Bool,
    Bytes,
    String,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Bytes32 => "bytes32",
            ParameterKind::Address => "address",
            ParameterKind::Uint256 => "uint256",
            ParameterKind::Int256 => "int256",
            ParameterKind::Bool => "bool",
            ParameterKind::Bytes => "bytes",
            ParameterKind::String => "string",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bytes32" => Some(ParameterKind::Bytes32),
            "address" => Some(ParameterKind::Address),
            "uint256" => Some(ParameterKind::Uint256),
            "int256" => Some(ParameterKind::Int256),
            "bool" => Some(ParameterKind::Bool),
            "bytes" => Some(ParameterKind::Bytes),
            "string" => Some(ParameterKind::String),
            _ => None,
        }
    }
}

/// A decoded parameter value, tagged with its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Bytes32(B256),
    Address(Address),
    Uint256(U256),
    Int256(I256),
    Bool(bool),
    Bytes(Bytes),
    String(String),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Bytes32(_) => ParameterKind::Bytes32,
            ParameterValue::Address(_) => ParameterKind::Address,
            ParameterValue::Uint256(_) => ParameterKind::Uint256,
            ParameterValue::Int256(_) => ParameterKind::Int256,
            ParameterValue::Bool(_) => ParameterKind::Bool,
            ParameterValue::Bytes(_) => ParameterKind::Bytes,
            ParameterValue::String(_) => ParameterKind::String,
        }
    }

    /// Canonical string form: lowercase 0x-hex for byte values, decimal for
    /// integers, `true`/`false` for booleans, the raw text for strings.
    /// This is the form used for API call values and for aggregation
    /// fingerprints, so it must be stable.
    pub fn canonical(&self) -> String {
        match self {
            ParameterValue::Bytes32(v) => format!("{v}"),
            ParameterValue::Address(v) => format!("{v:#x}"),
            ParameterValue::Uint256(v) => format!("{v}"),
            ParameterValue::Int256(v) => format!("{v}"),
            ParameterValue::Bool(v) => format!("{v}"),
            ParameterValue::Bytes(v) => format!("{v}"),
            ParameterValue::String(v) => v.clone(),
        }
    }

    fn abi_encoded(&self) -> Bytes {
        match self {
            ParameterValue::Bytes32(v) => v.abi_encode().into(),
            ParameterValue::Address(v) => v.abi_encode().into(),
            ParameterValue::Uint256(v) => v.abi_encode().into(),
            ParameterValue::Int256(v) => v.abi_encode().into(),
            ParameterValue::Bool(v) => v.abi_encode().into(),
            ParameterValue::Bytes(v) => v.abi_encode().into(),
            ParameterValue::String(v) => v.abi_encode().into(),
        }
    }

    fn abi_decoded(kind: ParameterKind, data: &[u8]) -> Result<Self, alloy::sol_types::Error> {
        Ok(match kind {
            ParameterKind::Bytes32 => ParameterValue::Bytes32(B256::abi_decode(data)?),
            ParameterKind::Address => ParameterValue::Address(Address::abi_decode(data)?),
            ParameterKind::Uint256 => ParameterValue::Uint256(U256::abi_decode(data)?),
            ParameterKind::Int256 => ParameterValue::Int256(I256::abi_decode(data)?),
            ParameterKind::Bool => ParameterValue::Bool(bool::abi_decode(data)?),
            ParameterKind::Bytes => ParameterValue::Bytes(Bytes::abi_decode(data)?),
            ParameterKind::String => ParameterValue::String(String::abi_decode(data)?),
        })
    }
}

/// Decoded request parameters, keyed by name in sorted order.
pub type ParameterMap = BTreeMap<String, ParameterValue>;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("parameter name {0:?} does not fit in bytes32")]
    NameTooLong(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid parameter blob: {0}")]
    Blob(#[from] alloy::sol_types::Error),

    #[error("parameter name is not valid UTF-8")]
    InvalidName,

    #[error("parameter {name:?} declares unsupported type {kind:?}")]
    UnsupportedKind { name: String, kind: String },

    #[error("duplicate parameter {0:?}")]
    Duplicate(String),

    #[error("failed to decode value of parameter {name:?}: {source}")]
    Value { name: String, source: alloy::sol_types::Error },
}

/// Encode a parameter map into a tagged parameter blob.
pub fn encode(params: &ParameterMap) -> Result<Bytes, EncodeError> {
    let tagged = params
        .iter()
        .map(|(name, value)| {
            Ok(TaggedParameter {
                name: str_to_bytes32(name).ok_or_else(|| EncodeError::NameTooLong(name.clone()))?,
                kind: str_to_bytes32(value.kind().as_str()).unwrap_or_default(),
                value: value.abi_encoded(),
            })
        })
        .collect::<Result<Vec<_>, EncodeError>>()?;

    Ok(tagged.abi_encode().into())
}

/// Decode a tagged parameter blob. An empty blob decodes to an empty map.
pub fn decode(data: &[u8]) -> Result<ParameterMap, DecodeError> {
    if data.is_empty() {
        return Ok(ParameterMap::new());
    }

    let tagged = Vec::<TaggedParameter>::abi_decode(data)?;

    let mut params = ParameterMap::new();
    for parameter in tagged {
        let name = bytes32_to_str(&parameter.name).ok_or(DecodeError::InvalidName)?.to_string();
        let kind_str = bytes32_to_str(&parameter.kind).unwrap_or_default();
        let kind = ParameterKind::parse(kind_str).ok_or_else(|| DecodeError::UnsupportedKind {
            name: name.clone(),
            kind: kind_str.to_string(),
        })?;

        let value = ParameterValue::abi_decoded(kind, &parameter.value)
            .map_err(|source| DecodeError::Value { name: name.clone(), source })?;

        if params.insert(name.clone(), value).is_some() {
            return Err(DecodeError::Duplicate(name));
        }
    }

    Ok(params)
}

/// Canonical serialization of a parameter map, used as the aggregation
/// fingerprint. Keys come out sorted (BTreeMap order) with canonical value
/// strings, so equal maps always serialize identically.
pub fn canonicalize(params: &ParameterMap) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={}", value.canonical()))
        .collect::<Vec<_>>()
        .join(",")
}

fn str_to_bytes32(s: &str) -> Option<B256> {
    let bytes = s.as_bytes();
    if bytes.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(bytes);
    Some(B256::from(out))
}

fn bytes32_to_str(b: &B256) -> Option<&str> {
    let end = b.iter().rposition(|&byte| byte != 0).map_or(0, |i| i + 1);
    std::str::from_utf8(&b[..end]).ok()
}
