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

//! External API execution.
//!
//! The HTTP side is abstracted behind [ApiClient] so the executor stage
//! only sees `call(endpoint, parameters) -> json`. Response values are
//! extracted per the reserved `_path`, scaled per `_times`, cast per
//! `_type`, and ABI-encoded into the 32-byte word submitted on-chain.

use std::collections::BTreeMap;

use airnode_protocol::params::ParameterMap;
use alloy::sol_types::SolValue;
use alloy_primitives::{Bytes, B256, I256, U256};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use thiserror::Error;

use crate::{
    config::{Config, Endpoint, HttpMethod, Ois, ParameterTarget},
    logs::LogEntry,
    AggregatedApiCall, ErrorCode,
};

/// Aggregated calls in flight at once.
pub const MAX_CONCURRENT_API_CALLS: usize = 10;

const API_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(29);

/// The response type a request asks for via `_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Int256,
    Bool,
    Bytes32,
}

impl ResponseKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "int256" => Some(ResponseKind::Int256),
            "bool" => Some(ResponseKind::Bool),
            "bytes32" => Some(ResponseKind::Bytes32),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReservedParameterError {
    #[error("_type is missing")]
    MissingType,

    #[error("_type {0:?} is not a supported response type")]
    UnknownType(String),

    #[error("_times {0:?} is not a valid multiplier")]
    InvalidTimes(String),

    #[error("_times only applies to int256 responses")]
    TimesWithoutInt256,
}

/// The reserved `_type`/`_path`/`_times` triple governing response
/// encoding. Endpoint-fixed values override client values; endpoint
/// defaults fill in when the client sent nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedParameters {
    pub kind: ResponseKind,
    pub path: Option<String>,
    pub times: Option<U256>,
}

impl ReservedParameters {
    pub fn extract(
        endpoint: &Endpoint,
        parameters: &ParameterMap,
    ) -> Result<Self, ReservedParameterError> {
        let value = |name: &str| -> Option<String> {
            let config = endpoint.reserved_parameters.iter().find(|r| r.name == name);
            if let Some(fixed) = config.and_then(|r| r.fixed.clone()) {
                return Some(fixed);
            }
            if let Some(sent) = parameters.get(name) {
                return Some(sent.canonical());
            }
            config.and_then(|r| r.default.clone())
        };

        let kind_str = value("_type").ok_or(ReservedParameterError::MissingType)?;
        let kind = ResponseKind::parse(&kind_str)
            .ok_or_else(|| ReservedParameterError::UnknownType(kind_str))?;

        let times = match value("_times") {
            Some(raw) => {
                if kind != ResponseKind::Int256 {
                    return Err(ReservedParameterError::TimesWithoutInt256);
                }
                Some(
                    raw.parse::<U256>()
                        .map_err(|_| ReservedParameterError::InvalidTimes(raw))?,
                )
            }
            None => None,
        };

        Ok(Self { kind, path: value("_path"), times })
    }
}

#[derive(Error, Debug)]
pub enum ApiClientError {
    #[error("no servers declared in API specification")]
    NoServers,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API responded with status {0}")]
    Status(u16),
}

/// The opaque `call(endpoint, parameters) -> (data, status)` capability.
/// String parameter values are canonical forms of the decoded request
/// parameters, reserved names already stripped.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(
        &self,
        ois: &Ois,
        endpoint: &Endpoint,
        parameters: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, ApiClientError>;
}

/// Reqwest-backed [ApiClient] honoring the endpoint's operation definition
/// and fixed operation parameters.
pub struct HttpApiClient {
    http: reqwest::Client,
}

impl HttpApiClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(API_CALL_TIMEOUT).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn call(
        &self,
        ois: &Ois,
        endpoint: &Endpoint,
        parameters: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, ApiClientError> {
        let server =
            ois.api_specifications.servers.first().ok_or(ApiClientError::NoServers)?;

        let mut path = endpoint.operation.path.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body = serde_json::Map::new();

        let mut assign = |name: &str, target: ParameterTarget, value: String| match target {
            ParameterTarget::Query => query.push((name.to_string(), value)),
            ParameterTarget::Header => headers.push((name.to_string(), value)),
            ParameterTarget::Path => {
                path = path.replace(&format!("{{{name}}}"), &value);
            }
            ParameterTarget::Body => {
                body.insert(name.to_string(), serde_json::Value::String(value));
            }
        };

        for fixed in &endpoint.fixed_operation_parameters {
            assign(
                &fixed.operation_parameter.name,
                fixed.operation_parameter.target,
                fixed.value.clone(),
            );
        }

        for (name, value) in parameters {
            let Some(parameter) = endpoint.parameters.iter().find(|p| &p.name == name) else {
                continue;
            };
            assign(
                &parameter.operation_parameter.name,
                parameter.operation_parameter.target,
                value.clone(),
            );
        }

        let url = format!(
            "{}/{}",
            server.url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut request = match endpoint.operation.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url).json(&serde_json::Value::Object(body)),
        };
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiClientError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("no value at _path {0:?}")]
    PathNotFound(String),

    #[error("cannot cast {0} to the requested type")]
    InvalidCast(serde_json::Value),

    #[error("numeric value out of range")]
    OutOfRange,
}

/// Apply `_path`, `_times`, and `_type` to a raw API response and encode
/// the resulting value as the 32-byte word submitted with `fulfill`.
pub fn extract_response_value(
    payload: &serde_json::Value,
    reserved: &ReservedParameters,
) -> Result<Bytes, ResponseError> {
    let mut value = payload;
    if let Some(path) = &reserved.path {
        for segment in path.split('.') {
            value = match value {
                serde_json::Value::Object(map) => map.get(segment),
                serde_json::Value::Array(items) => {
                    segment.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            }
            .ok_or_else(|| ResponseError::PathNotFound(path.clone()))?;
        }
    }

    let encoded = match reserved.kind {
        ResponseKind::Int256 => cast_int256(value, reserved.times)?.abi_encode(),
        ResponseKind::Bool => cast_bool(value)?.abi_encode(),
        ResponseKind::Bytes32 => cast_bytes32(value)?.abi_encode(),
    };

    Ok(encoded.into())
}

fn cast_int256(value: &serde_json::Value, times: Option<U256>) -> Result<I256, ResponseError> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ResponseError::InvalidCast(value.clone()))?;

    let times = times.map(|t| u128::try_from(t)).transpose().map_err(|_| ResponseError::OutOfRange)?;
    let scaled = number * times.unwrap_or(1) as f64;
    if !scaled.is_finite() {
        return Err(ResponseError::OutOfRange);
    }

    // Fractions are dropped after scaling.
    let truncated = scaled.trunc();
    if truncated >= i128::MAX as f64 || truncated <= i128::MIN as f64 {
        return Err(ResponseError::OutOfRange);
    }
    Ok(I256::try_from(truncated as i128).map_err(|_| ResponseError::OutOfRange)?)
}

fn cast_bool(value: &serde_json::Value) -> Result<bool, ResponseError> {
    match value {
        serde_json::Value::Null => Ok(false),
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        serde_json::Value::String(s) => Ok(!s.is_empty() && s != "false"),
        other => Err(ResponseError::InvalidCast(other.clone())),
    }
}

fn cast_bytes32(value: &serde_json::Value) -> Result<B256, ResponseError> {
    let serde_json::Value::String(s) = value else {
        return Err(ResponseError::InvalidCast(value.clone()));
    };
    let mut out = [0u8; 32];
    let bytes = s.as_bytes();
    let len = bytes.len().min(32);
    out[..len].copy_from_slice(&bytes[..len]);
    Ok(B256::from(out))
}

/// Execute every aggregated call with bounded parallelism. One failure
/// never aborts the others; failed calls carry `error = ApiCallFailed`.
pub async fn execute_aggregated_calls(
    config: &Config,
    client: &dyn ApiClient,
    calls: BTreeMap<B256, AggregatedApiCall>,
) -> (Vec<LogEntry>, BTreeMap<B256, AggregatedApiCall>) {
    let executed: Vec<(B256, Vec<LogEntry>, AggregatedApiCall)> = stream::iter(
        calls.into_iter().map(|(id, call)| async move {
            let (entries, call) = execute_one(config, client, call).await;
            (id, entries, call)
        }),
    )
    .buffer_unordered(MAX_CONCURRENT_API_CALLS)
    .collect()
    .await;

    // Completion order is arbitrary; re-sort by id so logs and state are
    // deterministic for identical inputs.
    let mut executed = executed;
    executed.sort_by_key(|(id, _, _)| *id);

    let mut entries = Vec::new();
    let mut results = BTreeMap::new();
    for (id, call_entries, call) in executed {
        entries.extend(call_entries);
        results.insert(id, call);
    }
    (entries, results)
}

async fn execute_one(
    config: &Config,
    client: &dyn ApiClient,
    call: AggregatedApiCall,
) -> (Vec<LogEntry>, AggregatedApiCall) {
    let failed = |message: String, call: AggregatedApiCall| {
        (
            vec![LogEntry::error(message)],
            AggregatedApiCall { error: Some(ErrorCode::ApiCallFailed), ..call },
        )
    };

    let (ois, endpoint) = config.resolve_trigger(&call.trigger);
    let (Some(ois), Some(endpoint)) = (ois, endpoint) else {
        return failed(
            format!(
                "Unable to resolve Endpoint:{} for aggregated Request:{}",
                call.trigger.endpoint_name, call.id
            ),
            call,
        );
    };

    let reserved = match ReservedParameters::extract(endpoint, &call.parameters) {
        Ok(reserved) => reserved,
        Err(err) => {
            return failed(
                format!("Invalid reserved parameters for aggregated Request:{}: {err}", call.id),
                call,
            )
        }
    };

    let parameters: BTreeMap<String, String> = call
        .parameters
        .iter()
        .filter(|(name, _)| !name.starts_with('_'))
        .map(|(name, value)| (name.clone(), value.canonical()))
        .collect();

    let payload = match client.call(ois, endpoint, &parameters).await {
        Ok(payload) => payload,
        Err(err) => {
            return failed(
                format!(
                    "Failed to call Endpoint:{} for aggregated Request:{}: {err}",
                    endpoint.name, call.id
                ),
                call,
            )
        }
    };

    match extract_response_value(&payload, &reserved) {
        Ok(response_value) => (
            vec![LogEntry::info(format!(
                "Received response for aggregated Request:{}",
                call.id
            ))],
            AggregatedApiCall { response_value: Some(response_value), ..call },
        ),
        Err(err) => failed(
            format!(
                "Failed to extract response value for aggregated Request:{}: {err}",
                call.id
            ),
            call,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::test_fixtures,
        logs::LogLevel,
        test_support, ApiCallType,
    };
    use serde_json::json;

    fn reserved(kind: ResponseKind, path: Option<&str>, times: Option<u64>) -> ReservedParameters {
        ReservedParameters {
            kind,
            path: path.map(str::to_string),
            times: times.map(U256::from),
        }
    }

    fn aggregated_call(tag: u8) -> AggregatedApiCall {
        let config = test_fixtures::config();
        AggregatedApiCall {
            id: B256::repeat_byte(tag),
            endpoint_id: test_fixtures::ENDPOINT_ID,
            parameters: test_support::parameters(),
            kind: ApiCallType::Regular,
            trigger: config.triggers.requests[0].clone(),
            response_value: None,
            error: None,
        }
    }

    struct StaticApiClient {
        payload: serde_json::Value,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl ApiClient for StaticApiClient {
        async fn call(
            &self,
            _ois: &Ois,
            _endpoint: &Endpoint,
            parameters: &BTreeMap<String, String>,
        ) -> Result<serde_json::Value, ApiClientError> {
            if let Some(from) = &self.fail_for {
                if parameters.get("from") == Some(from) {
                    return Err(ApiClientError::Status(500));
                }
            }
            Ok(self.payload.clone())
        }
    }

    #[test]
    fn extracts_reserved_parameters_with_fixed_overriding_client() {
        let config = test_fixtures::config();
        let endpoint = &config.ois[0].endpoints[0];

        // The client asks for bool but the endpoint pins int256; the
        // endpoint's _times default also applies.
        let mut params = test_support::parameters();
        params.insert(
            "_type".to_string(),
            airnode_protocol::params::ParameterValue::String("bool".to_string()),
        );

        let reserved = ReservedParameters::extract(endpoint, &params).unwrap();
        assert_eq!(reserved.kind, ResponseKind::Int256);
        assert_eq!(reserved.times, Some(U256::from(100_000u64)));
        assert!(reserved.path.is_none());
    }

    #[test]
    fn missing_type_is_invalid() {
        let mut endpoint = test_fixtures::config().ois[0].endpoints[0].clone();
        endpoint.reserved_parameters.clear();
        let params = ParameterMap::new();
        assert!(matches!(
            ReservedParameters::extract(&endpoint, &params),
            Err(ReservedParameterError::MissingType)
        ));
    }

    #[test]
    fn unknown_type_is_invalid() {
        let mut endpoint = test_fixtures::config().ois[0].endpoints[0].clone();
        endpoint.reserved_parameters[0].fixed = Some("uint128".to_string());
        assert!(matches!(
            ReservedParameters::extract(&endpoint, &test_support::parameters()),
            Err(ReservedParameterError::UnknownType(_))
        ));
    }

    #[test]
    fn times_requires_int256() {
        let mut endpoint = test_fixtures::config().ois[0].endpoints[0].clone();
        endpoint.reserved_parameters[0].fixed = Some("bool".to_string());
        assert!(matches!(
            ReservedParameters::extract(&endpoint, &test_support::parameters()),
            Err(ReservedParameterError::TimesWithoutInt256)
        ));
    }

    #[test]
    fn path_extraction_walks_objects_and_arrays() {
        let payload = json!({"data": {"prices": [{"usd": 723.39}]}});
        let reserved = reserved(ResponseKind::Int256, Some("data.prices.0.usd"), Some(100));

        let value = extract_response_value(&payload, &reserved).unwrap();
        assert_eq!(I256::abi_decode(&value).unwrap(), I256::try_from(72339i64).unwrap());
    }

    #[test]
    fn missing_path_is_an_error() {
        let payload = json!({"data": 1});
        let reserved = reserved(ResponseKind::Int256, Some("nope"), None);
        assert!(matches!(
            extract_response_value(&payload, &reserved),
            Err(ResponseError::PathNotFound(_))
        ));
    }

    #[test]
    fn int256_truncates_after_scaling() {
        let payload = json!("723.392028");
        let reserved = reserved(ResponseKind::Int256, None, Some(100));
        let value = extract_response_value(&payload, &reserved).unwrap();
        assert_eq!(I256::abi_decode(&value).unwrap(), I256::try_from(72339i64).unwrap());
    }

    #[test]
    fn bool_and_bytes32_casts_encode_one_word() {
        let reserved_bool = reserved(ResponseKind::Bool, None, None);
        let value = extract_response_value(&json!("false"), &reserved_bool).unwrap();
        assert!(!bool::abi_decode(&value).unwrap());
        let value = extract_response_value(&json!(1), &reserved_bool).unwrap();
        assert!(bool::abi_decode(&value).unwrap());

        let reserved_bytes = reserved(ResponseKind::Bytes32, None, None);
        let value = extract_response_value(&json!("hello"), &reserved_bytes).unwrap();
        let word = B256::abi_decode(&value).unwrap();
        assert_eq!(&word[..5], b"hello");
        assert_eq!(word[5], 0);
    }

    #[tokio::test]
    async fn one_failing_call_does_not_abort_the_batch() {
        let config = test_fixtures::config();
        let client = StaticApiClient {
            payload: json!({"result": "723.39"}),
            fail_for: Some("ETH".to_string()),
        };

        let failing = aggregated_call(0x01);
        let mut succeeding = aggregated_call(0x02);
        succeeding.parameters.insert(
            "from".to_string(),
            airnode_protocol::params::ParameterValue::String("BTC".to_string()),
        );
        succeeding.parameters.insert(
            "_path".to_string(),
            airnode_protocol::params::ParameterValue::String("result".to_string()),
        );
        let mut failing_params = failing.parameters.clone();
        failing_params.insert(
            "_path".to_string(),
            airnode_protocol::params::ParameterValue::String("result".to_string()),
        );
        let failing = AggregatedApiCall { parameters: failing_params, ..failing };

        let calls: BTreeMap<_, _> =
            [(failing.id, failing.clone()), (succeeding.id, succeeding.clone())].into();

        let (entries, results) = execute_aggregated_calls(&config, &client, calls).await;

        let failed = &results[&failing.id];
        assert_eq!(failed.error, Some(ErrorCode::ApiCallFailed));
        assert!(failed.response_value.is_none());

        let succeeded = &results[&succeeding.id];
        assert!(succeeded.error.is_none());
        assert!(succeeded.response_value.is_some());

        assert!(entries
            .iter()
            .any(|e| e.level == LogLevel::Error && e.message.contains(&format!("{}", failing.id))));
    }
}
