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

//! Cross-provider aggregation of equivalent API calls.
//!
//! Requests fingerprint as `(endpointId, canonical parameters)`. Every
//! pending request sharing a fingerprint, on any provider, is served by a
//! single API call whose id is the first participating request id in
//! provider-then-block order, which makes the whole stage deterministic
//! for identical inputs.

use std::collections::BTreeMap;

use airnode_protocol::params;
use alloy_primitives::B256;

use crate::{
    config::Config, logs::LogEntry, state::ProviderState, AggregatedApiCall, ApiCall, ErrorCode,
};

/// Collapse equivalent pending API calls across all providers. Returns the
/// providers with `aggregated_call_id` recorded on every participating
/// request, plus the aggregated calls keyed by id.
pub fn aggregate(
    config: &Config,
    providers: Vec<ProviderState>,
) -> (Vec<LogEntry>, Vec<ProviderState>, BTreeMap<B256, AggregatedApiCall>) {
    let mut entries = Vec::new();
    let mut by_fingerprint: BTreeMap<(B256, String), B256> = BTreeMap::new();
    let mut aggregated: BTreeMap<B256, AggregatedApiCall> = BTreeMap::new();
    let mut participants = 0usize;

    let providers = providers
        .into_iter()
        .map(|mut provider| {
            provider.requests.api_calls = provider
                .requests
                .api_calls
                .into_iter()
                .map(|call| {
                    if !call.is_pending() {
                        return call;
                    }
                    let Some(endpoint_id) = call.endpoint_id else {
                        return call;
                    };
                    let Some(trigger) = config.find_trigger(endpoint_id) else {
                        // Pending requests always carry a served endpoint
                        // by this stage; anything else is skipped.
                        entries.push(LogEntry::warn(format!(
                            "Request ID:{} has no trigger for Endpoint:{endpoint_id}, not aggregating",
                            call.id
                        )));
                        return call;
                    };

                    let fingerprint = (endpoint_id, params::canonicalize(&call.parameters));
                    let aggregated_id = *by_fingerprint.entry(fingerprint).or_insert(call.id);
                    aggregated.entry(aggregated_id).or_insert_with(|| AggregatedApiCall {
                        id: aggregated_id,
                        endpoint_id,
                        parameters: call.parameters.clone(),
                        kind: call.kind,
                        trigger: trigger.clone(),
                        response_value: None,
                        error: None,
                    });

                    participants += 1;
                    ApiCall { aggregated_call_id: Some(aggregated_id), ..call }
                })
                .collect();
            provider
        })
        .collect();

    entries.push(LogEntry::debug(format!(
        "Aggregated {participants} pending API call(s) into {} unique call(s)",
        aggregated.len()
    )));

    (entries, providers, aggregated)
}

/// Map executed aggregated calls back onto one provider's requests.
pub fn disaggregate(
    api_calls: Vec<ApiCall>,
    aggregated: &BTreeMap<B256, AggregatedApiCall>,
) -> (Vec<LogEntry>, Vec<ApiCall>) {
    let mut entries = Vec::new();
    let api_calls = api_calls
        .into_iter()
        .map(|call| {
            if !call.is_pending() {
                return call;
            }

            let matched = call
                .aggregated_call_id
                .and_then(|id| aggregated.get(&id))
                // A fingerprint collision would fulfill the request with a
                // value computed for different parameters.
                .filter(|agg| agg.parameters == call.parameters);

            match matched {
                Some(agg) => {
                    if let Some(response_value) = &agg.response_value {
                        ApiCall { response_value: Some(response_value.clone()), ..call }
                    } else if let Some(error) = agg.error {
                        call.errored(error)
                    } else {
                        // Executed without result or error; treat as unmatched.
                        entries.push(LogEntry::error(format!(
                            "Unable to find matching aggregated API calls for Request:{}",
                            call.id
                        )));
                        call.blocked(ErrorCode::NoMatchingAggregatedCall)
                    }
                }
                None => {
                    entries.push(LogEntry::error(format!(
                        "Unable to find matching aggregated API calls for Request:{}",
                        call.id
                    )));
                    call.blocked(ErrorCode::NoMatchingAggregatedCall)
                }
            }
        })
        .collect();

    (entries, api_calls)
}
