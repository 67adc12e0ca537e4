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

//! Authorization of pending API calls.
//!
//! Rules apply in order and the first match wins: trigger match, OIS
//! resolution, reserved parameter validation, requester endorsement.
//! Blocked requests older than the chain's configured age limit are
//! dropped from the batch entirely (not errored) so a stuck request
//! cannot be carried forever.

use std::collections::BTreeMap;

use airnode_protocol::contracts::IConvenience;
use alloy::providers::Provider;
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};

use crate::{
    api::ReservedParameters,
    config::Config,
    logs::LogEntry,
    retry::with_retries,
    ApiCall, ErrorCode, RequestStatus,
};

/// Unique `(requesterIndex, clientAddress)` pairs that need an endorsement
/// lookup this run.
pub fn endorsement_queries(api_calls: &[ApiCall]) -> Vec<(U256, Address)> {
    let mut queries: Vec<(U256, Address)> = api_calls
        .iter()
        .filter(|call| call.is_pending())
        .filter_map(|call| call.requester_index.map(|index| (index, call.client_address)))
        .collect();
    queries.sort();
    queries.dedup();
    queries
}

/// Batched endorsement lookup through the Convenience contract.
pub async fn fetch_endorsements<P>(
    convenience: &IConvenience::IConvenienceInstance<P>,
    queries: Vec<(U256, Address)>,
) -> Result<BTreeMap<(U256, Address), bool>>
where
    P: Provider,
{
    if queries.is_empty() {
        return Ok(BTreeMap::new());
    }

    let statuses = with_retries("endorsement fetch", || {
        let indices: Vec<U256> = queries.iter().map(|(index, _)| *index).collect();
        let clients: Vec<Address> = queries.iter().map(|(_, client)| *client).collect();
        async move {
            convenience
                .checkEndorsementStatuses(indices, clients)
                .call()
                .await
                .context("Failed to check endorsement statuses")
        }
    })
    .await?;

    Ok(queries.into_iter().zip(statuses).collect())
}

/// Apply the authorization rules to every request. Requests dropped for
/// age are removed from the returned set.
pub fn authorize(
    config: &Config,
    api_calls: Vec<ApiCall>,
    endorsements: &BTreeMap<(U256, Address), bool>,
) -> (Vec<LogEntry>, Vec<ApiCall>) {
    let mut entries = Vec::new();
    let api_calls = api_calls
        .into_iter()
        .filter_map(|call| {
            if call.status == RequestStatus::Blocked {
                let age = call.metadata.age();
                if age > call.metadata.ignore_blocked_requests_after_blocks {
                    entries.push(LogEntry::debug(format!(
                        "Dropping Request ID:{} after being blocked for {age} blocks",
                        call.id
                    )));
                    return None;
                }
                return Some(call);
            }
            if !call.is_pending() {
                return Some(call);
            }

            let (rule_entries, call) = authorize_pending(config, call, endorsements);
            entries.extend(rule_entries);
            Some(call)
        })
        .collect();
    (entries, api_calls)
}

fn authorize_pending(
    config: &Config,
    call: ApiCall,
    endorsements: &BTreeMap<(U256, Address), bool>,
) -> (Vec<LogEntry>, ApiCall) {
    let Some(endpoint_id) = call.endpoint_id else {
        let entry =
            LogEntry::debug(format!("Ignoring Request ID:{} with no endpoint", call.id));
        return (vec![entry], call.ignored());
    };

    let Some(trigger) = config.find_trigger(endpoint_id) else {
        let entry = LogEntry::debug(format!(
            "Ignoring Request ID:{} for unregistered Endpoint:{endpoint_id}",
            call.id
        ));
        return (vec![entry], call.ignored());
    };

    let (ois, endpoint) = config.resolve_trigger(trigger);
    let Some(_ois) = ois else {
        let entry = LogEntry::error(format!(
            "Unknown OIS:{} received for Request ID:{}",
            trigger.ois_title, call.id
        ));
        return (vec![entry], call.errored(ErrorCode::UnknownOis));
    };
    let Some(endpoint) = endpoint else {
        let entry = LogEntry::error(format!(
            "Unknown Endpoint:{} for OIS:{} received for Request ID:{}",
            trigger.endpoint_name, trigger.ois_title, call.id
        ));
        return (vec![entry], call.errored(ErrorCode::UnknownEndpointId));
    };

    if let Err(err) = ReservedParameters::extract(endpoint, &call.parameters) {
        let entry = LogEntry::error(format!(
            "Request ID:{} has invalid reserved parameters: {err}",
            call.id
        ));
        return (vec![entry], call.errored(ErrorCode::ReservedParametersInvalid));
    }

    let missing: Vec<&str> = endpoint
        .parameters
        .iter()
        .filter(|p| p.required && !call.parameters.contains_key(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        let entry = LogEntry::error(format!(
            "Request ID:{} is missing required parameter(s): {}",
            call.id,
            missing.join(", ")
        ));
        return (vec![entry], call.errored(ErrorCode::InsufficientParameters));
    }

    if let Some(index) = call.requester_index {
        let endorsed = endorsements.get(&(index, call.client_address)).copied().unwrap_or(false);
        if !endorsed {
            let entry = LogEntry::error(format!(
                "Client:{:#x} is not endorsed by requester {index} for Request ID:{}",
                call.client_address, call.id
            ));
            return (vec![entry], call.errored(ErrorCode::UnauthorizedClient));
        }
    }

    (Vec::new(), call)
}
