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

//! Materialization of requests from classified events.
//!
//! Creation events become request records, parameter blobs are decoded,
//! and fulfillment/failure events observed in the same window are overlaid
//! so a request that already completed on-chain is never acted on again.

use std::collections::HashSet;

use airnode_protocol::params;
use alloy_primitives::B256;

use crate::{
    evm::events::{AirnodeEvent, ParsedLog},
    logs::LogEntry,
    state::GroupedRequests,
    ApiCall, ApiCallType, ErrorCode, RequestMetadata, RequestStatus, Withdrawal,
};

/// Build the provider's request set from classified logs: one record per
/// creation event, parameters decoded, same-window fulfillments overlaid,
/// and API calls blocked behind pending withdrawals.
pub fn materialize(parsed: &[ParsedLog]) -> (Vec<LogEntry>, GroupedRequests) {
    let mut entries = Vec::new();
    let mut api_calls = Vec::new();
    let mut withdrawals = Vec::new();
    let mut fulfilled_api_calls = HashSet::new();
    let mut failed_api_calls = HashSet::new();
    let mut fulfilled_withdrawals = HashSet::new();

    for log in parsed {
        match &log.event {
            AirnodeEvent::ShortRequestCreated(event) => {
                api_calls.push(build_short(event, log.metadata))
            }
            AirnodeEvent::RequestCreated(event) => {
                api_calls.push(build_regular(event, log.metadata))
            }
            AirnodeEvent::FullRequestCreated(event) => {
                api_calls.push(build_full(event, log.metadata))
            }
            AirnodeEvent::RequestFulfilled(event) => {
                fulfilled_api_calls.insert(event.requestId);
            }
            AirnodeEvent::RequestFailed(event) => {
                failed_api_calls.insert(event.requestId);
            }
            AirnodeEvent::WithdrawalRequested(event) => {
                withdrawals.push(build_withdrawal(event, log.metadata))
            }
            AirnodeEvent::WithdrawalFulfilled(event) => {
                fulfilled_withdrawals.insert(event.withdrawalRequestId);
            }
        }
    }

    let api_calls = api_calls
        .into_iter()
        .map(|call| {
            let (param_entries, call) = apply_parameters(call);
            entries.extend(param_entries);
            call
        })
        .collect();

    let (overlay_entries, api_calls) = update_fulfilled_requests(api_calls, &fulfilled_api_calls);
    entries.extend(overlay_entries);

    let (overlay_entries, api_calls) = update_failed_requests(api_calls, &failed_api_calls);
    entries.extend(overlay_entries);

    let (overlay_entries, withdrawals) =
        update_fulfilled_withdrawals(withdrawals, &fulfilled_withdrawals);
    entries.extend(overlay_entries);

    let (blocking_entries, api_calls) = block_requests_with_withdrawals(api_calls, &withdrawals);
    entries.extend(blocking_entries);

    (entries, GroupedRequests { api_calls, withdrawals })
}

fn build_short(
    event: &airnode_protocol::contracts::IAirnode::ClientShortRequestCreated,
    metadata: RequestMetadata,
) -> ApiCall {
    ApiCall {
        id: event.requestId,
        kind: ApiCallType::Short,
        status: RequestStatus::Pending,
        error_code: None,
        provider_id: event.providerId,
        requester_index: None,
        client_address: event.clientAddress,
        designated_wallet: None,
        fulfill_address: None,
        fulfill_function_id: None,
        endpoint_id: None,
        template_id: Some(event.templateId),
        encoded_parameters: event.parameters.clone(),
        parameters: Default::default(),
        request_count: event.noRequests,
        metadata,
        aggregated_call_id: None,
        response_value: None,
    }
}

fn build_regular(
    event: &airnode_protocol::contracts::IAirnode::ClientRequestCreated,
    metadata: RequestMetadata,
) -> ApiCall {
    ApiCall {
        id: event.requestId,
        kind: ApiCallType::Regular,
        status: RequestStatus::Pending,
        error_code: None,
        provider_id: event.providerId,
        requester_index: Some(event.requesterIndex),
        client_address: event.clientAddress,
        designated_wallet: Some(event.designatedWallet),
        fulfill_address: Some(event.fulfillAddress),
        fulfill_function_id: Some(event.fulfillFunctionId),
        endpoint_id: None,
        template_id: Some(event.templateId),
        encoded_parameters: event.parameters.clone(),
        parameters: Default::default(),
        request_count: event.noRequests,
        metadata,
        aggregated_call_id: None,
        response_value: None,
    }
}

fn build_full(
    event: &airnode_protocol::contracts::IAirnode::ClientFullRequestCreated,
    metadata: RequestMetadata,
) -> ApiCall {
    ApiCall {
        id: event.requestId,
        kind: ApiCallType::Full,
        status: RequestStatus::Pending,
        error_code: None,
        provider_id: event.providerId,
        requester_index: Some(event.requesterIndex),
        client_address: event.clientAddress,
        designated_wallet: Some(event.designatedWallet),
        fulfill_address: Some(event.fulfillAddress),
        fulfill_function_id: Some(event.fulfillFunctionId),
        endpoint_id: Some(event.endpointId),
        template_id: None,
        encoded_parameters: event.parameters.clone(),
        parameters: Default::default(),
        request_count: event.noRequests,
        metadata,
        aggregated_call_id: None,
        response_value: None,
    }
}

fn build_withdrawal(
    event: &airnode_protocol::contracts::IAirnode::WithdrawalRequested,
    metadata: RequestMetadata,
) -> Withdrawal {
    Withdrawal {
        id: event.withdrawalRequestId,
        provider_id: event.providerId,
        requester_index: event.requesterIndex,
        designated_wallet: event.designatedWallet,
        destination: event.destination,
        status: RequestStatus::Pending,
        error_code: None,
        metadata,
    }
}

/// Decode the request's tagged parameter blob. A failed decode errors the
/// request and leaves every other field intact.
pub fn apply_parameters(call: ApiCall) -> (Vec<LogEntry>, ApiCall) {
    if call.encoded_parameters.is_empty() {
        return (Vec::new(), call);
    }

    match params::decode(&call.encoded_parameters) {
        Ok(parameters) => (Vec::new(), ApiCall { parameters, ..call }),
        Err(err) => {
            let entry = LogEntry::error(format!(
                "Request ID:{} submitted with invalid parameters: {} ({err})",
                call.id, call.encoded_parameters
            ));
            (vec![entry], call.errored(ErrorCode::RequestParameterDecodingFailed))
        }
    }
}

/// Mark requests already fulfilled on-chain. Idempotent.
pub fn update_fulfilled_requests(
    api_calls: Vec<ApiCall>,
    fulfilled_ids: &HashSet<B256>,
) -> (Vec<LogEntry>, Vec<ApiCall>) {
    let mut entries = Vec::new();
    let api_calls = api_calls
        .into_iter()
        .map(|call| {
            if fulfilled_ids.contains(&call.id) && call.status != RequestStatus::Fulfilled {
                entries.push(LogEntry::debug(format!(
                    "Request ID:{} (API call) has already been fulfilled",
                    call.id
                )));
                call.fulfilled()
            } else {
                call
            }
        })
        .collect();
    (entries, api_calls)
}

/// Mark requests whose previous fulfillment attempt failed on-chain.
/// A `Fulfilled` request is never downgraded.
pub fn update_failed_requests(
    api_calls: Vec<ApiCall>,
    failed_ids: &HashSet<B256>,
) -> (Vec<LogEntry>, Vec<ApiCall>) {
    let mut entries = Vec::new();
    let api_calls = api_calls
        .into_iter()
        .map(|call| {
            if failed_ids.contains(&call.id) && call.status != RequestStatus::Fulfilled {
                entries.push(LogEntry::debug(format!(
                    "Request ID:{} (API call) has already failed",
                    call.id
                )));
                call.errored(ErrorCode::ApiCallFailed)
            } else {
                call
            }
        })
        .collect();
    (entries, api_calls)
}

pub fn update_fulfilled_withdrawals(
    withdrawals: Vec<Withdrawal>,
    fulfilled_ids: &HashSet<B256>,
) -> (Vec<LogEntry>, Vec<Withdrawal>) {
    let mut entries = Vec::new();
    let withdrawals = withdrawals
        .into_iter()
        .map(|withdrawal| {
            if fulfilled_ids.contains(&withdrawal.id)
                && withdrawal.status != RequestStatus::Fulfilled
            {
                entries.push(LogEntry::debug(format!(
                    "Request ID:{} (withdrawal) has already been fulfilled",
                    withdrawal.id
                )));
                withdrawal.fulfilled()
            } else {
                withdrawal
            }
        })
        .collect();
    (entries, withdrawals)
}

/// A pending withdrawal empties the requester's designated wallet, so API
/// calls from the same requester cannot be fulfilled until it settles.
pub fn block_requests_with_withdrawals(
    api_calls: Vec<ApiCall>,
    withdrawals: &[Withdrawal],
) -> (Vec<LogEntry>, Vec<ApiCall>) {
    let withdrawing: HashSet<_> = withdrawals
        .iter()
        .filter(|w| w.is_pending())
        .map(|w| w.requester_index)
        .collect();

    let mut entries = Vec::new();
    let api_calls = api_calls
        .into_iter()
        .map(|call| match call.requester_index {
            Some(index) if call.is_pending() && withdrawing.contains(&index) => {
                entries.push(LogEntry::warn(format!(
                    "Request ID:{} is blocked by a pending withdrawal from requester {index}",
                    call.id
                )));
                call.blocked(ErrorCode::PendingWithdrawal)
            }
            _ => call,
        })
        .collect();
    (entries, api_calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        evm::events::{classify_logs, test_helpers::chain_log},
        logs::LogLevel,
        test_support,
    };
    use airnode_protocol::contracts::IAirnode;
    use alloy_primitives::{Address, Bytes, FixedBytes, U256};

    fn parsed_batch(raw: Vec<alloy::rpc::types::Log>) -> Vec<ParsedLog> {
        let (entries, parsed) = classify_logs(raw, 15, 20);
        assert!(entries.is_empty());
        parsed
    }

    #[test]
    fn builds_each_request_type_from_its_event() {
        let short = IAirnode::ClientShortRequestCreated {
            providerId: B256::repeat_byte(0x01),
            requestId: B256::repeat_byte(0x02),
            noRequests: U256::from(1u64),
            clientAddress: Address::repeat_byte(0x03),
            templateId: B256::repeat_byte(0x04),
            parameters: Bytes::new(),
        };
        let regular = IAirnode::ClientRequestCreated {
            providerId: B256::repeat_byte(0x01),
            requestId: B256::repeat_byte(0x05),
            noRequests: U256::from(2u64),
            clientAddress: Address::repeat_byte(0x03),
            templateId: B256::repeat_byte(0x04),
            requesterIndex: U256::from(7u64),
            designatedWallet: Address::repeat_byte(0x06),
            fulfillAddress: Address::repeat_byte(0x03),
            fulfillFunctionId: FixedBytes([0xd3, 0xbd, 0x14, 0x64]),
            parameters: Bytes::new(),
        };
        let full = IAirnode::ClientFullRequestCreated {
            providerId: B256::repeat_byte(0x01),
            requestId: B256::repeat_byte(0x08),
            noRequests: U256::from(3u64),
            clientAddress: Address::repeat_byte(0x03),
            endpointId: B256::repeat_byte(0x09),
            requesterIndex: U256::from(7u64),
            designatedWallet: Address::repeat_byte(0x06),
            fulfillAddress: Address::repeat_byte(0x03),
            fulfillFunctionId: FixedBytes([0xd3, 0xbd, 0x14, 0x64]),
            parameters: Bytes::new(),
        };

        let parsed = parsed_batch(vec![
            chain_log(&short, 10, 0),
            chain_log(&regular, 10, 1),
            chain_log(&full, 10, 2),
        ]);
        let (_, requests) = materialize(&parsed);

        let calls = &requests.api_calls;
        assert_eq!(calls.len(), 3);

        assert_eq!(calls[0].kind, ApiCallType::Short);
        assert_eq!(calls[0].template_id, Some(B256::repeat_byte(0x04)));
        assert!(calls[0].designated_wallet.is_none());
        assert!(calls[0].endpoint_id.is_none());

        assert_eq!(calls[1].kind, ApiCallType::Regular);
        assert_eq!(calls[1].requester_index, Some(U256::from(7u64)));
        assert_eq!(calls[1].template_id, Some(B256::repeat_byte(0x04)));
        assert!(calls[1].endpoint_id.is_none());

        assert_eq!(calls[2].kind, ApiCallType::Full);
        assert!(calls[2].template_id.is_none());
        assert_eq!(calls[2].endpoint_id, Some(B256::repeat_byte(0x09)));

        for call in calls {
            assert_eq!(call.status, RequestStatus::Pending);
        }
    }

    #[test]
    fn invalid_parameter_blob_errors_the_request_only() {
        let call = ApiCall {
            encoded_parameters: Bytes::from_static(b"0xincorrectparameters"),
            ..test_support::api_call(0x10)
        };
        let client = call.client_address;

        let (entries, call) = apply_parameters(call);

        assert_eq!(call.status, RequestStatus::Errored);
        assert_eq!(call.error_code, Some(ErrorCode::RequestParameterDecodingFailed));
        // Untouched fields survive the failure.
        assert_eq!(call.client_address, client);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert!(entries[0].message.contains(&format!("{}", call.id)));
        assert!(entries[0].message.contains("0x3078696e636f7272656374706172616d6574657273"));
    }

    #[test]
    fn valid_parameter_blob_is_decoded_into_the_request() {
        let mut params = airnode_protocol::params::ParameterMap::new();
        params.insert(
            "from".to_string(),
            airnode_protocol::params::ParameterValue::String("ETH".to_string()),
        );
        let call = ApiCall {
            encoded_parameters: airnode_protocol::params::encode(&params).unwrap(),
            parameters: Default::default(),
            ..test_support::api_call(0x11)
        };

        let (entries, call) = apply_parameters(call);
        assert!(entries.is_empty());
        assert_eq!(call.parameters, params);
        assert!(call.is_pending());
    }

    #[test]
    fn fulfilled_overlay_marks_and_logs_once() {
        let call = test_support::api_call(0x20);
        let id = call.id;
        let fulfilled: HashSet<_> = [id].into();

        let (entries, calls) = update_fulfilled_requests(vec![call], &fulfilled);
        assert_eq!(calls[0].status, RequestStatus::Fulfilled);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Debug);
        assert_eq!(
            entries[0].message,
            format!("Request ID:{id} (API call) has already been fulfilled")
        );

        // Idempotent: a second application changes nothing and stays quiet.
        let (entries, calls) = update_fulfilled_requests(calls, &fulfilled);
        assert_eq!(calls[0].status, RequestStatus::Fulfilled);
        assert!(entries.is_empty());
    }

    #[test]
    fn failed_overlay_never_downgrades_fulfilled() {
        let fulfilled_call = test_support::api_call(0x21).fulfilled();
        let pending_call = test_support::api_call(0x22);
        let failed: HashSet<_> = [fulfilled_call.id, pending_call.id].into();

        let (_, calls) = update_failed_requests(vec![fulfilled_call, pending_call], &failed);
        assert_eq!(calls[0].status, RequestStatus::Fulfilled);
        assert_eq!(calls[1].status, RequestStatus::Errored);
        assert_eq!(calls[1].error_code, Some(ErrorCode::ApiCallFailed));
    }

    #[test]
    fn pending_withdrawal_blocks_same_requester_api_calls() {
        let call = test_support::api_call(0x30);
        let other_requester = ApiCall {
            requester_index: Some(U256::from(99u64)),
            ..test_support::api_call(0x31)
        };
        let withdrawal = test_support::withdrawal(0x32);
        assert_eq!(call.requester_index, Some(withdrawal.requester_index));

        let (entries, calls) =
            block_requests_with_withdrawals(vec![call, other_requester], &[withdrawal]);

        assert_eq!(calls[0].status, RequestStatus::Blocked);
        assert_eq!(calls[0].error_code, Some(ErrorCode::PendingWithdrawal));
        assert!(calls[1].is_pending());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
    }

    #[test]
    fn settled_withdrawal_does_not_block() {
        let call = test_support::api_call(0x33);
        let withdrawal = test_support::withdrawal(0x34).fulfilled();

        let (entries, calls) = block_requests_with_withdrawals(vec![call], &[withdrawal]);
        assert!(calls[0].is_pending());
        assert!(entries.is_empty());
    }
}
