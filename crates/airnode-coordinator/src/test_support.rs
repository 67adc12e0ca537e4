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

//! Shared request fixtures for unit tests.

use airnode_protocol::params::{ParameterMap, ParameterValue};
use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};

use crate::{
    config::test_fixtures::ENDPOINT_ID, ApiCall, ApiCallType, RequestMetadata, RequestStatus,
    Withdrawal,
};

pub(crate) fn metadata(block_number: u64, log_index: u64) -> RequestMetadata {
    RequestMetadata {
        block_number,
        log_index,
        transaction_hash: B256::repeat_byte(0x77),
        current_block: block_number + 5,
        ignore_blocked_requests_after_blocks: 20,
    }
}

pub(crate) fn parameters() -> ParameterMap {
    let mut params = ParameterMap::new();
    params.insert("_type".to_string(), ParameterValue::String("int256".to_string()));
    params.insert("from".to_string(), ParameterValue::String("ETH".to_string()));
    params
}

/// A pending regular API call distinguished by `tag`.
pub(crate) fn api_call(tag: u8) -> ApiCall {
    ApiCall {
        id: B256::repeat_byte(tag),
        kind: ApiCallType::Regular,
        status: RequestStatus::Pending,
        error_code: None,
        provider_id: B256::repeat_byte(0x01),
        requester_index: Some(U256::from(7u64)),
        client_address: Address::repeat_byte(0x03),
        designated_wallet: Some(Address::repeat_byte(0x06)),
        fulfill_address: Some(Address::repeat_byte(0x03)),
        fulfill_function_id: Some(FixedBytes([0xd3, 0xbd, 0x14, 0x64])),
        endpoint_id: Some(ENDPOINT_ID),
        template_id: None,
        encoded_parameters: Bytes::new(),
        parameters: parameters(),
        request_count: U256::from(1u64),
        metadata: metadata(10, u64::from(tag)),
        aggregated_call_id: None,
        response_value: None,
    }
}

/// A pending withdrawal from the same requester as [api_call].
pub(crate) fn withdrawal(tag: u8) -> Withdrawal {
    Withdrawal {
        id: B256::repeat_byte(tag),
        provider_id: B256::repeat_byte(0x01),
        requester_index: U256::from(7u64),
        designated_wallet: Address::repeat_byte(0x06),
        destination: Address::repeat_byte(0x0b),
        status: RequestStatus::Pending,
        error_code: None,
        metadata: metadata(12, u64::from(tag)),
    }
}
