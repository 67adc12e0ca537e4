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

//! Request lifecycle engine of the Airnode oracle node.
//!
//! A coordinator run ingests blockchain logs from every configured chain
//! provider, drives each request through decoding, authorization,
//! cross-provider aggregation, API execution, and disaggregation, and
//! finally submits fulfillment transactions. Runs are short batches; all
//! state is rebuilt from chain and config on every invocation.

use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};

use airnode_protocol::params::ParameterMap;

pub mod aggregation;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod evm;
pub mod logs;
pub mod retry;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

use config::Trigger;

/// How the client supplied the request on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCallType {
    /// Template reference only; everything else comes from the template.
    Short,
    /// Template reference plus inline fulfillment parameters.
    Regular,
    /// No template; all parameters inline.
    Full,
}

/// Lifecycle status of a request within a run.
///
/// Transitions are monotone toward the terminal states `Fulfilled`,
/// `Ignored`, and `Errored`; `Blocked` requests either recover to be
/// retried next run or age out of the batch entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Eligible for execution.
    Pending,
    /// Already fulfilled on-chain; skipped.
    Fulfilled,
    /// Not served by this node; dropped silently.
    Ignored,
    /// Cannot be decided this run; carried unless too old.
    Blocked,
    /// Permanent failure; submitted as a fail transaction.
    Errored,
}

/// Why a request left the happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    RequestParameterDecodingFailed,
    ReservedParametersInvalid,
    TemplateNotFound,
    TemplateParameterDecodingFailed,
    InsufficientParameters,
    UnauthorizedClient,
    PendingWithdrawal,
    NoMatchingAggregatedCall,
    ApiCallFailed,
    UnknownEndpointId,
    UnknownOis,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::RequestParameterDecodingFailed => "RequestParameterDecodingFailed",
            ErrorCode::ReservedParametersInvalid => "ReservedParametersInvalid",
            ErrorCode::TemplateNotFound => "TemplateNotFound",
            ErrorCode::TemplateParameterDecodingFailed => "TemplateParameterDecodingFailed",
            ErrorCode::InsufficientParameters => "InsufficientParameters",
            ErrorCode::UnauthorizedClient => "UnauthorizedClient",
            ErrorCode::PendingWithdrawal => "PendingWithdrawal",
            ErrorCode::NoMatchingAggregatedCall => "NoMatchingAggregatedCall",
            ErrorCode::ApiCallFailed => "ApiCallFailed",
            ErrorCode::UnknownEndpointId => "UnknownEndpointId",
            ErrorCode::UnknownOis => "UnknownOIS",
        };
        f.write_str(name)
    }
}

/// Where and when a request was observed on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMetadata {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
    /// The run's view of the chain head when the log was fetched.
    pub current_block: u64,
    pub ignore_blocked_requests_after_blocks: u64,
}

impl RequestMetadata {
    /// Sort key honoring on-chain ordering.
    pub fn order(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    /// Blocks elapsed since the request was made.
    pub fn age(&self) -> u64 {
        self.current_block.saturating_sub(self.block_number)
    }
}

/// An API call request materialized from a creation event.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub id: B256,
    pub kind: ApiCallType,
    pub status: RequestStatus,
    pub error_code: Option<ErrorCode>,
    pub provider_id: B256,
    pub requester_index: Option<U256>,
    pub client_address: Address,
    pub designated_wallet: Option<Address>,
    pub fulfill_address: Option<Address>,
    pub fulfill_function_id: Option<FixedBytes<4>>,
    pub endpoint_id: Option<B256>,
    pub template_id: Option<B256>,
    pub encoded_parameters: Bytes,
    pub parameters: ParameterMap,
    pub request_count: U256,
    pub metadata: RequestMetadata,
    /// Set by the aggregator for every request that joined an aggregated
    /// call this run.
    pub aggregated_call_id: Option<B256>,
    pub response_value: Option<Bytes>,
}

impl ApiCall {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn errored(self, code: ErrorCode) -> Self {
        Self { status: RequestStatus::Errored, error_code: Some(code), ..self }
    }

    pub fn blocked(self, code: ErrorCode) -> Self {
        Self { status: RequestStatus::Blocked, error_code: Some(code), ..self }
    }

    pub fn fulfilled(self) -> Self {
        Self { status: RequestStatus::Fulfilled, ..self }
    }

    pub fn ignored(self) -> Self {
        Self { status: RequestStatus::Ignored, ..self }
    }

    /// Whether the on-chain fulfillment side of this request is known, i.e.
    /// a fulfill or fail transaction can actually be assembled for it.
    pub fn has_fulfillment_fields(&self) -> bool {
        self.requester_index.is_some()
            && self.designated_wallet.is_some()
            && self.fulfill_address.is_some()
            && self.fulfill_function_id.is_some()
    }
}

/// A withdrawal request materialized from a `WithdrawalRequested` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Withdrawal {
    pub id: B256,
    pub provider_id: B256,
    pub requester_index: U256,
    pub designated_wallet: Address,
    pub destination: Address,
    pub status: RequestStatus,
    pub error_code: Option<ErrorCode>,
    pub metadata: RequestMetadata,
}

impl Withdrawal {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn fulfilled(self) -> Self {
        Self { status: RequestStatus::Fulfilled, ..self }
    }
}

/// The coalesced form of equivalent API call requests across providers,
/// executed once against the external API.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedApiCall {
    /// Shared across all coalesced requests; the first participating
    /// request id in provider-then-block order.
    pub id: B256,
    pub endpoint_id: B256,
    pub parameters: ParameterMap,
    pub kind: ApiCallType,
    pub trigger: Trigger,
    pub response_value: Option<Bytes>,
    pub error: Option<ErrorCode>,
}
