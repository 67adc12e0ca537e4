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

//! Immutable state snapshots threaded through the pipeline.
//!
//! Stages never mutate in place: each consumes a snapshot and an update and
//! produces a new snapshot. Provider states hold plain data only; RPC
//! handles live with the run orchestrator so every stage below it stays
//! pure and testable.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{B256, U256};

use crate::{
    config::{ChainContracts, Config},
    AggregatedApiCall, ApiCall, Withdrawal,
};

/// Requests of one chain provider, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedRequests {
    pub api_calls: Vec<ApiCall>,
    pub withdrawals: Vec<Withdrawal>,
}

/// Snapshot of everything the run knows about one chain provider.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub chain_id: u64,
    /// `chains[].providers[].name` from configuration; used in log prefixes.
    pub name: String,
    pub contracts: ChainContracts,
    pub ignore_blocked_requests_after_blocks: u64,
    pub requests: GroupedRequests,
    pub transaction_counts_by_requester_index: BTreeMap<U256, u64>,
    pub current_block: u64,
    pub gas_price: u128,
}

/// Partial update merged over a [ProviderState].
#[derive(Debug, Default)]
pub struct ProviderUpdate {
    pub requests: Option<GroupedRequests>,
    pub transaction_counts_by_requester_index: Option<BTreeMap<U256, u64>>,
    pub current_block: Option<u64>,
    pub gas_price: Option<u128>,
}

impl ProviderState {
    pub fn new(
        chain_id: u64,
        name: impl Into<String>,
        contracts: ChainContracts,
        ignore_blocked_requests_after_blocks: u64,
    ) -> Self {
        Self {
            chain_id,
            name: name.into(),
            contracts,
            ignore_blocked_requests_after_blocks,
            requests: GroupedRequests::default(),
            transaction_counts_by_requester_index: BTreeMap::new(),
            current_block: 0,
            gas_price: 0,
        }
    }

    pub fn update(self, update: ProviderUpdate) -> Self {
        Self {
            requests: update.requests.unwrap_or(self.requests),
            transaction_counts_by_requester_index: update
                .transaction_counts_by_requester_index
                .unwrap_or(self.transaction_counts_by_requester_index),
            current_block: update.current_block.unwrap_or(self.current_block),
            gas_price: update.gas_price.unwrap_or(self.gas_price),
            ..self
        }
    }
}

/// Snapshot of a whole coordinator run.
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub config: Arc<Config>,
    /// One entry per `(chain, provider)` pair, in configuration order.
    pub evm_providers: Vec<ProviderState>,
    pub aggregated_api_calls_by_id: BTreeMap<B256, AggregatedApiCall>,
}

#[derive(Debug, Default)]
pub struct CoordinatorUpdate {
    pub evm_providers: Option<Vec<ProviderState>>,
    pub aggregated_api_calls_by_id: Option<BTreeMap<B256, AggregatedApiCall>>,
}

impl CoordinatorState {
    pub fn create(config: Arc<Config>) -> Self {
        Self { config, evm_providers: Vec::new(), aggregated_api_calls_by_id: BTreeMap::new() }
    }

    pub fn update(self, update: CoordinatorUpdate) -> Self {
        Self {
            evm_providers: update.evm_providers.unwrap_or(self.evm_providers),
            aggregated_api_calls_by_id: update
                .aggregated_api_calls_by_id
                .unwrap_or(self.aggregated_api_calls_by_id),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_fixtures;

    #[test]
    fn provider_update_merges_only_set_fields() {
        let config = test_fixtures::config();
        let chain = &config.node_settings.chains[0];
        let state = ProviderState::new(
            chain.id,
            "evm-local",
            chain.contracts,
            chain.ignore_blocked_requests_after_blocks,
        );

        let updated = state.clone().update(ProviderUpdate {
            current_block: Some(128),
            gas_price: Some(2_000_000_000),
            ..Default::default()
        });

        assert_eq!(updated.current_block, 128);
        assert_eq!(updated.gas_price, 2_000_000_000);
        assert_eq!(updated.requests, state.requests);
        assert_eq!(updated.name, "evm-local");
    }

    #[test]
    fn coordinator_update_replaces_providers() {
        let config = Arc::new(test_fixtures::config());
        let chain = &config.node_settings.chains[0];
        let state = CoordinatorState::create(config.clone());
        assert!(state.evm_providers.is_empty());

        let provider = ProviderState::new(chain.id, "evm-local", chain.contracts, 20);
        let updated = state
            .update(CoordinatorUpdate { evm_providers: Some(vec![provider]), ..Default::default() });
        assert_eq!(updated.evm_providers.len(), 1);
        assert!(updated.aggregated_api_calls_by_id.is_empty());
    }
}
