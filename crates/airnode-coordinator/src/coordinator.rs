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

//! One coordinator run, end to end.
//!
//! Per-provider initialization and ingestion fan out with bounded
//! parallelism and join before aggregation; API execution fans out and
//! joins before disaggregation; everything in between is pure and runs on
//! the joined results. A provider that fails to initialize yields error
//! logs and is skipped downstream, never aborting the run.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use airnode_protocol::{
    contracts::{IAirnode, IConvenience},
    derivation::MasterKeyring,
};
use alloy::{
    network::EthereumWallet,
    providers::{DynProvider, Provider, ProviderBuilder},
};
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use futures_util::{stream, StreamExt};

use crate::{
    aggregation,
    api::{self, ApiClient},
    config::{ChainConfig, ChainProviderConfig, Config},
    evm::{authorization, events, initialization, requests, templates, transactions},
    logs::{self, LogEntry},
    retry::with_retries,
    state::{CoordinatorState, CoordinatorUpdate, GroupedRequests, ProviderState, ProviderUpdate},
    RequestStatus,
};

/// Chain providers initialized and ingested at once.
pub const MAX_CONCURRENT_PROVIDERS: usize = 4;

/// Execute one coordinator run: reconcile provider records, ingest events,
/// execute aggregated API calls, and submit fulfillments. Returns the
/// final state snapshot and the ordered run log.
pub async fn run(
    config: Arc<Config>,
    keyring: Arc<MasterKeyring>,
    api_client: Arc<dyn ApiClient>,
) -> Result<(Vec<LogEntry>, CoordinatorState)> {
    let state = CoordinatorState::create(config.clone());
    let mut entries = Vec::new();

    let pairs: Vec<(ChainConfig, ChainProviderConfig)> = config
        .node_settings
        .chains
        .iter()
        .flat_map(|chain| {
            chain.providers.iter().map(move |provider| (chain.clone(), provider.clone()))
        })
        .collect();

    // Fan-out 1: per-provider initialization and ingestion, joined in
    // configuration order so aggregation sees a deterministic sequence.
    let initialized: Vec<(Vec<LogEntry>, Option<ProviderState>)> =
        stream::iter(pairs.iter().map(|(chain, provider_config)| {
            ingest_chain_provider(&config, &keyring, chain, provider_config)
        }))
        .buffered(MAX_CONCURRENT_PROVIDERS)
        .collect()
        .await;

    let mut providers = Vec::new();
    let mut provider_pairs = Vec::new();
    for ((chain, provider_config), (provider_entries, provider_state)) in
        pairs.iter().zip(initialized)
    {
        entries.extend(provider_entries);
        if let Some(provider_state) = provider_state {
            providers.push(provider_state);
            provider_pairs.push((chain.clone(), provider_config.clone()));
        }
    }

    if providers.is_empty() {
        logs::flush(&entries);
        anyhow::bail!("No chain provider could be initialized");
    }

    let (aggregate_entries, providers, aggregated) = aggregation::aggregate(&config, providers);
    entries.extend(aggregate_entries);

    // Fan-out 2: API execution, joined before disaggregation.
    let (execute_entries, aggregated) =
        api::execute_aggregated_calls(&config, api_client.as_ref(), aggregated).await;
    entries.extend(execute_entries);

    let providers: Vec<ProviderState> = providers
        .into_iter()
        .map(|provider| {
            let name = provider.name.clone();
            let (disaggregate_entries, api_calls) =
                aggregation::disaggregate(provider.requests.api_calls.clone(), &aggregated);
            entries.extend(logs::prefixed(&name, disaggregate_entries));
            let withdrawals = provider.requests.withdrawals.clone();
            provider.update(ProviderUpdate {
                requests: Some(GroupedRequests { api_calls, withdrawals }),
                ..Default::default()
            })
        })
        .collect();

    let submissions: Vec<Vec<LogEntry>> = stream::iter(
        providers.iter().zip(provider_pairs.iter()).map(|(provider_state, (chain, provider_config))| {
            submit_chain_provider(&keyring, chain, provider_config, provider_state)
        }),
    )
    .buffered(MAX_CONCURRENT_PROVIDERS)
    .collect()
    .await;
    for (provider_state, submission_entries) in providers.iter().zip(submissions) {
        entries.extend(logs::prefixed(&provider_state.name, submission_entries));
    }

    let state = state.update(CoordinatorUpdate {
        evm_providers: Some(providers),
        aggregated_api_calls_by_id: Some(aggregated),
    });

    Ok((entries, state))
}

fn connect(keyring: &MasterKeyring, url: &url::Url) -> DynProvider {
    let wallet = EthereumWallet::from(keyring.master_signer().clone());
    ProviderBuilder::new().wallet(wallet).connect_http(url.clone()).erased()
}

/// Initialize one chain provider and build its request state. Failures
/// yield logs and `None`; downstream stages skip the provider.
async fn ingest_chain_provider(
    config: &Config,
    keyring: &MasterKeyring,
    chain: &ChainConfig,
    provider_config: &ChainProviderConfig,
) -> (Vec<LogEntry>, Option<ProviderState>) {
    let label = provider_config.name.clone();
    match try_ingest_chain_provider(config, keyring, chain, provider_config).await {
        Ok((entries, provider_state)) => (logs::prefixed(&label, entries), Some(provider_state)),
        Err(err) => {
            let entry = LogEntry::error(format!("Chain provider initialization failed: {err:#}"));
            (logs::prefixed(&label, vec![entry]), None)
        }
    }
}

async fn try_ingest_chain_provider(
    config: &Config,
    keyring: &MasterKeyring,
    chain: &ChainConfig,
    provider_config: &ChainProviderConfig,
) -> Result<(Vec<LogEntry>, ProviderState)> {
    let mut entries = Vec::new();

    let provider = connect(keyring, &provider_config.url);
    let airnode = IAirnode::new(chain.contracts.airnode, provider.clone());
    let convenience = IConvenience::new(chain.contracts.convenience, provider.clone());

    let (init_entries, current_block) =
        initialization::initialize_provider(&airnode, &convenience, keyring, chain).await?;
    entries.extend(init_entries);

    let raw_logs = events::fetch_airnode_logs(
        &provider,
        chain.contracts.airnode,
        keyring.provider_id(),
        current_block,
    )
    .await?;
    let (classify_entries, parsed) = events::classify_logs(
        raw_logs,
        current_block,
        chain.ignore_blocked_requests_after_blocks,
    );
    entries.extend(classify_entries);

    let (materialize_entries, grouped) = requests::materialize(&parsed);
    entries.extend(materialize_entries);

    let template_ids = templates::template_ids(&grouped.api_calls);
    let fetched_templates = templates::fetch(&convenience, template_ids).await?;
    let (template_entries, api_calls) = templates::apply(grouped.api_calls, &fetched_templates);
    entries.extend(template_entries);

    let queries = authorization::endorsement_queries(&api_calls);
    let endorsements = authorization::fetch_endorsements(&convenience, queries).await?;
    let (authorize_entries, api_calls) = authorization::authorize(config, api_calls, &endorsements);
    entries.extend(authorize_entries);

    let gas_price = {
        let provider = &provider;
        with_retries("gas price fetch", || async move {
            provider.get_gas_price().await.context("Failed to get gas price")
        })
        .await?
    };

    let requests = GroupedRequests { api_calls, withdrawals: grouped.withdrawals };
    let transaction_counts = fetch_transaction_counts(&provider, &requests).await;

    let provider_state = ProviderState::new(
        chain.id,
        provider_config.name.clone(),
        chain.contracts,
        chain.ignore_blocked_requests_after_blocks,
    )
    .update(ProviderUpdate {
        requests: Some(requests),
        transaction_counts_by_requester_index: Some(transaction_counts),
        current_block: Some(current_block),
        gas_price: Some(gas_price),
    });

    Ok((entries, provider_state))
}

/// Fetch each actionable requester's designated wallet transaction count,
/// once per run.
async fn fetch_transaction_counts(
    provider: &DynProvider,
    requests: &GroupedRequests,
) -> BTreeMap<U256, u64> {
    let mut wallets: BTreeMap<U256, Address> = BTreeMap::new();
    for call in &requests.api_calls {
        if matches!(call.status, RequestStatus::Pending | RequestStatus::Errored) {
            if let (Some(index), Some(wallet)) = (call.requester_index, call.designated_wallet) {
                wallets.entry(index).or_insert(wallet);
            }
        }
    }
    for withdrawal in &requests.withdrawals {
        if withdrawal.is_pending() {
            wallets.entry(withdrawal.requester_index).or_insert(withdrawal.designated_wallet);
        }
    }

    let fetched = futures_util::future::join_all(wallets.into_iter().map(
        |(index, wallet)| async move {
            let count = with_retries("transaction count fetch", || async move {
                provider
                    .get_transaction_count(wallet)
                    .await
                    .with_context(|| format!("Failed to get transaction count of {wallet:#x}"))
            })
            .await;
            (index, count)
        },
    ))
    .await;

    fetched
        .into_iter()
        .filter_map(|(index, count)| match count {
            Ok(count) => Some((index, count)),
            Err(err) => {
                tracing::warn!("Skipping requester {index}: {err:#}");
                None
            }
        })
        .collect()
}

/// Assemble and submit one provider's transactions from the designated
/// wallets this node controls.
async fn submit_chain_provider(
    keyring: &MasterKeyring,
    chain: &ChainConfig,
    provider_config: &ChainProviderConfig,
    provider_state: &ProviderState,
) -> Vec<LogEntry> {
    let (mut entries, planned) = transactions::assemble(
        &provider_state.requests,
        &provider_state.transaction_counts_by_requester_index,
    );
    if planned.is_empty() {
        return entries;
    }

    let mut wallet = EthereumWallet::from(keyring.master_signer().clone());
    let mut controlled: BTreeSet<Address> = BTreeSet::new();
    let mut derived: BTreeSet<U256> = BTreeSet::new();
    for transaction in &planned {
        if !derived.insert(transaction.requester_index) {
            continue;
        }
        match keyring.designated_signer(transaction.requester_index) {
            Ok(signer) => {
                controlled.insert(signer.address());
                wallet.register_signer(signer);
            }
            Err(err) => entries.push(LogEntry::warn(format!(
                "Cannot derive designated wallet for requester {}: {err}",
                transaction.requester_index
            ))),
        }
    }

    let (signable, unsignable): (Vec<_>, Vec<_>) = planned
        .into_iter()
        .partition(|transaction| controlled.contains(&transaction.designated_wallet));
    for transaction in unsignable {
        entries.push(LogEntry::warn(format!(
            "Designated wallet {:#x} of requester {} is not derived from this node's master key, \
             skipping its transaction",
            transaction.designated_wallet, transaction.requester_index
        )));
    }
    if signable.is_empty() {
        return entries;
    }

    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .connect_http(provider_config.url.clone())
        .erased();
    let airnode = IAirnode::new(chain.contracts.airnode, provider);

    entries
        .extend(
            transactions::submit(
                &airnode,
                keyring.provider_id(),
                provider_state.gas_price,
                signable,
            )
            .await,
        );
    entries
}
