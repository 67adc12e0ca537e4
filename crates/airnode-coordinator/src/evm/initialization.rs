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

//! Provider record reconciliation.
//!
//! Before ingesting events, each chain's provider record is compared with
//! configuration. An absent or stale record is recreated with whatever the
//! master wallet can afford (the entire balance minus the transaction
//! cost goes along as value, funding future fulfillments). An underfunded
//! master wallet is warned about but never blocks request serving.

use airnode_protocol::{
    contracts::{IAirnode, IConvenience},
    derivation::MasterKeyring,
};
use alloy::providers::Provider;
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};

use crate::{config::ChainConfig, logs::LogEntry, retry::with_retries};

/// The on-chain provider record as returned by the Convenience contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecord {
    pub admin: Address,
    pub xpub: String,
    pub authorizers: Vec<Address>,
    pub block_number: u64,
}

impl ProviderRecord {
    /// An empty xpub means no record has ever been created.
    pub fn exists(&self) -> bool {
        !self.xpub.is_empty()
    }

    pub fn matches(&self, admin: Address, authorizers: &[Address], xpub: &str) -> bool {
        self.admin == admin && self.authorizers == authorizers && self.xpub == xpub
    }
}

/// What the initializer decided to do about the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializationAction {
    UpToDate,
    /// Submit `createProvider`, sending `value` wei along.
    Create { value: U256 },
    /// The master wallet cannot afford the transaction; serve requests
    /// with the record as it is.
    SkipUnderfunded,
}

/// Fetch the record and the chain head in one view call.
pub async fn fetch_provider_record<P>(
    convenience: &IConvenience::IConvenienceInstance<P>,
    provider_id: B256,
) -> Result<ProviderRecord>
where
    P: Provider,
{
    let record = with_retries("provider record fetch", || async move {
        convenience
            .getProviderAndBlockNumber(provider_id)
            .call()
            .await
            .context("Failed to get provider record")
    })
    .await?;

    Ok(ProviderRecord {
        admin: record.admin,
        xpub: record.xpub,
        authorizers: record.authorizers,
        block_number: u64::try_from(record.blockNumber).context("Block number out of range")?,
    })
}

/// Decide whether and how to reconcile the record. Pure; all chain reads
/// happen before this point.
pub fn plan(
    record: &ProviderRecord,
    admin: Address,
    authorizers: &[Address],
    xpub: &str,
    master_balance: U256,
    tx_cost: U256,
) -> (Vec<LogEntry>, InitializationAction) {
    if record.matches(admin, authorizers, xpub) {
        return (
            vec![LogEntry::debug("Provider record is up to date".to_string())],
            InitializationAction::UpToDate,
        );
    }

    let verb = if record.exists() { "update" } else { "create" };

    if master_balance >= tx_cost {
        let value = master_balance - tx_cost;
        let entry = LogEntry::info(format!(
            "Submitting provider record {verb} with {value} wei of funding"
        ));
        return (vec![entry], InitializationAction::Create { value });
    }

    let entries = vec![
        LogEntry::warn(format!("Master wallet balance is {master_balance} wei")),
        LogEntry::warn(format!("A provider record {verb} would cost {tx_cost} wei")),
        LogEntry::warn(
            "Provider record cannot be updated; requests will still be served but on-chain \
             metadata stays stale"
                .to_string(),
        ),
    ];
    (entries, InitializationAction::SkipUnderfunded)
}

/// Reconcile the chain's provider record with configuration. Returns the
/// chain head observed by the record fetch, which anchors the rest of the
/// run for this provider.
pub async fn initialize_provider<P>(
    airnode: &IAirnode::IAirnodeInstance<P>,
    convenience: &IConvenience::IConvenienceInstance<P>,
    keyring: &MasterKeyring,
    chain: &ChainConfig,
) -> Result<(Vec<LogEntry>, u64)>
where
    P: Provider,
{
    let record = fetch_provider_record(convenience, keyring.provider_id()).await?;
    let current_block = record.block_number;

    if record.matches(chain.provider_admin, &chain.authorizers, keyring.xpub()) {
        let entries = vec![LogEntry::debug("Provider record is up to date".to_string())];
        return Ok((entries, current_block));
    }

    let master = keyring.master_address();
    let create_call = || {
        airnode
            .createProvider(
                chain.provider_admin,
                keyring.xpub().to_string(),
                chain.authorizers.clone(),
            )
            .from(master)
    };

    let gas_limit = create_call()
        .value(U256::from(1u64))
        .estimate_gas()
        .await
        .context("Failed to estimate createProvider gas")?;
    let gas_price =
        airnode.provider().get_gas_price().await.context("Failed to get gas price")?;
    let tx_cost = U256::from(gas_limit) * U256::from(gas_price);
    let balance = airnode
        .provider()
        .get_balance(master)
        .await
        .context("Failed to get master wallet balance")?;

    let (mut entries, action) = plan(
        &record,
        chain.provider_admin,
        &chain.authorizers,
        keyring.xpub(),
        balance,
        tx_cost,
    );

    if let InitializationAction::Create { value } = action {
        let pending = create_call()
            .value(value)
            .gas(gas_limit)
            .gas_price(gas_price)
            .send()
            .await
            .context("Failed to send createProvider transaction")?;
        entries.push(LogEntry::info(format!(
            "Submitted createProvider transaction {}",
            pending.tx_hash()
        )));
    }

    Ok((entries, current_block))
}
