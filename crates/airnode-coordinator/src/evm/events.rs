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

//! Fetching and classification of Airnode contract logs.

use airnode_protocol::contracts::IAirnode;
use alloy::{
    providers::{DynProvider, Provider},
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use alloy_primitives::Address;
use anyhow::{Context, Result};

use crate::{
    logs::LogEntry,
    retry::with_retries,
    RequestMetadata,
};

/// How far behind the chain head a run looks for request events.
pub const BLOCK_LOOKBACK: u64 = 300;

/// A typed Airnode contract event.
#[derive(Debug, Clone)]
pub enum AirnodeEvent {
    ShortRequestCreated(IAirnode::ClientShortRequestCreated),
    RequestCreated(IAirnode::ClientRequestCreated),
    FullRequestCreated(IAirnode::ClientFullRequestCreated),
    RequestFulfilled(IAirnode::ClientRequestFulfilled),
    RequestFailed(IAirnode::ClientRequestFailed),
    WithdrawalRequested(IAirnode::WithdrawalRequested),
    WithdrawalFulfilled(IAirnode::WithdrawalFulfilled),
}

/// A classified log together with its on-chain position.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    pub event: AirnodeEvent,
    pub metadata: RequestMetadata,
}

/// Fetch this provider's Airnode logs in the run's lookback window. Every
/// Airnode event indexes the provider id as its first topic, so foreign
/// providers' requests are filtered out by the node's RPC query itself.
pub async fn fetch_airnode_logs(
    provider: &DynProvider,
    airnode: Address,
    provider_id: alloy_primitives::B256,
    current_block: u64,
) -> Result<Vec<Log>> {
    let from_block = current_block.saturating_sub(BLOCK_LOOKBACK);
    with_retries("Airnode log fetch", || {
        let filter = Filter::new()
            .address(airnode)
            .topic1(provider_id)
            .from_block(from_block)
            .to_block(current_block);
        async move { provider.get_logs(&filter).await.context("Failed to get logs") }
    })
    .await
}

/// Classify raw logs into typed events, in `(block number, log index)`
/// order. Unknown topics and undecodable logs are skipped with a WARN.
pub fn classify_logs(
    mut raw: Vec<Log>,
    current_block: u64,
    ignore_blocked_requests_after_blocks: u64,
) -> (Vec<LogEntry>, Vec<ParsedLog>) {
    raw.sort_by_key(|log| (log.block_number.unwrap_or(0), log.log_index.unwrap_or(0)));

    let mut entries = Vec::new();
    let mut parsed = Vec::new();

    for log in raw {
        let (Some(block_number), Some(log_index), Some(transaction_hash)) =
            (log.block_number, log.log_index, log.transaction_hash)
        else {
            entries.push(LogEntry::warn("Skipping log without confirmed position".to_string()));
            continue;
        };

        let event = match classify(&log) {
            Ok(Some(event)) => event,
            Ok(None) => {
                entries.push(LogEntry::warn(format!(
                    "Skipping unknown event topic {:?} in transaction {transaction_hash}",
                    log.topic0()
                )));
                continue;
            }
            Err(err) => {
                entries.push(LogEntry::warn(format!(
                    "Failed to decode event in transaction {transaction_hash}: {err}"
                )));
                continue;
            }
        };

        parsed.push(ParsedLog {
            event,
            metadata: RequestMetadata {
                block_number,
                log_index,
                transaction_hash,
                current_block,
                ignore_blocked_requests_after_blocks,
            },
        });
    }

    (entries, parsed)
}

fn classify(log: &Log) -> Result<Option<AirnodeEvent>, alloy::sol_types::Error> {
    let Some(topic) = log.topic0() else {
        return Ok(None);
    };

    let event = match *topic {
        IAirnode::ClientShortRequestCreated::SIGNATURE_HASH => AirnodeEvent::ShortRequestCreated(
            log.log_decode::<IAirnode::ClientShortRequestCreated>()?.inner.data,
        ),
        IAirnode::ClientRequestCreated::SIGNATURE_HASH => AirnodeEvent::RequestCreated(
            log.log_decode::<IAirnode::ClientRequestCreated>()?.inner.data,
        ),
        IAirnode::ClientFullRequestCreated::SIGNATURE_HASH => AirnodeEvent::FullRequestCreated(
            log.log_decode::<IAirnode::ClientFullRequestCreated>()?.inner.data,
        ),
        IAirnode::ClientRequestFulfilled::SIGNATURE_HASH => AirnodeEvent::RequestFulfilled(
            log.log_decode::<IAirnode::ClientRequestFulfilled>()?.inner.data,
        ),
        IAirnode::ClientRequestFailed::SIGNATURE_HASH => AirnodeEvent::RequestFailed(
            log.log_decode::<IAirnode::ClientRequestFailed>()?.inner.data,
        ),
        IAirnode::WithdrawalRequested::SIGNATURE_HASH => AirnodeEvent::WithdrawalRequested(
            log.log_decode::<IAirnode::WithdrawalRequested>()?.inner.data,
        ),
        IAirnode::WithdrawalFulfilled::SIGNATURE_HASH => AirnodeEvent::WithdrawalFulfilled(
            log.log_decode::<IAirnode::WithdrawalFulfilled>()?.inner.data,
        ),
        _ => return Ok(None),
    };

    Ok(Some(event))
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use alloy_primitives::{Log as PrimitiveLog, B256};

    /// Wrap a contract event into the RPC log shape the provider returns.
    pub(crate) fn chain_log<E: SolEvent>(event: &E, block_number: u64, log_index: u64) -> Log {
        Log {
            inner: PrimitiveLog {
                address: Address::repeat_byte(0xa1),
                data: event.encode_log_data(),
            },
            block_hash: None,
            block_number: Some(block_number),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0x77)),
            transaction_index: None,
            log_index: Some(log_index),
            removed: false,
        }
    }
}
