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

//! Fulfillment transaction assembly and submission.
//!
//! Assembly is pure: actionable requests are grouped by requester, ordered
//! by on-chain position, and assigned contiguous nonces starting at the
//! designated wallet's fetched transaction count. Submission is the only
//! I/O, and a failed submission never aborts its peers.

use std::collections::BTreeMap;

use airnode_protocol::contracts::{IAirnode, FAIL_STATUS_CODE, FULFILL_STATUS_CODE};
use alloy::providers::Provider;
use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use anyhow::{Context, Result};

use crate::{logs::LogEntry, state::GroupedRequests, RequestStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum PlannedCall {
    Fulfill {
        request_id: B256,
        fulfill_address: Address,
        fulfill_function_id: FixedBytes<4>,
        data: Bytes,
    },
    Fail {
        request_id: B256,
        fulfill_address: Address,
        fulfill_function_id: FixedBytes<4>,
    },
    Withdraw {
        withdrawal_request_id: B256,
        destination: Address,
    },
}

/// One transaction ready to submit from a designated wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTransaction {
    pub requester_index: U256,
    pub designated_wallet: Address,
    pub nonce: u64,
    pub call: PlannedCall,
}

impl PlannedTransaction {
    fn request_id(&self) -> B256 {
        match &self.call {
            PlannedCall::Fulfill { request_id, .. } => *request_id,
            PlannedCall::Fail { request_id, .. } => *request_id,
            PlannedCall::Withdraw { withdrawal_request_id, .. } => *withdrawal_request_id,
        }
    }
}

/// Assemble the provider's transactions in nonce order.
pub fn assemble(
    requests: &GroupedRequests,
    transaction_counts: &BTreeMap<U256, u64>,
) -> (Vec<LogEntry>, Vec<PlannedTransaction>) {
    let mut entries = Vec::new();
    // Per requester: (block, log index, wallet, call)
    let mut actions: BTreeMap<U256, Vec<(u64, u64, Address, PlannedCall)>> = BTreeMap::new();

    for call in &requests.api_calls {
        let actionable = match call.status {
            RequestStatus::Pending => call.response_value.is_some(),
            RequestStatus::Errored => true,
            RequestStatus::Fulfilled | RequestStatus::Ignored | RequestStatus::Blocked => false,
        };
        if !actionable {
            continue;
        }

        let (Some(index), Some(wallet), Some(fulfill_address), Some(fulfill_function_id)) = (
            call.requester_index,
            call.designated_wallet,
            call.fulfill_address,
            call.fulfill_function_id,
        ) else {
            entries.push(LogEntry::warn(format!(
                "Request ID:{} has no fulfillment parameters, no transaction assembled",
                call.id
            )));
            continue;
        };

        let planned = match &call.response_value {
            Some(data) if call.is_pending() => PlannedCall::Fulfill {
                request_id: call.id,
                fulfill_address,
                fulfill_function_id,
                data: data.clone(),
            },
            _ => PlannedCall::Fail { request_id: call.id, fulfill_address, fulfill_function_id },
        };

        let (block, log_index) = call.metadata.order();
        actions.entry(index).or_default().push((block, log_index, wallet, planned));
    }

    for withdrawal in &requests.withdrawals {
        if !withdrawal.is_pending() {
            continue;
        }
        let (block, log_index) = withdrawal.metadata.order();
        actions.entry(withdrawal.requester_index).or_default().push((
            block,
            log_index,
            withdrawal.designated_wallet,
            PlannedCall::Withdraw {
                withdrawal_request_id: withdrawal.id,
                destination: withdrawal.destination,
            },
        ));
    }

    let mut planned = Vec::new();
    for (requester_index, mut group) in actions {
        let Some(&start) = transaction_counts.get(&requester_index) else {
            entries.push(LogEntry::warn(format!(
                "No transaction count fetched for requester {requester_index}, skipping {} transaction(s)",
                group.len()
            )));
            continue;
        };

        group.sort_by_key(|(block, log_index, _, _)| (*block, *log_index));
        for (offset, (_, _, designated_wallet, call)) in group.into_iter().enumerate() {
            planned.push(PlannedTransaction {
                requester_index,
                designated_wallet,
                nonce: start + offset as u64,
                call,
            });
        }
    }

    (entries, planned)
}

/// Submit planned transactions one by one, logging and continuing on
/// failure. The provider behind `airnode` must hold the signers of every
/// designated wallet involved.
pub async fn submit<P>(
    airnode: &IAirnode::IAirnodeInstance<P>,
    provider_id: B256,
    gas_price: u128,
    planned: Vec<PlannedTransaction>,
) -> Vec<LogEntry>
where
    P: Provider,
{
    let mut entries = Vec::new();
    for transaction in planned {
        match submit_one(airnode, provider_id, gas_price, &transaction).await {
            Ok(entry) => entries.push(entry),
            Err(err) => entries.push(LogEntry::error(format!(
                "Failed to submit transaction with nonce {} for Request ID:{}: {err:#}",
                transaction.nonce,
                transaction.request_id()
            ))),
        }
    }
    entries
}

async fn submit_one<P>(
    airnode: &IAirnode::IAirnodeInstance<P>,
    provider_id: B256,
    gas_price: u128,
    transaction: &PlannedTransaction,
) -> Result<LogEntry>
where
    P: Provider,
{
    match &transaction.call {
        PlannedCall::Fulfill { request_id, fulfill_address, fulfill_function_id, data } => {
            let pending = airnode
                .fulfill(
                    *request_id,
                    provider_id,
                    U256::from(FULFILL_STATUS_CODE),
                    data.clone(),
                    *fulfill_address,
                    *fulfill_function_id,
                )
                .from(transaction.designated_wallet)
                .nonce(transaction.nonce)
                .gas_price(gas_price)
                .send()
                .await
                .context("Failed to send fulfill transaction")?;
            Ok(LogEntry::info(format!(
                "Submitted fulfill transaction {} for Request ID:{request_id}",
                pending.tx_hash()
            )))
        }
        PlannedCall::Fail { request_id, fulfill_address, fulfill_function_id } => {
            let pending = airnode
                .fail(
                    *request_id,
                    provider_id,
                    U256::from(FAIL_STATUS_CODE),
                    *fulfill_address,
                    *fulfill_function_id,
                )
                .from(transaction.designated_wallet)
                .nonce(transaction.nonce)
                .gas_price(gas_price)
                .send()
                .await
                .context("Failed to send fail transaction")?;
            Ok(LogEntry::info(format!(
                "Submitted fail transaction {} for Request ID:{request_id}",
                pending.tx_hash()
            )))
        }
        PlannedCall::Withdraw { withdrawal_request_id, destination } => {
            // The withdrawal sends the designated wallet's entire balance
            // minus the cost of the transaction itself.
            let balance = airnode
                .provider()
                .get_balance(transaction.designated_wallet)
                .await
                .context("Failed to get designated wallet balance")?;

            let gas_limit = airnode
                .fulfillWithdrawal(
                    *withdrawal_request_id,
                    provider_id,
                    transaction.requester_index,
                    *destination,
                )
                .from(transaction.designated_wallet)
                .value(U256::from(1u64))
                .estimate_gas()
                .await
                .context("Failed to estimate withdrawal gas")?;

            let tx_cost = U256::from(gas_limit) * U256::from(gas_price);
            let amount = balance.saturating_sub(tx_cost);
            if amount.is_zero() {
                return Ok(LogEntry::warn(format!(
                    "Designated wallet {:#x} cannot cover withdrawal transaction cost, skipping Request ID:{withdrawal_request_id}",
                    transaction.designated_wallet
                )));
            }

            let pending = airnode
                .fulfillWithdrawal(
                    *withdrawal_request_id,
                    provider_id,
                    transaction.requester_index,
                    *destination,
                )
                .from(transaction.designated_wallet)
                .value(amount)
                .gas(gas_limit)
                .nonce(transaction.nonce)
                .gas_price(gas_price)
                .send()
                .await
                .context("Failed to send withdrawal transaction")?;
            Ok(LogEntry::info(format!(
                "Submitted withdrawal transaction {} sending {amount} wei for Request ID:{withdrawal_request_id}",
                pending.tx_hash()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_support, ApiCall, ErrorCode};

    fn with_response(mut call: ApiCall) -> ApiCall {
        call.response_value = Some(Bytes::from(vec![0x01, 0xb9]));
        call
    }

    fn counts(pairs: &[(u64, u64)]) -> BTreeMap<U256, u64> {
        pairs.iter().map(|(index, count)| (U256::from(*index), *count)).collect()
    }

    #[test]
    fn nonces_are_contiguous_from_the_fetched_count() {
        let mut first = with_response(test_support::api_call(0x01));
        first.metadata.block_number = 10;
        let mut second = with_response(test_support::api_call(0x02));
        second.metadata.block_number = 11;
        let mut third = with_response(test_support::api_call(0x03));
        third.metadata.block_number = 12;

        let requests = GroupedRequests {
            api_calls: vec![third.clone(), first.clone(), second.clone()],
            withdrawals: vec![],
        };
        let (entries, planned) = assemble(&requests, &counts(&[(7, 5)]));

        assert!(entries.is_empty());
        let nonces: Vec<_> = planned.iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![5, 6, 7]);
        // Ordered by on-chain position, not input order.
        assert_eq!(planned[0].request_id(), first.id);
        assert_eq!(planned[1].request_id(), second.id);
        assert_eq!(planned[2].request_id(), third.id);
    }

    #[test]
    fn terminal_and_blocked_requests_produce_no_transactions() {
        let requests = GroupedRequests {
            api_calls: vec![
                with_response(test_support::api_call(0x01)).fulfilled(),
                test_support::api_call(0x02).ignored(),
                test_support::api_call(0x03).blocked(ErrorCode::NoMatchingAggregatedCall),
                // Pending without a response value is not actionable either.
                test_support::api_call(0x04),
            ],
            withdrawals: vec![],
        };
        let (entries, planned) = assemble(&requests, &counts(&[(7, 0)]));
        assert!(entries.is_empty());
        assert!(planned.is_empty());
    }

    #[test]
    fn errored_request_becomes_a_fail_transaction() {
        let call = test_support::api_call(0x01).errored(ErrorCode::ApiCallFailed);
        let requests = GroupedRequests { api_calls: vec![call.clone()], withdrawals: vec![] };
        let (_, planned) = assemble(&requests, &counts(&[(7, 3)]));

        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].nonce, 3);
        assert!(matches!(
            &planned[0].call,
            PlannedCall::Fail { request_id, .. } if *request_id == call.id
        ));
    }

    #[test]
    fn pending_with_response_becomes_a_fulfill_transaction() {
        let call = with_response(test_support::api_call(0x01));
        let requests = GroupedRequests { api_calls: vec![call.clone()], withdrawals: vec![] };
        let (_, planned) = assemble(&requests, &counts(&[(7, 0)]));

        assert!(matches!(
            &planned[0].call,
            PlannedCall::Fulfill { data, .. } if data == call.response_value.as_ref().unwrap()
        ));
    }

    #[test]
    fn withdrawals_share_the_requesters_nonce_sequence() {
        let mut call = with_response(test_support::api_call(0x01));
        call.metadata.block_number = 10;
        let mut withdrawal = test_support::withdrawal(0x02);
        withdrawal.metadata.block_number = 11;

        let requests =
            GroupedRequests { api_calls: vec![call], withdrawals: vec![withdrawal.clone()] };
        let (_, planned) = assemble(&requests, &counts(&[(7, 9)]));

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].nonce, 9);
        assert_eq!(planned[1].nonce, 10);
        assert!(matches!(planned[1].call, PlannedCall::Withdraw { .. }));
        assert_eq!(planned[1].designated_wallet, withdrawal.designated_wallet);
    }

    #[test]
    fn requester_without_transaction_count_is_skipped() {
        let call = with_response(test_support::api_call(0x01));
        let requests = GroupedRequests { api_calls: vec![call], withdrawals: vec![] };
        let (entries, planned) = assemble(&requests, &BTreeMap::new());

        assert!(planned.is_empty());
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("No transaction count"));
    }

    #[test]
    fn errored_request_without_fulfillment_fields_is_skipped() {
        let mut call = test_support::api_call(0x01).errored(ErrorCode::TemplateNotFound);
        call.designated_wallet = None;
        call.fulfill_address = None;
        let requests = GroupedRequests { api_calls: vec![call], withdrawals: vec![] };
        let (entries, planned) = assemble(&requests, &counts(&[(7, 0)]));

        assert!(planned.is_empty());
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("no fulfillment parameters"));
    }

    #[test]
    fn requesters_get_independent_sequences() {
        let a = with_response(test_support::api_call(0x01));
        let mut b = with_response(test_support::api_call(0x02));
        b.requester_index = Some(U256::from(8u64));
        b.designated_wallet = Some(Address::repeat_byte(0x08));

        let requests = GroupedRequests { api_calls: vec![a, b], withdrawals: vec![] };
        let (_, planned) = assemble(&requests, &counts(&[(7, 2), (8, 40)]));

        let by_requester: BTreeMap<U256, u64> =
            planned.iter().map(|t| (t.requester_index, t.nonce)).collect();
        assert_eq!(by_requester[&U256::from(7u64)], 2);
        assert_eq!(by_requester[&U256::from(8u64)], 40);
    }
}
