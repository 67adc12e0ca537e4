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

//! Alloy bindings for the Airnode and Convenience contracts.
//!
//! The Airnode contract is the request/fulfill entry point clients interact
//! with; the Convenience contract batches the view calls the node needs at
//! the start of a run (provider record, templates, endorsements).

use alloy::sol;

/// Status code submitted with a successful fulfillment.
pub const FULFILL_STATUS_CODE: u64 = 0;

/// Status code submitted with a `fail` transaction. The contract only
/// distinguishes zero from non-zero.
pub const FAIL_STATUS_CODE: u64 = 1;

sol! {
    #![sol(rpc, all_derives)]

    interface IAirnode {
        event ClientRequestCreated(
            bytes32 indexed providerId,
            bytes32 indexed requestId,
            uint256 noRequests,
            address clientAddress,
            bytes32 templateId,
            uint256 requesterIndex,
            address designatedWallet,
            address fulfillAddress,
            bytes4 fulfillFunctionId,
            bytes parameters
        );

        event ClientShortRequestCreated(
            bytes32 indexed providerId,
            bytes32 indexed requestId,
            uint256 noRequests,
            address clientAddress,
            bytes32 templateId,
            bytes parameters
        );

        event ClientFullRequestCreated(
            bytes32 indexed providerId,
            bytes32 indexed requestId,
            uint256 noRequests,
            address clientAddress,
            bytes32 endpointId,
            uint256 requesterIndex,
            address designatedWallet,
            address fulfillAddress,
            bytes4 fulfillFunctionId,
            bytes parameters
        );

        event ClientRequestFulfilled(
            bytes32 indexed providerId,
            bytes32 indexed requestId,
            uint256 statusCode,
            bytes data
        );

        event ClientRequestFailed(bytes32 indexed providerId, bytes32 indexed requestId);

        event WithdrawalRequested(
            bytes32 indexed providerId,
            uint256 indexed requesterIndex,
            bytes32 indexed withdrawalRequestId,
            address designatedWallet,
            address destination
        );

        event WithdrawalFulfilled(
            bytes32 indexed providerId,
            uint256 indexed requesterIndex,
            bytes32 indexed withdrawalRequestId,
            address designatedWallet,
            address destination,
            uint256 amount
        );

        function createProvider(
            address admin,
            string xpub,
            address[] authorizers
        ) external payable returns (bytes32 providerId);

        function fulfill(
            bytes32 requestId,
            bytes32 providerId,
            uint256 statusCode,
            bytes data,
            address fulfillAddress,
            bytes4 fulfillFunctionId
        ) external returns (bool callSuccess, bytes callData);

        function fail(
            bytes32 requestId,
            bytes32 providerId,
            uint256 statusCode,
            address fulfillAddress,
            bytes4 fulfillFunctionId
        ) external;

        function fulfillWithdrawal(
            bytes32 withdrawalRequestId,
            bytes32 providerId,
            uint256 requesterIndex,
            address destination
        ) external payable;
    }

    interface IConvenience {
        function getProviderAndBlockNumber(bytes32 providerId)
            external
            view
            returns (address admin, string xpub, address[] authorizers, uint256 blockNumber);

        function getTemplates(bytes32[] templateIds)
            external
            view
            returns (bytes32[] providerIds, bytes32[] endpointIds, bytes[] parameters);

        function checkEndorsementStatuses(
            uint256[] requesterIndices,
            address[] clientAddresses
        ) external view returns (bool[] statuses);
    }
}
