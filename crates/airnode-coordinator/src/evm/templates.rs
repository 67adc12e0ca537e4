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

//! Template resolution for short and regular requests.
//!
//! Templates are stored on-chain as `(providerId, endpointId, parameters)`
//! triples and fetched in batches through the Convenience contract. A
//! template's decoded parameters sit underneath the client's: any name the
//! client also sent wins.

use std::collections::BTreeMap;

use airnode_protocol::{contracts::IConvenience, params};
use alloy::providers::Provider;
use alloy_primitives::{Bytes, B256};
use anyhow::{Context, Result};

use crate::{logs::LogEntry, retry::with_retries, ApiCall, ErrorCode};

/// Templates fetched per Convenience call.
const TEMPLATE_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub endpoint_id: B256,
    pub parameters: Bytes,
}

/// Unique template ids referenced by still-pending API calls.
pub fn template_ids(api_calls: &[ApiCall]) -> Vec<B256> {
    let mut ids: Vec<B256> = api_calls
        .iter()
        .filter(|call| call.is_pending())
        .filter_map(|call| call.template_id)
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Fetch the given templates in batches. Missing templates (zeroed
/// entries) are simply absent from the result map.
pub async fn fetch<P>(
    convenience: &IConvenience::IConvenienceInstance<P>,
    ids: Vec<B256>,
) -> Result<BTreeMap<B256, Template>>
where
    P: Provider,
{
    let mut templates = BTreeMap::new();

    for chunk in ids.chunks(TEMPLATE_BATCH_SIZE) {
        let batch = with_retries("template fetch", || {
            let chunk = chunk.to_vec();
            async move {
                convenience
                    .getTemplates(chunk)
                    .call()
                    .await
                    .context("Failed to fetch templates")
            }
        })
        .await?;

        for (i, template_id) in chunk.iter().enumerate() {
            let endpoint_id = batch.endpointIds.get(i).copied().unwrap_or_default();
            if endpoint_id.is_zero() {
                continue;
            }
            templates.insert(
                *template_id,
                Template {
                    endpoint_id,
                    parameters: batch.parameters.get(i).cloned().unwrap_or_default(),
                },
            );
        }
    }

    Ok(templates)
}

/// Apply fetched templates to the requests that reference them.
pub fn apply(
    api_calls: Vec<ApiCall>,
    templates: &BTreeMap<B256, Template>,
) -> (Vec<LogEntry>, Vec<ApiCall>) {
    let mut entries = Vec::new();
    let api_calls = api_calls
        .into_iter()
        .map(|call| {
            let Some(template_id) = call.template_id else {
                return call;
            };
            if !call.is_pending() {
                return call;
            }

            let Some(template) = templates.get(&template_id) else {
                entries.push(LogEntry::error(format!(
                    "Unable to fetch template ID:{template_id} for Request ID:{}",
                    call.id
                )));
                return call.errored(ErrorCode::TemplateNotFound);
            };

            let template_params = match params::decode(&template.parameters) {
                Ok(params) => params,
                Err(err) => {
                    entries.push(LogEntry::error(format!(
                        "Template ID:{template_id} has invalid parameters: {} ({err})",
                        template.parameters
                    )));
                    return call.errored(ErrorCode::TemplateParameterDecodingFailed);
                }
            };

            // Template parameters fill in underneath the client's.
            let mut parameters = template_params;
            parameters.extend(call.parameters.clone());

            ApiCall {
                endpoint_id: call.endpoint_id.or(Some(template.endpoint_id)),
                parameters,
                ..call
            }
        })
        .collect();

    (entries, api_calls)
}
