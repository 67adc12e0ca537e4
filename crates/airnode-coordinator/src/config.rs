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

//! Node configuration: chains, triggers, and OIS definitions.
//!
//! The configuration document is JSON. A malformed document is a run-fatal
//! error; per-request problems (e.g. a trigger naming a missing OIS) are
//! handled per request at authorization time instead.

use std::{collections::BTreeMap, path::Path};

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

mod defaults {
    pub const fn ignore_blocked_requests_after_blocks() -> u64 {
        20
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    pub node_settings: NodeSettings,
    pub triggers: Triggers,
    pub ois: Vec<Ois>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeSettings {
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub cloud_provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub stage: String,
    pub node_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Evm,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainConfig {
    #[serde(rename = "type")]
    pub kind: ChainKind,
    pub id: u64,
    pub contracts: ChainContracts,
    pub providers: Vec<ChainProviderConfig>,
    /// Admin the provider record should carry; used when creating or
    /// updating the record.
    pub provider_admin: Address,
    #[serde(default)]
    pub authorizers: Vec<Address>,
    #[serde(default = "defaults::ignore_blocked_requests_after_blocks")]
    pub ignore_blocked_requests_after_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainContracts {
    pub airnode: Address,
    pub convenience: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainProviderConfig {
    pub name: String,
    pub url: Url,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Triggers {
    pub requests: Vec<Trigger>,
}

/// A `(endpointId, oisTitle, endpointName)` the node agrees to serve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Trigger {
    pub endpoint_id: B256,
    pub ois_title: String,
    pub endpoint_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Ois {
    pub ois_format: String,
    pub version: String,
    pub title: String,
    pub api_specifications: ApiSpecifications,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiSpecifications {
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Server {
    pub url: Url,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Endpoint {
    pub name: String,
    pub operation: Operation,
    #[serde(default)]
    pub fixed_operation_parameters: Vec<FixedOperationParameter>,
    #[serde(default)]
    pub reserved_parameters: Vec<ReservedParameterConfig>,
    #[serde(default)]
    pub parameters: Vec<EndpointParameter>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Operation {
    pub method: HttpMethod,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FixedOperationParameter {
    pub operation_parameter: OperationParameter,
    pub value: String,
}

/// Node-side pinning of the reserved parameters `_type`, `_path`, `_times`.
/// A `fixed` value always wins over the client's; a `default` only applies
/// when the client sent nothing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReservedParameterConfig {
    pub name: String,
    #[serde(default)]
    pub fixed: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndpointParameter {
    pub name: String,
    pub operation_parameter: OperationParameter,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub target: ParameterTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterTarget {
    Query,
    Header,
    Path,
    Body,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node_settings.chains.is_empty() {
            return Err(ConfigError::Validation("at least one chain must be configured".into()));
        }
        for chain in &self.node_settings.chains {
            if chain.providers.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "chain {} has no providers configured",
                    chain.id
                )));
            }
        }
        let mut ois_titles = BTreeMap::new();
        for ois in &self.ois {
            if ois_titles.insert(ois.title.as_str(), ()).is_some() {
                return Err(ConfigError::Validation(format!(
                    "duplicate OIS title {:?}",
                    ois.title
                )));
            }
        }
        Ok(())
    }

    /// The trigger serving `endpoint_id`, if this node serves it at all.
    pub fn find_trigger(&self, endpoint_id: B256) -> Option<&Trigger> {
        self.triggers.requests.iter().find(|t| t.endpoint_id == endpoint_id)
    }

    pub fn find_ois(&self, title: &str) -> Option<&Ois> {
        self.ois.iter().find(|ois| ois.title == title)
    }

    /// Resolve a trigger down to its OIS and endpoint definitions.
    pub fn resolve_trigger(&self, trigger: &Trigger) -> (Option<&Ois>, Option<&Endpoint>) {
        let ois = self.find_ois(&trigger.ois_title);
        let endpoint =
            ois.and_then(|o| o.endpoints.iter().find(|e| e.name == trigger.endpoint_name));
        (ois, endpoint)
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use alloy_primitives::{address, b256};

    pub const ENDPOINT_ID: B256 =
        b256!("13dea3311fe0d6b84f4daeab831befbc49e19e6494c41e9e065a09c3c68f43b6");

    pub fn config() -> Config {
        Config {
            node_settings: NodeSettings {
                chains: vec![ChainConfig {
                    kind: ChainKind::Evm,
                    id: 31337,
                    contracts: ChainContracts {
                        airnode: address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
                        convenience: address!("9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"),
                    },
                    providers: vec![ChainProviderConfig {
                        name: "evm-local".to_string(),
                        url: "http://127.0.0.1:8545".parse().unwrap(),
                    }],
                    provider_admin: address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
                    authorizers: vec![Address::ZERO],
                    ignore_blocked_requests_after_blocks:
                        defaults::ignore_blocked_requests_after_blocks(),
                }],
                log_format: LogFormat::Plain,
                cloud_provider: None,
                region: None,
                stage: "test".to_string(),
                node_version: "1.0.0".to_string(),
            },
            triggers: Triggers {
                requests: vec![Trigger {
                    endpoint_id: ENDPOINT_ID,
                    ois_title: "currency-converter".to_string(),
                    endpoint_name: "convertToUSD".to_string(),
                }],
            },
            ois: vec![Ois {
                ois_format: "1.0.0".to_string(),
                version: "1.2.3".to_string(),
                title: "currency-converter".to_string(),
                api_specifications: ApiSpecifications {
                    servers: vec![Server { url: "https://api.example.test/v1".parse().unwrap() }],
                },
                endpoints: vec![Endpoint {
                    name: "convertToUSD".to_string(),
                    operation: Operation { method: HttpMethod::Get, path: "/convert".to_string() },
                    fixed_operation_parameters: vec![FixedOperationParameter {
                        operation_parameter: OperationParameter {
                            name: "to".to_string(),
                            target: ParameterTarget::Query,
                        },
                        value: "USD".to_string(),
                    }],
                    reserved_parameters: vec![
                        ReservedParameterConfig {
                            name: "_type".to_string(),
                            fixed: Some("int256".to_string()),
                            default: None,
                        },
                        ReservedParameterConfig {
                            name: "_times".to_string(),
                            fixed: None,
                            default: Some("100000".to_string()),
                        },
                    ],
                    parameters: vec![EndpointParameter {
                        name: "from".to_string(),
                        operation_parameter: OperationParameter {
                            name: "from".to_string(),
                            target: ParameterTarget::Query,
                        },
                        required: true,
                    }],
                }],
            }],
        }
    }
}
