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

use std::{path::PathBuf, sync::Arc};

use airnode_coordinator::{
    api::HttpApiClient,
    config::{Config, LogFormat},
    coordinator, logs,
};
use airnode_protocol::derivation::MasterKeyring;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Run the Airnode coordinator once over current chain state")]
struct Args {
    /// Path to the node configuration document.
    #[clap(long, env = "AIRNODE_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// BIP-39 mnemonic of the node's master wallet.
    #[clap(long, env = "AIRNODE_MNEMONIC", hide_env_values = true)]
    mnemonic: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::try_parse()?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.node_settings.log_format {
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(env_filter).init(),
    }

    let keyring = Arc::new(
        MasterKeyring::from_mnemonic(&args.mnemonic)
            .context("Failed to derive master wallet from mnemonic")?,
    );
    tracing::info!("Serving as provider {}", keyring.provider_id());

    let api_client = Arc::new(HttpApiClient::new().context("Failed to build API client")?);

    let (entries, state) =
        coordinator::run(Arc::new(config), keyring, api_client).await.context("Run failed")?;

    logs::flush(&entries);
    tracing::info!(
        "Run complete: {} provider(s), {} aggregated API call(s)",
        state.evm_providers.len(),
        state.aggregated_api_calls_by_id.len()
    );

    Ok(())
}
