// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Context;
use clap::Parser;
use crown_ledger::api::{AppState, Backends, router};
use crown_ledger::memory::{
    MemoryAccountStore, MemoryBlobStore, MemoryReceiptStore, MemoryRewardStore,
};
use crown_ledger::{
    DocumentExtractor, HttpExtractor, LoyaltyConfig, SystemClock, UnavailableExtractor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Crown Ledger - loyalty points for receipt photos
///
/// Serves the balance, receipt upload and reward endpoints. Program policy
/// (point ratio, daily cap, recency window...) is read from the environment;
/// see `LoyaltyConfig`.
#[derive(Parser, Debug)]
#[command(name = "crown-ledger")]
#[command(about = "Loyalty ledger and receipt validation service", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Receipt extraction endpoint; without one every upload degrades to
    /// "no fields extracted"
    #[arg(long, env = "EXTRACTOR_URL")]
    extractor_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs);

    let config = LoyaltyConfig::from_env();
    let extractor: Arc<dyn DocumentExtractor> = match &args.extractor_url {
        Some(url) => {
            info!(%url, "using HTTP document extractor");
            Arc::new(HttpExtractor::new(url.clone()))
        }
        None => {
            warn!("no EXTRACTOR_URL configured, receipts will be judged without extracted fields");
            Arc::new(UnavailableExtractor)
        }
    };

    let state = AppState::new(
        config,
        Backends {
            accounts: Arc::new(MemoryAccountStore::new()),
            receipts: Arc::new(MemoryReceiptStore::new()),
            rewards: Arc::new(MemoryRewardStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            extractor,
            clock: Arc::new(SystemClock),
        },
    );

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "crown ledger listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("shut down cleanly");
    Ok(())
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
