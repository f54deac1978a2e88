// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use llm_policy_gateway::{
    api::{start_server, AppState},
    config::GatewayConfig,
    enforcement::{Enforcer, TracingAuditSink},
    generation::{EchoGenerator, OpenAiCompatibleGenerator, TextGenerator},
    logging,
    policy::{PolicyDocument, PolicyStore},
    rate_limit::{RateLimiter, RedisCounter},
    version,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = GatewayConfig::parse();
    config.validate().map_err(|e| anyhow!(e))?;

    // The policy's logging level applies only when RUST_LOG is unset
    let policy_level = peek_policy_level(&config);
    let otlp = config.otlp();
    let telemetry = logging::init(config.log_format, policy_level.as_deref(), otlp.as_ref())
        .context("initialising tracing")?;

    println!("Starting LLM Policy Gateway...");
    println!("BUILD VERSION: {}", version::VERSION);
    println!("Build Date: {}", version::BUILD_DATE);
    println!();

    let policies = Arc::new(
        PolicyStore::open(&config.policy_path)
            .with_context(|| format!("loading policy {}", config.policy_path.display()))?,
    );
    info!(version = %policies.version(), "Policy active");
    // Held for the life of the server; dropping it stops hot reload
    let _policy_watcher = match config.policy_reload_interval() {
        Some(settle) => match policies.spawn_watcher(settle) {
            Ok(watcher) => {
                info!(settle_secs = settle.as_secs(), "Policy hot reload enabled");
                Some(watcher)
            }
            Err(e) => {
                warn!(error = %e, "Policy hot reload unavailable; use POST /admin/policy/reload");
                None
            }
        },
        None => None,
    };

    let limiter = match &config.redis_url {
        Some(url) => {
            let redis = RedisCounter::new(url, config.backend_timeout())
                .context("configuring shared rate-limit backend")?;
            info!(
                reprobe_secs = config.rate_limit_reprobe_secs,
                "Rate limiting with shared Redis counter"
            );
            RateLimiter::with_shared(Arc::new(redis), config.reprobe_interval())
        }
        None => {
            warn!("REDIS_URL not set; rate limits are enforced per process");
            RateLimiter::local_only()
        }
    };

    let generator: Arc<dyn TextGenerator> = match config.upstream() {
        Some(upstream) => Arc::new(OpenAiCompatibleGenerator::new(upstream)?),
        None => {
            warn!("UPSTREAM_URL not set; prompts are echoed back after filtering");
            Arc::new(EchoGenerator)
        }
    };

    let enforcer = Arc::new(Enforcer::new(
        policies,
        Arc::new(limiter),
        generator,
        Arc::new(TracingAuditSink),
        config.upstream_timeout(),
    ));
    let state = Arc::new(AppState {
        enforcer,
        reject_flagged_output: config.reject_flagged_output,
        ready_requires_redis: config.ready_requires_redis,
        admin_api_key: config.admin_api_key.clone(),
    });
    if state.admin_api_key.is_none() {
        info!("ADMIN_API_KEY not set; POST /admin/policy/reload is disabled");
    }

    start_server(config.listen_addr, state, async {
        let _ = signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await?;

    if let Err(e) = telemetry.shutdown() {
        warn!(error = %e, "Failed to flush spans");
    }
    info!("Gateway stopped");
    Ok(())
}

/// Read `logging.level` before the subscriber exists; load errors surface
/// later through `PolicyStore::open`.
fn peek_policy_level(config: &GatewayConfig) -> Option<String> {
    if !config.policy_path.exists() {
        return None;
    }
    PolicyDocument::load(&config.policy_path)
        .ok()
        .and_then(|document| document.log_level)
}
