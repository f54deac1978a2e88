// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process configuration, from flags or environment variables

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::generation::OpenAiConfig;
use crate::logging::OtlpConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Gateway settings. Every flag can also be supplied through the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "llm-policy-gateway")]
#[command(version)]
#[command(about = "Rate limiting and content-safety enforcement in front of an LLM backend", long_about = None)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Policy document (YAML, or TOML by extension)
    #[arg(long, env = "POLICY_CONFIG_PATH", default_value = "config/policy.yaml")]
    pub policy_path: PathBuf,

    /// Quiet period after a policy file change before it is reloaded; 0
    /// disables hot reload
    #[arg(long, env = "POLICY_RELOAD_INTERVAL_SECS", default_value_t = 1)]
    pub policy_reload_interval_secs: u64,

    /// Shared rate-limit backend, e.g. redis://localhost:6379
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Timeout for each shared backend call
    #[arg(long, env = "RATE_LIMIT_BACKEND_TIMEOUT_MS", default_value_t = 250)]
    pub rate_limit_backend_timeout_ms: u64,

    /// Seconds before a failed shared backend is tried again; 0 never retries
    #[arg(long, env = "RATE_LIMIT_REPROBE_SECS", default_value_t = 30)]
    pub rate_limit_reprobe_secs: u64,

    /// OpenAI-compatible upstream; the prompt is echoed back when unset
    #[arg(long, env = "UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    #[arg(long, env = "UPSTREAM_MODEL", default_value = "gpt-3.5-turbo")]
    pub upstream_model: String,

    #[arg(long, env = "UPSTREAM_API_KEY", hide_env_values = true)]
    pub upstream_api_key: Option<String>,

    #[arg(long, env = "UPSTREAM_TIMEOUT_MS", default_value_t = 30_000)]
    pub upstream_timeout_ms: u64,

    /// Fail /readyz while the shared backend is unreachable
    #[arg(long, env = "READY_REQUIRES_REDIS", default_value_t = false, action = clap::ArgAction::Set)]
    pub ready_requires_redis: bool,

    /// Answer flagged output with 422 instead of 200
    #[arg(long, env = "REJECT_FLAGGED_OUTPUT", default_value_t = true, action = clap::ArgAction::Set)]
    pub reject_flagged_output: bool,

    /// Key for `POST /admin/policy/reload`; the route is disabled when unset
    #[arg(long, env = "ADMIN_API_KEY", hide_env_values = true)]
    pub admin_api_key: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP/HTTP traces URL; spans are not exported when unset
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "llm-policy-gateway")]
    pub otel_service_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            policy_path: PathBuf::from("config/policy.yaml"),
            policy_reload_interval_secs: 1,
            redis_url: None,
            rate_limit_backend_timeout_ms: 250,
            rate_limit_reprobe_secs: 30,
            upstream_url: None,
            upstream_model: "gpt-3.5-turbo".to_string(),
            upstream_api_key: None,
            upstream_timeout_ms: 30_000,
            ready_requires_redis: false,
            reject_flagged_output: true,
            admin_api_key: None,
            log_format: LogFormat::Text,
            otlp_endpoint: None,
            otel_service_name: "llm-policy-gateway".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rate_limit_backend_timeout_ms == 0 {
            return Err("Rate limit backend timeout must be greater than 0".to_string());
        }
        if self.upstream_timeout_ms == 0 {
            return Err("Upstream timeout must be greater than 0".to_string());
        }
        if let Some(url) = &self.redis_url {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                return Err(format!("REDIS_URL must use redis:// or rediss://, got '{}'", url));
            }
        }
        if let Some(url) = &self.upstream_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("UPSTREAM_URL must be an http(s) URL, got '{}'", url));
            }
        }
        if self.upstream_model.trim().is_empty() {
            return Err("Upstream model must not be empty".to_string());
        }
        if let Some(url) = &self.otlp_endpoint {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("OTLP_ENDPOINT must be an http(s) URL, got '{}'", url));
            }
        }
        if self.admin_api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err("ADMIN_API_KEY must not be blank".to_string());
        }
        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backend_timeout_ms)
    }

    /// `None` keeps a failed backend bypassed for the life of the process
    pub fn reprobe_interval(&self) -> Option<Duration> {
        (self.rate_limit_reprobe_secs > 0).then(|| Duration::from_secs(self.rate_limit_reprobe_secs))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn policy_reload_interval(&self) -> Option<Duration> {
        (self.policy_reload_interval_secs > 0)
            .then(|| Duration::from_secs(self.policy_reload_interval_secs))
    }

    /// Upstream client settings when an upstream is configured
    pub fn upstream(&self) -> Option<OpenAiConfig> {
        self.upstream_url.as_ref().map(|endpoint| OpenAiConfig {
            endpoint: endpoint.clone(),
            model: self.upstream_model.clone(),
            api_key: self.upstream_api_key.clone(),
            timeout: self.upstream_timeout(),
            ..OpenAiConfig::default()
        })
    }

    /// Span export settings when an OTLP endpoint is configured
    pub fn otlp(&self) -> Option<OtlpConfig> {
        self.otlp_endpoint.as_ref().map(|endpoint| OtlpConfig {
            endpoint: endpoint.clone(),
            service_name: self.otel_service_name.clone(),
        })
    }
}
