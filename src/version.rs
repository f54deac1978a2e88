// Version information for the LLM policy gateway

/// Full version string with feature description
pub const VERSION: &str = "v0.3.0-policy-hot-reload-2026-10-12";

/// Semantic version number
pub const VERSION_NUMBER: &str = "0.3.0";

/// Major version number
pub const VERSION_MAJOR: u32 = 0;

/// Minor version number
pub const VERSION_MINOR: u32 = 3;

/// Patch version number
pub const VERSION_PATCH: u32 = 0;

/// Build date
pub const BUILD_DATE: &str = "2026-10-12";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "api-key-auth",
    "fixed-window-rate-limiting",
    "redis-shared-counter",
    "local-counter-fallback",
    "backend-reprobe",
    "blocked-term-detection",
    "sanitize-rules",
    "paraphrase-hint",
    "pii-redaction",
    "output-check",
    "policy-hot-reload",
    "audit-log",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("LLM Policy Gateway {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
