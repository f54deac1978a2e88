// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod handlers;
pub mod http_server;

pub use errors::{ApiError, ErrorResponse};
pub use handlers::{
    AnalyzeRequest, AnalyzeResponse, HealthResponse, PolicyInfo, ReadyResponse, ReloadResponse,
};
pub use http_server::{
    create_app, start_server, ApiErrorResponse, AppState, ADMIN_KEY_HEADER, API_KEY_HEADER,
};
