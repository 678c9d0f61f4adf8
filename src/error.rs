// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Imago

use thiserror::Error;

/// Result type alias for Imago operations
pub type Result<T> = std::result::Result<T, ImagoError>;

/// Imago error types
#[derive(Error, Debug)]
pub enum ImagoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Vision engine not available: {0}")]
    EngineUnavailable(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
