// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Imago: Local AI Image Catalog & Organizer
//!
//! Classifies unsorted image collections with a local vision model,
//! groups them into proposed destination folders, and keeps
//! user-edited metadata in a portable JSON catalog that can be synced
//! across machines.

pub mod catalog;
pub mod classify;
pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod plan;
pub mod scan;
pub mod tagdb;

pub use config::AppConfig;
pub use error::{ImagoError, Result};
