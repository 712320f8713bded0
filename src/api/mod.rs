//! API client module for the training history service.

mod client;

pub use client::{ApiClient, ApiError, HistoryService, DEFAULT_API_BASE};
