//! 既読管理サービス（Readwise Reader API）クライアント

mod client;
mod types;

pub use client::{
    updated_after, ReaderClient, BATCH_INTERVAL, DEFAULT_BASE_URL, DEFAULT_DAYS_AGO,
    DEFAULT_LOCATION,
};
pub use types::{BatchUpdateResult, DocumentUpdate, ListResponse, UpdateFailure, UpdateProgress};
