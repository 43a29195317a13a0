//! inbox-triage
//!
//! あとで読むサービス（Readwise Reader）の受信箱を、手動またはLLMで
//! トリアージしてローカルに記録し、判定をサービスへ書き戻す。

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod logging;
pub mod reader;
pub mod store;
pub mod triage;

pub use error::{Result, TriageError};
