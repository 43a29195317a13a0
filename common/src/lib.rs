//! Inbox Triage Common Library
//!
//! 副作用のない共有部分: 型、取り込み時の正規化、LLMレスポンスパーサー、プロンプト

pub mod error;
pub mod export;
pub mod normalize;
pub mod parser;
pub mod prompts;
pub mod types;

pub use error::{Error, Result};
pub use export::{items_json, ExportItem};
pub use parser::{
    find_json_array, parse_triage_response, parse_triage_response_lenient, LenientParse,
};
pub use prompts::{render_prompt, PromptVariant, SYSTEM_PROMPT};
pub use types::{
    Action, Category, Item, Priority, TriageDecision, TriageResult, TriageSource,
};
