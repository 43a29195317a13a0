//! プロンプト生成モジュール
//!
//! - SYSTEM_PROMPT: システムメッセージ
//! - PromptVariant: フル（補足情報あり）/ リーン（判定のみ）
//! - render_prompt: テンプレートのプレースホルダーにアイテムJSONを埋め込む

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// アイテムJSONを埋め込むプレースホルダー
pub const ITEMS_PLACEHOLDER: &str = "{{ITEMS_JSON}}";

/// システムメッセージ
pub const SYSTEM_PROMPT: &str =
    "You are a careful reading assistant. You triage a person's read-it-later inbox and answer only with JSON.";

const FULL_TEMPLATE: &str = r#"Triage the following saved reading items.

For every item decide one action:
- read_now: worth reading today; timely or directly useful
- later: worth reading, not urgent
- archive: low value now, keep for reference
- delete: not worth keeping
- needs_review: cannot judge from the metadata

Assign a priority (high, medium, low) and give a 1-3 sentence reason.
Also add topics, suggested_tags (lowercase, hyphenated), a short credibility note
and reading_guidance (what to focus on or skip).

## Output format (a JSON array only, one object per item, same order as input)
[
  {
    "id": "item id",
    "title": "item title",
    "triage_decision": {
      "action": "read_now | later | archive | delete | needs_review",
      "priority": "high | medium | low",
      "reason": "why"
    },
    "topics": ["topic"],
    "suggested_tags": ["tag"],
    "credibility": "note",
    "reading_guidance": "guidance"
  }
]

## Items
{{ITEMS_JSON}}
"#;

const LEAN_TEMPLATE: &str = r#"Triage the following saved reading items.
Actions: read_now, later, archive, delete, needs_review. Priorities: high, medium, low.

Answer with a JSON array only:
[{"id": "...", "title": "...", "triage_decision": {"action": "...", "priority": "...", "reason": "one sentence"}}]

## Items
{{ITEMS_JSON}}
"#;

/// プロンプトの種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariant {
    /// 補足情報（topics, suggested_tags等）まで出力させる
    #[default]
    Full,
    /// 判定のみ（トークン節約）
    Lean,
}

impl PromptVariant {
    pub fn template(&self) -> &'static str {
        match self {
            PromptVariant::Full => FULL_TEMPLATE,
            PromptVariant::Lean => LEAN_TEMPLATE,
        }
    }
}

impl FromStr for PromptVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(PromptVariant::Full),
            "lean" => Ok(PromptVariant::Lean),
            _ => Err(format!("Unknown prompt variant: {}. Use full or lean", s)),
        }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptVariant::Full => write!(f, "full"),
            PromptVariant::Lean => write!(f, "lean"),
        }
    }
}

/// テンプレートにアイテムJSONを埋め込む
///
/// # Arguments
/// * `variant` - プロンプトの種類
/// * `items_json` - `export::items_json` で生成したJSON配列
pub fn render_prompt(variant: PromptVariant, items_json: &str) -> String {
    variant.template().replace(ITEMS_PLACEHOLDER, items_json)
}
