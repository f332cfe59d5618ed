//! Extraction prompt, output schema and the retry prompting policy.

use std::time::Duration;

use budgetlaw_core::{Action, Taxonomy};
use serde_json::{Value, json};

/// Only the most recent diagnostics are repeated back to the oracle.
const MAX_DIAGNOSTICS: usize = 5;

/// Base extraction prompt for one segment.
pub fn instructions(taxonomy: &Taxonomy, segment_text: &str) -> String {
    let categories = taxonomy.names().join("、");
    let actions = Action::ALL
        .iter()
        .map(Action::as_str)
        .collect::<Vec<_>>()
        .join("、");

    format!(
        "請將下列預算提案轉換為結構化資料，完成後以 submit_proposals 工具一次提交。

分類（category 只能是以下其中之一，必須完全相同）：
{categories}

欄位：
- category：提案所屬分類
- content：完整保留提案敘述，可讓排版更流暢但不得更改文字，移除開頭編號如 (一)，必填，可用 \\n 換行
- action：{actions} 擇一
  - 要求照列預算選「照列」，刪減選「減列」，凍結選「凍結」，增列選「增列」
  - 同時要求刪減與凍結選「減列與凍結」
  - 流程改善、政策建議等選「其他建議」
- proposer：提案人姓名陣列
- co_signers：連署人姓名陣列，沒有則為空陣列
- cost：原始編列的預算金額，未提及填 null
- frozen：凍結金額，沒有凍結要求填 null
- deleted：減列金額，沒有刪減要求填 null
- added：增列金額，沒有增列要求填 null
- remarks：其他補充資訊，沒有填 null

金額：
- 一律換算為以「元」為單位的整數
- 換算必須呼叫 calculate 工具，不可自行心算，例如 50萬元 → calculate(operation=convert, a=50, unit=萬元)
- 單位大多是「萬元」（後面 4 個 0），不是「千元」（後面 3 個 0）

結構：
- 母提案以括號編號開頭，例如 (一)
- 子提案以數字開頭，例如 1.，屬於母提案的內容
- 夾雜的文字若不像提案可以略過；整段都不是提案時提交空陣列

<提案>
{segment_text}
</提案>
"
    )
}

/// JSON schema for one record: every field required, closed enums for category and action.
pub fn record_schema(taxonomy: &Taxonomy) -> Value {
    let amount = json!({ "type": ["integer", "null"] });
    let names = json!({ "type": "array", "items": { "type": "string" } });
    let nullable_names = json!({ "type": ["array", "null"], "items": { "type": "string" } });

    json!({
        "type": "object",
        "properties": {
            "category": { "type": "string", "enum": taxonomy.names() },
            "content": { "type": "string" },
            "action": {
                "type": "string",
                "enum": Action::ALL.iter().map(Action::as_str).collect::<Vec<_>>()
            },
            "proposer": names,
            "co_signers": nullable_names,
            "cost": amount.clone(),
            "frozen": amount.clone(),
            "deleted": amount.clone(),
            "added": amount,
            "remarks": { "type": ["string", "null"] }
        },
        "required": [
            "category", "content", "action", "proposer", "co_signers",
            "cost", "frozen", "deleted", "added", "remarks"
        ],
        "additionalProperties": false
    })
}

/// Schema for the full oracle output: an array of records.
pub fn output_schema(taxonomy: &Taxonomy) -> Value {
    json!({ "type": "array", "items": record_schema(taxonomy) })
}

/// Bounded retry with diagnostic re-prompting, free of I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Wait before retry `n` is `base_delay * n`; only applied to transport failures.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Prompt for attempt number `attempt` (0 = first), or `None` once retries are spent.
    ///
    /// `errors` are diagnostics gathered so far, oldest first; the latest
    /// [`MAX_DIAGNOSTICS`] are appended so the oracle can correct itself.
    pub fn prompt(&self, base: &str, attempt: usize, errors: &[String]) -> Option<String> {
        if attempt > self.max_retries {
            return None;
        }
        if errors.is_empty() {
            return Some(base.to_string());
        }

        let recent = &errors[errors.len().saturating_sub(MAX_DIAGNOSTICS)..];
        let listed = recent
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n");
        Some(format!(
            "{base}\n先前的輸出有以下問題，請修正後重新提交：\n<錯誤>\n{listed}\n</錯誤>\n"
        ))
    }

    pub fn delay(&self, attempt: usize) -> Duration {
        self.base_delay * attempt as u32
    }
}
