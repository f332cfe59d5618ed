//! The `calculate` tool the oracle must use for amount arithmetic.
//!
//! Generators are unreliable at mental arithmetic on large round numbers
//! (`50萬元` becoming 50000 or 5000000), so every unit conversion is done here.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::oracle::ToolSpec;

pub const TOOL_NAME: &str = "calculate";

/// Results this close to an integer are reported as that integer.
const INTEGER_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Convert,
    Multiply,
    Add,
    Subtract,
}

/// Currency units appearing in budget documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Unit {
    #[serde(rename = "元")]
    Yuan,
    #[serde(rename = "千元")]
    Thousand,
    #[serde(rename = "萬元")]
    TenThousand,
    #[serde(rename = "百萬元")]
    Million,
    #[serde(rename = "億元")]
    HundredMillion,
}

impl Unit {
    pub fn factor(&self) -> f64 {
        match self {
            Self::Yuan => 1.0,
            Self::Thousand => 1_000.0,
            Self::TenThousand => 10_000.0,
            Self::Million => 1_000_000.0,
            Self::HundredMillion => 100_000_000.0,
        }
    }
}

/// Arguments of one `calculate` call.
#[derive(Debug, Clone, Deserialize)]
pub struct Calculation {
    pub operation: Operation,
    pub a: f64,
    #[serde(default)]
    pub b: Option<f64>,
    #[serde(default)]
    pub unit: Option<Unit>,
}

impl Calculation {
    pub fn evaluate(&self) -> Result<f64, String> {
        let value = match self.operation {
            Operation::Convert => {
                let unit = self.unit.ok_or("convert requires `unit`")?;
                self.a * unit.factor()
            }
            Operation::Multiply => self.a * self.operand()?,
            Operation::Add => self.a + self.operand()?,
            Operation::Subtract => self.a - self.operand()?,
        };
        if !value.is_finite() {
            return Err(format!("result {value} is not finite"));
        }
        Ok(snap_to_integer(value))
    }

    fn operand(&self) -> Result<f64, String> {
        self.b
            .ok_or_else(|| format!("{:?} requires `b`", self.operation).to_lowercase())
    }
}

fn snap_to_integer(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < INTEGER_TOLERANCE {
        rounded
    } else {
        value
    }
}

/// Execute a call from its raw JSON arguments and render the tool reply.
pub fn run(arguments: &str) -> String {
    let result = serde_json::from_str::<Calculation>(arguments)
        .map_err(|e| format!("invalid arguments: {e}"))
        .and_then(|calc| calc.evaluate());

    let reply = match result {
        Ok(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => json!({ "result": v as i64 }),
        Ok(v) => json!({ "result": v }),
        Err(e) => json!({ "error": e }),
    };
    reply.to_string()
}

/// A number, Arabic or Chinese, directly followed by 萬, 億 or 千元.
static SCALED_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[0-9０-９][0-9０-９.,，．]*|[一二兩三四五六七八九][一二兩三四五六七八九十百千]*)\s*(?:萬|億|千元)")
        .expect("valid regex")
});

/// Whether `text` states an amount in a scaled unit that needs conversion.
pub fn mentions_scaled_unit(text: &str) -> bool {
    SCALED_AMOUNT.is_match(text)
}

/// Tool definition with a strict argument schema.
pub fn tool_spec() -> ToolSpec {
    ToolSpec {
        name: TOOL_NAME.to_string(),
        description: "精確計算金額。convert：a 乘以 unit 的倍數換算為元；\
                      multiply / add / subtract：a 與 b 運算。所有金額換算都必須使用此工具。"
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["convert", "multiply", "add", "subtract"]
                },
                "a": { "type": "number" },
                "b": { "type": ["number", "null"] },
                "unit": {
                    "type": ["string", "null"],
                    "enum": ["元", "千元", "萬元", "百萬元", "億元", null]
                }
            },
            "required": ["operation", "a", "b", "unit"],
            "additionalProperties": false
        }),
    }
}
