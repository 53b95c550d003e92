//! currency_convert 工具：基于静态汇率表的币种换算
//!
//! Args: {"amount": 12.5, "from": "JPY", "to": "EUR"}；汇率表以 EUR 为基准（1 单位外币 = rate EUR）。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::round_cents;
use crate::tools::Tool;

pub const CURRENCY_TOOL: &str = "currency_convert";

pub struct CurrencyTool {
    rates: HashMap<String, f64>,
}

impl CurrencyTool {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .filter(|(_, r)| r.is_finite() && *r > 0.0)
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        Self { rates }
    }

    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, String> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return Ok(amount);
        }
        let from_rate = self
            .rates
            .get(&from)
            .ok_or_else(|| format!("Unknown currency: {}", from))?;
        let to_rate = self
            .rates
            .get(&to)
            .ok_or_else(|| format!("Unknown currency: {}", to))?;
        Ok(round_cents(amount * from_rate / to_rate))
    }
}

#[async_trait]
impl Tool for CurrencyTool {
    fn name(&self) -> &str {
        CURRENCY_TOOL
    }

    fn description(&self) -> &str {
        "Convert an amount between currencies. Args: {\"amount\": 10.0, \"from\": \"USD\", \"to\": \"EUR\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "amount": {"type": "number"},
                "from": {"type": "string"},
                "to": {"type": "string"}
            },
            "required": ["amount", "from", "to"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let amount = args
            .get("amount")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| "Missing 'amount'".to_string())?;
        let from = args.get("from").and_then(|v| v.as_str()).ok_or("Missing 'from'")?;
        let to = args.get("to").and_then(|v| v.as_str()).ok_or("Missing 'to'")?;
        let converted = self.convert(amount, from, to)?;
        Ok(serde_json::json!({ "amount": converted, "currency": to.to_uppercase() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> CurrencyTool {
        CurrencyTool::new(HashMap::from([
            ("eur".to_string(), 1.0),
            ("USD".to_string(), 0.5),
            ("BAD".to_string(), 0.0),
        ]))
    }

    #[test]
    fn test_convert_uses_eur_base() {
        let t = tool();
        assert_eq!(t.convert(10.0, "USD", "EUR").unwrap(), 5.0);
        assert_eq!(t.convert(10.0, "eur", "usd").unwrap(), 20.0);
        assert_eq!(t.convert(3.0, "XYZ", "XYZ").unwrap(), 3.0);
        assert!(t.convert(1.0, "BAD", "EUR").is_err());
    }

    #[tokio::test]
    async fn test_execute_reports_target_currency() {
        let out = tool()
            .execute(serde_json::json!({"amount": 4, "from": "USD", "to": "eur"}))
            .await
            .unwrap();
        assert_eq!(out["amount"], 2.0);
        assert_eq!(out["currency"], "EUR");
    }
}
