//! 规划请求：城市、国家、天数、预算与偏好
//!
//! 请求在整个运行期间只读；未设置预算表示「不限」，而不是 0。

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::RequestError;

/// 未登录请求使用的检索作用域
pub const ANONYMOUS_SCOPE: &str = "anonymous";

/// 偏好值：布尔开关、数值或文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PreferenceValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl PreferenceValue {
    /// 偏好是否处于「开启」状态
    pub fn is_enabled(&self) -> bool {
        match self {
            PreferenceValue::Flag(b) => *b,
            PreferenceValue::Number(n) => *n > 0.0,
            PreferenceValue::Text(s) => {
                let s = s.trim();
                !s.is_empty() && !s.eq_ignore_ascii_case("false") && s != "0"
            }
        }
    }
}

impl From<bool> for PreferenceValue {
    fn from(value: bool) -> Self {
        PreferenceValue::Flag(value)
    }
}

impl From<f64> for PreferenceValue {
    fn from(value: f64) -> Self {
        PreferenceValue::Number(value)
    }
}

impl From<&str> for PreferenceValue {
    fn from(value: &str) -> Self {
        PreferenceValue::Text(value.to_string())
    }
}

impl From<String> for PreferenceValue {
    fn from(value: String) -> Self {
        PreferenceValue::Text(value)
    }
}

fn default_days() -> u32 {
    3
}

/// 不可变的规划请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanRequest {
    pub city: String,
    pub country: String,
    /// 行程天数（≥1）
    #[serde(default = "default_days")]
    pub days: u32,
    /// 总预算；None 表示不限
    #[serde(default)]
    pub budget: Option<f64>,
    /// 偏好（如 culture / food / beach / free_days）
    #[serde(default)]
    pub preferences: BTreeMap<String, PreferenceValue>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// 报价币种，未设置时使用配置中的默认币种
    #[serde(default)]
    pub currency: Option<String>,
}

impl PlanRequest {
    pub fn new(city: impl Into<String>, country: impl Into<String>, days: u32) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
            days,
            budget: None,
            preferences: BTreeMap::new(),
            user_id: None,
            currency: None,
        }
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_preference(mut self, key: impl Into<String>, value: impl Into<PreferenceValue>) -> Self {
        self.preferences.insert(key.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// 校验必填字段、天数范围与预算
    pub fn validate(&self, max_days: u32) -> Result<(), RequestError> {
        if self.city.trim().is_empty() {
            return Err(RequestError::MissingField("city"));
        }
        if self.country.trim().is_empty() {
            return Err(RequestError::MissingField("country"));
        }
        if self.days < 1 || self.days > max_days {
            return Err(RequestError::InvalidDays {
                days: self.days,
                max: max_days,
            });
        }
        if let Some(b) = self.budget {
            if !b.is_finite() || b < 0.0 {
                return Err(RequestError::InvalidBudget(b));
            }
        }
        Ok(())
    }

    /// 已开启的偏好名（按字典序）
    pub fn enabled_preferences(&self) -> Vec<&str> {
        self.preferences
            .iter()
            .filter(|(_, v)| v.is_enabled())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn prefers(&self, key: &str) -> bool {
        self.preferences.get(key).is_some_and(PreferenceValue::is_enabled)
    }

    /// 用户是否明确允许空闲日（无安排的日子）
    pub fn allows_free_days(&self) -> bool {
        self.prefers("free_days")
    }

    /// 检索作用域：用户 ID，未设置时为匿名
    pub fn user_scope(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS_SCOPE)
    }

    pub fn currency_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.currency.as_deref().unwrap_or(fallback)
    }
}
