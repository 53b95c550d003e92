//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WAYFARER__*` 覆盖（双下划线表示嵌套，如 `WAYFARER__ORCHESTRATOR__MAX_STEPS=30`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::StageName;
use crate::tools::{Backoff, ToolPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
    pub research: ResearchSection,
    pub logistics: LogisticsSection,
    pub decision: DecisionSection,
    pub llm: LlmSection,
    pub persistence: PersistenceSection,
}

/// [app] 段：应用名、行程天数上限、默认币种
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 单次请求允许的最大天数（前端约束 1..=30）
    pub max_trip_days: u32,
    /// 请求未指定币种时使用
    pub default_currency: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_trip_days: 30,
            default_currency: "EUR".to_string(),
        }
    }
}

/// [orchestrator] 段：全局步数上限、阶段重试预算、整体截止时间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 单次运行最多调用多少次阶段（与各阶段重试预算无关）
    pub max_steps: u32,
    /// 没有单独覆盖的阶段使用的重试预算
    pub default_retry_budget: u32,
    /// 按阶段覆盖重试预算（键为 researcher / logistics / ...）
    pub stage_retry_budgets: HashMap<String, u32>,
    /// 运行截止时间（秒）；未设置表示不限
    pub run_deadline_secs: Option<u64>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_steps: 20,
            default_retry_budget: 3,
            stage_retry_budgets: HashMap::from([("researcher".to_string(), 2)]),
            run_deadline_secs: None,
        }
    }
}

impl OrchestratorSection {
    /// 指定阶段的重试预算：优先取覆盖值，否则取默认值
    pub fn retry_budget(&self, stage: StageName) -> u32 {
        self.stage_retry_budgets
            .get(stage.as_str())
            .copied()
            .unwrap_or(self.default_retry_budget)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

/// [tools] 段：默认超时与重试策略、按工具覆盖、搜索与汇率配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（毫秒）
    pub tool_timeout_ms: u64,
    pub max_retries: u32,
    /// fixed / exponential
    pub backoff: String,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// 按工具名覆盖策略
    pub per_tool: HashMap<String, ToolPolicyOverride>,
    pub search: SearchSection,
    pub currency: CurrencySection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 10_000,
            max_retries: 2,
            backoff: "exponential".to_string(),
            backoff_base_ms: 200,
            backoff_max_ms: 2_000,
            per_tool: HashMap::new(),
            search: SearchSection::default(),
            currency: CurrencySection::default(),
        }
    }
}

impl ToolsSection {
    fn backoff_from(kind: &str, base_ms: u64, max_ms: u64) -> Backoff {
        match kind.to_lowercase().as_str() {
            "fixed" => Backoff::Fixed { delay_ms: base_ms },
            _ => Backoff::Exponential { base_ms, max_ms },
        }
    }

    /// 全局默认工具策略
    pub fn default_policy(&self) -> ToolPolicy {
        ToolPolicy {
            timeout: Duration::from_millis(self.tool_timeout_ms),
            max_retries: self.max_retries,
            backoff: Self::backoff_from(&self.backoff, self.backoff_base_ms, self.backoff_max_ms),
        }
    }

    /// 将 per_tool 覆盖叠加到给定基础策略上
    pub fn override_for(&self, tool: &str, base: ToolPolicy) -> ToolPolicy {
        let Some(o) = self.per_tool.get(tool) else {
            return base;
        };
        let mut policy = base;
        if let Some(ms) = o.timeout_ms {
            policy.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = o.max_retries {
            policy.max_retries = n;
        }
        if let Some(kind) = &o.backoff {
            policy.backoff = Self::backoff_from(
                kind,
                o.backoff_base_ms.unwrap_or(self.backoff_base_ms),
                o.backoff_max_ms.unwrap_or(self.backoff_max_ms),
            );
        }
        policy
    }
}

/// [tools.per_tool.<name>]：单个工具的策略覆盖，未填字段沿用默认
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolPolicyOverride {
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub backoff: Option<String>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
}

/// [tools.search] 段：外部搜索端点（返回 JSON 结果列表）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub enabled: bool,
    pub endpoint: Option<String>,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
    pub max_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key_env: "WAYFARER_SEARCH_API_KEY".to_string(),
            max_results: 5,
        }
    }
}

/// [tools.currency] 段：静态汇率表（1 单位外币 = rate EUR）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurrencySection {
    pub rates: HashMap<String, f64>,
}

impl Default for CurrencySection {
    fn default() -> Self {
        Self {
            rates: HashMap::from([
                ("EUR".to_string(), 1.0),
                ("USD".to_string(), 0.92),
                ("GBP".to_string(), 1.17),
                ("JPY".to_string(), 0.0062),
                ("CNY".to_string(), 0.13),
            ]),
        }
    }
}

/// [research] 段：检索条数、是否追加网页搜索
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    pub top_k: usize,
    pub web_search: bool,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            top_k: 8,
            web_search: false,
        }
    }
}

/// [logistics] 段：每日时间窗、移动速度、交通费用与兜底活动
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogisticsSection {
    /// 每日开始时间，HH:MM
    pub day_start: String,
    /// 每日可用分钟数
    pub day_minutes: u32,
    /// 检索结果未给出时长时的默认活动时长
    pub default_activity_minutes: u32,
    pub walking_speed_kmh: f64,
    pub transit_speed_kmh: f64,
    /// 超过该距离改乘公共交通
    pub walking_threshold_km: f64,
    /// 单程公共交通票价（请求币种）
    pub transit_fare: f64,
    /// 缺少坐标时的默认换乘分钟数
    pub default_transfer_minutes: u32,
    /// 检索结果不足时按偏好补充通用活动
    pub generic_activities: bool,
}

impl Default for LogisticsSection {
    fn default() -> Self {
        Self {
            day_start: "09:00".to_string(),
            day_minutes: 600,
            default_activity_minutes: 90,
            walking_speed_kmh: 4.5,
            transit_speed_kmh: 20.0,
            walking_threshold_km: 2.0,
            transit_fare: 2.5,
            default_transfer_minutes: 20,
            generic_activities: true,
        }
    }
}

/// [decision] 段：预算容差（比例）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionSection {
    pub budget_tolerance: f64,
}

impl Default for DecisionSection {
    fn default() -> Self {
        Self {
            budget_tolerance: 0.10,
        }
    }
}

/// [llm] 段：文案生成后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// mock / openai；openai 需要 OPENAI_API_KEY
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次生成超时（毫秒）
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeout_ms: 20_000,
            temperature: 0.7,
            max_tokens: 400,
        }
    }
}

/// [persistence] 段：运行记录存储后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    /// memory / sqlite
    pub backend: String,
    pub sqlite_path: PathBuf,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            sqlite_path: PathBuf::from("data/runs.db"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 WAYFARER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WAYFARER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WAYFARER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_budgets() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_steps, 20);
        assert_eq!(cfg.orchestrator.retry_budget(StageName::Researcher), 2);
        assert_eq!(cfg.orchestrator.retry_budget(StageName::Logistics), 3);
        assert_eq!(cfg.app.max_trip_days, 30);
        assert!(cfg.orchestrator.run_deadline().is_none());
    }

    #[test]
    fn test_per_tool_override_applies_on_top_of_base() {
        let mut tools = ToolsSection::default();
        tools.per_tool.insert(
            "web_search".to_string(),
            ToolPolicyOverride {
                timeout_ms: Some(50),
                max_retries: Some(0),
                backoff: Some("fixed".to_string()),
                ..Default::default()
            },
        );
        let base = tools.default_policy();
        let policy = tools.override_for("web_search", base.clone());
        assert_eq!(policy.timeout, Duration::from_millis(50));
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.backoff, Backoff::Fixed { delay_ms: 200 });

        let untouched = tools.override_for("maps_route", base.clone());
        assert_eq!(untouched, base);
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let c = config::Config::builder()
            .add_source(config::File::from_str(
                "[orchestrator]\nmax_steps = 7\n[logistics]\nday_start = \"08:30\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: AppConfig = c.try_deserialize().unwrap();
        assert_eq!(cfg.orchestrator.max_steps, 7);
        assert_eq!(cfg.orchestrator.default_retry_budget, 3);
        assert_eq!(cfg.logistics.day_start, "08:30");
        assert_eq!(cfg.logistics.day_minutes, 600);
        assert_eq!(cfg.tools.tool_timeout_ms, 10_000);
    }
}
