//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / policy / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时与重试并统一转 ToolError。注册表本身不持有任何运行级可变状态，可被多个运行并发使用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::ToolPolicy;

/// 工具 trait：名称、描述、参数 schema、可选的自带策略、异步执行（args / 结果均为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（调用时的查找键）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 工具自带的超时 / 重试策略；None 表示使用全局默认
    fn policy(&self) -> Option<ToolPolicy> {
        None
    }

    /// 执行工具；Err 为上游失败的描述
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "tool re-registered, previous entry replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 已注册工具名（排序后返回，便于日志与测试）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 工具目录 JSON：name / description / parameters
    pub fn to_schema_json(&self) -> String {
        let mut tools: Vec<(&String, &Arc<dyn Tool>)> = self.tools.iter().collect();
        tools.sort_by(|a, b| a.0.cmp(b.0));
        let tools: Vec<Value> = tools
            .into_iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
