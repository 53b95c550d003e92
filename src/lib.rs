//! Wayfarer - 多阶段旅行行程编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 请求与规划状态、路由信号、错误与恢复、运行登记、Supervisor 状态机
//! - **stages**: Researcher / Logistics / Compliance / Experience / Decision 五个专家阶段
//! - **tools**: 工具注册表、带超时与重试的执行器，以及检索 / 搜索 / 汇率 / 路线工具
//! - **retrieval**: 检索协作方（按用户作用域过滤）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **output**: 对账、对外响应、JSON Schema、流式讲解
//! - **store**: 运行记录持久化（内存 / SQLite）
//! - **planner**: 服务门面 TravelPlanner

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod output;
pub mod planner;
pub mod retrieval;
pub mod stages;
pub mod store;
pub mod tools;

pub use crate::core::{PlanRequest, PlannerBuilder, PlannerError};
pub use planner::{RunStatusReport, TravelPlanner};
