//! 工具层：统一调用契约、注册表、带超时与重试的执行器，以及内置工具
//!
//! 内置工具：retrieval_query（检索协作方）、web_search、currency_convert、maps_route。

pub mod currency;
pub mod executor;
pub mod maps;
pub mod policy;
pub mod registry;
pub mod retrieval;
pub mod search;

pub use currency::{CurrencyTool, CURRENCY_TOOL};
pub use executor::ToolExecutor;
pub use maps::{estimate_leg, haversine_km, Leg, MapsTool, RouteProfile, TravelMode, MAPS_TOOL};
pub use policy::{Backoff, ToolPolicy};
pub use registry::{Tool, ToolRegistry};
pub use retrieval::{RetrievalTool, RETRIEVAL_TOOL};
pub use search::{SearchTool, SEARCH_TOOL};
