//! 请求 / 响应的 JSON Schema（schemars 自动生成），供前端或网关校验使用

use schemars::schema_for;

use crate::core::PlanRequest;
use crate::output::ItineraryResponse;

pub fn request_schema_json() -> String {
    let schema = schema_for!(PlanRequest);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

pub fn response_schema_json() -> String {
    let schema = schema_for!(ItineraryResponse);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_name_key_fields() {
        let req = request_schema_json();
        assert!(req.contains("\"city\""));
        assert!(req.contains("\"preferences\""));
        let resp = response_schema_json();
        assert!(resp.contains("\"daily_plans\""));
        assert!(resp.contains("\"within_budget\""));
    }
}
