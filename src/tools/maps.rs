//! maps_route 工具与路程估算
//!
//! 两点都有坐标时按大圆距离估算；短距离步行，超过阈值改乘公共交通（含候车时间）。
//! 缺少坐标时给出默认换乘时长。Logistics 的贪心排程直接用 estimate_leg，
//! 已选定的路段再经 maps_route 工具确认。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LogisticsSection;
use crate::core::GeoPoint;
use crate::tools::Tool;

pub const MAPS_TOOL: &str = "maps_route";

const EARTH_RADIUS_KM: f64 = 6371.0;
/// 乘公共交通的固定候车分钟数
const TRANSIT_WAIT_MINUTES: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    /// 当天第一站，无需移动
    None,
    Walk,
    Transit,
    /// 缺少坐标，使用默认换乘时长
    Unknown,
}

/// 一段路程
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub distance_km: f64,
    pub minutes: u32,
    pub mode: TravelMode,
}

/// 路程估算参数
#[derive(Debug, Clone, PartialEq)]
pub struct RouteProfile {
    pub walking_speed_kmh: f64,
    pub transit_speed_kmh: f64,
    pub walking_threshold_km: f64,
    pub default_transfer_minutes: u32,
}

impl From<&LogisticsSection> for RouteProfile {
    fn from(cfg: &LogisticsSection) -> Self {
        Self {
            walking_speed_kmh: cfg.walking_speed_kmh.max(0.1),
            transit_speed_kmh: cfg.transit_speed_kmh.max(0.1),
            walking_threshold_km: cfg.walking_threshold_km,
            default_transfer_minutes: cfg.default_transfer_minutes,
        }
    }
}

impl Default for RouteProfile {
    fn default() -> Self {
        Self::from(&LogisticsSection::default())
    }
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// 估算 from -> to 的路程；from 为 None 表示当天第一站
pub fn estimate_leg(from: Option<Option<GeoPoint>>, to: Option<GeoPoint>, profile: &RouteProfile) -> Leg {
    let Some(from) = from else {
        return Leg {
            distance_km: 0.0,
            minutes: 0,
            mode: TravelMode::None,
        };
    };
    match (from, to) {
        (Some(a), Some(b)) => {
            let km = haversine_km(a, b);
            if km <= profile.walking_threshold_km {
                Leg {
                    distance_km: km,
                    minutes: (km / profile.walking_speed_kmh * 60.0).ceil() as u32,
                    mode: TravelMode::Walk,
                }
            } else {
                Leg {
                    distance_km: km,
                    minutes: (km / profile.transit_speed_kmh * 60.0).ceil() as u32 + TRANSIT_WAIT_MINUTES,
                    mode: TravelMode::Transit,
                }
            }
        }
        _ => Leg {
            distance_km: 0.0,
            minutes: profile.default_transfer_minutes,
            mode: TravelMode::Unknown,
        },
    }
}

/// 路线工具：Args {"from": {"lat","lon"}, "to": {"lat","lon"}}，返回 Leg
pub struct MapsTool {
    profile: RouteProfile,
}

impl MapsTool {
    pub fn new(profile: RouteProfile) -> Self {
        Self { profile }
    }
}

fn parse_point(v: Option<&Value>) -> Option<GeoPoint> {
    v.and_then(|p| serde_json::from_value(p.clone()).ok())
}

#[async_trait]
impl Tool for MapsTool {
    fn name(&self) -> &str {
        MAPS_TOOL
    }

    fn description(&self) -> &str {
        "Estimate distance and travel minutes between two coordinates. Args: {\"from\": {\"lat\": 0, \"lon\": 0}, \"to\": {\"lat\": 0, \"lon\": 0}}"
    }

    fn parameters_schema(&self) -> Value {
        let point = serde_json::json!({
            "type": "object",
            "properties": {"lat": {"type": "number"}, "lon": {"type": "number"}},
            "required": ["lat", "lon"]
        });
        serde_json::json!({
            "type": "object",
            "properties": {"from": point.clone(), "to": point},
            "required": ["from", "to"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let from = parse_point(args.get("from")).ok_or("Missing or invalid 'from'")?;
        let to = parse_point(args.get("to")).ok_or("Missing or invalid 'to'")?;
        let leg = estimate_leg(Some(Some(from)), Some(to), &self.profile);
        serde_json::to_value(leg).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAGRADA: GeoPoint = GeoPoint { lat: 41.4036, lon: 2.1744 };
    const CASA_BATLLO: GeoPoint = GeoPoint { lat: 41.3916, lon: 2.1649 };
    const BARCELONETA: GeoPoint = GeoPoint { lat: 41.3784, lon: 2.1925 };
    const MONTJUIC: GeoPoint = GeoPoint { lat: 41.3639, lon: 2.1586 };

    #[test]
    fn test_short_hop_walks_and_long_hop_takes_transit() {
        let p = RouteProfile::default();
        let walk = estimate_leg(Some(Some(SAGRADA)), Some(CASA_BATLLO), &p);
        assert_eq!(walk.mode, TravelMode::Walk);
        assert!(walk.distance_km > 1.0 && walk.distance_km < 2.0);

        let ride = estimate_leg(Some(Some(BARCELONETA)), Some(MONTJUIC), &p);
        assert_eq!(ride.mode, TravelMode::Transit);
        assert!(ride.minutes > TRANSIT_WAIT_MINUTES);
    }

    #[test]
    fn test_first_stop_and_missing_coordinates() {
        let p = RouteProfile::default();
        assert_eq!(estimate_leg(None, Some(SAGRADA), &p).minutes, 0);
        let unknown = estimate_leg(Some(None), Some(SAGRADA), &p);
        assert_eq!(unknown.mode, TravelMode::Unknown);
        assert_eq!(unknown.minutes, p.default_transfer_minutes);
    }

    #[tokio::test]
    async fn test_tool_rejects_bad_points() {
        let tool = MapsTool::new(RouteProfile::default());
        assert!(tool.execute(serde_json::json!({"from": {"lat": 1.0}})).await.is_err());
        let out = tool
            .execute(serde_json::json!({"from": SAGRADA, "to": CASA_BATLLO}))
            .await
            .unwrap();
        assert_eq!(out["mode"], "walk");
    }
}
