use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{AlertError, Result};

/// Weather variables the Alert API can watch.
pub mod weather_param {
    pub const TEMPERATURE: &str = "temp";
    pub const PRESSURE: &str = "pressure";
    pub const HUMIDITY: &str = "humidity";
    pub const WIND_SPEED: &str = "wind_speed";
    pub const WIND_DIRECTION: &str = "wind_direction";
    pub const CLOUDS: &str = "clouds";

    pub const fn all() -> &'static [&'static str] {
        &[TEMPERATURE, PRESSURE, HUMIDITY, WIND_SPEED, WIND_DIRECTION, CLOUDS]
    }
}

/// A point in time accepted by the trigger API, before it is turned into an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeValue {
    Unix(i64),
    DateTime(DateTime<Utc>),
    /// RFC 3339 (`2018-05-20T09:42:55Z`) or `2018-05-20 09:42:55+00`.
    Iso8601(String),
}

impl TimeValue {
    /// Canonical Unix timestamp in seconds.
    pub fn to_unix(&self) -> Result<i64> {
        let ts = match self {
            TimeValue::Unix(ts) => *ts,
            TimeValue::DateTime(dt) => dt.timestamp(),
            TimeValue::Iso8601(s) => DateTime::parse_from_rfc3339(s)
                .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z"))
                .map_err(|e| {
                    AlertError::InvalidArgument(format!("'{s}' is not an ISO 8601 time: {e}"))
                })?
                .timestamp(),
        };

        if ts < 0 {
            return Err(AlertError::InvalidArgument(format!(
                "time values must not precede the Unix epoch, got {ts}"
            )));
        }
        Ok(ts)
    }
}

impl From<i64> for TimeValue {
    fn from(ts: i64) -> Self {
        TimeValue::Unix(ts)
    }
}

impl From<i32> for TimeValue {
    fn from(ts: i32) -> Self {
        TimeValue::Unix(ts.into())
    }
}

impl From<DateTime<Utc>> for TimeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        TimeValue::DateTime(dt)
    }
}

impl From<&str> for TimeValue {
    fn from(s: &str) -> Self {
        TimeValue::Iso8601(s.to_string())
    }
}

impl From<String> for TimeValue {
    fn from(s: String) -> Self {
        TimeValue::Iso8601(s)
    }
}

impl FromStr for TimeValue {
    type Err = std::convert::Infallible;

    /// Integers become epochs, anything else is kept as an ISO 8601 string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<i64>() {
            Ok(ts) => TimeValue::Unix(ts),
            Err(_) => TimeValue::Iso8601(s.to_string()),
        })
    }
}

/// Comparison applied between an observed weather value and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "$gt")]
    GreaterThan,
    #[serde(rename = "$gte")]
    GreaterThanEqual,
    #[serde(rename = "$lt")]
    LessThan,
    #[serde(rename = "$lte")]
    LessThanEqual,
    #[serde(rename = "$eq")]
    Equal,
    #[serde(rename = "$ne")]
    NotEqual,
}

impl Operator {
    /// Expression code used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::GreaterThan => "$gt",
            Operator::GreaterThanEqual => "$gte",
            Operator::LessThan => "$lt",
            Operator::LessThanEqual => "$lte",
            Operator::Equal => "$eq",
            Operator::NotEqual => "$ne",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::GreaterThan => ">",
            Operator::GreaterThanEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanEqual => "<=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
        }
    }

    pub const fn all() -> &'static [Operator] {
        &[
            Operator::GreaterThan,
            Operator::GreaterThanEqual,
            Operator::LessThan,
            Operator::LessThanEqual,
            Operator::Equal,
            Operator::NotEqual,
        ]
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = AlertError;

    fn from_str(value: &str) -> Result<Self> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "$gt" | "gt" | ">" | "greater_than" => Ok(Operator::GreaterThan),
            "$gte" | "gte" | ">=" | "greater_than_equal" => Ok(Operator::GreaterThanEqual),
            "$lt" | "lt" | "<" | "less_than" => Ok(Operator::LessThan),
            "$lte" | "lte" | "<=" | "less_than_equal" => Ok(Operator::LessThanEqual),
            "$eq" | "eq" | "=" | "==" | "equal" => Ok(Operator::Equal),
            "$ne" | "ne" | "!=" | "not_equal" => Ok(Operator::NotEqual),
            _ => Err(AlertError::InvalidArgument(format!(
                "Unknown operator '{value}'. Supported operators: $gt, $gte, $lt, $lte, $eq, $ne."
            ))),
        }
    }
}

/// A single check of a weather variable against a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub weather_param: String,
    pub operator: Operator,
    pub amount: f64,
    /// Assigned by the server once the owning trigger exists.
    pub id: Option<String>,
}

impl Condition {
    pub fn new(weather_param: impl Into<String>, operator: Operator, amount: f64) -> Result<Self> {
        let weather_param = weather_param.into();
        if weather_param.trim().is_empty() {
            return Err(AlertError::InvalidArgument(
                "a condition needs a weather parameter".to_string(),
            ));
        }

        Ok(Self {
            weather_param,
            operator,
            amount,
            id: None,
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.weather_param, self.operator, self.amount)
    }
}

/// `[longitude, latitude]` or `[longitude, latitude, altitude]`, in GeoJSON order.
pub type Position = Vec<f64>;

/// GeoJSON geometry describing (part of) the area a trigger watches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<Geometry> },
}

impl Geometry {
    pub fn point(lon: f64, lat: f64) -> Result<Self> {
        Ok(Geometry::Point {
            coordinates: check_position(vec![lon, lat])?,
        })
    }

    pub fn multi_point(points: Vec<Position>) -> Result<Self> {
        if points.is_empty() {
            return Err(AlertError::InvalidArgument(
                "a MultiPoint needs at least one point".into(),
            ));
        }
        let coordinates = points.into_iter().map(check_position).collect::<Result<_>>()?;
        Ok(Geometry::MultiPoint { coordinates })
    }

    pub fn line_string(points: Vec<Position>) -> Result<Self> {
        if points.len() < 2 {
            return Err(AlertError::InvalidArgument(
                "a LineString needs at least two points".into(),
            ));
        }
        let coordinates = points.into_iter().map(check_position).collect::<Result<_>>()?;
        Ok(Geometry::LineString { coordinates })
    }

    /// Each ring must be closed (first point equals last) and hold at least four points.
    pub fn polygon(rings: Vec<Vec<Position>>) -> Result<Self> {
        if rings.is_empty() {
            return Err(AlertError::InvalidArgument(
                "a Polygon needs at least one ring".into(),
            ));
        }

        let mut coordinates = Vec::with_capacity(rings.len());
        for ring in rings {
            if ring.len() < 4 || ring.first() != ring.last() {
                return Err(AlertError::InvalidArgument(
                    "Polygon rings must be closed and have at least four points".into(),
                ));
            }
            coordinates.push(ring.into_iter().map(check_position).collect::<Result<Vec<_>>>()?);
        }
        Ok(Geometry::Polygon { coordinates })
    }

    pub fn collection(geometries: Vec<Geometry>) -> Result<Self> {
        if geometries.is_empty() {
            return Err(AlertError::InvalidArgument(
                "a GeometryCollection needs at least one geometry".into(),
            ));
        }
        Ok(Geometry::GeometryCollection { geometries })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// GeoJSON representation sent to the API.
    pub fn geojson(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn check_position(pos: Position) -> Result<Position> {
    let (lon, lat) = match pos.as_slice() {
        [lon, lat] | [lon, lat, _] => (*lon, *lat),
        _ => {
            return Err(AlertError::InvalidArgument(format!(
                "a position needs two or three values, got {}",
                pos.len()
            )));
        }
    };
    if !(-180.0..=180.0).contains(&lon) {
        return Err(AlertError::InvalidArgument(format!(
            "longitude {lon} is outside [-180, 180]"
        )));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(AlertError::InvalidArgument(format!(
            "latitude {lat} is outside [-90, 90]"
        )));
    }
    Ok(pos)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentValue {
    pub min: f64,
    pub max: f64,
}

/// A condition that was met, together with the observed value range.
#[derive(Debug, Clone, PartialEq)]
pub struct MetCondition {
    pub current_value: CurrentValue,
    pub condition: Condition,
}

/// An event recorded by the server when a trigger's conditions were met.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub trigger_id: String,
    pub met_conditions: Vec<MetCondition>,
    pub coordinates: Coordinates,
    /// Milliseconds since the epoch.
    pub last_update: Option<i64>,
    pub date: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertChannel {
    pub name: String,
}

impl AlertChannel {
    pub const OWM_API_POLLING: &'static str = "OWM API POLLING";

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for AlertChannel {
    fn default() -> Self {
        Self::new(Self::OWM_API_POLLING)
    }
}

/// A watch on weather conditions over an area and a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// Assigned by the server; `None` until the trigger has been created.
    pub id: Option<String>,
    /// Unix seconds.
    pub start: i64,
    pub end: i64,
    pub conditions: Vec<Condition>,
    pub area: Vec<Geometry>,
    pub alerts: Vec<Alert>,
    pub alert_channels: Option<Vec<AlertChannel>>,
}

impl Trigger {
    pub fn new(
        start: i64,
        end: i64,
        conditions: Vec<Condition>,
        area: Vec<Geometry>,
        alerts: Vec<Alert>,
        alert_channels: Option<Vec<AlertChannel>>,
        id: Option<String>,
    ) -> Result<Self> {
        let trigger = Self {
            id,
            start,
            end,
            conditions,
            area,
            alerts,
            alert_channels,
        };
        trigger.validate()?;
        Ok(trigger)
    }

    /// Checks the invariants the API enforces on every write.
    pub fn validate(&self) -> Result<()> {
        validate_parts(self.start, self.end, &self.conditions, &self.area)
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == alert_id)
    }

    /// Alerts in which a condition on `weather_param` was met.
    pub fn get_alerts_on(&self, weather_param: &str) -> Vec<&Alert> {
        self.alerts
            .iter()
            .filter(|a| a.met_conditions.iter().any(|m| m.condition.weather_param == weather_param))
            .collect()
    }

    /// Alerts updated at or after `timestamp_ms`.
    pub fn get_alerts_since(&self, timestamp_ms: i64) -> Vec<&Alert> {
        self.alerts
            .iter()
            .filter(|a| a.last_update.is_some_and(|t| t >= timestamp_ms))
            .collect()
    }
}

pub(crate) fn validate_parts(
    start: i64,
    end: i64,
    conditions: &[Condition],
    area: &[Geometry],
) -> Result<()> {
    if start >= end {
        return Err(AlertError::InvalidRequest(
            "the start epoch must precede the end epoch".to_string(),
        ));
    }
    if conditions.is_empty() {
        return Err(AlertError::InvalidRequest(
            "a trigger must contain at least one condition: you provided none".to_string(),
        ));
    }
    if area.is_empty() {
        return Err(AlertError::InvalidRequest(
            "the area for a trigger must contain at least one geoJSON type: you provided none"
                .to_string(),
        ));
    }
    Ok(())
}
