use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    error::{AlertError, Result},
    model::{Alert, Condition, Coordinates, CurrentValue, Geometry, MetCondition, Operator, Trigger},
};

/// Turns Alert API trigger payloads into [`Trigger`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerParser;

impl TriggerParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_json(&self, json: &str) -> Result<Trigger> {
        let value: Value = serde_json::from_str(json)?;
        self.parse_value(&value)
    }

    pub fn parse_value(&self, value: &Value) -> Result<Trigger> {
        let raw = RawTrigger::deserialize(value)?;
        let trigger_id = raw.id.clone().unwrap_or_default();

        let conditions = raw.conditions.into_iter().map(RawCondition::into_condition).collect();

        let alerts = raw
            .alerts
            .unwrap_or_default()
            .into_iter()
            .map(|(id, a)| Alert {
                id,
                trigger_id: trigger_id.clone(),
                met_conditions: a
                    .conditions
                    .into_iter()
                    .map(|m| MetCondition {
                        current_value: m.current_value,
                        condition: m.condition.into_condition(),
                    })
                    .collect(),
                coordinates: a.coordinates,
                last_update: a.last_update,
                date: a.date,
            })
            .collect();

        Trigger::new(
            raw.time_period.start.amount,
            raw.time_period.end.amount,
            conditions,
            raw.area,
            alerts,
            None,
            raw.id,
        )
        .map_err(|e| AlertError::Parse(format!("server returned an invalid trigger: {e}")))
    }

    /// Parses a JSON array of triggers, keeping server order.
    pub fn parse_list(&self, value: &Value) -> Result<Vec<Trigger>> {
        let items = value
            .as_array()
            .ok_or_else(|| AlertError::Parse("expected a JSON array of triggers".to_string()))?;

        items.iter().map(|item| self.parse_value(item)).collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    time_period: RawTimePeriod,
    conditions: Vec<RawCondition>,
    area: Vec<Geometry>,
    #[serde(default)]
    alerts: Option<BTreeMap<String, RawAlert>>,
}

#[derive(Debug, Deserialize)]
struct RawTimePeriod {
    start: RawTimePoint,
    end: RawTimePoint,
}

#[derive(Debug, Deserialize)]
struct RawTimePoint {
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    name: String,
    expression: Operator,
    amount: f64,
    #[serde(rename = "_id", default)]
    id: Option<String>,
}

impl RawCondition {
    fn into_condition(self) -> Condition {
        Condition {
            weather_param: self.name,
            operator: self.expression,
            amount: self.amount,
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAlert {
    #[serde(default)]
    conditions: Vec<RawMetCondition>,
    coordinates: Coordinates,
    last_update: Option<i64>,
    date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawMetCondition {
    current_value: CurrentValue,
    condition: RawCondition,
}
