use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::{
    error::{AlertError, Result},
    model::{Alert, AlertChannel, Condition, Geometry, TimeValue, Trigger, validate_parts},
    parser::TriggerParser,
    transport::HttpTransport,
    uris::Uris,
};

pub const ALERT_API_VERSION: (u8, u8) = (3, 0);

const JSON_HEADERS: [(&str, &str); 1] = [("Content-Type", "application/json")];

/// CRUD access to the triggers of the Alert API.
///
/// Each call is a single request/response exchange; the client keeps no state
/// besides its key and transport, so it can be shared freely.
#[derive(Debug)]
pub struct TriggerClient {
    api_key: String,
    http: Box<dyn HttpTransport>,
    parser: TriggerParser,
    uris: Uris,
}

impl TriggerClient {
    pub fn new(api_key: impl Into<String>, http: Box<dyn HttpTransport>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AlertError::MissingApiKey);
        }

        Ok(Self {
            api_key,
            http,
            parser: TriggerParser::new(),
            uris: Uris::default(),
        })
    }

    /// Point the client at a different API root, e.g. a staging server.
    pub fn with_uris(mut self, uris: Uris) -> Self {
        self.uris = uris;
        self
    }

    pub fn alert_api_version(&self) -> (u8, u8) {
        ALERT_API_VERSION
    }

    fn params(&self) -> [(&str, &str); 1] {
        [("appid", self.api_key.as_str())]
    }

    /// Create a trigger. `alert_channels` is accepted but not sent: the API
    /// currently only delivers alerts through polling.
    #[instrument(skip_all)]
    pub async fn create_trigger(
        &self,
        start: impl Into<TimeValue>,
        end: impl Into<TimeValue>,
        conditions: Vec<Condition>,
        area: Vec<Geometry>,
        alert_channels: Option<Vec<AlertChannel>>,
    ) -> Result<Trigger> {
        let start = start.into().to_unix()?;
        let end = end.into().to_unix()?;
        validate_parts(start, end, &conditions, &area)?;

        if let Some(channels) = &alert_channels {
            debug!(count = channels.len(), "alert channels are not transmitted");
        }

        let body = trigger_body(start, end, &conditions, &area)?;
        let (status, payload) = self
            .http
            .post(&self.uris.triggers(), &self.params(), &body, &JSON_HEADERS)
            .await?;
        debug!(%status, "trigger created");

        let mut trigger = self.parser.parse_value(&payload)?;
        trigger.alert_channels = alert_channels;
        Ok(trigger)
    }

    /// All of the user's triggers, in the order the server lists them.
    #[instrument(skip_all)]
    pub async fn get_triggers(&self) -> Result<Vec<Trigger>> {
        let (status, data) = self
            .http
            .get_json(&self.uris.triggers(), &self.params(), &JSON_HEADERS)
            .await?;

        let triggers = self.parser.parse_list(&data)?;
        debug!(%status, count = triggers.len(), "triggers listed");
        Ok(triggers)
    }

    #[instrument(skip(self))]
    pub async fn get_trigger(&self, trigger_id: &str) -> Result<Trigger> {
        check_id(trigger_id)?;

        let (_, data) = self
            .http
            .get_json(&self.uris.named_trigger(trigger_id), &self.params(), &JSON_HEADERS)
            .await?;
        self.parser.parse_value(&data)
    }

    /// Overwrite the remote trigger having `trigger.id` with the local data.
    #[instrument(skip_all, fields(id = ?trigger.id))]
    pub async fn update_trigger(&self, trigger: &Trigger) -> Result<()> {
        let id = trigger_id(trigger)?;
        trigger.validate()?;

        let body = trigger_body(
            trigger.start,
            trigger.end,
            &trigger.conditions,
            &trigger.area,
        )?;
        let (status, _) = self
            .http
            .put(&self.uris.named_trigger(id), &self.params(), &body, &JSON_HEADERS)
            .await?;
        debug!(%status, "trigger updated");
        Ok(())
    }

    /// Delete the trigger; the server drops its alerts along with it.
    #[instrument(skip_all, fields(id = ?trigger.id))]
    pub async fn delete_trigger(&self, trigger: &Trigger) -> Result<()> {
        let id = trigger_id(trigger)?;

        let (status, _) = self
            .http
            .delete(&self.uris.named_trigger(id), &self.params(), &JSON_HEADERS)
            .await?;
        debug!(%status, "trigger deleted");
        Ok(())
    }

    pub async fn get_alerts_for(&self, _trigger: &Trigger) -> Result<Vec<Alert>> {
        Err(AlertError::NotImplemented("get_alerts_for"))
    }

    pub async fn get_alert(&self, _alert_id: &str, _trigger: &Trigger) -> Result<Alert> {
        Err(AlertError::NotImplemented("get_alert"))
    }

    pub async fn delete_all_alerts_for(&self, _trigger: &Trigger) -> Result<()> {
        Err(AlertError::NotImplemented("delete_all_alerts_for"))
    }

    pub async fn delete_alert(&self, _alert: &Alert) -> Result<()> {
        Err(AlertError::NotImplemented("delete_alert"))
    }
}

fn trigger_body(
    start: i64,
    end: i64,
    conditions: &[Condition],
    area: &[Geometry],
) -> Result<Value> {
    let conditions: Vec<Value> = conditions
        .iter()
        .map(|c| json!({"name": c.weather_param, "expression": c.operator, "amount": c.amount}))
        .collect();
    let area = area
        .iter()
        .map(Geometry::geojson)
        .collect::<Result<Vec<_>>>()?;

    Ok(json!({
        "time_period": {
            "start": {"expression": "exact", "amount": start},
            "end": {"expression": "exact", "amount": end},
        },
        "conditions": conditions,
        "area": area,
    }))
}

fn trigger_id(trigger: &Trigger) -> Result<&str> {
    let id = trigger.id.as_deref().ok_or_else(|| {
        AlertError::InvalidArgument("the trigger has no id: create it first".to_string())
    })?;
    check_id(id)?;
    Ok(id)
}

/// Trigger ids are server-generated object ids; anything else could reshape the URI.
fn check_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !valid {
        return Err(AlertError::InvalidArgument(format!("'{id}' is not a valid trigger id")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::Operator,
        parser::tests::{TRIGGER_JSON, TWO_TRIGGERS_JSON},
        transport::{Headers, Params},
    };
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        method: &'static str,
        uri: String,
        params: Vec<(String, String)>,
        headers: Vec<(String, String)>,
        body: Option<Value>,
    }

    /// Replays a canned response and records every request it sees.
    #[derive(Debug, Clone)]
    struct MockTransport {
        response: Value,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl MockTransport {
        fn new(response: &str) -> Self {
            Self {
                response: serde_json::from_str(response).unwrap(),
                calls: Arc::default(),
            }
        }

        fn record(
            &self,
            method: &'static str,
            uri: &str,
            params: &Params<'_>,
            headers: &Headers<'_>,
            body: Option<&Value>,
        ) {
            let own = |pairs: &[(&str, &str)]| -> Vec<(String, String)> {
                pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
            };
            self.calls.lock().unwrap().push(Call {
                method,
                uri: uri.to_string(),
                params: own(params),
                headers: own(headers),
                body: body.cloned(),
            });
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(
            &self,
            uri: &str,
            params: &Params<'_>,
            headers: &Headers<'_>,
        ) -> Result<(StatusCode, Vec<u8>)> {
            self.record("GET", uri, params, headers, None);
            Ok((StatusCode::OK, serde_json::to_vec(&self.response)?))
        }

        async fn get_json(
            &self,
            uri: &str,
            params: &Params<'_>,
            headers: &Headers<'_>,
        ) -> Result<(StatusCode, Value)> {
            self.record("GET", uri, params, headers, None);
            Ok((StatusCode::OK, self.response.clone()))
        }

        async fn post(
            &self,
            uri: &str,
            params: &Params<'_>,
            body: &Value,
            headers: &Headers<'_>,
        ) -> Result<(StatusCode, Value)> {
            self.record("POST", uri, params, headers, Some(body));
            Ok((StatusCode::OK, self.response.clone()))
        }

        async fn put(
            &self,
            uri: &str,
            params: &Params<'_>,
            body: &Value,
            headers: &Headers<'_>,
        ) -> Result<(StatusCode, Option<Value>)> {
            self.record("PUT", uri, params, headers, Some(body));
            Ok((StatusCode::OK, None))
        }

        async fn delete(
            &self,
            uri: &str,
            params: &Params<'_>,
            headers: &Headers<'_>,
        ) -> Result<(StatusCode, Option<Value>)> {
            self.record("DELETE", uri, params, headers, None);
            Ok((StatusCode::NO_CONTENT, None))
        }
    }

    /// Always fails like a server answering 401.
    #[derive(Debug)]
    struct UnauthorizedTransport;

    fn unauthorized<T>() -> Result<T> {
        Err(AlertError::Api {
            status: StatusCode::UNAUTHORIZED,
            body: "Invalid API key".into(),
        })
    }

    #[async_trait]
    impl HttpTransport for UnauthorizedTransport {
        async fn get(
            &self,
            _: &str,
            _: &Params<'_>,
            _: &Headers<'_>,
        ) -> Result<(StatusCode, Vec<u8>)> {
            unauthorized()
        }

        async fn get_json(
            &self,
            _: &str,
            _: &Params<'_>,
            _: &Headers<'_>,
        ) -> Result<(StatusCode, Value)> {
            unauthorized()
        }

        async fn post(
            &self,
            _: &str,
            _: &Params<'_>,
            _: &Value,
            _: &Headers<'_>,
        ) -> Result<(StatusCode, Value)> {
            unauthorized()
        }

        async fn put(
            &self,
            _: &str,
            _: &Params<'_>,
            _: &Value,
            _: &Headers<'_>,
        ) -> Result<(StatusCode, Option<Value>)> {
            unauthorized()
        }

        async fn delete(
            &self,
            _: &str,
            _: &Params<'_>,
            _: &Headers<'_>,
        ) -> Result<(StatusCode, Option<Value>)> {
            unauthorized()
        }
    }

    fn client(mock: &MockTransport) -> TriggerClient {
        TriggerClient::new("APIKey", Box::new(mock.clone())).unwrap()
    }

    fn conditions() -> Vec<Condition> {
        vec![
            Condition::new("humidity", Operator::LessThan, 10.0).unwrap(),
            Condition::new("temp", Operator::GreaterThanEqual, 100.6).unwrap(),
        ]
    }

    fn area() -> Vec<Geometry> {
        vec![Geometry::point(13.6, 46.9).unwrap()]
    }

    fn local_trigger(id: Option<&str>) -> Trigger {
        let id = id.map(String::from);
        Trigger::new(1526809375, 1527809375, conditions(), area(), vec![], None, id).unwrap()
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn instantiation_fails_without_api_key() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let err = TriggerClient::new("", Box::new(mock.clone())).unwrap_err();
        assert!(matches!(err, AlertError::MissingApiKey));
        assert!(TriggerClient::new("   ", Box::new(mock)).is_err());
    }

    #[test]
    fn alert_api_version_is_three_zero() {
        let mock = MockTransport::new(TRIGGER_JSON);
        assert_eq!(client(&mock).alert_api_version(), (3, 0));
    }

    #[tokio::test]
    async fn create_trigger_posts_body_and_parses_echo() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let trigger = client(&mock)
            .create_trigger(1526809375, 1527809375, conditions(), area(), None)
            .await
            .expect("create should succeed");

        assert_eq!(trigger.id.as_deref(), Some("5852816a9aaacb00153134a3"));
        assert!(!trigger.conditions.is_empty());
        assert!(!trigger.area.is_empty());

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.method, "POST");
        assert_eq!(call.uri, "https://api.openweathermap.org/data/3.0/triggers");
        assert_eq!(call.params, vec![pair("appid", "APIKey")]);
        assert_eq!(call.headers, vec![pair("Content-Type", "application/json")]);
        assert_eq!(
            call.body,
            Some(json!({
                "time_period": {
                    "start": {"expression": "exact", "amount": 1526809375},
                    "end": {"expression": "exact", "amount": 1527809375},
                },
                "conditions": [
                    {"name": "humidity", "expression": "$lt", "amount": 10.0},
                    {"name": "temp", "expression": "$gte", "amount": 100.6},
                ],
                "area": [{"type": "Point", "coordinates": [13.6, 46.9]}],
            }))
        );
    }

    #[tokio::test]
    async fn create_trigger_keeps_alert_channels_locally() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let channels = Some(vec![AlertChannel::default()]);
        let trigger = client(&mock)
            .create_trigger(1526809375, 1527809375, conditions(), area(), channels)
            .await
            .unwrap();

        assert_eq!(trigger.alert_channels, Some(vec![AlertChannel::default()]));
        let body = mock.calls()[0].body.clone().unwrap();
        assert!(body.get("alert_channels").is_none());
    }

    #[tokio::test]
    async fn create_trigger_accepts_iso_times() {
        let mock = MockTransport::new(TRIGGER_JSON);
        client(&mock)
            .create_trigger(
                "2018-05-20T09:42:55Z",
                "2018-05-31T23:29:35Z",
                conditions(),
                area(),
                None,
            )
            .await
            .unwrap();

        let body = mock.calls()[0].body.clone().unwrap();
        assert_eq!(body["time_period"]["start"]["amount"], 1526809375);
        assert_eq!(body["time_period"]["end"]["amount"], 1527809375);
    }

    #[tokio::test]
    async fn create_trigger_fails_with_wrong_inputs() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let c = client(&mock);

        let err = c
            .create_trigger(1526809375, 1327809375, conditions(), area(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidRequest(_)));
        let err = c
            .create_trigger(1526809375, 1526809375, conditions(), area(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidRequest(_)));
        let err = c
            .create_trigger(1526809375, 1527809375, vec![], area(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidRequest(_)));
        let err = c
            .create_trigger(1526809375, 1527809375, conditions(), vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidRequest(_)));
        let err = c
            .create_trigger("not a date", 1527809375, conditions(), area(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidArgument(_)));

        assert!(mock.calls().is_empty(), "no request may be sent for invalid input");
    }

    #[tokio::test]
    async fn get_triggers_returns_all_in_order() {
        let mock = MockTransport::new(TWO_TRIGGERS_JSON);
        let triggers = client(&mock).get_triggers().await.unwrap();

        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].id.as_deref(), Some("585280edbe54110025ea52bb"));
        assert_eq!(triggers[1].id.as_deref(), Some("5852816a9aaacb00153134a3"));
        assert_eq!(mock.calls()[0].method, "GET");
    }

    #[tokio::test]
    async fn get_trigger_by_id() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let trigger = client(&mock).get_trigger("5852816a9aaacb00153134a3").await.unwrap();

        assert_eq!(trigger.id.as_deref(), Some("5852816a9aaacb00153134a3"));
        assert_eq!(
            mock.calls()[0].uri,
            "https://api.openweathermap.org/data/3.0/triggers/5852816a9aaacb00153134a3"
        );
    }

    #[tokio::test]
    async fn get_trigger_fails_with_wrong_input() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let c = client(&mock);

        for bad in ["", "a/b", "has space"] {
            let err = c.get_trigger(bad).await.unwrap_err();
            assert!(matches!(err, AlertError::InvalidArgument(_)), "{bad:?}");
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn ids_cannot_reshape_the_uri() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let c = client(&mock);

        for bad in ["..", ".", "%2e%2e", "a?b", "a#b", "abc?appid=evil", "a%2Fb"] {
            let err = c.get_trigger(bad).await.unwrap_err();
            assert!(matches!(err, AlertError::InvalidArgument(_)), "{bad:?}");

            let err = c.delete_trigger(&local_trigger(Some(bad))).await.unwrap_err();
            assert!(matches!(err, AlertError::InvalidArgument(_)), "{bad:?}");

            let err = c.update_trigger(&local_trigger(Some(bad))).await.unwrap_err();
            assert!(matches!(err, AlertError::InvalidArgument(_)), "{bad:?}");
        }
        assert!(mock.calls().is_empty());

        c.get_trigger("trigger_id-42").await.unwrap();
        assert!(mock.calls()[0].uri.ends_with("/triggers/trigger_id-42"));
    }

    #[tokio::test]
    async fn update_trigger_sends_same_body_shape() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let mut modified = TriggerParser::new().parse_json(TRIGGER_JSON).unwrap();
        modified.end = 1527809375 + 10000;

        let result = client(&mock).update_trigger(&modified).await;
        assert!(result.is_ok());

        let call = &mock.calls()[0];
        assert_eq!(call.method, "PUT");
        assert!(call.uri.ends_with("/triggers/5852816a9aaacb00153134a3"));

        let body = call.body.clone().unwrap();
        assert_eq!(body["time_period"]["start"]["amount"], 132000000);
        assert_eq!(body["time_period"]["end"]["amount"], 1527819375);
        assert_eq!(
            body["conditions"],
            json!([{"name": "temp", "expression": "$lt", "amount": 273.0}])
        );
        assert_eq!(body["area"], json!([{"type": "Point", "coordinates": [37.0, 53.0]}]));
    }

    #[tokio::test]
    async fn update_trigger_fails_with_wrong_input() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let c = client(&mock);

        let err = c.update_trigger(&local_trigger(None)).await.unwrap_err();
        assert!(matches!(err, AlertError::InvalidArgument(_)));
        let err = c.update_trigger(&local_trigger(Some(""))).await.unwrap_err();
        assert!(matches!(err, AlertError::InvalidArgument(_)));

        let mut broken = local_trigger(Some("trigger-id"));
        broken.conditions.clear();
        let err = c.update_trigger(&broken).await.unwrap_err();
        assert!(matches!(err, AlertError::InvalidRequest(_)));

        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_trigger() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let trigger = TriggerParser::new().parse_json(TRIGGER_JSON).unwrap();

        let result = client(&mock).delete_trigger(&trigger).await;
        assert!(result.is_ok());

        let call = &mock.calls()[0];
        assert_eq!(call.method, "DELETE");
        assert!(call.uri.ends_with("/triggers/5852816a9aaacb00153134a3"));
        assert_eq!(call.params, vec![pair("appid", "APIKey")]);
    }

    #[tokio::test]
    async fn delete_trigger_fails_with_wrong_input() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let err = client(&mock).delete_trigger(&local_trigger(None)).await.unwrap_err();

        assert!(matches!(err, AlertError::InvalidArgument(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn round_trip_through_server_echo() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let c = client(&mock);
        c.create_trigger(1526809375, 1527809375, conditions(), area(), None)
            .await
            .unwrap();

        // Echo the request body back as the server would, with an id.
        let mut echo = mock.calls()[0].body.clone().unwrap();
        echo["_id"] = json!("echoed-id");
        let parsed = TriggerParser::new().parse_value(&echo).unwrap();

        let local = local_trigger(Some("echoed-id"));
        assert_eq!(parsed.start, local.start);
        assert_eq!(parsed.end, local.end);
        assert_eq!(parsed.conditions, local.conditions);
        assert_eq!(parsed.area, local.area);
    }

    #[tokio::test]
    async fn transport_errors_propagate_unchanged() {
        let c = TriggerClient::new("APIKey", Box::new(UnauthorizedTransport)).unwrap();

        let err = c.get_triggers().await.unwrap_err();
        assert!(matches!(
            err,
            AlertError::Api { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
        let err = c.delete_trigger(&local_trigger(Some("x"))).await.unwrap_err();
        assert!(matches!(err, AlertError::Api { .. }));
    }

    #[tokio::test]
    async fn custom_api_root_is_used() {
        let mock = MockTransport::new(TWO_TRIGGERS_JSON);
        let c = client(&mock).with_uris(Uris::new("http://localhost:9000/data/3.0"));
        c.get_triggers().await.unwrap();

        assert_eq!(mock.calls()[0].uri, "http://localhost:9000/data/3.0/triggers");
    }

    #[tokio::test]
    async fn alert_operations_are_not_implemented() {
        let mock = MockTransport::new(TRIGGER_JSON);
        let c = client(&mock);
        let trigger = TriggerParser::new().parse_json(TRIGGER_JSON).unwrap();
        let alert = trigger.alerts[0].clone();

        assert!(matches!(
            c.get_alerts_for(&trigger).await,
            Err(AlertError::NotImplemented("get_alerts_for"))
        ));
        assert!(matches!(
            c.get_alert(&alert.id, &trigger).await,
            Err(AlertError::NotImplemented(_))
        ));
        assert!(matches!(
            c.delete_all_alerts_for(&trigger).await,
            Err(AlertError::NotImplemented(_))
        ));
        assert!(matches!(c.delete_alert(&alert).await, Err(AlertError::NotImplemented(_))));
        assert!(mock.calls().is_empty());
    }
}
