use alert_core::{Alert, Geometry, Trigger};
use chrono::{DateTime, Utc};

pub fn trigger_table(triggers: &[Trigger]) -> String {
    if triggers.is_empty() {
        return "No triggers found.\n".to_string();
    }

    let mut out = format!(
        "{:<26} {:<20} {:<20} {:>5} {:>6}\n",
        "ID", "START", "END", "CONDS", "ALERTS"
    );
    for t in triggers {
        out.push_str(&format!(
            "{:<26} {:<20} {:<20} {:>5} {:>6}\n",
            t.id.as_deref().unwrap_or("-"),
            format_time(t.start),
            format_time(t.end),
            t.conditions.len(),
            t.alerts.len(),
        ));
    }
    out
}

pub fn trigger_details(t: &Trigger) -> String {
    let mut out = format!("Trigger {}\n", t.id.as_deref().unwrap_or("(unsaved)"));
    out.push_str(&format!(
        "  Window:     {} .. {}\n",
        format_time(t.start),
        format_time(t.end)
    ));

    out.push_str("  Conditions:\n");
    for c in &t.conditions {
        out.push_str(&format!("    - {c}\n"));
    }

    out.push_str("  Area:\n");
    for g in &t.area {
        out.push_str(&format!("    - {}\n", describe_geometry(g)));
    }

    if t.alerts.is_empty() {
        out.push_str("  Alerts:     none\n");
    } else {
        out.push_str("  Alerts:\n");
        for a in &t.alerts {
            out.push_str(&describe_alert(a));
        }
    }
    out
}

fn describe_alert(a: &Alert) -> String {
    let when = a
        .last_update
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "    - {} at ({}, {}), {} condition(s) met, updated {when}\n",
        a.id,
        a.coordinates.lon,
        a.coordinates.lat,
        a.met_conditions.len(),
    )
}

fn describe_geometry(g: &Geometry) -> String {
    match g {
        Geometry::Point { coordinates } if coordinates.len() >= 2 => {
            format!("Point ({}, {})", coordinates[0], coordinates[1])
        }
        other => other.kind().to_string(),
    }
}

fn format_time(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::{Condition, Operator};

    fn trigger() -> Trigger {
        Trigger::new(
            1526809375,
            1527809375,
            vec![Condition::new("temp", Operator::GreaterThan, 300.0).unwrap()],
            vec![Geometry::point(13.6, 46.9).unwrap()],
            vec![],
            None,
            Some("abc".into()),
        )
        .unwrap()
    }

    #[test]
    fn empty_table() {
        assert_eq!(trigger_table(&[]), "No triggers found.\n");
    }

    #[test]
    fn table_lists_each_trigger() {
        let out = trigger_table(&[trigger(), trigger()]);
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains("2018-05-20 09:42 UTC"));
    }

    #[test]
    fn details_show_conditions_and_area() {
        let out = trigger_details(&trigger());
        assert!(out.starts_with("Trigger abc"));
        assert!(out.contains("temp > 300"));
        assert!(out.contains("Point (13.6, 46.9)"));
        assert!(out.contains("Alerts:     none"));
    }
}
