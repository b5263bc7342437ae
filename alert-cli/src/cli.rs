use alert_core::{Condition, Config, Geometry, Operator, TimeValue, weather_param};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use tracing::info;

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "alerts", version, about = "Manage OpenWeatherMap weather alert triggers")]
pub struct Cli {
    /// API key to use instead of the configured one.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key (and optionally the API root) in the config file.
    Configure,

    /// List all triggers.
    List,

    /// Show a single trigger with its alerts.
    Show {
        id: String,
    },

    /// Create a trigger.
    Create {
        /// Start of the watch: Unix epoch or ISO 8601 time.
        #[arg(long, value_parser = parse_time_value)]
        start: TimeValue,

        /// End of the watch: Unix epoch or ISO 8601 time.
        #[arg(long, value_parser = parse_time_value)]
        end: TimeValue,

        /// Condition as PARAM,OPERATOR,AMOUNT, e.g. "temp,>,300". Repeatable.
        /// PARAM is one of temp, pressure, humidity, wind_speed, wind_direction, clouds.
        #[arg(long = "condition", value_parser = parse_condition, required = true)]
        conditions: Vec<Condition>,

        /// Point of the watched area as LON,LAT. Repeatable.
        #[arg(long = "point", value_parser = parse_point, required = true)]
        points: Vec<Geometry>,
    },

    /// Change the time window of an existing trigger.
    Update {
        id: String,

        #[arg(long, value_parser = parse_time_value)]
        start: Option<TimeValue>,

        #[arg(long, value_parser = parse_time_value)]
        end: Option<TimeValue>,
    },

    /// Delete a trigger together with its alerts.
    Delete {
        id: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;
        let api_key = self.api_key;
        let connect = || config.trigger_client(api_key.as_deref());

        match self.command {
            Command::Configure => configure(&mut config)?,
            Command::List => {
                let client = connect()?;
                let triggers = client.get_triggers().await.context("Failed to list triggers")?;
                print!("{}", output::trigger_table(&triggers));
            }
            Command::Show { id } => {
                let client = connect()?;
                let trigger = client.get_trigger(&id).await.context("Failed to fetch trigger")?;
                print!("{}", output::trigger_details(&trigger));
            }
            Command::Create { start, end, conditions, points } => {
                let client = connect()?;
                let trigger = client
                    .create_trigger(start, end, conditions, points, None)
                    .await
                    .context("Failed to create trigger")?;
                info!(id = ?trigger.id, "trigger created");
                print!("{}", output::trigger_details(&trigger));
            }
            Command::Update { id, start, end } => {
                if start.is_none() && end.is_none() {
                    return Err(anyhow!("Nothing to update: pass --start and/or --end"));
                }

                let client = connect()?;
                let mut trigger =
                    client.get_trigger(&id).await.context("Failed to fetch trigger")?;
                if let Some(start) = start {
                    trigger.start = start.to_unix()?;
                }
                if let Some(end) = end {
                    trigger.end = end.to_unix()?;
                }

                client.update_trigger(&trigger).await.context("Failed to update trigger")?;
                println!("Trigger {id} updated.");
            }
            Command::Delete { id } => {
                let client = connect()?;
                let trigger = client.get_trigger(&id).await.context("Failed to fetch trigger")?;
                client.delete_trigger(&trigger).await.context("Failed to delete trigger")?;
                println!("Trigger {id} and its alerts were deleted.");
            }
        }

        Ok(())
    }
}

fn configure(config: &mut Config) -> Result<()> {
    let api_key = Password::new("OpenWeatherMap API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow!("The API key must not be empty"));
    }
    config.set_api_key(api_key.trim().to_string());

    let api_root = Text::new("Alert API root:")
        .with_default(config.api_root())
        .prompt()
        .context("Failed to read API root")?;
    config.api_root = Some(api_root.trim().to_string());

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

/// Integers are epochs; the ISO 8601 check happens when the value is converted.
fn parse_time_value(s: &str) -> Result<TimeValue, String> {
    s.parse::<TimeValue>().map_err(|e| e.to_string())
}

fn parse_condition(s: &str) -> Result<Condition, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [param, op, amount] = parts.as_slice() else {
        return Err(format!("expected PARAM,OPERATOR,AMOUNT, got '{s}'"));
    };

    if !weather_param::all().contains(param) {
        return Err(format!(
            "unknown weather parameter '{param}', expected one of: {}",
            weather_param::all().join(", ")
        ));
    }

    let operator: Operator = op.parse().map_err(|e| format!("{e}"))?;
    let amount: f64 = amount.parse().map_err(|_| format!("'{amount}' is not a number"))?;
    Condition::new(*param, operator, amount).map_err(|e| e.to_string())
}

fn parse_point(s: &str) -> Result<Geometry, String> {
    let (lon, lat) = s.split_once(',').ok_or_else(|| format!("expected LON,LAT, got '{s}'"))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("'{lon}' is not a longitude"))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("'{lat}' is not a latitude"))?;
    Geometry::point(lon, lat).map_err(|e| e.to_string())
}
