use std::future::ready;

use codeact_core::tool::{Error as ToolError, Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, JsonSchema)]
pub struct WeatherParameters {
    #[schemars(description = "The location for which to get the weather.")]
    location: String,
    #[schemars(
        description = "The temperature unit, 'c' for Celsius, 'f' for Fahrenheit."
    )]
    unit: String,
}

/// A tool returning simulated weather data.
pub struct WeatherTool {
    parameter_schema: Value,
}

impl WeatherTool {
    /// Creates a new weather tool.
    #[inline]
    pub fn new() -> Self {
        WeatherTool {
            parameter_schema: schema_for!(WeatherParameters).to_value(),
        }
    }
}

impl Default for WeatherTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WeatherTool {
    type Input = WeatherParameters;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the weather information for a specified location. Returns a dict \
         with `location`, `temperature`, `unit` and `description`."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: WeatherParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(weather_report(input))
    }
}

fn weather_report(input: WeatherParameters) -> ToolResult {
    let temperature = match input.unit.as_str() {
        "c" => 20,
        "f" => 68,
        _ => {
            return Err(ToolError::invalid_input()
                .with_reason("unit must be 'c' or 'f'"));
        }
    };
    debug!("reporting weather for {}", input.location);
    Ok(json!({
        "location": input.location,
        "temperature": temperature,
        "unit": input.unit,
        "description": "Clear",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_weather_units() {
        let tool = WeatherTool::new();
        let report = tool
            .execute(WeatherParameters {
                location: "Shanghai".to_owned(),
                unit: "f".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(report["temperature"], 68);
        assert_eq!(report["location"], "Shanghai");

        let err = tool
            .execute(WeatherParameters {
                location: "Shanghai".to_owned(),
                unit: "k".to_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "unit must be 'c' or 'f'");
    }
}
