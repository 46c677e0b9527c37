//! Time-series query commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, SeriesResponse};
use crate::output::{format_timestamp, format_value, print_json, print_rows, print_warning, OutputFormat};

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Range parameters; an unset bound is left to the agent
fn range_query(start: Option<i64>, end: Option<i64>) -> Vec<(&'static str, i64)> {
    [("start", start), ("end", end)]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
}

/// Query stored samples of one series
pub async fn query_series(
    client: &ApiClient,
    kind: &str,
    entity: &str,
    field: &str,
    start: Option<i64>,
    end: Option<i64>,
    format: OutputFormat,
) -> Result<()> {
    let response: SeriesResponse = client
        .get_with_query(
            &["api", "v1", "series", kind, entity, field],
            &range_query(start, end),
        )
        .await?;

    if let OutputFormat::Json = format {
        return print_json(&response);
    }

    println!(
        "{}",
        format!(
            "{} {}/{}",
            response.field, response.entity.kind, response.entity.id
        )
        .bold()
    );
    println!(
        "{} .. {}\n",
        format_timestamp(response.start),
        format_timestamp(response.end)
    );

    if response.samples.is_empty() {
        print_warning("No samples in range");
        return Ok(());
    }

    let rows: Vec<SampleRow> = response
        .samples
        .iter()
        .map(|s| SampleRow {
            time: format_timestamp(s.timestamp),
            value: format_value(s.value),
        })
        .collect();
    print_rows(rows);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_query() {
        assert!(range_query(None, None).is_empty());
        assert_eq!(range_query(Some(0), Some(600)), vec![("start", 0), ("end", 600)]);
        assert_eq!(range_query(None, Some(600)), vec![("end", 600)]);
    }

    #[tokio::test]
    async fn test_query_series_addresses_region_scoped_instance() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/series/instance/us-east-1.i-1/CPUUtilization")
            .match_query(mockito::Matcher::UrlEncoded("end".into(), "600".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "entity": {"kind": "instance", "id": "us_east_1.i_1"},
                    "field": "CPUUtilization",
                    "start": 0,
                    "end": 600,
                    "samples": [{"timestamp": 300, "value": 40.0}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        query_series(
            &client,
            "instance",
            "us-east-1.i-1",
            "CPUUtilization",
            None,
            Some(600),
            OutputFormat::Json,
        )
        .await
        .unwrap();

        mock.assert_async().await;
    }
}
