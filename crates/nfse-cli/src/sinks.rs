//! Output sinks only the CLI needs: JSON on stdout and Google Sheets.

use std::io::Write;

use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info};

use nfse_core::models::SinkConfig;
use nfse_core::{Field, Row, RowSink, SinkError};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// Writes each appended batch as a JSON array of objects.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> RowSink for JsonSink<W> {
    fn append_rows(&mut self, rows: &[Row]) -> Result<(), SinkError> {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
            .iter()
            .map(|row| {
                Field::ALL
                    .iter()
                    .map(|f| (f.column_name().to_string(), row[f.index()].clone().into()))
                    .collect()
            })
            .collect();

        serde_json::to_writer_pretty(&mut self.writer, &objects)
            .map_err(|e| SinkError::Write(e.to_string()))?;
        writeln!(self.writer)?;
        Ok(())
    }
}

/// Body of a `values:append` call.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppendRequest<'a> {
    major_dimension: &'static str,
    values: &'a [Row],
}

/// Appends rows to a Google Sheets range.
///
/// Expects an access token that was issued elsewhere; it is read from the
/// environment variable named in the sink configuration.
pub struct SheetsSink {
    client: reqwest::blocking::Client,
    endpoint: Url,
    token: String,
}

impl SheetsSink {
    pub fn from_config(config: &SinkConfig) -> Result<Self, SinkError> {
        let spreadsheet_id = config
            .spreadsheet_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SinkError::NotConfigured("sink.spreadsheet_id is not set".to_string()))?;

        let token = std::env::var(&config.access_token_env).map_err(|_| {
            SinkError::NotConfigured(format!(
                "environment variable {} is not set",
                config.access_token_env
            ))
        })?;

        Ok(Self {
            client: reqwest::blocking::Client::new(),
            endpoint: append_endpoint(spreadsheet_id, &config.range)?,
            token,
        })
    }
}

/// `.../spreadsheets/{id}/values/{range}:append`
fn append_endpoint(spreadsheet_id: &str, range: &str) -> Result<Url, SinkError> {
    let mut url = Url::parse(SHEETS_API).map_err(|e| SinkError::NotConfigured(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| SinkError::NotConfigured("invalid Sheets API base URL".to_string()))?
        .pop_if_empty()
        .push(spreadsheet_id)
        .push("values")
        .push(&format!("{}:append", range));
    Ok(url)
}

impl RowSink for SheetsSink {
    fn append_rows(&mut self, rows: &[Row]) -> Result<(), SinkError> {
        debug!("Appending {} rows to {}", rows.len(), self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .bearer_auth(&self.token)
            .json(&AppendRequest {
                major_dimension: "ROWS",
                values: rows,
            })
            .send()
            .map_err(|e| SinkError::Write(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Inserted {} rows into spreadsheet", rows.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_endpoint() {
        let url = append_endpoint("12JjqCBD7mek", "Sheet1!A:D").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/12JjqCBD7mek/values/Sheet1!A:D:append"
        );
    }

    #[test]
    fn test_append_request_body() {
        let rows = vec![["10:15:30", "Acme Ltd", "Consulting", "150,00"].map(String::from)];
        let body = serde_json::to_value(AppendRequest {
            major_dimension: "ROWS",
            values: &rows,
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "majorDimension": "ROWS",
                "values": [["10:15:30", "Acme Ltd", "Consulting", "150,00"]]
            })
        );
    }

    #[test]
    fn test_missing_spreadsheet_id() {
        let config = SinkConfig::default();
        assert!(matches!(
            SheetsSink::from_config(&config),
            Err(SinkError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_json_sink_uses_column_names() {
        let mut sink = JsonSink::new(Vec::new());
        sink.append_rows(&[["N/A", "Acme", "N/A", "1,00"].map(String::from)])
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&sink.writer).unwrap();
        assert_eq!(value[0]["counterparty"], "Acme");
        assert_eq!(value[0]["amount"], "1,00");
    }
}
