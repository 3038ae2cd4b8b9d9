use std::fmt::Write as FmtWrite;

use crate::models::OutputFormat;
use crate::services::IngestReport;

pub trait Formatter {
    fn format_ingest_report(&self, report: &IngestReport, collection: &str) -> String;
    fn format_dry_run(&self, summary: &DryRunSummary) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    pub collection_exists: bool,
    pub collection_error: Option<String>,
    pub points: u64,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone)]
pub struct DryRunSummary {
    pub input: String,
    pub layout: String,
    pub records: u64,
    pub sample_prompt: Option<String>,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_ingest_report(&self, report: &IngestReport, collection: &str) -> String {
        let mut output = String::new();
        writeln!(output, "Ingestion Complete").unwrap();
        writeln!(output, "------------------").unwrap();
        writeln!(output, "Collection:         {}", collection).unwrap();
        writeln!(output, "Records read:       {}", report.records_read).unwrap();
        writeln!(output, "Points upserted:    {}", report.points_upserted).unwrap();
        writeln!(output, "Batches:            {}", report.batches).unwrap();
        writeln!(output, "Embedding requests: {}", report.embedding_requests).unwrap();
        if report.retries > 0 {
            writeln!(output, "Retries:            {}", report.retries).unwrap();
        }
        writeln!(output, "Duration:           {}ms", report.duration_ms).unwrap();
        output
    }

    fn format_dry_run(&self, summary: &DryRunSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Dry Run").unwrap();
        writeln!(output, "-------").unwrap();
        writeln!(output, "Input:   {} ({})", summary.input, summary.layout).unwrap();
        writeln!(output, "Records: {}", summary.records).unwrap();
        if let Some(ref prompt) = summary.sample_prompt {
            writeln!(output, "Sample prompt:").unwrap();
            writeln!(output, "  {}", prompt).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(output, "Vector Store:  Qdrant ({})", vector_status).unwrap();
        writeln!(output, "  URL:         {}", status.vector_store_url).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if let Some(ref error) = status.collection_error {
            writeln!(output, "  Points:      unavailable ({})", error).unwrap();
        } else if status.vector_store_connected {
            if status.collection_exists {
                writeln!(output, "  Points:      {}", status.points).unwrap();
            } else {
                writeln!(output, "  Points:      (collection not created yet)").unwrap();
            }
        }
        writeln!(output).unwrap();
        writeln!(
            output,
            "Embedding:     {} ({} dims)",
            status.embedding_model, status.embedding_dimension
        )
        .unwrap();

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, json: &serde_json::Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(json)
        } else {
            serde_json::to_string(json)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_ingest_report(&self, report: &IngestReport, collection: &str) -> String {
        let json = serde_json::json!({
            "collection": collection,
            "records_read": report.records_read,
            "points_upserted": report.points_upserted,
            "batches": report.batches,
            "embedding_requests": report.embedding_requests,
            "retries": report.retries,
            "duration_ms": report.duration_ms,
        });
        self.render(&json)
    }

    fn format_dry_run(&self, summary: &DryRunSummary) -> String {
        let json = serde_json::json!({
            "dry_run": true,
            "input": summary.input,
            "layout": summary.layout,
            "records": summary.records,
            "sample_prompt": summary.sample_prompt,
        });
        self.render(&json)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "vector_store": {
                "url": status.vector_store_url,
                "connected": status.vector_store_connected,
                "collection": status.collection,
                "collection_exists": status.collection_exists,
                "error": status.collection_error,
                "points": status.points,
            },
            "embedding": {
                "model": status.embedding_model,
                "dimension": status.embedding_dimension,
            }
        });
        self.render(&json)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
