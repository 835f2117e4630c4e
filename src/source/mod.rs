//! Record sources
//!
//! The pipeline only needs an ordered snapshot of inventory records. Where
//! they come from (an export file, a service dump, a test fixture) stays
//! behind the `RecordSource` trait.
//!
//! Field names are accepted in three spellings:
//! - snake_case (`stock_quantity`)
//! - the grocery dataset's column names (`Stock_Quantity`)
//! - the inventory service's camelCase (`stockLevel`, `reorderThreshold`)

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::models::InventoryRecord;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supplies one consistent snapshot of inventory records per call
pub trait RecordSource {
    fn snapshot(&self) -> PipelineResult<Vec<InventoryRecord>>;
}

/// Records already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<InventoryRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<InventoryRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for MemorySource {
    fn snapshot(&self) -> PipelineResult<Vec<InventoryRecord>> {
        Ok(self.records.clone())
    }
}

/// JSON array file, or JSON Lines when the extension is `.jsonl`
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_jsonl(&self) -> bool {
        self.path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false)
    }
}

impl RecordSource for JsonFileSource {
    fn snapshot(&self) -> PipelineResult<Vec<InventoryRecord>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::data(
                Stage::Ingest,
                format!("failed to read {}: {}", self.path.display(), e),
            )
        })?;

        let records = if self.is_jsonl() {
            parse_jsonl(&content)?
        } else {
            parse_json(&content)?
        };

        info!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Parse a JSON array of raw records
pub fn parse_json(content: &str) -> PipelineResult<Vec<InventoryRecord>> {
    let raw: Vec<RawRecord> = serde_json::from_str(content)
        .map_err(|e| PipelineError::data(Stage::Ingest, format!("invalid JSON: {e}")))?;
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| r.into_record(i))
        .collect()
}

/// Parse JSON Lines, one raw record per non-blank line
pub fn parse_jsonl(content: &str) -> PipelineResult<Vec<InventoryRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(line).map_err(|e| {
            PipelineError::record(Stage::Ingest, format!("line {}", line_no + 1), e.to_string())
        })?;
        records.push(raw.into_record(records.len())?);
    }
    debug!("Parsed {} JSONL records", records.len());
    Ok(records)
}

/// Identifier that may arrive as a string or a number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

/// Record as it appears on the wire, before required fields are checked
#[derive(Debug, Clone, Default, Deserialize)]
struct RawRecord {
    #[serde(alias = "Product_ID", alias = "productId", alias = "id")]
    product_id: Option<Scalar>,
    #[serde(alias = "Product_Name", alias = "productName")]
    product_name: Option<String>,
    #[serde(alias = "Stock_Quantity", alias = "stockQuantity", alias = "stockLevel")]
    stock_quantity: Option<f64>,
    #[serde(alias = "Sales_Volume", alias = "salesVolume")]
    sales_volume: Option<f64>,
    #[serde(alias = "Reorder_Level", alias = "reorderLevel", alias = "reorderThreshold")]
    reorder_level: Option<f64>,
    #[serde(alias = "Reorder_Quantity", alias = "reorderQuantity")]
    reorder_quantity: Option<f64>,
    #[serde(
        alias = "Last_Order_Date",
        alias = "last_order_date",
        alias = "lastOrderDate",
        alias = "lastRestockDate"
    )]
    last_restock_date: Option<String>,
    #[serde(alias = "Supplier_Name", alias = "supplierName")]
    supplier_name: Option<String>,
}

impl RawRecord {
    fn into_record(self, index: usize) -> PipelineResult<InventoryRecord> {
        let product_id = self.product_id.map(Scalar::into_string);
        let label = product_id.clone().unwrap_or_else(|| format!("#{index}"));
        let missing =
            |field: &str| PipelineError::record(Stage::Ingest, &label, format!("missing field `{field}`"));

        let raw_date = self.last_restock_date.ok_or_else(|| missing("last_restock_date"))?;
        let last_restock_date = parse_restock_date(&raw_date).ok_or_else(|| {
            PipelineError::record(
                Stage::Ingest,
                &label,
                format!("unparseable last_restock_date `{raw_date}`"),
            )
        })?;

        Ok(InventoryRecord {
            product_id: product_id.ok_or_else(|| missing("product_id"))?,
            product_name: self.product_name.ok_or_else(|| missing("product_name"))?,
            stock_quantity: self.stock_quantity.ok_or_else(|| missing("stock_quantity"))?,
            sales_volume: self.sales_volume.ok_or_else(|| missing("sales_volume"))?,
            reorder_level: self.reorder_level.ok_or_else(|| missing("reorder_level"))?,
            reorder_quantity: self.reorder_quantity.ok_or_else(|| missing("reorder_quantity"))?,
            last_restock_date,
            supplier_name: self.supplier_name.ok_or_else(|| missing("supplier_name"))?,
        })
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and `MM/DD/YYYY`
pub fn parse_restock_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok())
}
