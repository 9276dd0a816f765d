//! Decoded billing line items.
//!
//! The export schema has a stable set of named columns plus
//! vendor-specific extras that vary by report. The fixed set decodes into
//! named fields; every other header column is preserved verbatim in the
//! open `extra` map so nothing the vendor adds is dropped.

use std::collections::HashMap;

use csv::StringRecord;
use serde::Serialize;

/// One decoded billing row. Fully populated before it is handed to the
/// sink; never emitted partially decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineItem {
    pub line_item_id: String,
    pub time_interval: String,
    pub invoice_id: String,
    pub usage_account_id: String,
    pub usage_start_date: String,
    pub usage_end_date: String,
    pub product_code: String,
    pub usage_type: String,
    pub operation: String,
    pub availability_zone: String,
    pub resource_id: String,
    pub currency_code: String,
    pub unblended_cost: String,
    /// Header columns outside the fixed set, keyed by their literal name.
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// Where a header column lands in a [`LineItem`].
#[derive(Debug, Clone)]
enum Column {
    LineItemId,
    TimeInterval,
    InvoiceId,
    UsageAccountId,
    UsageStartDate,
    UsageEndDate,
    ProductCode,
    UsageType,
    Operation,
    AvailabilityZone,
    ResourceId,
    CurrencyCode,
    UnblendedCost,
    Extra(String),
}

impl Column {
    fn from_name(name: &str) -> Self {
        match name {
            "identity/LineItemId" => Self::LineItemId,
            "identity/TimeInterval" => Self::TimeInterval,
            "bill/InvoiceId" => Self::InvoiceId,
            "lineItem/UsageAccountId" => Self::UsageAccountId,
            "lineItem/UsageStartDate" => Self::UsageStartDate,
            "lineItem/UsageEndDate" => Self::UsageEndDate,
            "lineItem/ProductCode" => Self::ProductCode,
            "lineItem/UsageType" => Self::UsageType,
            "lineItem/Operation" => Self::Operation,
            "lineItem/AvailabilityZone" => Self::AvailabilityZone,
            "lineItem/ResourceId" => Self::ResourceId,
            "lineItem/CurrencyCode" => Self::CurrencyCode,
            "lineItem/UnblendedCost" => Self::UnblendedCost,
            other => Self::Extra(other.to_string()),
        }
    }
}

/// Positional row decoder built once from a report's header row.
#[derive(Debug, Clone)]
pub(crate) struct RecordDecoder {
    columns: Vec<Column>,
}

impl RecordDecoder {
    pub(crate) fn from_header(header: &StringRecord) -> Self {
        Self {
            columns: header.iter().map(Column::from_name).collect(),
        }
    }

    pub(crate) fn decode(&self, row: &StringRecord) -> LineItem {
        let mut item = LineItem::default();
        for (index, column) in self.columns.iter().enumerate() {
            let value = row.get(index).unwrap_or_default();
            match column {
                Column::LineItemId => item.line_item_id = value.to_string(),
                Column::TimeInterval => item.time_interval = value.to_string(),
                Column::InvoiceId => item.invoice_id = value.to_string(),
                Column::UsageAccountId => item.usage_account_id = value.to_string(),
                Column::UsageStartDate => item.usage_start_date = value.to_string(),
                Column::UsageEndDate => item.usage_end_date = value.to_string(),
                Column::ProductCode => item.product_code = value.to_string(),
                Column::UsageType => item.usage_type = value.to_string(),
                Column::Operation => item.operation = value.to_string(),
                Column::AvailabilityZone => item.availability_zone = value.to_string(),
                Column::ResourceId => item.resource_id = value.to_string(),
                Column::CurrencyCode => item.currency_code = value.to_string(),
                Column::UnblendedCost => item.unblended_cost = value.to_string(),
                Column::Extra(name) => {
                    item.extra.insert(name.clone(), value.to_string());
                }
            }
        }
        item
    }
}
