use chrono::{DateTime, NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Fields the model extracts from a BOL/packing-list pair. Every field is
/// independently optional; `None` means the value was missing or ambiguous.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShipmentExtraction {
    /// The Bill of Lading Number, usually found on the top right of the PDF.
    #[serde(default)]
    pub bill_of_lading_number: Option<String>,
    /// The Container Number. If multiple are present, pick the primary one.
    #[serde(default)]
    pub container_number: Option<String>,
    /// The Name of the Consignee.
    #[serde(default)]
    pub consignee_name: Option<String>,
    /// The Address of the Consignee.
    #[serde(default)]
    pub consignee_address: Option<String>,
    /// Date of Export/Shipment normalized to YYYY-MM-DD.
    #[serde(default, deserialize_with = "deserialize_calendar_date")]
    #[schemars(with = "Option<NaiveDate>")]
    pub date_of_export: Option<NaiveDate>,
    /// Count of distinct product rows in the packing list/invoice (excluding headers/footers).
    #[serde(default)]
    pub line_items_count: Option<u32>,
    /// The Total Gross Weight of the shipment.
    #[serde(default)]
    pub total_gross_weight: Option<f64>,
    /// The Total Invoice Amount/Value.
    #[serde(default)]
    pub total_invoice_amount: Option<f64>,
}

impl ShipmentExtraction {
    /// Blank strings are treated as "not found".
    pub fn sanitized(mut self) -> Self {
        for slot in [
            &mut self.bill_of_lading_number,
            &mut self.container_number,
            &mut self.consignee_name,
            &mut self.consignee_address,
        ] {
            *slot = slot
                .take()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
        self
    }
}

/// Extraction plus the derived averages handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentResponse {
    #[serde(flatten)]
    pub extraction: ShipmentExtraction,
    #[serde(default)]
    pub average_gross_weight: Option<f64>,
    #[serde(default)]
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShipmentField {
    BillOfLadingNumber,
    ContainerNumber,
    ConsigneeName,
    ConsigneeAddress,
    DateOfExport,
    LineItemsCount,
    TotalGrossWeight,
    TotalInvoiceAmount,
    AverageGrossWeight,
    AveragePrice,
}

impl ShipmentField {
    pub const ALL: [ShipmentField; 10] = [
        ShipmentField::BillOfLadingNumber,
        ShipmentField::ContainerNumber,
        ShipmentField::ConsigneeName,
        ShipmentField::ConsigneeAddress,
        ShipmentField::DateOfExport,
        ShipmentField::LineItemsCount,
        ShipmentField::TotalGrossWeight,
        ShipmentField::TotalInvoiceAmount,
        ShipmentField::AverageGrossWeight,
        ShipmentField::AveragePrice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentField::BillOfLadingNumber => "bill_of_lading_number",
            ShipmentField::ContainerNumber => "container_number",
            ShipmentField::ConsigneeName => "consignee_name",
            ShipmentField::ConsigneeAddress => "consignee_address",
            ShipmentField::DateOfExport => "date_of_export",
            ShipmentField::LineItemsCount => "line_items_count",
            ShipmentField::TotalGrossWeight => "total_gross_weight",
            ShipmentField::TotalInvoiceAmount => "total_invoice_amount",
            ShipmentField::AverageGrossWeight => "average_gross_weight",
            ShipmentField::AveragePrice => "average_price",
        }
    }
}

impl fmt::Display for ShipmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed field value, used by the evaluation comparators.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Integer(i64),
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value:?}"),
        }
    }
}

impl ShipmentResponse {
    pub fn field(&self, field: ShipmentField) -> Option<FieldValue> {
        let extraction = &self.extraction;
        match field {
            ShipmentField::BillOfLadingNumber => {
                extraction.bill_of_lading_number.clone().map(FieldValue::Text)
            }
            ShipmentField::ContainerNumber => extraction.container_number.clone().map(FieldValue::Text),
            ShipmentField::ConsigneeName => extraction.consignee_name.clone().map(FieldValue::Text),
            ShipmentField::ConsigneeAddress => {
                extraction.consignee_address.clone().map(FieldValue::Text)
            }
            ShipmentField::DateOfExport => extraction.date_of_export.map(FieldValue::Date),
            ShipmentField::LineItemsCount => extraction
                .line_items_count
                .map(|count| FieldValue::Integer(i64::from(count))),
            ShipmentField::TotalGrossWeight => extraction.total_gross_weight.map(FieldValue::Float),
            ShipmentField::TotalInvoiceAmount => {
                extraction.total_invoice_amount.map(FieldValue::Float)
            }
            ShipmentField::AverageGrossWeight => self.average_gross_weight.map(FieldValue::Float),
            ShipmentField::AveragePrice => self.average_price.map(FieldValue::Float),
        }
    }
}

/// Accepts `YYYY-MM-DD` or a timestamp and keeps only the calendar date.
fn deserialize_calendar_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_calendar_date(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("not an ISO 8601 date: {text}"))),
    }
}

fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.date_naive());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|timestamp| timestamp.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_deserialize_as_none() {
        let extraction: ShipmentExtraction =
            serde_json::from_value(json!({ "bill_of_lading_number": "ZMLU34110002" })).unwrap();
        assert_eq!(extraction.bill_of_lading_number.as_deref(), Some("ZMLU34110002"));
        assert_eq!(extraction.date_of_export, None);
        assert_eq!(extraction.line_items_count, None);
    }

    #[test]
    fn timestamps_are_truncated_to_calendar_date() {
        let extraction: ShipmentExtraction =
            serde_json::from_value(json!({ "date_of_export": "2019-08-22T00:00:00Z" })).unwrap();
        assert_eq!(extraction.date_of_export, NaiveDate::from_ymd_opt(2019, 8, 22));

        let extraction: ShipmentExtraction =
            serde_json::from_value(json!({ "date_of_export": "2019-08-22T10:30:00" })).unwrap();
        assert_eq!(extraction.date_of_export, NaiveDate::from_ymd_opt(2019, 8, 22));
    }

    #[test]
    fn non_iso_date_is_rejected() {
        let result =
            serde_json::from_value::<ShipmentExtraction>(json!({ "date_of_export": "22 Aug 19" }));
        assert!(result.is_err());
    }

    #[test]
    fn blank_strings_are_sanitized_to_none() {
        let extraction = ShipmentExtraction {
            consignee_name: Some("   ".to_string()),
            container_number: Some(" MSCU1234567 ".to_string()),
            ..Default::default()
        }
        .sanitized();
        assert_eq!(extraction.consignee_name, None);
        assert_eq!(extraction.container_number.as_deref(), Some("MSCU1234567"));
    }

    #[test]
    fn response_flattens_extraction_fields() {
        let response = ShipmentResponse {
            extraction: ShipmentExtraction {
                line_items_count: Some(18),
                ..Default::default()
            },
            average_gross_weight: Some(902.5),
            average_price: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["line_items_count"], json!(18));
        assert_eq!(value["average_gross_weight"], json!(902.5));
        assert_eq!(value["average_price"], json!(null));

        let round: ShipmentResponse = serde_json::from_value(value).unwrap();
        assert_eq!(round, response);
    }

    #[test]
    fn field_accessor_exposes_typed_values() {
        let response = ShipmentResponse {
            extraction: ShipmentExtraction {
                line_items_count: Some(18),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            response.field(ShipmentField::LineItemsCount),
            Some(FieldValue::Integer(18))
        );
        assert_eq!(response.field(ShipmentField::ConsigneeName), None);
        assert_eq!(FieldValue::Float(16250.0).to_string(), "16250.0");
    }
}
