use crate::models::{ShipmentExtraction, ShipmentResponse};

/// `total / count`, or `None` when either operand is missing or the count is zero.
pub fn average(total: Option<f64>, count: Option<u32>) -> Option<f64> {
    match (total, count) {
        (Some(total), Some(count)) if count > 0 => {
            let value = total / f64::from(count);
            value.is_finite().then_some(value)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedAverages {
    pub average_gross_weight: Option<f64>,
    pub average_price: Option<f64>,
}

pub fn derive_averages(extraction: &ShipmentExtraction) -> DerivedAverages {
    DerivedAverages {
        average_gross_weight: average(extraction.total_gross_weight, extraction.line_items_count),
        average_price: average(extraction.total_invoice_amount, extraction.line_items_count),
    }
}

impl From<ShipmentExtraction> for ShipmentResponse {
    fn from(extraction: ShipmentExtraction) -> Self {
        let averages = derive_averages(&extraction);
        Self {
            extraction,
            average_gross_weight: averages.average_gross_weight,
            average_price: averages.average_price,
        }
    }
}
