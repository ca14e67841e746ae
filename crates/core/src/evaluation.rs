use crate::models::{FieldValue, ShipmentExtraction, ShipmentField, ShipmentResponse};
use crate::similarity::ratio;
use crate::ShipmentError;
use chrono::NaiveDate;
use std::fmt::Write as _;
use std::path::Path;

pub const ADDRESS_MATCH_THRESHOLD: f64 = 0.8;
pub const FLOAT_TOLERANCE: f64 = 0.01;

const DISPLAY_WIDTH: usize = 20;
const RULE_WIDTH: usize = 110;

/// How a single field is compared against its expected value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparator {
    /// Lowercased, whitespace-collapsed equality.
    ExactText,
    /// Same normalization, then similarity ratio at or above `threshold`.
    FuzzyText { threshold: f64 },
    Date,
    Integer,
    /// Absolute difference at or below `tolerance`.
    Float { tolerance: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub reason: String,
}

impl MatchOutcome {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            matched: true,
            reason: reason.into(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            reason: reason.into(),
        }
    }
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl Comparator {
    pub fn compare(&self, extracted: Option<&FieldValue>, expected: Option<&FieldValue>) -> MatchOutcome {
        let (extracted, expected) = match (extracted, expected) {
            (None, None) => return MatchOutcome::pass("Both None"),
            (Some(extracted), Some(expected)) => (extracted, expected),
            (extracted, expected) => {
                return MatchOutcome::fail(format!(
                    "One is None: Extracted={}, Expected={}",
                    display_optional(extracted),
                    display_optional(expected)
                ))
            }
        };

        match self {
            Comparator::ExactText => {
                let (Some(left), Some(right)) = (as_text(extracted), as_text(expected)) else {
                    return type_error(extracted, expected);
                };
                let (left, right) = (normalize_text(left), normalize_text(right));
                if left == right {
                    MatchOutcome::pass("Exact Match")
                } else {
                    MatchOutcome::fail(format!("Mismatch: '{left}' != '{right}'"))
                }
            }
            Comparator::FuzzyText { threshold } => {
                let (Some(left), Some(right)) = (as_text(extracted), as_text(expected)) else {
                    return type_error(extracted, expected);
                };
                let (left, right) = (normalize_text(left), normalize_text(right));
                let score = ratio(&left, &right);
                if score >= *threshold {
                    MatchOutcome::pass(format!("Fuzzy Match ({})", percent(score)))
                } else {
                    MatchOutcome::fail(format!(
                        "Low Similarity ({}): '{left}' vs '{right}'",
                        percent(score)
                    ))
                }
            }
            Comparator::Date => match (extracted, expected) {
                (FieldValue::Date(left), FieldValue::Date(right)) if left == right => {
                    MatchOutcome::pass("Date Match")
                }
                (FieldValue::Date(left), FieldValue::Date(right)) => {
                    MatchOutcome::fail(format!("Date Mismatch: {left} != {right}"))
                }
                _ => type_error(extracted, expected),
            },
            Comparator::Integer => match (extracted, expected) {
                (FieldValue::Integer(left), FieldValue::Integer(right)) if left == right => {
                    MatchOutcome::pass("Count Match")
                }
                (FieldValue::Integer(left), FieldValue::Integer(right)) => {
                    MatchOutcome::fail(format!("Count Mismatch: {left} != {right}"))
                }
                _ => type_error(extracted, expected),
            },
            Comparator::Float { tolerance } => {
                let (Some(left), Some(right)) = (as_float(extracted), as_float(expected)) else {
                    return type_error(extracted, expected);
                };
                let diff = (left - right).abs();
                if diff <= *tolerance {
                    MatchOutcome::pass(format!("Float Match (Diff: {diff:.4})"))
                } else {
                    MatchOutcome::fail(format!(
                        "Float Mismatch: {left:?} != {right:?} (Diff: {diff})"
                    ))
                }
            }
        }
    }
}

fn as_text(value: &FieldValue) -> Option<&str> {
    match value {
        FieldValue::Text(text) => Some(text),
        _ => None,
    }
}

fn as_float(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Float(number) => Some(*number),
        FieldValue::Integer(number) => Some(*number as f64),
        _ => None,
    }
}

fn type_error(extracted: &FieldValue, expected: &FieldValue) -> MatchOutcome {
    MatchOutcome::fail(format!("Type Error: {extracted} vs {expected}"))
}

fn display_optional(value: Option<&FieldValue>) -> String {
    value.map_or_else(|| "None".to_string(), ToString::to_string)
}

fn percent(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

/// Field name to comparator rules, evaluated in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparatorTable {
    rules: Vec<(ShipmentField, Comparator)>,
}

impl Default for ComparatorTable {
    fn default() -> Self {
        let float = Comparator::Float {
            tolerance: FLOAT_TOLERANCE,
        };
        Self {
            rules: vec![
                (ShipmentField::BillOfLadingNumber, Comparator::ExactText),
                (ShipmentField::ContainerNumber, Comparator::ExactText),
                (ShipmentField::ConsigneeName, Comparator::ExactText),
                (
                    ShipmentField::ConsigneeAddress,
                    Comparator::FuzzyText {
                        threshold: ADDRESS_MATCH_THRESHOLD,
                    },
                ),
                (ShipmentField::DateOfExport, Comparator::Date),
                (ShipmentField::LineItemsCount, Comparator::Integer),
                (ShipmentField::TotalGrossWeight, float),
                (ShipmentField::TotalInvoiceAmount, float),
                (ShipmentField::AverageGrossWeight, float),
                (ShipmentField::AveragePrice, float),
            ],
        }
    }
}

impl ComparatorTable {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule, replacing any existing rule for the same field.
    pub fn with_rule(mut self, field: ShipmentField, comparator: Comparator) -> Self {
        match self.rules.iter_mut().find(|(existing, _)| *existing == field) {
            Some(rule) => rule.1 = comparator,
            None => self.rules.push((field, comparator)),
        }
        self
    }

    pub fn get(&self, field: ShipmentField) -> Option<Comparator> {
        self.rules
            .iter()
            .find(|(existing, _)| *existing == field)
            .map(|(_, comparator)| *comparator)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShipmentField, Comparator)> + '_ {
        self.rules.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Compares one field with the rule the table holds for it. Fields without a
/// rule fall back to plain equality.
pub fn is_match(
    table: &ComparatorTable,
    field: ShipmentField,
    extracted: Option<&FieldValue>,
    expected: Option<&FieldValue>,
) -> MatchOutcome {
    match table.get(field) {
        Some(comparator) => comparator.compare(extracted, expected),
        None => match (extracted, expected) {
            (None, None) => MatchOutcome::pass("Both None"),
            (Some(left), Some(right)) if left == right => MatchOutcome::pass("Generic Match"),
            (left, right) => MatchOutcome::fail(format!(
                "Generic Mismatch: {} != {}",
                display_optional(left),
                display_optional(right)
            )),
        },
    }
}

/// Expected values for one document pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth(pub ShipmentResponse);

impl Default for GroundTruth {
    /// The sample BOL `ZMLU34110002` and its packing list.
    fn default() -> Self {
        Self(ShipmentResponse {
            extraction: ShipmentExtraction {
                bill_of_lading_number: Some("ZMLU34110002".to_string()),
                container_number: Some("MSCU1234567".to_string()),
                consignee_name: Some("KABOFER TRADING INC".to_string()),
                consignee_address: Some("66-89 MAIN ST 8GH 643 FLUSHING, NY, 94089 US".to_string()),
                date_of_export: NaiveDate::from_ymd_opt(2019, 8, 22),
                line_items_count: Some(18),
                total_gross_weight: Some(16250.0),
                total_invoice_amount: Some(23211.24),
            },
            average_gross_weight: Some(902.7778),
            average_price: Some(1289.5133),
        })
    }
}

impl GroundTruth {
    pub fn from_json(json: &str) -> Result<Self, ShipmentError> {
        Ok(Self(serde_json::from_str(json)?))
    }

    pub fn load(path: &Path) -> Result<Self, ShipmentError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    Correct,
    /// Nothing extracted where a value was expected.
    Missed,
    /// A value was extracted but it does not match.
    Wrong,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldResult {
    pub field: ShipmentField,
    pub extracted: Option<FieldValue>,
    pub expected: Option<FieldValue>,
    pub status: FieldStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    /// Never incremented: every expected value is compared as a positive.
    pub true_negative: usize,
    pub total_fields: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn guarded_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

impl Tally {
    /// Accuracy keeps the `(TP + TN) / total` form even though TN is always
    /// zero here, which makes it equal to TP over all compared fields.
    pub fn scores(&self) -> Scores {
        let tp = self.true_positive as f64;
        let fp = self.false_positive as f64;
        let fn_ = self.false_negative as f64;
        let tn = self.true_negative as f64;

        let precision = guarded_div(tp, tp + fp);
        let recall = guarded_div(tp, tp + fn_);
        let accuracy = guarded_div(tp + tn, self.total_fields as f64);
        let f1 = guarded_div(2.0 * precision * recall, precision + recall);

        Scores {
            accuracy,
            precision,
            recall,
            f1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub rows: Vec<FieldResult>,
    pub tally: Tally,
    pub scores: Scores,
}

pub fn evaluate(
    extracted: &ShipmentResponse,
    ground_truth: &GroundTruth,
    table: &ComparatorTable,
) -> EvaluationReport {
    let mut tally = Tally {
        total_fields: table.len(),
        ..Default::default()
    };
    let mut rows = Vec::with_capacity(table.len());

    for (field, comparator) in table.iter() {
        let extracted_value = extracted.field(field);
        let expected_value = ground_truth.0.field(field);
        let outcome = comparator.compare(extracted_value.as_ref(), expected_value.as_ref());

        let status = if outcome.matched {
            tally.true_positive += 1;
            FieldStatus::Correct
        } else if extracted_value.is_none() && expected_value.is_some() {
            tally.false_negative += 1;
            FieldStatus::Missed
        } else {
            tally.false_positive += 1;
            FieldStatus::Wrong
        };

        rows.push(FieldResult {
            field,
            extracted: extracted_value,
            expected: expected_value,
            status,
            reason: outcome.reason,
        });
    }

    EvaluationReport {
        rows,
        tally,
        scores: tally.scores(),
    }
}

fn truncate_for_display(value: Option<&FieldValue>) -> String {
    let text = display_optional(value);
    if text.chars().count() > DISPLAY_WIDTH {
        let head: String = text.chars().take(DISPLAY_WIDTH).collect();
        format!("{head}...")
    } else {
        text
    }
}

impl EvaluationReport {
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let rule = "-".repeat(RULE_WIDTH);

        let _ = writeln!(
            out,
            "{:<25} | {:<23} | {:<23} | Status",
            "Field", "Extracted", "Expected"
        );
        let _ = writeln!(out, "{rule}");
        for row in &self.rows {
            let status = if row.status == FieldStatus::Correct {
                "PASS"
            } else {
                "FAIL"
            };
            let _ = writeln!(
                out,
                "{:<25} | {:<23} | {:<23} | {status} ({})",
                row.field.as_str(),
                truncate_for_display(row.extracted.as_ref()),
                truncate_for_display(row.expected.as_ref()),
                row.reason
            );
        }
        let _ = writeln!(out, "{rule}");
        out
    }

    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total Fields: {}", self.tally.total_fields);
        let _ = writeln!(out, "Correct (TP): {}", self.tally.true_positive);
        let _ = writeln!(out, "Wrong (FP):   {}", self.tally.false_positive);
        let _ = writeln!(out, "Missed (FN):  {}", self.tally.false_negative);
        let _ = writeln!(out, "{}", "-".repeat(20));
        let _ = writeln!(out, "Accuracy:  {:.2}%", self.scores.accuracy * 100.0);
        let _ = writeln!(out, "Precision: {:.2}%", self.scores.precision * 100.0);
        let _ = writeln!(out, "Recall:    {:.2}%", self.scores.recall * 100.0);
        let _ = writeln!(out, "F1 Score:  {:.2}%", self.scores.f1 * 100.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_values() -> Vec<(ShipmentField, FieldValue)> {
        vec![
            (ShipmentField::BillOfLadingNumber, FieldValue::Text("ZMLU34110002".into())),
            (ShipmentField::ContainerNumber, FieldValue::Text("MSCU1234567".into())),
            (ShipmentField::ConsigneeName, FieldValue::Text("Kabofer Trading Inc".into())),
            (
                ShipmentField::ConsigneeAddress,
                FieldValue::Text("66-89 MAIN ST 8GH 643 FLUSHING, NY, 94089 US".into()),
            ),
            (
                ShipmentField::DateOfExport,
                FieldValue::Date(NaiveDate::from_ymd_opt(2019, 8, 22).unwrap()),
            ),
            (ShipmentField::LineItemsCount, FieldValue::Integer(18)),
            (ShipmentField::TotalGrossWeight, FieldValue::Float(16250.0)),
            (ShipmentField::TotalInvoiceAmount, FieldValue::Float(23211.24)),
            (ShipmentField::AverageGrossWeight, FieldValue::Float(902.7778)),
            (ShipmentField::AveragePrice, FieldValue::Float(1289.5133)),
        ]
    }

    #[test]
    fn every_field_matches_itself() {
        let table = ComparatorTable::default();
        for (field, value) in sample_values() {
            let outcome = is_match(&table, field, Some(&value), Some(&value));
            assert!(outcome.matched, "{field} should match itself: {}", outcome.reason);
        }
    }

    #[test]
    fn null_handling_applies_to_every_field() {
        let table = ComparatorTable::default();
        for (field, value) in sample_values() {
            assert!(is_match(&table, field, None, None).matched);
            assert!(!is_match(&table, field, None, Some(&value)).matched);
            assert!(!is_match(&table, field, Some(&value), None).matched);
        }
    }

    #[test]
    fn exact_text_ignores_case_and_whitespace_runs() {
        let outcome = Comparator::ExactText.compare(
            Some(&FieldValue::Text("  KABOFER   trading\tINC ".into())),
            Some(&FieldValue::Text("Kabofer Trading Inc".into())),
        );
        assert!(outcome.matched);
        assert_eq!(outcome.reason, "Exact Match");
    }

    #[test]
    fn fuzzy_address_with_only_case_and_spacing_changes_is_full_similarity() {
        let comparator = Comparator::FuzzyText {
            threshold: ADDRESS_MATCH_THRESHOLD,
        };
        let outcome = comparator.compare(
            Some(&FieldValue::Text("66-89 main st  8gh 643\nflushing, ny, 94089 us".into())),
            Some(&FieldValue::Text("66-89 MAIN ST 8GH 643 FLUSHING, NY, 94089 US".into())),
        );
        assert!(outcome.matched);
        assert_eq!(outcome.reason, "Fuzzy Match (100.0%)");
    }

    #[test]
    fn fuzzy_address_below_threshold_fails() {
        let comparator = Comparator::FuzzyText {
            threshold: ADDRESS_MATCH_THRESHOLD,
        };
        let outcome = comparator.compare(
            Some(&FieldValue::Text("1 Harbor Road, Oakland CA".into())),
            Some(&FieldValue::Text("66-89 MAIN ST 8GH 643 FLUSHING, NY, 94089 US".into())),
        );
        assert!(!outcome.matched);
        assert!(outcome.reason.starts_with("Low Similarity"));
    }

    #[test]
    fn float_tolerance_is_inclusive_of_one_cent() {
        let comparator = Comparator::Float {
            tolerance: FLOAT_TOLERANCE,
        };
        assert!(comparator
            .compare(Some(&FieldValue::Float(902.7777777)), Some(&FieldValue::Float(902.7778)))
            .matched);
        assert!(!comparator
            .compare(Some(&FieldValue::Float(902.80)), Some(&FieldValue::Float(902.7778)))
            .matched);
    }

    #[test]
    fn date_and_count_are_strict() {
        let day = |d| FieldValue::Date(NaiveDate::from_ymd_opt(2019, 8, d).unwrap());
        assert!(!Comparator::Date.compare(Some(&day(21)), Some(&day(22))).matched);
        assert!(!Comparator::Integer
            .compare(Some(&FieldValue::Integer(17)), Some(&FieldValue::Integer(18)))
            .matched);
    }

    #[test]
    fn mismatched_types_are_reported() {
        let outcome = Comparator::Date.compare(
            Some(&FieldValue::Text("2019-08-22".into())),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2019, 8, 22).unwrap())),
        );
        assert!(!outcome.matched);
        assert!(outcome.reason.starts_with("Type Error"));
    }

    #[test]
    fn table_rules_can_be_replaced_as_data() {
        let table = ComparatorTable::default().with_rule(
            ShipmentField::ConsigneeName,
            Comparator::FuzzyText { threshold: 0.5 },
        );
        assert_eq!(table.len(), 10);
        assert_eq!(
            table.get(ShipmentField::ConsigneeName),
            Some(Comparator::FuzzyText { threshold: 0.5 })
        );
    }

    #[test]
    fn fields_without_a_rule_use_plain_equality() {
        let table = ComparatorTable::empty();
        let value = FieldValue::Integer(3);
        assert_eq!(
            is_match(&table, ShipmentField::LineItemsCount, Some(&value), Some(&value)).reason,
            "Generic Match"
        );
    }

    #[test]
    fn scenario_totals_agree_with_derived_averages() {
        let extraction = ShipmentExtraction {
            bill_of_lading_number: Some("ZMLU34110002".to_string()),
            total_gross_weight: Some(16250.0),
            total_invoice_amount: Some(23211.24),
            line_items_count: Some(18),
            ..Default::default()
        };
        let report = evaluate(
            &ShipmentResponse::from(extraction),
            &GroundTruth::default(),
            &ComparatorTable::default(),
        );

        let status_of = |field| {
            report
                .rows
                .iter()
                .find(|row| row.field == field)
                .map(|row| row.status)
        };
        for field in [
            ShipmentField::BillOfLadingNumber,
            ShipmentField::LineItemsCount,
            ShipmentField::TotalGrossWeight,
            ShipmentField::TotalInvoiceAmount,
            ShipmentField::AverageGrossWeight,
            ShipmentField::AveragePrice,
        ] {
            assert_eq!(status_of(field), Some(FieldStatus::Correct), "{field}");
        }
        assert_eq!(status_of(ShipmentField::ContainerNumber), Some(FieldStatus::Missed));

        assert_eq!(report.tally.true_positive, 6);
        assert_eq!(report.tally.false_negative, 4);
        assert_eq!(report.tally.false_positive, 0);
        assert_eq!(report.tally.true_negative, 0);
        assert!((report.scores.accuracy - 0.6).abs() < 1e-12);
        assert!((report.scores.precision - 1.0).abs() < 1e-12);
        assert!((report.scores.recall - 0.6).abs() < 1e-12);
        assert!((report.scores.f1 - 0.75).abs() < 1e-12);
    }

    #[test]
    fn wrong_values_count_as_false_positives() {
        let mut response = GroundTruth::default().0;
        response.extraction.container_number = Some("TGHU0000000".to_string());
        let report = evaluate(&response, &GroundTruth::default(), &ComparatorTable::default());
        assert_eq!(report.tally.true_positive, 9);
        assert_eq!(report.tally.false_positive, 1);
        assert_eq!(report.tally.false_negative, 0);
    }

    #[test]
    fn scores_are_zero_when_nothing_can_be_counted() {
        assert_eq!(Tally::default().scores(), Scores::default());
    }

    #[test]
    fn ground_truth_loads_from_json() {
        let truth = GroundTruth::from_json(
            r#"{"bill_of_lading_number": "ABC", "date_of_export": "2024-01-12", "line_items_count": 3}"#,
        )
        .unwrap();
        assert_eq!(truth.0.extraction.bill_of_lading_number.as_deref(), Some("ABC"));
        assert_eq!(truth.0.extraction.date_of_export, NaiveDate::from_ymd_opt(2024, 1, 12));
        assert_eq!(truth.0.average_price, None);
    }

    #[test]
    fn table_rendering_truncates_long_values() {
        let report = evaluate(
            &GroundTruth::default().0,
            &GroundTruth::default(),
            &ComparatorTable::default(),
        );
        let table = report.render_table();
        assert!(table.contains("66-89 MAIN ST 8GH 64..."));
        assert!(table.contains("PASS (Exact Match)"));
        assert!(report.render_summary().contains("F1 Score:  100.00%"));
    }
}
