//! Budget aggregation: currency strings → totals, percentages, display order.
//!
//! The display rules are fixed for compatibility with the budget panel:
//! one-decimal rounding per category (so percentages may sum to 100.1),
//! zero-percent categories hidden, descending percent, ties broken by the
//! category's enumeration order.

use crate::breakdown::{Budget, BudgetCategory};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One row of the budget display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLine {
    pub key: BudgetCategory,
    pub name: String,
    pub amount: f64,
    pub percent: f64,
    pub color_key: String,
}

/// Aggregated budget: the grand total plus the visible rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetDisplay {
    pub total: f64,
    pub lines: Vec<BudgetLine>,
}

/// Parse a currency string into a non-negative amount.
///
/// Every character other than ASCII digits and `.` is dropped, so
/// `"RM 1,500"` → 1500 and `"-30"` → 30. Anything that still fails to parse
/// (`"TBD"`, `"1.2.3"`) counts as 0.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Render an amount as `"RM {integer-or-decimal}"`, at most two decimals.
///
/// Amounts too large to scale by 100 are rendered unrounded; non-finite
/// input renders as `"RM 0"`.
pub fn format_rm(amount: f64) -> String {
    let scaled = amount * 100.0;
    let rounded = if scaled.is_finite() {
        scaled.round() / 100.0
    } else if amount.is_finite() {
        amount
    } else {
        0.0
    };
    // `+ 0.0` folds -0 into 0
    format!("RM {}", rounded + 0.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Aggregate a budget mapping for display.
pub fn aggregate(budget: &Budget) -> BudgetDisplay {
    let amounts: Vec<(BudgetCategory, f64)> = BudgetCategory::ALL
        .iter()
        .map(|c| (*c, budget.amount(*c)))
        .collect();
    let total: f64 = amounts.iter().map(|(_, a)| a).sum();

    let mut lines: Vec<BudgetLine> = amounts
        .into_iter()
        .map(|(category, amount)| {
            let percent = if total > 0.0 {
                round1(amount / total * 100.0)
            } else {
                0.0
            };
            BudgetLine {
                key: category,
                name: category.display_name().to_string(),
                amount,
                percent,
                color_key: category.color_key().to_string(),
            }
        })
        .filter(|line| line.percent != 0.0)
        .collect();

    // Stable sort keeps enumeration order among equal percentages.
    lines.sort_by(|a, b| b.percent.partial_cmp(&a.percent).unwrap_or(Ordering::Equal));

    BudgetDisplay { total, lines }
}
