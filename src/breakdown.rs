//! Script breakdown data model.
//!
//! A [`ScriptBreakdown`] exclusively owns its [`Scene`] sequence and a
//! [`Budget`] that always carries all seven [`BudgetCategory`] keys. Values
//! are plain data: edits produce new snapshots (see [`ScriptBreakdown::with_budget_amount`])
//! rather than mutating shared state.

use crate::error::SceneSplitError;
use crate::pipeline::budget::{format_rm, parse_amount};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Budget categories ────────────────────────────────────────────────────

/// One of the seven fixed budget buckets.
///
/// Declaration order is the enumeration order used as the tie-break when
/// sorting the budget display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BudgetCategory {
    Talent,
    Location,
    PropsSet,
    WardrobeMakeup,
    SfxVfx,
    Crew,
    Miscellaneous,
}

impl BudgetCategory {
    /// All categories in enumeration order.
    pub const ALL: [BudgetCategory; 7] = [
        BudgetCategory::Talent,
        BudgetCategory::Location,
        BudgetCategory::PropsSet,
        BudgetCategory::WardrobeMakeup,
        BudgetCategory::SfxVfx,
        BudgetCategory::Crew,
        BudgetCategory::Miscellaneous,
    ];

    /// Wire key, as used in the JSON budget mapping.
    pub fn key(self) -> &'static str {
        match self {
            BudgetCategory::Talent => "talent",
            BudgetCategory::Location => "location",
            BudgetCategory::PropsSet => "propsSet",
            BudgetCategory::WardrobeMakeup => "wardrobeMakeup",
            BudgetCategory::SfxVfx => "sfxVfx",
            BudgetCategory::Crew => "crew",
            BudgetCategory::Miscellaneous => "miscellaneous",
        }
    }

    /// Human-readable label for the budget display.
    pub fn display_name(self) -> &'static str {
        match self {
            BudgetCategory::Talent => "Talent",
            BudgetCategory::Location => "Location",
            BudgetCategory::PropsSet => "Props & Set",
            BudgetCategory::WardrobeMakeup => "Wardrobe & Makeup",
            BudgetCategory::SfxVfx => "SFX & VFX",
            BudgetCategory::Crew => "Crew",
            BudgetCategory::Miscellaneous => "Miscellaneous",
        }
    }

    /// Stable colour token the presentation layer maps to a swatch.
    pub fn color_key(self) -> &'static str {
        match self {
            BudgetCategory::Talent => "indigo",
            BudgetCategory::Location => "emerald",
            BudgetCategory::PropsSet => "amber",
            BudgetCategory::WardrobeMakeup => "pink",
            BudgetCategory::SfxVfx => "violet",
            BudgetCategory::Crew => "sky",
            BudgetCategory::Miscellaneous => "slate",
        }
    }

    /// Match a key leniently: case, spaces, `_`, `-` and `&` are ignored,
    /// so `props_set`, `Props & Set` and `PROPSSET` all resolve.
    pub fn from_key(key: &str) -> Option<Self> {
        let canonical: String = key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match canonical.as_str() {
            "talent" => Some(BudgetCategory::Talent),
            "location" => Some(BudgetCategory::Location),
            "propsset" => Some(BudgetCategory::PropsSet),
            "wardrobemakeup" => Some(BudgetCategory::WardrobeMakeup),
            "sfxvfx" => Some(BudgetCategory::SfxVfx),
            "crew" => Some(BudgetCategory::Crew),
            "miscellaneous" | "misc" => Some(BudgetCategory::Miscellaneous),
            _ => None,
        }
    }

    /// Position in [`BudgetCategory::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl fmt::Display for BudgetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for BudgetCategory {
    type Err = SceneSplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BudgetCategory::from_key(s).ok_or_else(|| SceneSplitError::UnknownBudgetCategory(s.to_string()))
    }
}

// ── Budget mapping ───────────────────────────────────────────────────────

/// Category → currency string. Every category is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "IndexMap<BudgetCategory, String>",
    into = "IndexMap<BudgetCategory, String>"
)]
pub struct Budget {
    amounts: IndexMap<BudgetCategory, String>,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            amounts: BudgetCategory::ALL
                .iter()
                .map(|c| (*c, format_rm(0.0)))
                .collect(),
        }
    }
}

impl From<IndexMap<BudgetCategory, String>> for Budget {
    fn from(mut raw: IndexMap<BudgetCategory, String>) -> Self {
        let amounts = BudgetCategory::ALL
            .iter()
            .map(|c| (*c, raw.shift_remove(c).unwrap_or_else(|| format_rm(0.0))))
            .collect();
        Self { amounts }
    }
}

impl From<Budget> for IndexMap<BudgetCategory, String> {
    fn from(b: Budget) -> Self {
        b.amounts
    }
}

impl Budget {
    /// Raw currency string for a category, e.g. `"RM 500"` or `"TBD"`.
    pub fn get(&self, category: BudgetCategory) -> &str {
        self.amounts
            .get(&category)
            .map(String::as_str)
            .unwrap_or("RM 0")
    }

    /// Parsed non-negative amount for a category (unparsable → 0).
    pub fn amount(&self, category: BudgetCategory) -> f64 {
        parse_amount(self.get(category))
    }

    /// Sum of all category amounts.
    pub fn total(&self) -> f64 {
        BudgetCategory::ALL.iter().map(|c| self.amount(*c)).sum()
    }

    pub fn set(&mut self, category: BudgetCategory, value: impl Into<String>) {
        self.amounts.insert(category, value.into());
    }

    /// Copy of this budget with one category replaced.
    pub fn with(&self, category: BudgetCategory, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.set(category, value);
        next
    }

    /// Iterate `(category, raw string)` in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (BudgetCategory, &str)> {
        self.amounts.iter().map(|(c, v)| (*c, v.as_str()))
    }
}

// ── Scenes ───────────────────────────────────────────────────────────────

/// Time of day from a slugline. Open enum: unknown text is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TimeOfDay {
    Day,
    Night,
    Dawn,
    Dusk,
    Other(String),
}

impl TimeOfDay {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "DAY" => TimeOfDay::Day,
            "NIGHT" => TimeOfDay::Night,
            "DAWN" => TimeOfDay::Dawn,
            "DUSK" => TimeOfDay::Dusk,
            _ => TimeOfDay::Other(trimmed.to_string()),
        }
    }

    /// No time given at all.
    pub fn is_unspecified(&self) -> bool {
        matches!(self, TimeOfDay::Other(s) if s.is_empty())
    }

    pub fn as_str(&self) -> &str {
        match self {
            TimeOfDay::Day => "DAY",
            TimeOfDay::Night => "NIGHT",
            TimeOfDay::Dawn => "DAWN",
            TimeOfDay::Dusk => "DUSK",
            TimeOfDay::Other(s) => s,
        }
    }
}

impl Default for TimeOfDay {
    fn default() -> Self {
        TimeOfDay::Other(String::new())
    }
}

impl From<String> for TimeOfDay {
    fn from(s: String) -> Self {
        TimeOfDay::parse(&s)
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slugline-delimited unit of a script.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Position in the script; unique and strictly increasing.
    pub number: u64,
    /// Raw slugline, e.g. `INT. KITCHEN - NIGHT`.
    pub heading: String,
    pub location: String,
    pub time: TimeOfDay,
    /// Speaking and non-speaking characters, first-seen order.
    pub characters: IndexSet<String>,
    pub props: Vec<String>,
    pub wardrobe: Vec<String>,
    pub sfx: Vec<String>,
    pub notes: String,
    /// Free-text currency string, e.g. `"RM 500"`.
    pub budget: String,
}

// ── Breakdown ────────────────────────────────────────────────────────────

/// The structured extraction derived from a script.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptBreakdown {
    pub scenes: Vec<Scene>,
    pub characters: IndexSet<String>,
    pub locations: IndexSet<String>,
    pub props: IndexSet<String>,
    pub budget: Budget,
}

/// Quick-access counts for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownSummary {
    pub total_scenes: usize,
    pub total_characters: usize,
    pub total_locations: usize,
    pub total_props: usize,
    pub estimated_budget: f64,
}

impl ScriptBreakdown {
    pub fn summary(&self) -> BreakdownSummary {
        BreakdownSummary {
            total_scenes: self.scenes.len(),
            total_characters: self.characters.len(),
            total_locations: self.locations.len(),
            total_props: self.props.len(),
            estimated_budget: self.budget.total(),
        }
    }

    pub fn scene(&self, number: u64) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.number == number)
    }

    /// Copy with one budget category overridden by a numeric amount.
    pub fn with_budget_amount(&self, category: BudgetCategory, amount: f64) -> Self {
        Self {
            budget: self.budget.with(category, format_rm(amount.max(0.0))),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_has_all_categories_at_zero() {
        let b = Budget::default();
        let keys: Vec<_> = b.iter().map(|(c, _)| c).collect();
        assert_eq!(keys, BudgetCategory::ALL.to_vec());
        assert!(b.iter().all(|(_, v)| v == "RM 0"));
    }

    #[test]
    fn budget_deserialises_with_missing_keys_filled() {
        let b: Budget = serde_json::from_str(r#"{"crew":"RM 900","talent":"RM 400"}"#).unwrap();
        assert_eq!(b.get(BudgetCategory::Crew), "RM 900");
        assert_eq!(b.get(BudgetCategory::SfxVfx), "RM 0");
        // Enumeration order restored regardless of input order.
        assert_eq!(b.iter().next().map(|(c, _)| c), Some(BudgetCategory::Talent));
    }

    #[test]
    fn budget_serialises_camel_case_keys() {
        let json = serde_json::to_value(Budget::default()).unwrap();
        assert!(json.get("propsSet").is_some());
        assert!(json.get("wardrobeMakeup").is_some());
        assert!(json.get("sfxVfx").is_some());
    }

    #[test]
    fn category_lenient_keys() {
        assert_eq!(BudgetCategory::from_key("props_set"), Some(BudgetCategory::PropsSet));
        assert_eq!(BudgetCategory::from_key("Props & Set"), Some(BudgetCategory::PropsSet));
        assert_eq!(BudgetCategory::from_key("SFX-VFX"), Some(BudgetCategory::SfxVfx));
        assert_eq!(BudgetCategory::from_key("catering"), None);
        assert!("catering".parse::<BudgetCategory>().is_err());
    }

    #[test]
    fn time_of_day_round_trips_unknown_text() {
        assert_eq!(TimeOfDay::parse("night"), TimeOfDay::Night);
        assert_eq!(
            TimeOfDay::parse("Continuous"),
            TimeOfDay::Other("Continuous".into())
        );
        assert!(TimeOfDay::parse("  ").is_unspecified());
        let json = serde_json::to_string(&TimeOfDay::Dusk).unwrap();
        assert_eq!(json, "\"DUSK\"");
    }

    #[test]
    fn budget_override_is_a_new_snapshot() {
        let original = ScriptBreakdown::default();
        let edited = original.with_budget_amount(BudgetCategory::Crew, 1200.0);
        assert_eq!(original.budget.get(BudgetCategory::Crew), "RM 0");
        assert_eq!(edited.budget.get(BudgetCategory::Crew), "RM 1200");
        assert_eq!(edited.summary().estimated_budget, 1200.0);
    }
}
