//! Breakdown normalisation: raw model text → a fully populated [`ScriptBreakdown`].
//!
//! The JSON schema in the prompt is a request, not a guarantee. Models wrap
//! their answer in ` ```json ` fences, prepend chatter, drop keys, emit
//! numbers as strings and invent budget categories. This module tolerates all
//! of that with fixed defaulting and coercion rules, and fails only when the
//! response holds no JSON object at all.
//!
//! ## Rules
//!
//! 1. Strip wrapper text: prefer the first fenced block, then slice from the
//!    first `{` to the last `}`. When that slice does not parse (braces in
//!    the surrounding prose), take the first `{` at which a complete object
//!    parses, ignoring whatever follows it.
//! 2. Parse; no parsable object anywhere is
//!    [`SceneSplitError::MalformedResponse`].
//! 3. Missing `scenes`/`characters`/`locations`/`props`/`budget` become empty.
//! 4. Scene `number` is coerced to an integer; missing, non-numeric or
//!    non-increasing values get the next sequential number. List fields that
//!    are not arrays become empty; `notes`/`budget` default to `""`.
//! 5. Budget: all seven categories present; numbers render as `"RM {n}"`;
//!    unknown keys are summed into `miscellaneous`, and keys that spell the
//!    same category (`talent`, `Talent`) are summed into it.

use crate::breakdown::{Budget, BudgetCategory, Scene, ScriptBreakdown, TimeOfDay};
use crate::error::SceneSplitError;
use crate::pipeline::budget::{format_rm, parse_amount};
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Top-level keys some models nest the breakdown under.
const WRAPPER_KEYS: [&str; 4] = ["breakdown", "script_data", "data", "analysis"];

/// Keys the breakdown object is expected to carry.
const EXPECTED_KEYS: [&str; 5] = ["scenes", "characters", "locations", "props", "budget"];

/// Normalise a raw model response into a [`ScriptBreakdown`].
///
/// Pure and deterministic: the same input always yields an equal output.
pub fn normalize_response(raw: &str) -> Result<ScriptBreakdown, SceneSplitError> {
    let root = parse_json_object(raw)?;
    Ok(normalize_object(unwrap_nested(&root)))
}

fn malformed(detail: &str, raw: &str) -> SceneSplitError {
    SceneSplitError::MalformedResponse {
        detail: detail.to_string(),
        snippet: raw.trim().chars().take(80).collect(),
    }
}

// ── Rule 1: strip wrapper text ───────────────────────────────────────────────

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap());

fn parse_json_object(raw: &str) -> Result<Map<String, Value>, SceneSplitError> {
    let fenced = RE_FENCED
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|inner| inner.contains('{'));
    let candidate = fenced.unwrap_or(raw);

    let (Some(start), Some(end)) = (candidate.find('{'), candidate.rfind('}')) else {
        return Err(malformed("no JSON object found in response", raw));
    };
    if end <= start {
        return Err(malformed("no JSON object found in response", raw));
    }

    let parse_error = match serde_json::from_str::<Value>(&candidate[start..=end]) {
        Ok(Value::Object(root)) => return Ok(root),
        Ok(_) => "top-level JSON value is not an object".to_string(),
        Err(e) => e.to_string(),
    };

    match first_object_from(candidate) {
        Some(root) => {
            debug!("Recovered JSON object past surrounding braces ({})", parse_error);
            Ok(root)
        }
        None => Err(malformed(&parse_error, raw)),
    }
}

/// First `{` offset at which a complete JSON object parses; text after the
/// object is ignored.
fn first_object_from(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(idx, _)| {
        match serde_json::Deserializer::from_str(&text[idx..])
            .into_iter::<Value>()
            .next()
        {
            Some(Ok(Value::Object(root))) => Some(root),
            _ => None,
        }
    })
}

/// Descend one level when the model wrapped the breakdown, e.g.
/// `{"breakdown": {"scenes": [...]}}`.
fn unwrap_nested(root: &Map<String, Value>) -> &Map<String, Value> {
    if EXPECTED_KEYS.iter().any(|k| root.contains_key(*k)) {
        return root;
    }
    WRAPPER_KEYS
        .iter()
        .filter_map(|k| root.get(*k).and_then(Value::as_object))
        .find(|inner| EXPECTED_KEYS.iter().any(|k| inner.contains_key(*k)))
        .unwrap_or(root)
}

// ── Rules 3–5: defaulting and coercion ───────────────────────────────────────

fn normalize_object(root: &Map<String, Value>) -> ScriptBreakdown {
    let scenes = normalize_scenes(root.get("scenes"));

    let mut characters = name_set(root.get("characters"));
    let mut locations = name_set(root.get("locations"));
    let mut props = name_set(root.get("props"));

    for scene in &scenes {
        characters.extend(scene.characters.iter().cloned());
        if !scene.location.is_empty() {
            locations.insert(scene.location.clone());
        }
        props.extend(scene.props.iter().cloned());
    }

    let budget = normalize_budget(root.get("budget"));

    debug!(
        "Normalised breakdown: {} scenes, {} characters, {} locations, {} props",
        scenes.len(),
        characters.len(),
        locations.len(),
        props.len()
    );

    ScriptBreakdown {
        scenes,
        characters,
        locations,
        props,
        budget,
    }
}

fn normalize_scenes(value: Option<&Value>) -> Vec<Scene> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut scenes = Vec::with_capacity(entries.len());
    // Given numbers fit in u32 and each entry adds at most one, so the u64
    // counter cannot overflow.
    let mut last_number = 0u64;

    for (idx, entry) in entries.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            warn!("Skipping scene entry {}: not an object", idx + 1);
            continue;
        };

        let number = match coerce_number(obj.get("number")).map(u64::from) {
            Some(n) if n > last_number => n,
            given => {
                if given.is_some() {
                    warn!(
                        "Scene number {:?} is not increasing; renumbered to {}",
                        given,
                        last_number + 1
                    );
                }
                last_number + 1
            }
        };
        last_number = number;

        scenes.push(normalize_scene(obj, number));
    }

    scenes
}

fn normalize_scene(obj: &Map<String, Value>, number: u64) -> Scene {
    let heading = text(obj.get("heading"));
    let (slug_location, slug_time) = parse_slugline(&heading);

    let location = match text(obj.get("location")) {
        l if l.is_empty() => slug_location,
        l => l,
    };
    let time = match text(obj.get("time")) {
        t if t.is_empty() => TimeOfDay::parse(&slug_time),
        t => TimeOfDay::parse(&t),
    };

    Scene {
        number,
        heading,
        location,
        time,
        characters: string_list(obj.get("characters")).into_iter().collect(),
        props: string_list(obj.get("props")),
        wardrobe: string_list(obj.get("wardrobe")),
        sfx: string_list(obj.get("sfx")),
        notes: text(obj.get("notes")),
        budget: currency_or_empty(obj.get("budget")),
    }
}

fn coerce_number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u32>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0 && *f <= u32::MAX as f64)
                    .map(|f| f as u32)
            })
        }
        _ => None,
    }
}

/// Scalar → trimmed string; anything else → `""`.
fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Array of scalars (or `{name}` objects) → non-empty strings. Non-arrays → empty.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(text(obj.get("name"))),
            other => Some(text(Some(other))),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Top-level aggregate: an array, or an object keyed by name.
fn name_set(value: Option<&Value>) -> IndexSet<String> {
    match value {
        Some(Value::Object(obj)) => obj
            .keys()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        other => string_list(other).into_iter().collect(),
    }
}

fn currency_or_empty(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => format_rm(n.as_f64().unwrap_or(0.0).max(0.0)),
        other => text(other),
    }
}

// ── Budget ───────────────────────────────────────────────────────────────────

fn normalize_budget(value: Option<&Value>) -> Budget {
    let mut budget = Budget::default();
    let Some(entries) = value.and_then(Value::as_object) else {
        return budget;
    };

    let mut unknown_total = 0.0;
    let mut saw_unknown = false;
    let mut seen: Vec<BudgetCategory> = Vec::new();

    for (key, raw) in entries {
        match BudgetCategory::from_key(key) {
            Some(category) if seen.contains(&category) => {
                let amount = budget.amount(category) + parse_amount(&category_currency(raw));
                warn!(
                    "Budget key '{}' repeats category {}; amounts summed",
                    key, category
                );
                budget.set(category, format_rm(amount));
            }
            Some(category) => {
                seen.push(category);
                budget.set(category, category_currency(raw));
            }
            None => {
                let amount = parse_amount(&category_currency(raw));
                warn!(
                    "Unknown budget category '{}' ({}) merged into miscellaneous",
                    key, amount
                );
                unknown_total += amount;
                saw_unknown = true;
            }
        }
    }

    if saw_unknown {
        let misc = budget.amount(BudgetCategory::Miscellaneous) + unknown_total;
        budget.set(BudgetCategory::Miscellaneous, format_rm(misc));
    }

    budget
}

fn category_currency(value: &Value) -> String {
    match value {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => format_rm(n.as_f64().unwrap_or(0.0).max(0.0)),
        // `{"amount": 500}` / `{"total": 500}`
        Value::Object(obj) => obj
            .get("amount")
            .or_else(|| obj.get("total"))
            .map(category_currency)
            .unwrap_or_else(|| format_rm(0.0)),
        _ => format_rm(0.0),
    }
}

// ── Slugline fallback ────────────────────────────────────────────────────────

static RE_SLUG_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:\d+[A-Z]?\s+)?(?:INT\.?\s*/\s*EXT\.?|EXT\.?\s*/\s*INT\.?|I/E\.?|INT\.|EXT\.|INT|EXT)\s+")
        .unwrap()
});

/// Split `INT. HOUSE - KITCHEN - NIGHT` into (`HOUSE - KITCHEN`, `NIGHT`).
fn parse_slugline(heading: &str) -> (String, String) {
    let unified = heading.replace(['\u{2013}', '\u{2014}'], "-");
    let rest = RE_SLUG_PREFIX.replace(&unified, "");
    let rest = rest.trim();
    match rest.rsplit_once(" - ") {
        Some((location, time)) => (location.trim().to_string(), time.trim().to_string()),
        None => (rest.to_string(), String::new()),
    }
}
