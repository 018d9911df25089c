//! Prompts for LLM-based script breakdown.
//!
//! Centralising every prompt here means changing the requested schema is a
//! one-place edit, and tests can inspect the prompt without a live model.
//!
//! Callers can override the default via [`crate::config::AnalysisConfig::system_prompt`];
//! the constants here are used only when no override is provided.

/// Default instruction describing the JSON breakdown the model must return.
pub const BREAKDOWN_SYSTEM_PROMPT: &str = r#"You are an experienced first assistant director preparing a script breakdown for a film production in Malaysia.

Read the screenplay supplied by the user and return ONE JSON object with exactly this shape:

{
  "scenes": [
    {
      "number": 1,
      "heading": "INT. KITCHEN - NIGHT",
      "location": "KITCHEN",
      "time": "NIGHT",
      "characters": ["MAYA", "DEV"],
      "props": ["kettle", "letter"],
      "wardrobe": ["Maya: hospital scrubs"],
      "sfx": ["rain on window"],
      "notes": "Short production note",
      "budget": "RM 500"
    }
  ],
  "characters": ["MAYA", "DEV"],
  "locations": ["KITCHEN"],
  "props": ["kettle", "letter"],
  "budget": {
    "talent": "RM 0",
    "location": "RM 0",
    "propsSet": "RM 0",
    "wardrobeMakeup": "RM 0",
    "sfxVfx": "RM 0",
    "crew": "RM 0",
    "miscellaneous": "RM 0"
  }
}

Rules:
1. One entry in "scenes" per slugline, numbered from 1 in script order.
2. "time" is one of DAY, NIGHT, DAWN, DUSK, or the slugline's own wording.
3. Character names are written as they appear in the script, uppercase.
4. Every amount is a string in Malaysian Ringgit: "RM" followed by a number, no thousands separators.
5. Use only the seven budget keys shown. Put anything else under "miscellaneous".
6. Output ONLY the JSON object. No markdown fences, no commentary."#;

/// User turn carrying the script text.
pub fn script_message(script_text: &str) -> String {
    format!("Screenplay to break down:\n\n\"\"\"\n{}\n\"\"\"", script_text)
}
