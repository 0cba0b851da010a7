//! Step validator — a pure, per-state rule table.
//!
//! Input: the raw payload the caller claims to be submitting for a state.
//! Output: either a normalized field set or the full list of field errors.
//! No side effects, no I/O. Unknown fields and missing required fields are
//! errors, never silently defaulted.

use serde_json::{Map, Value};

use crate::error::FieldError;

const GOALS: &[&str] = &[
    "lose_weight",
    "build_muscle",
    "improve_endurance",
    "increase_strength",
    "general_health",
    "improve_mobility",
];
const EXPERIENCE_LEVELS: &[&str] = &["beginner", "intermediate", "advanced"];
const ACTIVITY_LEVELS: &[&str] = &["sedentary", "light", "moderate", "high"];
const PREFERRED_TIMES: &[&str] = &["morning", "afternoon", "evening"];
const WORKOUT_STYLES: &[&str] = &[
    "strength",
    "hypertrophy",
    "cardio",
    "hiit",
    "yoga",
    "mobility",
    "sports",
];
const INTENSITIES: &[&str] = &["low", "moderate", "high"];
const STRESS_LEVELS: &[&str] = &["low", "moderate", "high"];
const OCCUPATION_ACTIVITIES: &[&str] = &["seated", "mixed", "on_feet"];

const MAX_TEXT_LEN: usize = 500;
const MAX_LIST_ITEM_LEN: usize = 100;

/// Validate a payload against the rule table for `state`.
///
/// Returns the normalized field set (trimmed strings, lowercased enum
/// values, deduplicated lists) or every field error found.
pub fn validate_step(state: u8, payload: &Value) -> Result<Map<String, Value>, Vec<FieldError>> {
    let Some(object) = payload.as_object() else {
        return Err(vec![FieldError::new("payload", "must be a JSON object")]);
    };

    let mut checker = Checker::new(object);
    match state {
        1 => {
            checker.require_string_list("goals", Some(GOALS), false);
            checker.optional_string("motivation", MAX_TEXT_LEN);
        }
        2 => {
            checker.require_enum("experience_level", EXPERIENCE_LEVELS);
            checker.require_enum("current_activity", ACTIVITY_LEVELS);
            checker.optional_int("training_years", 0, 60);
        }
        3 => {
            checker.require_string_list("equipment", None, true);
            checker.require_string_list("injuries", None, true);
            checker.require_string_list("limitations", None, true);
        }
        4 => {
            checker.require_int("days_per_week", 1, 7);
            checker.require_int("session_minutes", 15, 180);
            checker.optional_enum("preferred_time", PREFERRED_TIMES);
        }
        5 => {
            checker.require_string_list("preferred_styles", Some(WORKOUT_STYLES), false);
            checker.require_enum("intensity", INTENSITIES);
        }
        6 => {
            checker.require_int("meals_per_day", 1, 8);
            checker.require_string_list("dietary_restrictions", None, true);
            checker.optional_bool("cooks_at_home");
        }
        7 => {
            checker.require_int("protein_pct", 0, 100);
            checker.require_int("carbs_pct", 0, 100);
            checker.require_int("fat_pct", 0, 100);
            checker.optional_int("calorie_target", 1000, 6000);
            checker.check_macro_sum();
        }
        8 => {
            checker.require_number("sleep_hours", 3.0, 14.0);
            checker.require_enum("stress_level", STRESS_LEVELS);
            checker.optional_enum("occupation_activity", OCCUPATION_ACTIVITIES);
        }
        9 => {
            checker.require_number("height_cm", 100.0, 250.0);
            checker.require_number("weight_kg", 30.0, 300.0);
            checker.require_int("age", 13, 100);
            checker.optional_number("body_fat_pct", 3.0, 60.0);
        }
        other => {
            return Err(vec![FieldError::new(
                "state",
                format!("no rule table for state {other}"),
            )]);
        }
    }
    checker.finish()
}

/// Accumulates normalized fields and errors while walking one rule table.
struct Checker<'a> {
    payload: &'a Map<String, Value>,
    normalized: Map<String, Value>,
    errors: Vec<FieldError>,
    known: Vec<&'static str>,
}

impl<'a> Checker<'a> {
    fn new(payload: &'a Map<String, Value>) -> Self {
        Self {
            payload,
            normalized: Map::new(),
            errors: Vec::new(),
            known: Vec::new(),
        }
    }

    fn finish(mut self) -> Result<Map<String, Value>, Vec<FieldError>> {
        for key in self.payload.keys() {
            if !self.known.contains(&key.as_str()) {
                self.errors.push(FieldError::new(key, "unknown field"));
            }
        }
        if self.errors.is_empty() {
            Ok(self.normalized)
        } else {
            Err(self.errors)
        }
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    // ── Field rules ─────────────────────────────────────────────────

    fn require_enum(&mut self, field: &'static str, allowed: &[&str]) {
        self.known.push(field);
        match self.payload.get(field) {
            Some(value) => self.check_enum(field, value, allowed),
            None => self.error(field, "missing required field"),
        }
    }

    fn optional_enum(&mut self, field: &'static str, allowed: &[&str]) {
        self.known.push(field);
        if let Some(value) = self.payload.get(field) {
            self.check_enum(field, value, allowed);
        }
    }

    fn check_enum(&mut self, field: &str, value: &Value, allowed: &[&str]) {
        match value.as_str() {
            Some(s) => {
                let canonical = s.trim().to_lowercase();
                if allowed.contains(&canonical.as_str()) {
                    self.normalized
                        .insert(field.to_string(), Value::String(canonical));
                } else {
                    self.error(field, format!("must be one of: {}", allowed.join(", ")));
                }
            }
            None => self.error(field, "must be a string"),
        }
    }

    fn require_int(&mut self, field: &'static str, min: i64, max: i64) {
        self.known.push(field);
        match self.payload.get(field) {
            Some(value) => self.check_int(field, value, min, max),
            None => self.error(field, "missing required field"),
        }
    }

    fn optional_int(&mut self, field: &'static str, min: i64, max: i64) {
        self.known.push(field);
        if let Some(value) = self.payload.get(field) {
            self.check_int(field, value, min, max);
        }
    }

    fn check_int(&mut self, field: &str, value: &Value, min: i64, max: i64) {
        match value.as_i64() {
            Some(n) if (min..=max).contains(&n) => {
                self.normalized.insert(field.to_string(), Value::from(n));
            }
            Some(_) => self.error(field, format!("must be between {min} and {max}")),
            None => self.error(field, "must be an integer"),
        }
    }

    fn require_number(&mut self, field: &'static str, min: f64, max: f64) {
        self.known.push(field);
        match self.payload.get(field) {
            Some(value) => self.check_number(field, value, min, max),
            None => self.error(field, "missing required field"),
        }
    }

    fn optional_number(&mut self, field: &'static str, min: f64, max: f64) {
        self.known.push(field);
        if let Some(value) = self.payload.get(field) {
            self.check_number(field, value, min, max);
        }
    }

    fn check_number(&mut self, field: &str, value: &Value, min: f64, max: f64) {
        match value.as_f64() {
            Some(n) if n >= min && n <= max => {
                self.normalized.insert(field.to_string(), Value::from(n));
            }
            Some(_) => self.error(field, format!("must be between {min} and {max}")),
            None => self.error(field, "must be a number"),
        }
    }

    /// A list of strings. With `allowed`, each item must be a member of the
    /// given set; otherwise items are free text up to the item length cap.
    fn require_string_list(
        &mut self,
        field: &'static str,
        allowed: Option<&[&str]>,
        allow_empty: bool,
    ) {
        self.known.push(field);
        let Some(value) = self.payload.get(field) else {
            self.error(field, "missing required field");
            return;
        };
        let Some(items) = value.as_array() else {
            self.error(field, "must be a list of strings");
            return;
        };
        if items.is_empty() && !allow_empty {
            self.error(field, "must not be empty");
            return;
        }

        let mut normalized: Vec<Value> = Vec::with_capacity(items.len());
        let mut seen: Vec<String> = Vec::new();
        for item in items {
            let Some(s) = item.as_str() else {
                self.error(field, "every entry must be a string");
                return;
            };
            let canonical = match allowed {
                Some(set) => {
                    let lowered = s.trim().to_lowercase();
                    if !set.contains(&lowered.as_str()) {
                        self.error(
                            field,
                            format!("entries must be one of: {}", set.join(", ")),
                        );
                        return;
                    }
                    lowered
                }
                None => {
                    let trimmed = s.trim().to_string();
                    if trimmed.is_empty() {
                        self.error(field, "entries must not be blank");
                        return;
                    }
                    if trimmed.chars().count() > MAX_LIST_ITEM_LEN {
                        self.error(
                            field,
                            format!("entries must be at most {MAX_LIST_ITEM_LEN} characters"),
                        );
                        return;
                    }
                    trimmed
                }
            };
            if !seen.contains(&canonical) {
                seen.push(canonical.clone());
                normalized.push(Value::String(canonical));
            }
        }
        self.normalized
            .insert(field.to_string(), Value::Array(normalized));
    }

    fn optional_string(&mut self, field: &'static str, max_len: usize) {
        self.known.push(field);
        let Some(value) = self.payload.get(field) else {
            return;
        };
        match value.as_str() {
            Some(s) => {
                let trimmed = s.trim();
                if trimmed.chars().count() > max_len {
                    self.error(field, format!("must be at most {max_len} characters"));
                } else if !trimmed.is_empty() {
                    self.normalized
                        .insert(field.to_string(), Value::String(trimmed.to_string()));
                }
            }
            None => self.error(field, "must be a string"),
        }
    }

    fn optional_bool(&mut self, field: &'static str) {
        self.known.push(field);
        let Some(value) = self.payload.get(field) else {
            return;
        };
        match value.as_bool() {
            Some(b) => {
                self.normalized.insert(field.to_string(), Value::Bool(b));
            }
            None => self.error(field, "must be a boolean"),
        }
    }

    /// Macro percentages must sum to exactly 100. Only checked once the
    /// individual fields validated.
    fn check_macro_sum(&mut self) {
        let pcts: Option<Vec<i64>> = ["protein_pct", "carbs_pct", "fat_pct"]
            .iter()
            .map(|f| self.normalized.get(*f).and_then(Value::as_i64))
            .collect();
        if let Some(pcts) = pcts {
            let sum: i64 = pcts.iter().sum();
            if sum != 100 {
                self.error(
                    "macros",
                    format!("protein_pct + carbs_pct + fat_pct must sum to 100 (got {sum})"),
                );
            }
        }
    }
}
