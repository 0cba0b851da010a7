//! System prompts, the save tool schema, and the classification prompt.

use serde_json::json;

use crate::agent::capability::Capability;
use crate::llm::ToolDefinition;
use crate::onboarding::state::{OnboardingState, domain_key, state_title};

/// Name of the tool onboarding agents call to persist one state's data.
pub const SAVE_TOOL_NAME: &str = "save_step_data";

/// Tool definition handed to onboarding agents.
///
/// The `data` payload is validated by the step validator on submission, so
/// the schema here stays deliberately loose.
pub fn save_tool() -> ToolDefinition {
    ToolDefinition {
        name: SAVE_TOOL_NAME.to_string(),
        description: "Save the structured data collected for the user's current onboarding \
                      state. Call this once you have every required field for the state, \
                      using the field names given in your instructions."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "state": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 9,
                    "description": "The onboarding state number this data belongs to"
                },
                "data": {
                    "type": "object",
                    "description": "The collected fields for that state"
                }
            },
            "required": ["state", "data"]
        }),
    }
}

/// Build the system prompt for a capability.
///
/// Onboarding capabilities get the current state's collection instructions
/// plus a summary of what earlier states already gathered; the general
/// capability gets a plain coaching prompt.
pub fn system_prompt(capability: Capability, onboarding: &OnboardingState) -> String {
    let base = "\
You are Fit Coach, a conversational fitness coach helping a user set up their training profile.

Guidelines:
- Be concise. 1-3 sentences per response, ONE question at a time.
- Acknowledge what the user shares before asking the next question.
- If an answer is vague, ask a brief follow-up before moving on.
- Never invent values the user did not give you.";

    let instructions = match capability {
        Capability::General => {
            return format!(
                "{base}\n\nThe user has finished onboarding. Answer their fitness and \
                 nutrition questions using the profile context below. Do not try to \
                 collect onboarding data.{}",
                context_section(onboarding)
            );
        }
        Capability::Assessment => {
            "\
You are collecting the user's goals, experience, and constraints (states 1-3).
State field reference:
- state 1: goals (list from: lose_weight, build_muscle, improve_endurance, increase_strength, general_health, improve_mobility), optional motivation.
- state 2: experience_level (beginner/intermediate/advanced), current_activity (sedentary/light/moderate/high), optional training_years.
- state 3: equipment, injuries, limitations (all three lists, empty allowed)."
        }
        Capability::Planning => {
            "\
You are planning the user's training week (states 4-5).
State field reference:
- state 4: days_per_week (1-7), session_minutes (15-180), optional preferred_time (morning/afternoon/evening).
- state 5: preferred_styles (list from: strength, hypertrophy, cardio, hiit, yoga, mobility, sports), intensity (low/moderate/high)."
        }
        Capability::Nutrition => {
            "\
You are collecting nutrition and lifestyle data (states 6-8).
State field reference:
- state 6: meals_per_day (1-8), dietary_restrictions (list, empty allowed), optional cooks_at_home (boolean).
- state 7: protein_pct, carbs_pct, fat_pct (must sum to exactly 100), optional calorie_target (1000-6000).
- state 8: sleep_hours (3-14), stress_level (low/moderate/high), optional occupation_activity (seated/mixed/on_feet)."
        }
        Capability::Review => {
            "\
You are collecting the final body metrics (state 9) and closing out onboarding.
State field reference:
- state 9: height_cm (100-250), weight_kg (30-300), age (13-100), optional body_fat_pct.
After saving, tell the user their profile is ready to be created."
        }
    };

    format!(
        "{base}\n\n{instructions}\n\nThe user is currently on state {}: {}. \
         When you have every required field for that state, call {SAVE_TOOL_NAME} with the \
         state number and the collected fields. The user never sees the tool call.{}",
        onboarding.current_state,
        state_title(onboarding.current_state).unwrap_or("unknown"),
        context_section(onboarding)
    )
}

/// Summarize the already-collected context for the prompt.
fn context_section(onboarding: &OnboardingState) -> String {
    if onboarding.context.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    for state in 1..=9u8 {
        let Some(key) = domain_key(state) else { continue };
        if let Some(value) = onboarding.context.get(key) {
            lines.push(format!("- {key}: {value}"));
        }
    }
    format!("\n\nCollected so far:\n{}", lines.join("\n"))
}

/// Prompt for classifying a free-form query into a capability tag.
pub fn classification_prompt(message: &str) -> String {
    format!(
        "Classify the user message into exactly one category. Reply with the single \
         word only, no punctuation.\n\nCategories: assessment, planning, nutrition, \
         review, general.\n\nUser message: {message}"
    )
}
