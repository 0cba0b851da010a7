//! Agent capabilities and the fixed state→capability table.

use serde::{Deserialize, Serialize};

/// A conversational capability: one family of system prompt and tools.
///
/// Onboarding states map onto the first four; `General` answers free-form
/// questions and is the only capability available once onboarding is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// States 1–3: goals, experience, constraints.
    Assessment,
    /// States 4–5: schedule and workout planning.
    Planning,
    /// States 6–8: eating habits, macro targets, lifestyle.
    Nutrition,
    /// State 9: body metrics and final review.
    Review,
    /// Free-form coaching questions.
    General,
}

impl Capability {
    /// The capability responsible for an onboarding state.
    pub fn for_state(state: u8) -> Option<Self> {
        match state {
            1..=3 => Some(Self::Assessment),
            4..=5 => Some(Self::Planning),
            6..=8 => Some(Self::Nutrition),
            9 => Some(Self::Review),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assessment => "assessment",
            Self::Planning => "planning",
            Self::Nutrition => "nutrition",
            Self::Review => "review",
            Self::General => "general",
        }
    }

    /// Whether this capability drives onboarding data collection (and so
    /// carries the save tool).
    pub fn is_onboarding(&self) -> bool {
        !matches!(self, Self::General)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "assessment" => Ok(Self::Assessment),
            "planning" => Ok(Self::Planning),
            "nutrition" => Ok(Self::Nutrition),
            "review" => Ok(Self::Review),
            "general" => Ok(Self::General),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}
