/// Intent Router
/// Decides whether a text message is in scope and which processing mode answers it.
/// Matching is case-insensitive substring search; rules are evaluated in order, first match wins.
use crate::models::assistant::SuggestedAction;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentMode {
    /// Answer from the medical knowledge index
    /// Examples: "any treatment for eczema?", "home remedy for a rash"
    MedicalSearch,

    /// List specialists from the directory
    /// Examples: "find me a dermatologist", "can I book an appointment"
    DermatologistQuery,

    /// Free conversation with the assistant
    GeneralChat,
}

/// Off-topic markers; any hit rejects the message
const BLOCKED_KEYWORDS: [&str; 3] = ["code", "python", "java"];

const HEALTHCARE_KEYWORDS: [&str; 9] = [
    "skin", "rash", "acne", "doctor", "pain", "itch", "bump", "hello", "hi",
];

pub const REDIRECT_MESSAGE: &str = "I specialize only in skin health. Please ask a medical question.";

pub struct IntentRule {
    pub mode: IntentMode,
    pub predicate: fn(&str, bool) -> bool,
}

fn image_context(_message: &str, has_image_context: bool) -> bool {
    has_image_context
}

fn mentions_treatment(message: &str, _has_image_context: bool) -> bool {
    message.contains("treatment") || message.contains("remedy")
}

fn mentions_dermatologist(message: &str, _has_image_context: bool) -> bool {
    message.contains("dermatologist") || message.contains("appointment")
}

/// Ordered routing table. The image-context rule comes first on purpose:
/// with an image in play every message is treated as conversation about it.
pub const RULES: [IntentRule; 3] = [
    IntentRule {
        mode: IntentMode::GeneralChat,
        predicate: image_context,
    },
    IntentRule {
        mode: IntentMode::MedicalSearch,
        predicate: mentions_treatment,
    },
    IntentRule {
        mode: IntentMode::DermatologistQuery,
        predicate: mentions_dermatologist,
    },
];

pub struct IntentRouter;

impl IntentRouter {
    /// Keyword heuristic for "is this a skin-health question"
    pub fn is_healthcare_question(message: &str) -> bool {
        let message_lower = message.to_lowercase();

        for keyword in &BLOCKED_KEYWORDS {
            if message_lower.contains(keyword) {
                debug!("Rejected off-topic message: matched '{}'", keyword);
                return false;
            }
        }

        HEALTHCARE_KEYWORDS
            .iter()
            .any(|keyword| message_lower.contains(keyword))
    }

    pub fn determine_mode(message: &str, has_image_context: bool) -> IntentMode {
        let message_lower = message.to_lowercase();

        for rule in &RULES {
            if (rule.predicate)(&message_lower, has_image_context) {
                debug!("Routed message to {:?}", rule.mode);
                return rule.mode;
            }
        }

        debug!("Defaulting to GeneralChat");
        IntentMode::GeneralChat
    }

    /// Follow-up suggestions for a general chat reply
    pub fn followup_actions(message: &str) -> Vec<SuggestedAction> {
        let mut actions = vec![SuggestedAction::LearnMore];
        if message.to_lowercase().contains("pain") {
            actions.push(SuggestedAction::EmergencyContact);
        }
        actions
    }
}
