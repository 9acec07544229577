use serde::{Deserialize, Serialize};

/// The step an in-progress checkout is waiting on. Absence of a stored
/// state means no checkout is active for the chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    AskReturning,
    AskEmailLookup,
    AskEmail,
    AskName,
    AskCompany,
    AskAddress,
    AskPhone,
    AskConfirm,
}

impl CheckoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskReturning => "ask_returning",
            Self::AskEmailLookup => "ask_email_lookup",
            Self::AskEmail => "ask_email",
            Self::AskName => "ask_name",
            Self::AskCompany => "ask_company",
            Self::AskAddress => "ask_address",
            Self::AskPhone => "ask_phone",
            Self::AskConfirm => "ask_confirm",
        }
    }
}

/// Customer data collected so far. The draft survives interruptions and is
/// only discarded on commit or explicit abort.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDraft {
    pub email: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl CustomerDraft {
    /// Everything the commit needs. Company is optional by design.
    pub fn is_complete(&self) -> bool {
        self.email.is_some()
            && self.name.is_some()
            && self.address.is_some()
            && self.phone.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmChoice {
    Yes,
    Edit,
    No,
}

/// Inputs the state machine consumes. `Answer` is the raw user reply to
/// the current prompt; the lookup results are fed back by the handler
/// after it resolves the email against the client table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutEvent {
    Answer(String),
    ClientFound {
        name: String,
        email: String,
        phone: Option<String>,
        address: Option<String>,
    },
    ClientMissing {
        email: String,
    },
}

pub fn parse_yes_no(text: &str) -> Option<bool> {
    let normalized = text.trim().to_lowercase();
    let first = normalized.split_whitespace().next()?;
    match first.trim_matches(|ch: char| !ch.is_alphanumeric()) {
        "sí" | "si" | "s" | "yes" | "vale" | "claro" | "correcto" | "ok" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn parse_confirmation(text: &str) -> Option<ConfirmChoice> {
    if let Some(answer) = parse_yes_no(text) {
        return Some(if answer { ConfirmChoice::Yes } else { ConfirmChoice::No });
    }
    let normalized = text.trim().to_lowercase();
    let wants_edit = ["editar", "edit", "cambiar", "corregir", "modificar"]
        .iter()
        .any(|word| normalized.contains(word));
    wants_edit.then_some(ConfirmChoice::Edit)
}

/// "none"-style answers for the optional company step.
pub fn parse_company(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let normalized = trimmed.to_lowercase();
    match normalized.as_str() {
        "no" | "none" | "ninguna" | "ninguno" | "n/a" | "-" => None,
        _ => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_company, parse_confirmation, parse_yes_no, ConfirmChoice, CustomerDraft};

    #[test]
    fn yes_no_parsing_covers_common_spanish_forms() {
        assert_eq!(parse_yes_no("sí"), Some(true));
        assert_eq!(parse_yes_no("Si, claro"), Some(true));
        assert_eq!(parse_yes_no("  NO "), Some(false));
        assert_eq!(parse_yes_no("quizás"), None);
        assert_eq!(parse_yes_no(""), None);
    }

    #[test]
    fn confirmation_recognizes_edit_requests() {
        assert_eq!(parse_confirmation("sí"), Some(ConfirmChoice::Yes));
        assert_eq!(parse_confirmation("no"), Some(ConfirmChoice::No));
        assert_eq!(parse_confirmation("quiero editar el email"), Some(ConfirmChoice::Edit));
        assert_eq!(parse_confirmation("mmm"), None);
    }

    #[test]
    fn company_none_answers_clear_the_field() {
        assert_eq!(parse_company("Acme"), Some("Acme".to_string()));
        assert_eq!(parse_company("ninguna"), None);
        assert_eq!(parse_company("none"), None);
    }

    #[test]
    fn draft_completeness_ignores_company() {
        let mut draft = CustomerDraft {
            email: Some("buyer@example.com".to_string()),
            name: Some("Jane".to_string()),
            company: None,
            address: Some("1 Main St".to_string()),
            phone: Some("555-0001".to_string()),
        };
        assert!(draft.is_complete());

        draft.phone = None;
        assert!(!draft.is_complete());
    }
}
