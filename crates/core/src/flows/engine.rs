use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::flows::states::{
    parse_company, parse_confirmation, parse_yes_no, CheckoutEvent, CheckoutState, ConfirmChoice,
    CustomerDraft,
};

/// Side effect the handler must perform after a transition. The flow
/// itself never touches storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepAction {
    None,
    /// Look the email up in the client table, then feed `ClientFound` or
    /// `ClientMissing` back into the flow.
    LookupClient { email: String },
    /// All data collected and confirmed; materialize the order.
    Commit,
}

/// Why an answer was rejected. The state does not advance on rejection
/// and the prompt is re-sent with a brief error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerRejection {
    UnclearYesNo,
    InvalidEmail,
    EmptyAnswer,
    UnclearConfirmation,
}

/// Semantic reply for the transport layer to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepReply {
    /// Send the canonical prompt for this step.
    Prompt(CheckoutState),
    /// Validation failed; re-prompt the same step with the given reason.
    Rejected { state: CheckoutState, reason: AnswerRejection },
    /// Email not found among registered clients; continuing as new.
    UnknownClient(CheckoutState),
    /// User backed out at confirmation; cart intact.
    Aborted,
    /// Commit requested; the final confirmation text is rendered by the
    /// handler once the order id exists.
    Committing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    /// `None` ends the flow (abort). On `Commit` the state is kept so a
    /// failed commit can be retried from the confirmation step.
    pub next: Option<CheckoutState>,
    pub draft: CustomerDraft,
    pub action: StepAction,
    pub reply: StepReply,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CheckoutFlowError {
    #[error("event {event:?} is not valid in state {state:?}")]
    UnexpectedEvent { state: CheckoutState, event: String },
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

/// Permissive RFC 5321 shape: one `@`, non-empty local part, a dot in the
/// domain, no whitespace.
pub fn is_valid_email(candidate: &str) -> bool {
    let re = EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email regex"));
    re.is_match(candidate.trim())
}

/// The multi-step checkout dialog as a total function over
/// `(state, draft, event)`. All transitions are pure; storage effects are
/// requested through [`StepAction`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckoutFlow;

impl CheckoutFlow {
    /// The state a fresh checkout enters after the non-empty-cart check.
    pub fn initial_state(&self) -> CheckoutState {
        CheckoutState::AskReturning
    }

    pub fn apply(
        &self,
        state: CheckoutState,
        draft: &CustomerDraft,
        event: &CheckoutEvent,
    ) -> Result<StepOutcome, CheckoutFlowError> {
        match (state, event) {
            (CheckoutState::AskReturning, CheckoutEvent::Answer(text)) => {
                Ok(match parse_yes_no(text) {
                    Some(true) => advance(draft.clone(), CheckoutState::AskEmailLookup),
                    Some(false) => advance(draft.clone(), CheckoutState::AskEmail),
                    None => rejected(draft.clone(), state, AnswerRejection::UnclearYesNo),
                })
            }

            (CheckoutState::AskEmailLookup, CheckoutEvent::Answer(text)) => {
                let email = text.trim().to_lowercase();
                if !is_valid_email(&email) {
                    return Ok(rejected(draft.clone(), state, AnswerRejection::InvalidEmail));
                }
                Ok(StepOutcome {
                    next: Some(state),
                    draft: draft.clone(),
                    action: StepAction::LookupClient { email },
                    reply: StepReply::Prompt(state),
                })
            }
            (CheckoutState::AskEmailLookup, CheckoutEvent::ClientFound { name, email, phone, address }) => {
                let prefilled = CustomerDraft {
                    email: Some(email.clone()),
                    name: Some(name.clone()),
                    company: draft.company.clone(),
                    address: address.clone(),
                    phone: phone.clone(),
                };
                Ok(advance(prefilled, CheckoutState::AskConfirm))
            }
            (CheckoutState::AskEmailLookup, CheckoutEvent::ClientMissing { email }) => {
                let mut retained = draft.clone();
                retained.email = Some(email.clone());
                Ok(StepOutcome {
                    next: Some(CheckoutState::AskEmail),
                    draft: retained,
                    action: StepAction::None,
                    reply: StepReply::UnknownClient(CheckoutState::AskEmail),
                })
            }

            (CheckoutState::AskEmail, CheckoutEvent::Answer(text)) => {
                let email = text.trim().to_lowercase();
                if !is_valid_email(&email) {
                    return Ok(rejected(draft.clone(), state, AnswerRejection::InvalidEmail));
                }
                let mut updated = draft.clone();
                updated.email = Some(email);
                Ok(advance(updated, CheckoutState::AskName))
            }

            (CheckoutState::AskName, CheckoutEvent::Answer(text)) => {
                let name = text.trim();
                if name.is_empty() {
                    return Ok(rejected(draft.clone(), state, AnswerRejection::EmptyAnswer));
                }
                let mut updated = draft.clone();
                updated.name = Some(name.to_string());
                Ok(advance(updated, CheckoutState::AskCompany))
            }

            (CheckoutState::AskCompany, CheckoutEvent::Answer(text)) => {
                if text.trim().is_empty() {
                    return Ok(rejected(draft.clone(), state, AnswerRejection::EmptyAnswer));
                }
                let mut updated = draft.clone();
                updated.company = parse_company(text);
                Ok(advance(updated, CheckoutState::AskAddress))
            }

            (CheckoutState::AskAddress, CheckoutEvent::Answer(text)) => {
                let address = text.trim();
                if address.is_empty() {
                    return Ok(rejected(draft.clone(), state, AnswerRejection::EmptyAnswer));
                }
                let mut updated = draft.clone();
                updated.address = Some(address.to_string());
                Ok(advance(updated, CheckoutState::AskPhone))
            }

            (CheckoutState::AskPhone, CheckoutEvent::Answer(text)) => {
                let phone = text.trim();
                if phone.is_empty() {
                    return Ok(rejected(draft.clone(), state, AnswerRejection::EmptyAnswer));
                }
                let mut updated = draft.clone();
                updated.phone = Some(phone.to_string());
                Ok(advance(updated, CheckoutState::AskConfirm))
            }

            (CheckoutState::AskConfirm, CheckoutEvent::Answer(text)) => {
                Ok(match parse_confirmation(text) {
                    Some(ConfirmChoice::Yes) => StepOutcome {
                        next: Some(CheckoutState::AskConfirm),
                        draft: draft.clone(),
                        action: StepAction::Commit,
                        reply: StepReply::Committing,
                    },
                    Some(ConfirmChoice::Edit) => advance(draft.clone(), CheckoutState::AskEmail),
                    Some(ConfirmChoice::No) => StepOutcome {
                        next: None,
                        draft: draft.clone(),
                        action: StepAction::None,
                        reply: StepReply::Aborted,
                    },
                    None => {
                        rejected(draft.clone(), state, AnswerRejection::UnclearConfirmation)
                    }
                })
            }

            (state, event) => Err(CheckoutFlowError::UnexpectedEvent {
                state,
                event: format!("{event:?}"),
            }),
        }
    }
}

fn advance(draft: CustomerDraft, next: CheckoutState) -> StepOutcome {
    StepOutcome {
        next: Some(next),
        draft,
        action: StepAction::None,
        reply: StepReply::Prompt(next),
    }
}

fn rejected(draft: CustomerDraft, state: CheckoutState, reason: AnswerRejection) -> StepOutcome {
    StepOutcome {
        next: Some(state),
        draft,
        action: StepAction::None,
        reply: StepReply::Rejected { state, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_valid_email, AnswerRejection, CheckoutFlow, StepAction, StepOutcome, StepReply,
    };
    use crate::flows::states::{CheckoutEvent, CheckoutState, CustomerDraft};

    fn answer(text: &str) -> CheckoutEvent {
        CheckoutEvent::Answer(text.to_string())
    }

    fn apply(state: CheckoutState, draft: &CustomerDraft, event: &CheckoutEvent) -> StepOutcome {
        CheckoutFlow.apply(state, draft, event).expect("transition should be defined")
    }

    #[test]
    fn email_validation_is_permissive_but_shaped() {
        assert!(is_valid_email("buyer@example.com"));
        assert!(is_valid_email("a.b+tag@sub.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn new_customer_path_collects_every_field_in_order() {
        let flow = CheckoutFlow;
        let mut state = flow.initial_state();
        let mut draft = CustomerDraft::default();

        let steps = [
            ("no", CheckoutState::AskEmail),
            ("buyer@example.com", CheckoutState::AskName),
            ("Jane", CheckoutState::AskCompany),
            ("Acme", CheckoutState::AskAddress),
            ("1 Main St", CheckoutState::AskPhone),
            ("555-0001", CheckoutState::AskConfirm),
        ];
        for (text, expected) in steps {
            let outcome = apply(state, &draft, &answer(text));
            state = outcome.next.expect("flow continues");
            draft = outcome.draft;
            assert_eq!(state, expected, "answer `{text}` should reach {expected:?}");
        }

        assert!(draft.is_complete());
        assert_eq!(draft.email.as_deref(), Some("buyer@example.com"));
        assert_eq!(draft.company.as_deref(), Some("Acme"));

        let confirmed = apply(state, &draft, &answer("sí"));
        assert_eq!(confirmed.action, StepAction::Commit);
        assert_eq!(confirmed.reply, StepReply::Committing);
        assert_eq!(confirmed.next, Some(CheckoutState::AskConfirm));
    }

    #[test]
    fn returning_customer_is_prefilled_to_confirmation() {
        let draft = CustomerDraft::default();
        let outcome = apply(CheckoutState::AskReturning, &draft, &answer("sí"));
        assert_eq!(outcome.next, Some(CheckoutState::AskEmailLookup));

        let lookup = apply(CheckoutState::AskEmailLookup, &draft, &answer("repeat@example.com"));
        assert_eq!(
            lookup.action,
            StepAction::LookupClient { email: "repeat@example.com".to_string() }
        );

        let found = apply(
            CheckoutState::AskEmailLookup,
            &draft,
            &CheckoutEvent::ClientFound {
                name: "Repeat Buyer".to_string(),
                email: "repeat@example.com".to_string(),
                phone: Some("555-0007".to_string()),
                address: Some("7 Repeat Rd".to_string()),
            },
        );
        assert_eq!(found.next, Some(CheckoutState::AskConfirm));
        assert!(found.draft.is_complete());
        assert_eq!(found.draft.name.as_deref(), Some("Repeat Buyer"));
    }

    #[test]
    fn unknown_email_falls_back_to_new_customer_path() {
        let draft = CustomerDraft::default();
        let outcome = apply(
            CheckoutState::AskEmailLookup,
            &draft,
            &CheckoutEvent::ClientMissing { email: "new@example.com".to_string() },
        );
        assert_eq!(outcome.next, Some(CheckoutState::AskEmail));
        assert_eq!(outcome.draft.email.as_deref(), Some("new@example.com"));
        assert_eq!(outcome.reply, StepReply::UnknownClient(CheckoutState::AskEmail));
    }

    #[test]
    fn invalid_answers_do_not_advance_state() {
        let draft = CustomerDraft::default();

        let unclear = apply(CheckoutState::AskReturning, &draft, &answer("tal vez"));
        assert_eq!(unclear.next, Some(CheckoutState::AskReturning));
        assert_eq!(
            unclear.reply,
            StepReply::Rejected {
                state: CheckoutState::AskReturning,
                reason: AnswerRejection::UnclearYesNo
            }
        );

        let bad_email = apply(CheckoutState::AskEmail, &draft, &answer("not-an-email"));
        assert_eq!(bad_email.next, Some(CheckoutState::AskEmail));

        let blank_name = apply(CheckoutState::AskName, &draft, &answer("   "));
        assert_eq!(blank_name.next, Some(CheckoutState::AskName));
    }

    #[test]
    fn edit_at_confirmation_returns_to_email_with_draft_retained() {
        let draft = CustomerDraft {
            email: Some("buyer@example.com".to_string()),
            name: Some("Jane".to_string()),
            company: Some("Acme".to_string()),
            address: Some("1 Main St".to_string()),
            phone: Some("555-0001".to_string()),
        };

        let outcome = apply(CheckoutState::AskConfirm, &draft, &answer("quiero editar"));
        assert_eq!(outcome.next, Some(CheckoutState::AskEmail));
        assert_eq!(outcome.draft, draft);
    }

    #[test]
    fn declining_at_confirmation_ends_the_flow() {
        let draft = CustomerDraft::default();
        let outcome = apply(CheckoutState::AskConfirm, &draft, &answer("no"));
        assert_eq!(outcome.next, None);
        assert_eq!(outcome.reply, StepReply::Aborted);
        assert_eq!(outcome.action, StepAction::None);
    }

    #[test]
    fn lookup_events_outside_lookup_state_are_rejected() {
        let result = CheckoutFlow.apply(
            CheckoutState::AskName,
            &CustomerDraft::default(),
            &CheckoutEvent::ClientMissing { email: "x@example.com".to_string() },
        );
        assert!(result.is_err());
    }
}
