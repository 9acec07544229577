//! Rule-based classifier used when the model is unavailable or returns
//! output that fails schema validation. Obvious commands keep working;
//! everything else degrades to a product search over the raw text.

use std::sync::OnceLock;

use regex::Regex;

use ferrobot_core::commands::parse_slash_command;
use ferrobot_core::domain::product::Sku;
use ferrobot_core::intent::{Classification, Intent, ProductRef};

static SKU_RE: OnceLock<Regex> = OnceLock::new();

fn sku_regex() -> &'static Regex {
    SKU_RE.get_or_init(|| Regex::new(r"^(?i)SKU\d{5}$").expect("static sku regex"))
}

const GREETING_WORDS: &[&str] =
    &["hola", "buenas", "buenos", "saludos", "hello", "hi", "hey"];

const HELP_WORDS: &[&str] = &["ayuda", "help", "comandos"];

const QUESTION_WORDS: &[&str] = &[
    "qué", "que", "cuál", "cual", "cómo", "como", "dónde", "donde", "cuánto", "cuanto",
    "cuándo", "cuando", "quién", "quien", "tienes", "tenéis", "teneis", "hay",
];

pub fn classify(text: &str, checkout_active: bool) -> Classification {
    if let Some(intent) = parse_slash_command(text) {
        return Classification::command(intent);
    }

    let trimmed = text.trim();

    // A bare SKU is an unambiguous detail request.
    if sku_regex().is_match(trimmed) {
        return Classification::fallback(Intent::ProductDetail {
            target: ProductRef::Sku(Sku::new(trimmed)),
        });
    }

    // Mid-checkout, everything that does not look like a new question is
    // an answer to the pending step; questions fall through to search so
    // the interruption policy can take over.
    if checkout_active {
        if !looks_like_question(trimmed) {
            return Classification::fallback(Intent::CheckoutAnswer {
                value: trimmed.to_string(),
            });
        }
        return Classification::fallback(Intent::ProductSearch {
            keywords: trimmed.to_string(),
        });
    }

    let first_word = first_bare_word(trimmed);

    if GREETING_WORDS.contains(&first_word.as_str()) {
        return Classification::fallback(Intent::Greeting);
    }
    if HELP_WORDS.contains(&first_word.as_str()) {
        return Classification::fallback(Intent::Help);
    }

    if trimmed.is_empty() {
        return Classification::fallback(Intent::Unknown);
    }

    Classification::fallback(Intent::ProductSearch { keywords: trimmed.to_string() })
}

fn looks_like_question(text: &str) -> bool {
    if text.contains('?') || text.contains('¿') {
        return true;
    }
    QUESTION_WORDS.contains(&first_bare_word(text).as_str())
}

fn first_bare_word(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|ch: char| !ch.is_alphanumeric())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::classify;
    use ferrobot_core::domain::product::Sku;
    use ferrobot_core::intent::{ClassifierSource, Intent, ProductRef};

    #[test]
    fn slash_commands_still_work_without_the_model() {
        let classification = classify("/agregar SKU00010 1", false);
        assert_eq!(classification.source, ClassifierSource::Command);
        assert_eq!(
            classification.intent,
            Intent::AddToCart { target: ProductRef::Sku(Sku::new("SKU00010")), quantity: 1 }
        );
    }

    #[test]
    fn pure_sku_routes_to_detail() {
        let classification = classify("sku00042", false);
        assert_eq!(
            classification.intent,
            Intent::ProductDetail { target: ProductRef::Sku(Sku::new("SKU00042")) }
        );
    }

    #[test]
    fn free_text_degrades_to_product_search() {
        let classification = classify("busco algo para cortar metal", false);
        assert_eq!(
            classification.intent,
            Intent::ProductSearch { keywords: "busco algo para cortar metal".to_string() }
        );
        assert_eq!(classification.source, ClassifierSource::Fallback);
    }

    #[test]
    fn greetings_and_help_are_recognized() {
        assert_eq!(classify("hola, ¿qué tal?", false).intent, Intent::Greeting);
        assert_eq!(classify("ayuda", false).intent, Intent::Help);
    }

    #[test]
    fn checkout_answers_are_kept_in_the_flow() {
        for answer in ["sí", "buyer@example.com", "Jane Doe", "1 Main St", "555-0001"] {
            assert_eq!(
                classify(answer, true).intent,
                Intent::CheckoutAnswer { value: answer.to_string() },
                "`{answer}` must feed the active checkout step"
            );
        }
        // Without an active checkout the same email is just a search.
        assert!(matches!(
            classify("buyer@example.com", false).intent,
            Intent::ProductSearch { .. }
        ));
    }

    #[test]
    fn questions_mid_checkout_become_searches_for_the_interruption_path() {
        assert_eq!(
            classify("¿tienes martillos?", true).intent,
            Intent::ProductSearch { keywords: "¿tienes martillos?".to_string() }
        );
        assert_eq!(
            classify("cuánto cuesta el taladro", true).intent,
            Intent::ProductSearch { keywords: "cuánto cuesta el taladro".to_string() }
        );
    }
}
