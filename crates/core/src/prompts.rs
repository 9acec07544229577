//! LLM prompts as data. Prompts are versioned so alternative revisions can
//! be evaluated against the scripted conversation scenarios without code
//! changes.

/// Bumped whenever the classifier contract changes shape.
pub const CLASSIFIER_PROMPT_VERSION: &str = "v2";

/// System prompt for intent classification. The model must answer with a
/// single JSON object matching the documented schema; anything else is
/// treated as a schema violation and routed to the rule-based fallback.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"Eres el asistente de ventas de un mayorista de ferretería industrial.
Analiza el último mensaje del usuario, considerando el historial reciente, y clasifícalo.

Responde ÚNICAMENTE con este JSON (sin texto adicional, sin markdown):
{
  "intent": "product_search" | "product_detail" | "add_to_cart" | "update_quantity" | "remove_from_cart" | "view_cart" | "clear_cart" | "checkout_start" | "checkout_answer" | "technical_question" | "greeting" | "help" | "unknown",
  "confidence": 0.0,
  "keywords": "términos de búsqueda" | null,
  "sku": "SKU exacto si se menciona" | null,
  "position": 1 | null,
  "quantity": 1 | null,
  "value": "respuesta libre para checkout_answer" | null,
  "question": "pregunta técnica literal" | null
}

Reglas:
- "position" es la referencia 1-based a la última lista mostrada ("el segundo", "número 3", "el 1").
- Si el usuario menciona un SKU explícito (formato SKUnnnnn), usa "sku" y deja "position" en null.
- "quantity" solo para operaciones de carrito; nunca lo mezcles dentro de "keywords".
- Cantidades y posiciones son enteros, no texto.
- Saludos y charla sin objetivo comercial → "greeting"; peticiones de ayuda → "help".
- Si hay un checkout activo (se te indicará en el contexto), las respuestas cortas tipo datos personales son "checkout_answer" con el texto literal en "value".
- Ante duda razonable entre búsqueda y otra cosa, prefiere "product_search" con los términos en "keywords".
- BAJO NINGUNA CIRCUNSTANCIA respondas con texto conversacional."#;

/// User-turn template: the message plus, when non-empty, the positional
/// context of the most recent listing so the model can resolve "the
/// second one".
pub fn classifier_user_turn(message: &str, recent: &[(String, String)], checkout_active: bool) -> String {
    let mut turn = String::new();
    if !recent.is_empty() {
        turn.push_str("Última lista mostrada (posición. SKU — nombre):\n");
        for (index, (sku, name)) in recent.iter().enumerate() {
            turn.push_str(&format!("{}. {sku} — {name}\n", index + 1));
        }
        turn.push('\n');
    }
    if checkout_active {
        turn.push_str("Hay un proceso de compra activo esperando una respuesta del usuario.\n\n");
    }
    turn.push_str("Mensaje del usuario: ");
    turn.push_str(message);
    turn
}

/// System prompt for grounded technical answers. The model may only use
/// the supplied datasheet text.
pub fn technical_answer_prompt(
    product_name: &str,
    sku: &str,
    description: &str,
    specs: &[(String, String)],
) -> String {
    let mut rendered_specs = String::new();
    for (key, value) in specs {
        rendered_specs.push_str(&format!("- {key}: {value}\n"));
    }
    if rendered_specs.is_empty() {
        rendered_specs.push_str("(sin especificaciones registradas)\n");
    }

    format!(
        "Eres un experto técnico de un mayorista de ferretería. Un cliente pregunta por el \
         producto '{product_name}' (SKU: {sku}).\n\
         Descripción: {description}\n\
         Especificaciones:\n{rendered_specs}\n\
         Responde a la pregunta del cliente de forma clara y concisa usando ÚNICAMENTE la \
         información anterior. Si la ficha no contiene la respuesta, responde exactamente: \
         NO_CONFIRMADO"
    )
}

/// Sentinel the technical-answer prompt instructs the model to emit when
/// the datasheet does not cover the question.
pub const TECHNICAL_UNCERTAIN_SENTINEL: &str = "NO_CONFIRMADO";
