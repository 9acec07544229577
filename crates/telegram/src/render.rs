//! Spanish Markdown rendering for every outbound reply. All user-facing
//! copy lives here; handlers deal in domain values only.

use rust_decimal::Decimal;

use ferrobot_core::domain::product::{Category, Product, Sku};
use ferrobot_core::flows::engine::{AnswerRejection, StepReply};
use ferrobot_core::flows::states::{CheckoutState, CustomerDraft};

use crate::transport::InlineButton;

/// Cart views longer than this are truncated with an "…y N más" tail.
pub const CART_VIEW_MAX_LINES: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Text {
        markdown: String,
        buttons: Option<Vec<Vec<InlineButton>>>,
    },
    Photo {
        url: String,
        caption: Option<String>,
    },
}

/// An assembled reply: one or more outbound messages, sent in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub messages: Vec<Outbound>,
}

impl Reply {
    pub fn text(markdown: impl Into<String>) -> Self {
        Self {
            messages: vec![Outbound::Text { markdown: markdown.into(), buttons: None }],
        }
    }

    pub fn with_buttons(markdown: impl Into<String>, buttons: Vec<Vec<InlineButton>>) -> Self {
        Self {
            messages: vec![Outbound::Text { markdown: markdown.into(), buttons: Some(buttons) }],
        }
    }

    pub fn push_text(mut self, markdown: impl Into<String>) -> Self {
        self.messages.push(Outbound::Text { markdown: markdown.into(), buttons: None });
        self
    }

    pub fn push_photo(mut self, url: impl Into<String>, caption: Option<String>) -> Self {
        self.messages.push(Outbound::Photo { url: url.into(), caption });
        self
    }

    /// Appends the checkout resume reminder to the last text message,
    /// used when a product question interrupts an active checkout.
    pub fn with_resume_reminder(mut self, state: CheckoutState, draft: &CustomerDraft) -> Self {
        let reminder =
            format!("\n\n↩️ Continuamos con tu pedido — {}", prompt_line(state, draft));
        if let Some(Outbound::Text { markdown, .. }) = self
            .messages
            .iter_mut()
            .rev()
            .find(|message| matches!(message, Outbound::Text { .. }))
        {
            markdown.push_str(&reminder);
        } else {
            self.messages.push(Outbound::Text { markdown: reminder, buttons: None });
        }
        self
    }
}

/// es-ES money format: thousands separated by dots, decimal comma, two
/// decimals, euro suffix.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let raw = format!("{rounded:.2}");
    let (integer_part, decimal_part) = raw.split_once('.').unwrap_or((raw.as_str(), "00"));

    let (sign, digits) = match integer_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", integer_part),
    };

    let mut grouped = String::new();
    let chars: Vec<char> = digits.chars().collect();
    for (index, ch) in chars.iter().enumerate() {
        if index > 0 && (chars.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*ch);
    }

    format!("{sign}{grouped},{decimal_part} €")
}

// ---------------------------------------------------------------------
// Product replies
// ---------------------------------------------------------------------

pub fn product_list(query: &str, shown: &[Product], total_found: usize) -> Reply {
    let mut text = format!(
        "🔍 He encontrado {total_found} productos para \"{query}\":\n\n"
    );
    let mut buttons: Vec<Vec<InlineButton>> = Vec::new();

    for (index, product) in shown.iter().enumerate() {
        let position = index + 1;
        let brand = product.brand.as_deref().unwrap_or("—");
        text.push_str(&format!(
            "*{position}. {name}* (`{sku}`)\n🏷️ {brand} · {price}\n📝 {summary}\n\n",
            name = product.name,
            sku = product.sku,
            price = format_money(product.price),
            summary = product.short_description(80),
        ));
        buttons.push(vec![InlineButton::new(
            format!("Ver detalles {position}"),
            format!("detail:{}", product.sku),
        )]);
    }

    text.push_str("💬 Pídeme detalles por número (\"el segundo\") o añade al carrito con /agregar.");
    Reply::with_buttons(text, buttons)
}

pub fn product_detail(product: &Product) -> Reply {
    let brand = product.brand.as_deref().unwrap_or("N/A");
    let mut caption = format!(
        "*{name}*\n`SKU: {sku}`\n\n{description}\n\n🏷️ Marca: {brand}\n*Precio: {price}*\n",
        name = product.name,
        sku = product.sku,
        description = product.description,
        price = format_money(product.price),
    );

    if !product.specs.is_empty() {
        caption.push_str("\n*Características:*\n");
        for (key, value) in &product.specs {
            let label = key.replace('_', " ");
            caption.push_str(&format!("• *{label}:* {value}\n"));
        }
    }

    let buttons = vec![vec![InlineButton::new(
        "Añadir al carrito",
        format!("add:{}:1", product.sku),
    )]];

    match product.image_urls.first() {
        Some(url) => Reply::default()
            .push_photo(url.clone(), Some(caption))
            .push_text("¿Quieres añadirlo al carrito? Usa /agregar o dímelo con tus palabras."),
        None => Reply::with_buttons(caption, buttons),
    }
}

pub fn no_results(query: &str) -> Reply {
    Reply::text(format!("🤔 No he encontrado resultados para \"{query}\"."))
        .push_text("Prueba con otros términos. Por ejemplo, en lugar de \"destornillador de estrella\", prueba \"destornillador Phillips\".")
}

pub fn related_results(query: &str, shown: &[Product], total_found: usize) -> Reply {
    let mut reply = Reply::text(format!(
        "No encontré coincidencias exactas para \"{query}\", pero esto se le parece:"
    ));
    reply
        .messages
        .extend(product_list(query, shown, total_found).messages);
    reply
}

pub fn position_out_of_range(position: usize, list_len: usize) -> Reply {
    if list_len == 0 {
        Reply::text(
            "🔍 Aún no te he mostrado ninguna lista de productos. Dime qué buscas primero.",
        )
    } else {
        Reply::text(format!(
            "🤔 No veo el número {position} en la última lista (tiene {list_len} productos)."
        ))
    }
}

pub fn technical_answer(answer: &str) -> Reply {
    Reply::text(answer.to_string())
}

pub fn technical_uncertain() -> Reply {
    Reply::text(
        "No puedo confirmarlo con la ficha técnica que tengo. Por favor, contacta con ventas y te lo resolvemos.",
    )
}

pub fn technical_unavailable() -> Reply {
    Reply::text("Lo siento, el análisis técnico no está disponible en este momento.")
}

// ---------------------------------------------------------------------
// Cart replies
// ---------------------------------------------------------------------

/// A cart line enriched with the product name for presentation.
#[derive(Clone, Debug, PartialEq)]
pub struct CartLineView {
    pub sku: Sku,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

pub fn cart_view(lines: &[CartLineView], total: Decimal) -> Reply {
    if lines.is_empty() {
        return Reply::text("🛒 Tu carrito está vacío.");
    }

    let mut text = String::from("🛒 *Tu carrito:*\n\n");
    for line in lines.iter().take(CART_VIEW_MAX_LINES) {
        let line_total = line.unit_price * Decimal::from(line.quantity);
        text.push_str(&format!(
            "• {qty} × *{name}* (`{sku}`) — {total}\n",
            qty = line.quantity,
            name = line.name,
            sku = line.sku,
            total = format_money(line_total),
        ));
    }
    if lines.len() > CART_VIEW_MAX_LINES {
        text.push_str(&format!("…y {} más\n", lines.len() - CART_VIEW_MAX_LINES));
    }
    text.push_str(&format!("\n*Total: {}*", format_money(total)));
    text.push_str("\n\nCuando quieras, finaliza con /finalizar_compra.");
    Reply::text(text)
}

pub fn cart_updated(action: &str, lines: &[CartLineView], total: Decimal) -> Reply {
    let mut reply = Reply::text(format!("✅ {action}"));
    reply.messages.extend(cart_view(lines, total).messages);
    reply
}

pub fn cart_cleared() -> Reply {
    Reply::text("🗑️ He vaciado tu carrito.")
}

pub fn cart_line_missing(sku: &Sku) -> Reply {
    Reply::text(format!("🤔 No tienes `{sku}` en el carrito."))
}

pub fn product_unknown(sku: &Sku) -> Reply {
    Reply::text(format!("🔍 No encuentro ningún producto con SKU `{sku}`."))
}

// ---------------------------------------------------------------------
// Checkout replies
// ---------------------------------------------------------------------

pub fn checkout_started(cart_lines: &[CartLineView], total: Decimal) -> Reply {
    let mut reply = Reply::text("✅ *Proceso de compra iniciado*");
    reply.messages.extend(cart_view(cart_lines, total).messages);
    reply.push_text(prompt_line(CheckoutState::AskReturning, &CustomerDraft::default()))
}

pub fn checkout_empty_cart() -> Reply {
    Reply::text("🛒 Tu carrito está vacío. Añade productos antes de finalizar la compra.")
}

/// The canonical question for each step. The confirmation step renders
/// the collected draft for review.
pub fn prompt_line(state: CheckoutState, draft: &CustomerDraft) -> String {
    match state {
        CheckoutState::AskReturning => {
            "👋 Antes de continuar, ¿ya eres cliente nuestro? (responde *sí* o *no*)".to_string()
        }
        CheckoutState::AskEmailLookup => {
            "¡Genial! Envíame tu *correo electrónico* y busco tus datos.".to_string()
        }
        CheckoutState::AskEmail => "📧 Envíame tu *correo electrónico*:".to_string(),
        CheckoutState::AskName => "👤 ¿Cuál es tu *nombre completo*?".to_string(),
        CheckoutState::AskCompany => {
            "🏢 ¿Nombre de tu *empresa*? (escribe *ninguna* si compras a título personal)"
                .to_string()
        }
        CheckoutState::AskAddress => "🏠 Dime la *dirección de envío* completa:".to_string(),
        CheckoutState::AskPhone => "📱 ¿Tu *número de teléfono*?".to_string(),
        CheckoutState::AskConfirm => {
            let email = draft.email.as_deref().unwrap_or("—");
            let name = draft.name.as_deref().unwrap_or("—");
            let company = draft.company.as_deref().unwrap_or("—");
            let address = draft.address.as_deref().unwrap_or("—");
            let phone = draft.phone.as_deref().unwrap_or("—");
            format!(
                "📋 Revisa tus datos:\n👤 {name}\n📧 {email}\n🏢 {company}\n🏠 {address}\n📱 {phone}\n\n¿Confirmo el pedido? (*sí* / *editar* / *no*)"
            )
        }
    }
}

pub fn step_reply(reply: &StepReply, draft: &CustomerDraft) -> Reply {
    match reply {
        StepReply::Prompt(state) => Reply::text(prompt_line(*state, draft)),
        StepReply::Rejected { state, reason } => {
            Reply::text(format!("{}\n\n{}", rejection_line(*reason), prompt_line(*state, draft)))
        }
        StepReply::UnknownClient(state) => Reply::text(format!(
            "No encontré tus datos, así que te registro como cliente nuevo.\n\n{}",
            prompt_line(*state, draft)
        )),
        StepReply::Aborted => {
            Reply::text("De acuerdo, cancelo el proceso de compra. Tu carrito sigue intacto. 🛒")
        }
        StepReply::Committing => Reply::text("⏳ Procesando tu pedido…"),
    }
}

fn rejection_line(reason: AnswerRejection) -> &'static str {
    match reason {
        AnswerRejection::UnclearYesNo => {
            "🤔 No entendí tu respuesta. Por favor, responde solo *sí* o *no*."
        }
        AnswerRejection::InvalidEmail => {
            "🤔 Ese correo no parece válido. Revísalo e inténtalo de nuevo."
        }
        AnswerRejection::EmptyAnswer => "🤔 Necesito una respuesta para continuar.",
        AnswerRejection::UnclearConfirmation => {
            "🤔 Responde *sí* para confirmar, *editar* para corregir datos o *no* para cancelar."
        }
    }
}

pub fn returning_client_found(name: &str, phone: Option<&str>, address: Option<&str>) -> Reply {
    Reply::text(format!(
        "¡Hola de nuevo, *{name}*! 👋\n\nHe encontrado estos datos:\n📱 Teléfono: *{phone}*\n🏠 Dirección: *{address}*",
        phone = phone.unwrap_or("—"),
        address = address.unwrap_or("—"),
    ))
}

pub fn order_confirmed(customer_name: &str, order_id: &str, email: &str) -> Reply {
    Reply::text(format!(
        "🎉 *¡Gracias por tu compra, {customer_name}!*\n\n✅ Tu pedido `#{order_id}` ha sido confirmado.\nTe hemos enviado la factura a *{email}*."
    ))
}

pub fn checkout_commit_failed() -> Reply {
    Reply::text(
        "❌ No he podido registrar tu pedido. Tu carrito y tus datos siguen guardados; responde *sí* para intentarlo de nuevo.",
    )
}

// ---------------------------------------------------------------------
// General replies
// ---------------------------------------------------------------------

pub fn greeting(categories: &[Category]) -> Reply {
    let mut text = String::from(
        "👋 ¡Hola! Soy el asistente de ventas. Puedo buscarte productos, gestionar tu carrito y tramitar tu pedido.\n",
    );
    if !categories.is_empty() {
        text.push_str("\nEstas son nuestras categorías principales:\n");
        for category in categories {
            text.push_str(&format!("• {}\n", category.name));
        }
    }
    text.push_str("\n💡 Prueba con \"busco taladros\" o escribe /help para ver los comandos.");
    Reply::text(text)
}

pub fn help() -> Reply {
    Reply::text(
        "🤖 *Comandos disponibles:*\n\
         /start — saludo y ayuda\n\
         /help — esta lista\n\
         /agregar `<SKU>` `[cantidad]` — añadir al carrito\n\
         /eliminar `<SKU>` — quitar una línea\n\
         /ver\\_carrito — ver el carrito\n\
         /vaciar\\_carrito — vaciar el carrito\n\
         /finalizar\\_compra — iniciar el pedido\n\n\
         También me puedes hablar con normalidad: \"busco tubos de PVC\", \"dame 2 del segundo\"…",
    )
}

pub fn no_active_checkout() -> Reply {
    Reply::text(
        "No hay ningún pedido en curso. Cuando tengas productos en el carrito, inícialo con /finalizar\\_compra.",
    )
}

pub fn clarifying_question() -> Reply {
    Reply::text(
        "🤔 No estoy seguro de qué necesitas. ¿Buscas algún producto en concreto, o quieres gestionar tu carrito?",
    )
}

pub fn generic_error() -> Reply {
    Reply::text("❌ Algo salió mal. Por favor, inténtalo de nuevo.")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{
        cart_view, format_money, product_detail, product_list, prompt_line, CartLineView,
        Outbound, Reply, CART_VIEW_MAX_LINES,
    };
    use ferrobot_core::domain::product::{Product, Sku};
    use ferrobot_core::flows::states::{CheckoutState, CustomerDraft};

    fn product(sku: &str, name: &str, cents: i64) -> Product {
        Product {
            sku: Sku::new(sku),
            name: name.to_string(),
            description: format!("{name} de uso profesional"),
            brand: Some("Hilti".to_string()),
            price: Decimal::new(cents, 2),
            category_id: None,
            specs: BTreeMap::new(),
            image_urls: Vec::new(),
        }
    }

    #[test]
    fn money_uses_spanish_grouping() {
        assert_eq!(format_money(Decimal::new(4500, 2)), "45,00 €");
        assert_eq!(format_money(Decimal::new(123456789, 2)), "1.234.567,89 €");
        assert_eq!(format_money(Decimal::new(-9050, 2)), "-90,50 €");
        assert_eq!(format_money(Decimal::new(0, 0)), "0,00 €");
    }

    #[test]
    fn product_list_numbers_items_and_offers_detail_buttons() {
        let products =
            vec![product("SKU00010", "Taladro percutor", 4500), product("SKU00011", "Taladro 12V", 3990)];
        let reply = product_list("taladros", &products, 5);

        let Outbound::Text { markdown, buttons } = &reply.messages[0] else {
            panic!("expected text message");
        };
        assert!(markdown.contains("*1. Taladro percutor*"));
        assert!(markdown.contains("*2. Taladro 12V*"));
        assert!(markdown.contains("45,00 €"));

        let buttons = buttons.as_ref().expect("buttons present");
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0][0].callback_data, "detail:SKU00010");
    }

    #[test]
    fn detail_with_image_sends_photo_first() {
        let mut with_image = product("SKU00010", "Taladro percutor", 4500);
        with_image.image_urls = vec!["https://img.example/x.jpg".to_string()];

        let reply = product_detail(&with_image);
        assert!(matches!(&reply.messages[0], Outbound::Photo { .. }));

        let without_image = product("SKU00011", "Taladro 12V", 3990);
        let reply = product_detail(&without_image);
        assert!(matches!(&reply.messages[0], Outbound::Text { .. }));
    }

    #[test]
    fn cart_view_truncates_past_twenty_lines() {
        let lines: Vec<CartLineView> = (0..25)
            .map(|i| CartLineView {
                sku: Sku::new(format!("SKU{i:05}")),
                name: format!("Producto {i}"),
                quantity: 1,
                unit_price: Decimal::new(100, 2),
            })
            .collect();

        let reply = cart_view(&lines, Decimal::new(2500, 2));
        let Outbound::Text { markdown, .. } = &reply.messages[0] else {
            panic!("expected text");
        };
        assert_eq!(markdown.matches("• 1 ×").count(), CART_VIEW_MAX_LINES);
        assert!(markdown.contains("…y 5 más"));
        assert!(markdown.contains("*Total: 25,00 €*"));
    }

    #[test]
    fn confirm_prompt_shows_the_collected_draft() {
        let draft = CustomerDraft {
            email: Some("buyer@example.com".to_string()),
            name: Some("Jane".to_string()),
            company: Some("Acme".to_string()),
            address: Some("1 Main St".to_string()),
            phone: Some("555-0001".to_string()),
        };
        let prompt = prompt_line(CheckoutState::AskConfirm, &draft);
        for field in ["Jane", "buyer@example.com", "Acme", "1 Main St", "555-0001"] {
            assert!(prompt.contains(field), "prompt should include `{field}`");
        }
    }

    #[test]
    fn resume_reminder_lands_on_the_last_text_message() {
        let reply = Reply::text("resultado de búsqueda").with_resume_reminder(
            CheckoutState::AskAddress,
            &CustomerDraft::default(),
        );

        let Outbound::Text { markdown, .. } = &reply.messages[0] else {
            panic!("expected text");
        };
        assert!(markdown.contains("Continuamos con tu pedido"));
        assert!(markdown.contains("dirección de envío"));
    }
}
