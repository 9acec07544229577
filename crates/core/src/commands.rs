use crate::domain::product::Sku;
use crate::intent::{Intent, ProductRef};

/// Stable user-facing command grammar. Commands bypass the model entirely.
pub const SLASH_COMMANDS: &[&str] = &[
    "/start",
    "/help",
    "/agregar",
    "/eliminar",
    "/ver_carrito",
    "/vaciar_carrito",
    "/finalizar_compra",
];

/// Parses a slash command into its intent. Returns `None` when the text is
/// not a command; unknown commands map to `Help` so the user sees the
/// command list instead of silence.
pub fn parse_slash_command(text: &str) -> Option<Intent> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or_default().to_ascii_lowercase();
    // Telegram suffixes commands with the bot name in groups.
    let command = command.split('@').next().unwrap_or_default();

    match command {
        "/start" => Some(Intent::Greeting),
        "/help" => Some(Intent::Help),
        "/ver_carrito" => Some(Intent::ViewCart),
        "/vaciar_carrito" => Some(Intent::ClearCart),
        "/finalizar_compra" => Some(Intent::CheckoutStart),
        "/agregar" => match parts.next() {
            Some(token) => {
                let target = parse_product_token(token);
                let quantity = parts
                    .next()
                    .and_then(|raw| raw.parse::<u32>().ok())
                    .map(|qty| qty.max(1))
                    .unwrap_or(1);
                Some(Intent::AddToCart { target, quantity })
            }
            // Missing arguments earn the command list, not silence.
            None => Some(Intent::Help),
        },
        "/eliminar" => match parts.next() {
            Some(token) => Some(Intent::RemoveFromCart { target: parse_product_token(token) }),
            None => Some(Intent::Help),
        },
        _ => Some(Intent::Help),
    }
}

/// Inline-button payloads round-trip as callback data and are dispatched
/// as if they were typed commands: `detail:<SKU>` and `add:<SKU>:<qty>`.
pub fn parse_callback_data(data: &str) -> Option<Intent> {
    let mut parts = data.trim().split(':');
    match parts.next()? {
        "detail" => {
            let sku = parts.next().filter(|raw| !raw.is_empty())?;
            Some(Intent::ProductDetail { target: ProductRef::Sku(Sku::new(sku)) })
        }
        "add" => {
            let sku = parts.next().filter(|raw| !raw.is_empty())?;
            let quantity =
                parts.next().and_then(|raw| raw.parse::<u32>().ok()).unwrap_or(1).max(1);
            Some(Intent::AddToCart {
                target: ProductRef::Sku(Sku::new(sku)),
                quantity,
            })
        }
        _ => None,
    }
}

/// A product token in a command is either a SKU or a 1-based position
/// into the last shown listing.
fn parse_product_token(token: &str) -> ProductRef {
    if let Ok(position) = token.parse::<usize>() {
        if position >= 1 {
            return ProductRef::Position(position);
        }
    }
    ProductRef::Sku(Sku::new(token))
}
