use serde::{Deserialize, Serialize};

use crate::domain::product::Sku;

/// How a message points at a product: either an explicit SKU or a 1-based
/// index into the most recently shown listing. When a classifier returns
/// both, the SKU wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductRef {
    Sku(Sku),
    Position(usize),
}

/// Closed set of user goals the analyzer can produce. Dispatch is a match
/// over this enum, not a runtime handler registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    ProductSearch { keywords: String },
    ProductDetail { target: ProductRef },
    AddToCart { target: ProductRef, quantity: u32 },
    UpdateQuantity { target: ProductRef, quantity: u32 },
    RemoveFromCart { target: ProductRef },
    ViewCart,
    ClearCart,
    CheckoutStart,
    CheckoutAnswer { value: String },
    TechnicalQuestion { target: Option<ProductRef>, question: String },
    Greeting,
    Help,
    Unknown,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProductSearch { .. } => "product_search",
            Self::ProductDetail { .. } => "product_detail",
            Self::AddToCart { .. } => "add_to_cart",
            Self::UpdateQuantity { .. } => "update_quantity",
            Self::RemoveFromCart { .. } => "remove_from_cart",
            Self::ViewCart => "view_cart",
            Self::ClearCart => "clear_cart",
            Self::CheckoutStart => "checkout_start",
            Self::CheckoutAnswer { .. } => "checkout_answer",
            Self::TechnicalQuestion { .. } => "technical_question",
            Self::Greeting => "greeting",
            Self::Help => "help",
            Self::Unknown => "unknown",
        }
    }

    /// Intents that are allowed to interrupt an in-progress checkout. The
    /// checkout state is preserved while these run.
    pub fn interrupts_checkout(&self) -> bool {
        matches!(
            self,
            Self::ProductSearch { .. }
                | Self::ProductDetail { .. }
                | Self::TechnicalQuestion { .. }
                | Self::ViewCart
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierSource {
    /// Direct slash-command parse, no model involved.
    Command,
    /// LLM classification that passed schema validation.
    Model,
    /// Rule-based keyword fingerprinting after model failure.
    Fallback,
}

/// The analyzer's validated output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    pub source: ClassifierSource,
}

impl Classification {
    pub fn command(intent: Intent) -> Self {
        Self { intent, confidence: 1.0, source: ClassifierSource::Command }
    }

    pub fn fallback(intent: Intent) -> Self {
        Self { intent, confidence: 0.5, source: ClassifierSource::Fallback }
    }

    /// Low-confidence classifications of short messages earn a clarifying
    /// question instead of an action.
    pub fn needs_clarification(&self, message: &str) -> bool {
        const SHORT_MESSAGE_CHARS: usize = 25;
        self.source == ClassifierSource::Model
            && self.confidence < 0.5
            && message.trim().chars().count() <= SHORT_MESSAGE_CHARS
    }
}
