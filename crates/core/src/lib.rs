// Re-export chrono for downstream crates that need DateTime types
pub use chrono;

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod intent;
pub mod prompts;

pub use domain::cart::{Cart, CartLine};
pub use domain::client::{Client, ClientId};
pub use domain::order::{Order, OrderId, OrderItem, OrderStatus};
pub use domain::product::{Category, CategoryId, Product, Sku};
pub use errors::AssistantError;
pub use flows::engine::{CheckoutFlow, CheckoutFlowError, StepAction, StepOutcome, StepReply};
pub use flows::states::{CheckoutEvent, CheckoutState, ConfirmChoice, CustomerDraft};
pub use intent::{Classification, ClassifierSource, Intent, ProductRef};
