use serde::{Deserialize, Serialize};

/// Sequential business key with the `CUSTnnnn` shape. The numeric tail is
/// monotone per table; the first materialized client gets `CUST1000`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub const FIRST_SEQUENCE: i64 = 1000;

    pub fn from_sequence(sequence: i64) -> Self {
        Self(format!("CUST{sequence}"))
    }

    pub fn sequence(&self) -> Option<i64> {
        self.0.strip_prefix("CUST")?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered buyer. Email is the identity used for lookups; the row is
/// materialized lazily on the first successful checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: ClientId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}
