use sqlx::Row;

use ferrobot_core::domain::client::{Client, ClientId};

use super::{ClientDirectory, RepositoryError};
use crate::DbPool;

pub struct SqlClientDirectory {
    pool: DbPool,
}

impl SqlClientDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClientDirectory for SqlClientDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Client>, RepositoryError> {
        find_by_email(&self.pool, email).await
    }
}

pub(crate) async fn find_by_email<'e, E>(
    executor: E,
    email: &str,
) -> Result<Option<Client>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        "SELECT client_id, name, email, phone, address FROM clients WHERE email = ?",
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(executor)
    .await?;

    row.map(|row| decode_client(&row)).transpose()
}

/// Resolves the client for an email, creating the row with the next
/// `CUSTnnnn` sequence on first sight. Safe under concurrent first-time
/// checkouts: a unique-constraint violation (same email racing, or two
/// writers drawing the same sequence) triggers a re-read and a bounded
/// retry rather than a duplicate row.
pub(crate) async fn get_or_create(
    pool: &DbPool,
    name: &str,
    email: &str,
    phone: Option<&str>,
    address: Option<&str>,
) -> Result<Client, RepositoryError> {
    const MAX_ATTEMPTS: usize = 3;
    let normalized_email = email.trim().to_lowercase();

    for _ in 0..MAX_ATTEMPTS {
        if let Some(existing) = find_by_email(pool, &normalized_email).await? {
            return refresh_contact(pool, existing, name, phone, address).await;
        }

        let next_sequence = next_client_sequence(pool).await?;
        let client_id = ClientId::from_sequence(next_sequence);

        let inserted = sqlx::query(
            r#"
            INSERT INTO clients (client_id, name, email, phone, address, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, datetime('now'), datetime('now'))
            "#,
        )
        .bind(client_id.as_str())
        .bind(name)
        .bind(&normalized_email)
        .bind(phone)
        .bind(address)
        .execute(pool)
        .await;

        match inserted {
            Ok(_) => {
                return Ok(Client {
                    client_id,
                    name: name.to_string(),
                    email: normalized_email,
                    phone: phone.map(str::to_string),
                    address: address.map(str::to_string),
                })
            }
            Err(error) if is_unique_violation(&error) => continue,
            Err(error) => return Err(RepositoryError::Database(error)),
        }
    }

    Err(RepositoryError::Conflict(format!(
        "client upsert for `{normalized_email}` exhausted retries"
    )))
}

/// A returning customer may hand in fresher contact data during checkout;
/// the stored row follows the latest confirmed values (original behavior).
async fn refresh_contact(
    pool: &DbPool,
    existing: Client,
    name: &str,
    phone: Option<&str>,
    address: Option<&str>,
) -> Result<Client, RepositoryError> {
    let name = if name.trim().is_empty() { existing.name.clone() } else { name.to_string() };
    let phone = phone.map(str::to_string).or(existing.phone.clone());
    let address = address.map(str::to_string).or(existing.address.clone());

    sqlx::query(
        "UPDATE clients SET name = ?, phone = ?, address = ?, updated_at = datetime('now') WHERE client_id = ?",
    )
    .bind(&name)
    .bind(&phone)
    .bind(&address)
    .bind(existing.client_id.as_str())
    .execute(pool)
    .await?;

    Ok(Client { client_id: existing.client_id, name, email: existing.email, phone, address })
}

async fn next_client_sequence(pool: &DbPool) -> Result<i64, RepositoryError> {
    let max: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(CAST(SUBSTR(client_id, 5) AS INTEGER))
        FROM clients
        WHERE client_id LIKE 'CUST%'
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(max.map(|value| value + 1).unwrap_or(ClientId::FIRST_SEQUENCE))
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|database_error| database_error.is_unique_violation())
        .unwrap_or(false)
}

fn decode_client(row: &sqlx::sqlite::SqliteRow) -> Result<Client, RepositoryError> {
    Ok(Client {
        client_id: ClientId(row.try_get("client_id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
    })
}
