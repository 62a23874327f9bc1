//! Common test utilities

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use card_ledger::card::{generate_cvv, generate_pan, pan_fingerprint};
use card_ledger::{EncryptionKey, SecretCodec};

/// Fixed codec key so seeded ciphertext and the app under test agree
pub const TEST_KEY_HEX: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub fn test_codec() -> SecretCodec {
    SecretCodec::new(&EncryptionKey::from_hex(TEST_KEY_HEX).expect("valid test key"))
}

/// Statements from migrations/001_init.sql, one per entry so they can run
/// through the prepared-statement path
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'USER',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS api_keys (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        key_hash TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL DEFAULT '',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS cards (
        id BIGSERIAL PRIMARY KEY,
        owner_id BIGINT NOT NULL REFERENCES users(id),
        number_encrypted TEXT NOT NULL,
        number_hash TEXT NOT NULL UNIQUE,
        holder TEXT NOT NULL,
        expiration_date DATE NOT NULL,
        cvv_encrypted TEXT NOT NULL,
        balance NUMERIC(14,2) NOT NULL DEFAULT 0 CHECK (balance >= 0),
        status TEXT NOT NULL DEFAULT 'ACTIVE',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS transfers (
        id BIGSERIAL PRIMARY KEY,
        from_card_id BIGINT NOT NULL REFERENCES cards(id),
        to_card_id BIGINT NOT NULL REFERENCES cards(id),
        amount NUMERIC(14,2) NOT NULL CHECK (amount > 0),
        status TEXT NOT NULL DEFAULT 'COMPLETED',
        description TEXT,
        transfer_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS transfers_from_card_idx ON transfers (from_card_id)",
    "CREATE INDEX IF NOT EXISTS transfers_to_card_idx ON transfers (to_card_id)",
    r#"CREATE TABLE IF NOT EXISTS block_requests (
        id BIGSERIAL PRIMARY KEY,
        card_id BIGINT NOT NULL REFERENCES cards(id),
        requested_by BIGINT NOT NULL REFERENCES users(id),
        reason TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        processed_by BIGINT REFERENCES users(id),
        processed_at TIMESTAMPTZ,
        admin_comment TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS block_requests_one_pending_per_card
        ON block_requests (card_id) WHERE status = 'PENDING'"#,
];

/// Setup test database - create schema and wipe state
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to create schema");
    }

    sqlx::query(
        "TRUNCATE TABLE block_requests, transfers, cards, api_keys, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    pool
}

/// Seed a user with an API key; returns the user id
pub async fn seed_user(
    pool: &PgPool,
    role: &str,
    first_name: &str,
    last_name: &str,
    api_key: &str,
) -> i64 {
    let email = format!(
        "{}.{}@example.com",
        first_name.to_lowercase(),
        last_name.to_lowercase()
    );

    let user_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, first_name, last_name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&email)
    .bind(first_name)
    .bind(last_name)
    .bind(role)
    .fetch_one(pool)
    .await
    .expect("Failed to seed user");

    sqlx::query(
        r#"
        INSERT INTO api_keys (user_id, key_hash, name)
        VALUES ($1, encode(sha256($2::bytea), 'hex'), $3)
        "#,
    )
    .bind(user_id)
    .bind(api_key.as_bytes())
    .bind(api_key)
    .execute(pool)
    .await
    .expect("Failed to seed API key");

    user_id
}

/// A card seeded directly into the store, with its clear PAN/CVV kept around
/// so tests can exercise CVV checks and masking
pub struct SeededCard {
    pub id: i64,
    pub pan: String,
    pub cvv: String,
}

pub async fn seed_card(
    pool: &PgPool,
    codec: &SecretCodec,
    owner_id: i64,
    balance: &str,
    status: &str,
    expiration_date: NaiveDate,
) -> SeededCard {
    let pan = generate_pan();
    let cvv = generate_cvv();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO cards
            (owner_id, number_encrypted, number_hash, holder,
             expiration_date, cvv_encrypted, balance, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7::numeric, $8)
        RETURNING id
        "#,
    )
    .bind(owner_id)
    .bind(codec.encrypt(&pan).expect("encrypt PAN"))
    .bind(pan_fingerprint(&pan))
    .bind("Test Holder")
    .bind(expiration_date)
    .bind(codec.encrypt(&cvv).expect("encrypt CVV"))
    .bind(balance)
    .bind(status)
    .fetch_one(pool)
    .await
    .expect("Failed to seed card");

    SeededCard { id, pan, cvv }
}

/// Current card balance as text (avoids Decimal juggling in asserts)
pub async fn card_balance(pool: &PgPool, card_id: i64) -> String {
    sqlx::query_scalar("SELECT balance::text FROM cards WHERE id = $1")
        .bind(card_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read balance")
}

/// Current card status
pub async fn card_status(pool: &PgPool, card_id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM cards WHERE id = $1")
        .bind(card_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read status")
}
