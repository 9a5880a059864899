use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the session and message tables if they do not exist.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_session (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            step TEXT,
            language TEXT,
            subject TEXT,
            purpose TEXT,
            audience TEXT,
            core_message TEXT,
            outline TEXT,
            structure TEXT,
            status TEXT NOT NULL DEFAULT 'active'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_message (
            id UUID PRIMARY KEY,
            session_id UUID NOT NULL REFERENCES chat_session(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            content JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            metadata JSONB
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_chat_message_session_id ON chat_message (session_id)",
        "CREATE INDEX IF NOT EXISTS idx_chat_session_created_at ON chat_session (created_at)",
        "CREATE INDEX IF NOT EXISTS idx_chat_message_created_at ON chat_message (created_at)",
        "CREATE INDEX IF NOT EXISTS idx_chat_session_status ON chat_session (status)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Database schema ready");
    Ok(())
}
