use sqlx::PgPool;

/// Executes the `kanau` query processors defined in [`crate::entities`].
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
