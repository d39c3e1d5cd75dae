use async_trait::async_trait;
use domain::{
    Message, MessageContent, MessageId, MessageStore, ProfileRepository, RepositoryError,
    RepositoryResult, UserId, UserProfile,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

/// 映射数据库错误并在出错处记录；`operation` 标明是哪一步失败
fn map_sqlx_err(operation: &'static str, err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            debug!(operation, error = %err, "唯一约束冲突");
            return RepositoryError::Conflict;
        }
    }
    warn!(operation, error = %err, "数据库操作失败");
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    let message = message.into();
    warn!(error = %message, "数据库中的记录无法解析");
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    sent_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message::new(
            MessageId::from(value.id),
            UserId::from(value.sender_id),
            UserId::from(value.receiver_id),
            content,
            value.sent_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct ProfileRecord {
    id: Uuid,
    name: String,
    username: String,
    image_url: Option<String>,
}

impl From<ProfileRecord> for UserProfile {
    fn from(value: ProfileRecord) -> Self {
        UserProfile {
            id: UserId::from(value.id),
            name: value.name,
            username: value.username,
            image_url: value.image_url,
        }
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: Message) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, content, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.receiver_id))
        .bind(message.content.as_str())
        .bind(message.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|err| map_sqlx_err("append_message", err))?;

        Ok(())
    }

    async fn query_by_pair(&self, user_a: UserId, user_b: UserId) -> RepositoryResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, sender_id, receiver_id, content, sent_at
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(Uuid::from(user_a))
        .bind(Uuid::from(user_b))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| map_sqlx_err("query_by_pair", err))?;

        records.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn get_user_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            r#"SELECT id, name, username, image_url FROM user_profiles WHERE id = $1"#,
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| map_sqlx_err("get_user_profile", err))?;

        Ok(record.map(UserProfile::from))
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
