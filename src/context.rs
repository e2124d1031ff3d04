use crate::random::{OsSecureRandom, SecureRandom};
use crate::settings::Tokens;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Everything the lifecycle operations need from their environment: the
/// database, the server-wide token settings and the random source.
#[derive(Debug, Clone)]
pub struct OAuthContext {
    db: DatabaseConnection,
    tokens: Tokens,
    random: Arc<dyn SecureRandom>,
}

impl OAuthContext {
    pub fn new(db: DatabaseConnection, tokens: Tokens) -> Self {
        Self {
            db,
            tokens,
            random: Arc::new(OsSecureRandom),
        }
    }

    pub fn with_random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.random = random;
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    pub(crate) fn secure_random(&self) -> String {
        self.random.secure_random()
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.tokens.max_token_attempts.max(1)
    }
}
