use crate::errors::GrantorError;
use crate::settings::Database as DbCfg;
use chrono::{NaiveTime, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, GrantorError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

/// Applies all pending schema migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), GrantorError> {
    Migrator::up(db, None).await?;
    Ok(())
}

/// Current time as unix seconds, the representation every table uses.
pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

/// `ts + secs`, or InvalidArgument when the result is not a valid timestamp.
pub(crate) fn offset(ts: i64, secs: i64) -> Result<i64, GrantorError> {
    ts.checked_add(secs).ok_or_else(|| {
        GrantorError::InvalidArgument(format!("lifetime of {secs} seconds is out of range"))
    })
}

/// Unix seconds of UTC midnight starting the day that contains `ts`.
pub(crate) fn start_of_day(ts: i64) -> i64 {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp(),
        None => ts - ts.rem_euclid(86_400),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_day() {
        // 2024-03-15T13:45:10Z
        let ts = 1_710_510_310;
        // 2024-03-15T00:00:00Z
        assert_eq!(start_of_day(ts), 1_710_460_800);
        assert_eq!(start_of_day(1_710_460_800), 1_710_460_800);
        assert_eq!(start_of_day(1_710_460_799), 1_710_460_800 - 86_400);
    }

    #[test]
    fn test_offset_rejects_overflow() {
        assert_eq!(offset(1_000, 60).expect("in range"), 1_060);
        assert_eq!(offset(1_000, -60).expect("in range"), 940);
        assert!(matches!(
            offset(1_000, i64::MAX),
            Err(GrantorError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let test_db = test_support::TestDb::new().await;
        migrate(test_db.connection())
            .await
            .expect("Second migration run failed");
    }
}
