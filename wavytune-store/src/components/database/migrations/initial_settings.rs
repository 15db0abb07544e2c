use rusqlite::Transaction;
use uuid::Uuid;

pub(super) const MIGRATION_ID: Uuid = Uuid::from_u128(0x7b87b3ab_6153_4904_9270_73b61efe637c);

pub(super) struct Migration;

impl super::Migration for Migration {
    fn id(&self) -> Uuid {
        MIGRATION_ID
    }

    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &'static str {
        "Creates the settings key-value table."
    }

    fn up(&self, transaction: &Transaction<'_>) -> Result<(), rusqlite::Error> {
        transaction.execute_batch(
            "CREATE TABLE wavytune_settings (
                key TEXT NOT NULL PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}
