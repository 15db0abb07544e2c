use rusqlite::Transaction;
use uuid::Uuid;

pub(super) const MIGRATION_ID: Uuid = Uuid::from_u128(0x98739ef0_69eb_4196_a884_b5b18b0e93e7);

pub(super) struct Migration;

impl super::Migration for Migration {
    fn id(&self) -> Uuid {
        MIGRATION_ID
    }

    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Adds the recently-opened projects table."
    }

    fn up(&self, transaction: &Transaction<'_>) -> Result<(), rusqlite::Error> {
        transaction.execute_batch(
            "CREATE TABLE wavytune_recent_projects (
                path TEXT NOT NULL UNIQUE,
                last_opened TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}
