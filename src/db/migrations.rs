use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Ordered schema steps; entry `n` brings `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

pub(crate) const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Bring the schema up to date in a single transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version = schema_version(conn)?;
    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database schema v{version} is newer than this build supports (v{CURRENT_SCHEMA_VERSION})"
        );
    }

    let pending = MIGRATIONS
        .iter()
        .enumerate()
        .skip(usize::try_from(version).unwrap_or(0));
    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    let mut applied = 0;
    for (index, (name, sql)) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply {name} (v{})", index + 1))?;
        applied += 1;
    }
    if applied == 0 {
        return Ok(());
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;
    log::info!("database schema migrated from v{version} to v{CURRENT_SCHEMA_VERSION}");

    Ok(())
}
