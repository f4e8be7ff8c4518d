//! SQL functions registered on every SQLite connection.
//!
//! The management layer's queries expect a few helpers that SQLite lacks
//! out of the box.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use uuid::Uuid;

pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function("make_uuid", 0, FunctionFlags::SQLITE_UTF8, |_ctx| {
        Ok(Uuid::new_v4().to_string())
    })?;

    conn.create_scalar_function(
        "iso_time",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let epoch: Option<i64> = ctx.get(0)?;
            Ok(iso_time(epoch.unwrap_or(0)))
        },
    )?;

    conn.create_scalar_function("now", 0, FunctionFlags::SQLITE_UTF8, |_ctx| {
        Ok(Utc::now().timestamp())
    })?;

    Ok(())
}

/// RFC 3339 UTC rendering of a Unix time. 0 means "never" and renders empty.
#[must_use]
pub fn iso_time(epoch: i64) -> String {
    if epoch == 0 {
        return String::new();
    }
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
