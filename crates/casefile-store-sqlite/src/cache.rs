//! [`LocalCache`] over the `cache` table of the same SQLite file.

use casefile_core::cache::LocalCache;
use chrono::Utc;
use rusqlite::OptionalExtension as _;

use crate::{encode::encode_dt, Error, Result, SqliteStore};

impl LocalCache for SqliteStore {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
    let key = key.to_owned();

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value_json FROM cache WHERE key = ?1",
              rusqlite::params![key],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Error::Json)
  }

  async fn set(&self, key: String, value: serde_json::Value) -> Result<()> {
    let value_str = value.to_string();
    let at_str    = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cache (key, value_json, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (key) DO UPDATE
             SET value_json = excluded.value_json, updated_at = excluded.updated_at",
          rusqlite::params![key, value_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<()> {
    let key = key.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM cache WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
    // substr comparison avoids LIKE wildcard escaping.
    let prefix = prefix.to_owned();
    let keys = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT key FROM cache WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
          .query_map(rusqlite::params![prefix], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
      })
      .await?;
    Ok(keys)
  }
}
