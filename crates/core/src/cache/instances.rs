//! Named cache instances and the record of which one is active.

use super::connection::CacheDb;
use super::entries::{CacheInstance, EntryRow, insert_entry};
use crate::Error;
use crate::model::{Request, Response};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

impl CacheDb {
    /// Open a cache instance, creating it if it does not exist.
    pub async fn open_instance(&self, name: &str) -> Result<CacheInstance, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_instances (name, created_at) VALUES (?1, ?2)",
                    params![owned, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(self.instance_handle(name))
    }

    /// Handle to an instance without creating it.
    pub fn instance_handle(&self, name: &str) -> CacheInstance {
        CacheInstance { db: self.clone(), name: name.to_string() }
    }

    /// Create (or reuse) an instance and store every pair in one transaction.
    ///
    /// Either the instance ends up holding all the pairs or nothing is written.
    pub async fn populate_instance(&self, name: &str, pairs: Vec<(Request, Response)>) -> Result<CacheInstance, Error> {
        let rows = pairs
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, _>>()?;

        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO cache_instances (name, created_at) VALUES (?1, ?2)",
                    params![owned, chrono::Utc::now().to_rfc3339()],
                )?;
                for row in &rows {
                    insert_entry(&tx, &owned, row)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(self.instance_handle(name))
    }

    pub async fn has_instance(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_instances WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all instances, oldest first.
    pub async fn instance_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_instances ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an instance and, by cascade, all of its entries.
    ///
    /// Returns whether the instance existed.
    pub async fn delete_instance(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_instances WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Name of the instance recorded by the last successful activation.
    pub async fn active_instance(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> {
                let name = conn
                    .query_row("SELECT active_instance FROM worker_state WHERE id = 1", [], |row| {
                        row.get::<_, Option<String>>(0)
                    })
                    .optional()?;
                Ok(name.flatten())
            })
            .await
            .map_err(Error::from)
    }

    /// Record the instance that is now serving requests.
    pub async fn set_active_instance(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO worker_state (id, active_instance, activated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET
                        active_instance = excluded.active_instance,
                        activated_at = excluded.activated_at",
                    params![name, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
