//! Entry operations on a single cache instance.
//!
//! Entries are keyed by request identity (method + absolute URL). Each entry
//! remembers the store-wide insertion counter it got on first insert; re-puts
//! replace status, headers and body in place but keep that position, so
//! enumeration order is first-insertion order.

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use crate::model::{Request, Response};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio_rusqlite::{params, rusqlite};
use url::Url;

/// Handle to one named cache instance.
///
/// Holding a handle does not keep the instance alive: once the sweeper
/// deletes it, writes through a stale handle fail instead of resurrecting it.
#[derive(Clone, Debug)]
pub struct CacheInstance {
    pub(crate) db: CacheDb,
    pub(crate) name: String,
}

/// Stored entry metadata, without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Body length in bytes; zero when it could not be read.
    pub size: u64,
}

/// A row ready to be written to `cache_entries`.
#[derive(Debug, Clone)]
pub(crate) struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    pub(crate) fn new(request: &Request, response: &Response) -> Result<Self, Error> {
        Ok(Self {
            key_hash: compute_cache_key(&request.method, &request.url),
            method: request.method.as_str().to_string(),
            url: request.url.as_str().to_string(),
            status: response.status.as_u16(),
            headers_json: encode_headers(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

/// Header values are stored hex-encoded so non-UTF-8 bytes survive the trip.
fn encode_headers(headers: &HeaderMap) -> Result<String, Error> {
    let pairs: Vec<(&str, String)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), hex::encode(value.as_bytes())))
        .collect();
    Ok(serde_json::to_string(&pairs)?)
}

fn decode_headers(json: &str) -> Result<HeaderMap, Error> {
    let pairs: Vec<(String, String)> =
        serde_json::from_str(json).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let raw = hex::decode(&value).map_err(|e| Error::CorruptEntry(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_bytes(&raw).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Insert or replace an entry. The instance row must already exist.
pub(crate) fn insert_entry(conn: &rusqlite::Connection, instance: &str, row: &EntryRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cache_entries (
            instance, key_hash, seq, method, url, status, headers_json, body, stored_at
        ) VALUES (
            ?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries), ?3, ?4, ?5, ?6, ?7, ?8
        )
        ON CONFLICT(instance, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            instance,
            &row.key_hash,
            &row.method,
            &row.url,
            row.status,
            &row.headers_json,
            &row.body,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Entry metadata in insertion order. Unreadable sizes count as zero.
pub(crate) fn list_entries(conn: &rusqlite::Connection, instance: &str) -> rusqlite::Result<Vec<EntryMeta>> {
    let mut stmt = conn.prepare(
        "SELECT key_hash, method, url, status, length(body)
         FROM cache_entries WHERE instance = ?1 ORDER BY seq ASC",
    )?;
    let mut rows = stmt.query(params![instance])?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let key_hash: String = row.get(0)?;
        let size = match row.get::<_, Option<i64>>(4) {
            Ok(Some(len)) => u64::try_from(len).unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(instance, key_hash = %key_hash, error = %e, "unreadable entry size, counting as 0");
                0
            }
        };
        entries.push(EntryMeta { key_hash, method: row.get(1)?, url: row.get(2)?, status: row.get(3)?, size });
    }
    Ok(entries)
}

impl CacheInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a response under the request's identity.
    ///
    /// # Errors
    ///
    /// Fails if the instance has been deleted or the database is unavailable.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), Error> {
        let row = EntryRow::new(request, response)?;
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                insert_entry(conn, &name, &row)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the stored response for a request.
    ///
    /// Returns None on a miss.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        self.match_key(&request.method, &request.url).await
    }

    /// Look up the stored GET response for a URL.
    pub async fn match_url(&self, url: &Url) -> Result<Option<Response>, Error> {
        self.match_key(&Method::GET, url).await
    }

    async fn match_key(&self, method: &Method, url: &Url) -> Result<Option<Response>, Error> {
        let key_hash = compute_cache_key(method, url);
        let name = self.name.clone();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(u16, String, Option<Vec<u8>>)>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body FROM cache_entries WHERE instance = ?1 AND key_hash = ?2",
                    params![name, key_hash],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((status, headers_json, body)) = row else {
            return Ok(None);
        };

        let status = StatusCode::from_u16(status).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        Ok(Some(Response { status, headers: decode_headers(&headers_json)?, body: body.unwrap_or_default().into() }))
    }

    /// Delete the entry for a request identity.
    ///
    /// Returns whether an entry was removed.
    pub async fn delete(&self, method: &Method, url: &Url) -> Result<bool, Error> {
        let key_hash = compute_cache_key(method, url);
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE instance = ?1 AND key_hash = ?2",
                    params![name, key_hash],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Entry metadata, oldest insertion first.
    pub async fn entries(&self) -> Result<Vec<EntryMeta>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<EntryMeta>, Error> { Ok(list_entries(conn, &name)?) })
            .await
            .map_err(Error::from)
    }

    /// Aggregate body size of all entries.
    pub async fn total_size(&self) -> Result<u64, Error> {
        Ok(self.entries().await?.iter().map(|e| e.size).sum())
    }
}
