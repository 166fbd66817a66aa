//! `DocumentClient` -- the only remote dependency SheetGate has.
//!
//! Everything else (HTTP transport, request-signature validation, business
//! endpoints, the remote spreadsheet service itself) lives outside this
//! crate's scope; this trait is the abstract capability the Connection Pool
//! and Batch Coordinator are built against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An opaque remote-session handle returned by `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle(pub String);

/// A sheet (tab) within a tenant's spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub title: String,
}

/// A single row of cell data, keyed by column header.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Classification of failures the remote document store can produce. This
/// is distinct from `SheetGateError`: callers of `DocumentClient` map
/// `ClientError` onto the broader taxonomy (e.g. `Transient` retries once,
/// `RateLimited` becomes `SheetGateError::RateLimited`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("transient error: {0}")]
    Transient(String),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },
    #[error("auth error: {0}")]
    Auth(String),
    #[error("fatal error: {0}")]
    Fatal(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Abstract capability for talking to the remote spreadsheet service.
///
/// Implementations hide authentication, transport, and reconnection from
/// every other SheetGate component.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    async fn open(&self, sheet_ref: &str) -> ClientResult<Handle>;
    async fn load_info(&self, handle: &Handle) -> ClientResult<()>;
    async fn ensure_sheet(
        &self,
        handle: &Handle,
        title: &str,
        headers: &[String],
    ) -> ClientResult<Sheet>;
    async fn get_rows(&self, sheet: &Sheet, range: Option<&str>) -> ClientResult<Vec<Row>>;
    async fn add_rows(&self, sheet: &Sheet, rows: Vec<Row>) -> ClientResult<usize>;
    async fn update_row(
        &self,
        sheet: &Sheet,
        row_id: &str,
        fields: HashMap<String, String>,
    ) -> ClientResult<()>;
    async fn delete_row(&self, sheet: &Sheet, row_id: &str) -> ClientResult<()>;
    async fn close(&self, handle: &Handle) -> ClientResult<()>;
}

pub mod fake {
    //! An in-memory `DocumentClient` used by every other crate's tests so
    //! coalescing, invalidation, and pool behavior can be exercised without
    //! a network dependency.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct SheetState {
        headers: Vec<String>,
        rows: Vec<Row>,
    }

    /// A fully in-process stand-in for the remote spreadsheet service.
    ///
    /// Records every `add_rows` call so batching tests can assert on
    /// coalescence (number of remote round-trips, row counts per call).
    /// Each remote method can have a queue of `ClientError`s to return
    /// before falling through to its normal behavior, so callers (pool and
    /// coordinator retry tests) can script transient, rate-limited, auth,
    /// and fatal failures without a network dependency.
    pub struct FakeDocumentClient {
        sheets: Mutex<HashMap<String, SheetState>>,
        next_row_id: AtomicU64,
        pub add_rows_calls: Mutex<Vec<(String, usize)>>,
        open_faults: Mutex<VecDeque<ClientError>>,
        ensure_sheet_faults: Mutex<VecDeque<ClientError>>,
        add_rows_faults: Mutex<VecDeque<ClientError>>,
        update_row_faults: Mutex<VecDeque<ClientError>>,
        delete_row_faults: Mutex<VecDeque<ClientError>>,
    }

    impl Default for FakeDocumentClient {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FakeDocumentClient {
        pub fn new() -> Self {
            Self {
                sheets: Mutex::new(HashMap::new()),
                next_row_id: AtomicU64::new(1),
                add_rows_calls: Mutex::new(Vec::new()),
                open_faults: Mutex::new(VecDeque::new()),
                ensure_sheet_faults: Mutex::new(VecDeque::new()),
                add_rows_faults: Mutex::new(VecDeque::new()),
                update_row_faults: Mutex::new(VecDeque::new()),
                delete_row_faults: Mutex::new(VecDeque::new()),
            }
        }

        pub fn fail_next_open(&self) {
            self.queue_open_fault(ClientError::Auth("forced failure".into()));
        }

        pub fn queue_open_fault(&self, err: ClientError) {
            self.open_faults.lock().unwrap().push_back(err);
        }

        pub fn queue_ensure_sheet_fault(&self, err: ClientError) {
            self.ensure_sheet_faults.lock().unwrap().push_back(err);
        }

        pub fn queue_add_rows_fault(&self, err: ClientError) {
            self.add_rows_faults.lock().unwrap().push_back(err);
        }

        pub fn queue_update_row_fault(&self, err: ClientError) {
            self.update_row_faults.lock().unwrap().push_back(err);
        }

        pub fn queue_delete_row_fault(&self, err: ClientError) {
            self.delete_row_faults.lock().unwrap().push_back(err);
        }

        pub fn call_count_for(&self, title: &str) -> usize {
            self.add_rows_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == title)
                .count()
        }
    }

    #[async_trait]
    impl DocumentClient for FakeDocumentClient {
        async fn open(&self, sheet_ref: &str) -> ClientResult<Handle> {
            if let Some(err) = self.open_faults.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(Handle(sheet_ref.to_string()))
        }

        async fn load_info(&self, _handle: &Handle) -> ClientResult<()> {
            Ok(())
        }

        async fn ensure_sheet(
            &self,
            _handle: &Handle,
            title: &str,
            headers: &[String],
        ) -> ClientResult<Sheet> {
            if let Some(err) = self.ensure_sheet_faults.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut sheets = self.sheets.lock().unwrap();
            let state = sheets.entry(title.to_string()).or_default();
            if state.headers.is_empty() {
                state.headers = headers.to_vec();
            }
            Ok(Sheet {
                title: title.to_string(),
            })
        }

        async fn get_rows(&self, sheet: &Sheet, _range: Option<&str>) -> ClientResult<Vec<Row>> {
            let sheets = self.sheets.lock().unwrap();
            Ok(sheets
                .get(&sheet.title)
                .map(|s| s.rows.clone())
                .unwrap_or_default())
        }

        async fn add_rows(&self, sheet: &Sheet, mut rows: Vec<Row>) -> ClientResult<usize> {
            if let Some(err) = self.add_rows_faults.lock().unwrap().pop_front() {
                return Err(err);
            }

            self.add_rows_calls
                .lock()
                .unwrap()
                .push((sheet.title.clone(), rows.len()));

            let mut sheets = self.sheets.lock().unwrap();
            let state = sheets.entry(sheet.title.clone()).or_default();
            for row in rows.iter_mut() {
                if row.id.is_empty() {
                    row.id = self.next_row_id.fetch_add(1, Ordering::SeqCst).to_string();
                }
            }
            let added = rows.len();
            state.rows.extend(rows);
            Ok(added)
        }

        async fn update_row(
            &self,
            sheet: &Sheet,
            row_id: &str,
            fields: HashMap<String, String>,
        ) -> ClientResult<()> {
            if let Some(err) = self.update_row_faults.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut sheets = self.sheets.lock().unwrap();
            let state = sheets
                .get_mut(&sheet.title)
                .ok_or_else(|| ClientError::Transient(format!("unknown sheet {}", sheet.title)))?;
            let row = state
                .rows
                .iter_mut()
                .find(|r| r.id == row_id)
                .ok_or_else(|| ClientError::Transient(format!("unknown row {row_id}")))?;
            row.fields.extend(fields);
            Ok(())
        }

        async fn delete_row(&self, sheet: &Sheet, row_id: &str) -> ClientResult<()> {
            if let Some(err) = self.delete_row_faults.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut sheets = self.sheets.lock().unwrap();
            if let Some(state) = sheets.get_mut(&sheet.title) {
                state.rows.retain(|r| r.id != row_id);
            }
            Ok(())
        }

        async fn close(&self, _handle: &Handle) -> ClientResult<()> {
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn add_rows_then_get_rows_round_trips() {
            let client = FakeDocumentClient::new();
            let handle = client.open("sheet-1").await.unwrap();
            let sheet = client
                .ensure_sheet(&handle, "METRICS", &["a".into(), "b".into()])
                .await
                .unwrap();

            let mut row = Row::default();
            row.fields.insert("a".into(), "1".into());
            client.add_rows(&sheet, vec![row]).await.unwrap();

            let rows = client.get_rows(&sheet, None).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(client.call_count_for("METRICS"), 1);
        }

        #[tokio::test]
        async fn forced_open_failure_surfaces_once() {
            let client = FakeDocumentClient::new();
            client.fail_next_open();
            assert!(client.open("sheet-1").await.is_err());
            assert!(client.open("sheet-1").await.is_ok());
        }
    }
}
