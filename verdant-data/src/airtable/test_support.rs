//! Deterministic test doubles for the remote table transport.
//!
//! [`StubStore`] answers from scripted in-memory state and records every
//! call, letting tests count network round-trips and inspect batch sizes
//! without a running service.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    future::Future,
    io::Write,
};

use async_trait::async_trait;

use verdant_core::{Page, PageToken, Record, RecordId, Value};

use super::error::TransportError;
use super::source::TableStore;
use super::types::{TableRef, ViewId, WebhookUrl};
use super::wire::JsonFields;

/// Run a future on a throwaway current-thread runtime.
pub fn block_on_for_tests<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime")
        .block_on(future)
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// A page listing with its filter and continuation arguments.
    ListPage {
        /// Addressed table, rendered as `base/table`.
        table: String,
        /// Saved-view filter, when supplied.
        view: Option<String>,
        /// Continuation token, when supplied.
        offset: Option<String>,
    },
    /// A single-record fetch.
    GetRecord {
        /// Addressed table, rendered as `base/table`.
        table: String,
        /// Requested record id.
        id: String,
    },
    /// A batch write with its record count.
    CreateRecords {
        /// Addressed table, rendered as `base/table`.
        table: String,
        /// Number of records in the batch.
        len: usize,
        /// Field names of the first record, sorted.
        columns: Vec<String>,
    },
    /// A single-record delete.
    DeleteRecord {
        /// Addressed table, rendered as `base/table`.
        table: String,
        /// Deleted record id.
        id: String,
    },
    /// A deletion-trigger invocation.
    TriggerWebhook {
        /// Trigger endpoint.
        url: String,
    },
    /// An attachment download.
    DownloadAttachment {
        /// Attachment URL.
        url: String,
    },
}

/// Stub [`TableStore`] backed by scripted in-memory responses.
#[derive(Debug, Default)]
pub struct StubStore {
    calls: RefCell<Vec<StoreCall>>,
    pages: RefCell<VecDeque<Result<Page, TransportError>>>,
    records: RefCell<HashMap<String, Record>>,
    create_responses: RefCell<VecDeque<Result<(), TransportError>>>,
    delete_responses: RefCell<VecDeque<Result<(), TransportError>>>,
    trigger_responses: RefCell<VecDeque<Result<(), TransportError>>>,
    attachments: RefCell<HashMap<String, Vec<u8>>>,
    record_seq: Cell<usize>,
}

impl StubStore {
    /// Construct an empty stub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a listing response.
    pub fn push_page(&self, page: Page) {
        self.pages.borrow_mut().push_back(Ok(page));
    }

    /// Queue a failed listing response with the given HTTP status.
    pub fn push_page_failure(&self, status: u16) {
        self.pages.borrow_mut().push_back(Err(http_error(status)));
    }

    /// Queue a listing page of `count` generated records.
    ///
    /// Each generated record carries a unique id and a `CODE` field; the
    /// generated records are also registered for single-record fetches.
    pub fn push_page_with_records(&self, count: usize, offset: Option<&str>) {
        let records: Vec<Record> = (0..count).map(|_| self.generate_record()).collect();
        for record in &records {
            self.insert_record(record.clone());
        }
        self.push_page(Page::new(records, offset.map(PageToken::from)));
    }

    /// Register a record for single-record fetches.
    pub fn insert_record(&self, record: Record) {
        self.records
            .borrow_mut()
            .insert(record.id().as_ref().to_owned(), record);
    }

    /// Queue a batch-write response; an exhausted queue answers success.
    pub fn push_create_response(&self, response: Result<(), u16>) {
        self.create_responses
            .borrow_mut()
            .push_back(response.map_err(http_error));
    }

    /// Queue a delete response; an exhausted queue answers success.
    pub fn push_delete_response(&self, response: Result<(), u16>) {
        self.delete_responses
            .borrow_mut()
            .push_back(response.map_err(http_error));
    }

    /// Queue a trigger response; an exhausted queue answers success.
    pub fn push_trigger_response(&self, response: Result<(), u16>) {
        self.trigger_responses
            .borrow_mut()
            .push_back(response.map_err(http_error));
    }

    /// Register an attachment body served at `url`.
    pub fn set_attachment(&self, url: impl Into<String>, body: Vec<u8>) {
        self.attachments.borrow_mut().insert(url.into(), body);
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.borrow().clone()
    }

    /// Number of page listings issued.
    pub fn list_page_count(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::ListPage { .. }))
    }

    /// Number of single-record fetches issued.
    pub fn get_record_count(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::GetRecord { .. }))
    }

    /// Number of deletion-trigger invocations issued.
    pub fn trigger_count(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::TriggerWebhook { .. }))
    }

    /// Number of single-record deletes issued.
    pub fn delete_count(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::DeleteRecord { .. }))
    }

    /// Sizes of the submitted batches, in submission order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                StoreCall::CreateRecords { len, .. } => Some(*len),
                _ => None,
            })
            .collect()
    }

    fn count<F: Fn(&StoreCall) -> bool>(&self, matches: F) -> usize {
        self.calls.borrow().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: StoreCall) {
        self.calls.borrow_mut().push(call);
    }

    fn generate_record(&self) -> Record {
        let seq = self.record_seq.get();
        self.record_seq.set(seq + 1);
        let fields = HashMap::from([(
            "CODE".to_owned(),
            Value::Text(format!("code-{seq}")),
        )]);
        Record::new(RecordId::new(format!("rec{seq}")), fields)
    }
}

fn http_error(status: u16) -> TransportError {
    TransportError::Http {
        url: "https://stub.example/v0".to_owned(),
        status,
        message: format!("stubbed failure with status {status}"),
    }
}

#[async_trait(?Send)]
impl TableStore for StubStore {
    async fn list_page(
        &self,
        table: &TableRef,
        view: Option<&ViewId>,
        offset: Option<&PageToken>,
    ) -> Result<Page, TransportError> {
        self.record(StoreCall::ListPage {
            table: table.to_string(),
            view: view.map(|value| value.as_ref().to_owned()),
            offset: offset.map(|value| value.as_ref().to_owned()),
        });
        self.pages
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::new(Vec::new(), None)))
    }

    async fn get_record(
        &self,
        table: &TableRef,
        id: &RecordId,
    ) -> Result<Record, TransportError> {
        self.record(StoreCall::GetRecord {
            table: table.to_string(),
            id: id.as_ref().to_owned(),
        });
        self.records
            .borrow()
            .get(id.as_ref())
            .cloned()
            .ok_or_else(|| http_error(404))
    }

    async fn create_records(
        &self,
        table: &TableRef,
        rows: &[JsonFields],
    ) -> Result<(), TransportError> {
        let mut columns: Vec<String> = rows
            .first()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();
        columns.sort();
        self.record(StoreCall::CreateRecords {
            table: table.to_string(),
            len: rows.len(),
            columns,
        });
        self.create_responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn delete_record(
        &self,
        table: &TableRef,
        id: &RecordId,
    ) -> Result<(), TransportError> {
        self.record(StoreCall::DeleteRecord {
            table: table.to_string(),
            id: id.as_ref().to_owned(),
        });
        self.delete_responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn trigger_webhook(&self, url: &WebhookUrl) -> Result<(), TransportError> {
        self.record(StoreCall::TriggerWebhook {
            url: url.as_ref().to_owned(),
        });
        self.trigger_responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn download_attachment(
        &self,
        url: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        self.record(StoreCall::DownloadAttachment {
            url: url.to_owned(),
        });
        let attachments = self.attachments.borrow();
        let Some(body) = attachments.get(url) else {
            return Err(http_error(404));
        };
        sink.write_all(body)
            .map_err(|source| TransportError::Network {
                url: url.to_owned(),
                source,
            })?;
        Ok(body.len() as u64)
    }
}
