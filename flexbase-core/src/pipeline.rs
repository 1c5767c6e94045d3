// flexbase-core/src/pipeline.rs
// Index maintenance pipeline
//
// Every mutation writes the primary store first and then enqueues one
// IndexEvent here. A single consumer thread applies events strictly in
// enqueue order, across all tables, so sorted indexes only ever have one
// writer. Reads that go through an index may briefly miss a fresh write or
// still see a deleted one; `flush` waits until everything enqueued so far
// has been applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::QueueBound;
use crate::document::Document;
use crate::error::{FlexError, Result};
use crate::table::Table;
use crate::{log_debug, log_error, log_info, log_trace};

/// Tables by name, shared between the database and the pipeline consumer
pub type TableMap = DashMap<String, Arc<Table>>;

/// Index effect of one mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// New document: add its fields to the indexes
    Insert,
    /// Changed document: drop its old entries, then insert
    Reindex,
    /// Deleted document: drop its entries
    Remove,
}

#[derive(Debug, Clone)]
pub struct IndexEvent {
    pub table: String,
    pub doc: Document,
    pub kind: EventKind,
}

impl IndexEvent {
    pub fn new(table: impl Into<String>, doc: Document, kind: EventKind) -> Self {
        IndexEvent {
            table: table.into(),
            doc,
            kind,
        }
    }
}

enum Message {
    Event(IndexEvent),
    /// Barrier: answered once every earlier message has been handled
    Flush(Sender<()>),
}

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub enqueued: u64,
    pub applied: u64,
    pub failed: u64,
}

impl PipelineStats {
    /// Events enqueued but not yet handled
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.applied + self.failed)
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
}

pub struct IndexPipeline {
    sender: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl IndexPipeline {
    /// Spawn the consumer thread
    pub fn start(tables: Arc<TableMap>, bound: QueueBound) -> Result<Self> {
        let (sender, receiver) = match bound.capacity() {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker = std::thread::Builder::new()
            .name("flexbase-index".into())
            .spawn(move || consume(receiver, tables, worker_counters))
            .map_err(|e| FlexError::PipelineStart(e.to_string()))?;

        log_info!("index pipeline started ({:?})", bound);

        Ok(IndexPipeline {
            sender: Some(sender),
            worker: Some(worker),
            counters,
        })
    }

    /// Queue an event; blocks only when a bounded queue is full
    pub fn enqueue(&self, event: IndexEvent) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(FlexError::PipelineClosed)?;
        log_trace!("enqueue {:?} for {}", event.kind, event.table);
        // Counted before sending so `applied + failed` never exceeds it
        self.counters.enqueued.fetch_add(1, Ordering::AcqRel);
        if sender.send(Message::Event(event)).is_err() {
            self.counters.enqueued.fetch_sub(1, Ordering::AcqRel);
            return Err(FlexError::PipelineClosed);
        }
        Ok(())
    }

    /// Block until every event enqueued before this call has been applied
    pub fn flush(&self) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(FlexError::PipelineClosed)?;
        let (reply_tx, reply_rx) = channel::bounded(1);
        sender
            .send(Message::Flush(reply_tx))
            .map_err(|_| FlexError::PipelineClosed)?;
        reply_rx.recv().map_err(|_| FlexError::PipelineClosed)
    }

    pub fn stats(&self) -> PipelineStats {
        // Handled counts first: anything they include was enqueued earlier
        let applied = self.counters.applied.load(Ordering::Acquire);
        let failed = self.counters.failed.load(Ordering::Acquire);
        PipelineStats {
            enqueued: self.counters.enqueued.load(Ordering::Acquire),
            applied,
            failed,
        }
    }
}

impl Drop for IndexPipeline {
    /// Closing the channel lets the consumer drain what is queued and exit
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log_error!("index pipeline thread panicked");
            }
        }
    }
}

fn consume(receiver: Receiver<Message>, tables: Arc<TableMap>, counters: Arc<Counters>) {
    for message in receiver.iter() {
        match message {
            Message::Event(event) => match apply(&tables, &event) {
                Ok(()) => {
                    counters.applied.fetch_add(1, Ordering::Release);
                }
                Err(e) => {
                    // One bad event must not stop indexing for everyone else
                    counters.failed.fetch_add(1, Ordering::Release);
                    log_error!(
                        "index event {:?} on table '{}' failed: {}",
                        event.kind,
                        event.table,
                        e
                    );
                }
            },
            Message::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
    log_info!("index pipeline stopped");
}

fn apply(tables: &TableMap, event: &IndexEvent) -> Result<()> {
    let table = tables
        .get(&event.table)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| FlexError::TableNotFound(event.table.clone()))?;
    let id = event.doc.id()?;

    match event.kind {
        EventKind::Insert => {
            let inserted = table.index_document(&event.doc)?;
            log_trace!("indexed {} fields of {}/{}", inserted, event.table, id);
        }
        EventKind::Reindex => {
            let removed = table.unindex_document(id);
            let inserted = table.index_document(&event.doc)?;
            log_trace!(
                "reindexed {}/{}: -{} +{}",
                event.table,
                id,
                removed,
                inserted
            );
        }
        EventKind::Remove => {
            let removed = table.unindex_document(id);
            log_debug!("unindexed {}/{} from {} indexes", event.table, id, removed);
        }
    }
    Ok(())
}
