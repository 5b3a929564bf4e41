//! Background writer for persisted state.
//!
//! A single worker thread owns all writes so two saves of the same blob can
//! never race on its temp and backup files. Requests that pile up while the
//! worker is busy are coalesced: only the newest bytes per name are written.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::atomic::AtomicStateWriter;
use crate::error::{Result, StorageError};

enum Request {
    Write { name: String, bytes: Vec<u8> },
    Flush(Sender<()>),
}

/// Fire-and-forget save queue backed by one worker thread.
pub struct SaveQueue {
    writer: AtomicStateWriter,
    sender: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
}

impl SaveQueue {
    /// Starts the worker thread writing through `writer`.
    pub fn start(writer: AtomicStateWriter) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker_writer = writer.clone();
        let worker = thread::Builder::new()
            .name("owl-state-writer".into())
            .spawn(move || run(worker_writer, receiver))
            .map_err(|err| StorageError::Worker(err.to_string()))?;

        Ok(Self {
            writer,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Writer used for synchronous operations on the same directory.
    pub fn writer(&self) -> &AtomicStateWriter {
        &self.writer
    }

    /// Queues `bytes` to be stored under `name`.
    pub fn submit(&self, name: impl Into<String>, bytes: Vec<u8>) -> Result<()> {
        self.send(Request::Write {
            name: name.into(),
            bytes,
        })
    }

    /// Blocks until every write submitted before this call has completed.
    pub fn flush(&self) -> Result<()> {
        let (ack, done) = mpsc::channel();
        self.send(Request::Flush(ack))?;
        done.recv()
            .map_err(|_| StorageError::Worker("writer stopped before flushing".into()))
    }

    fn send(&self, request: Request) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| StorageError::Worker("queue closed".into()))?
            .send(request)
            .map_err(|_| StorageError::Worker("writer thread is gone".into()))
    }
}

impl Drop for SaveQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is left, then exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("State writer thread panicked");
            }
        }
    }
}

fn run(writer: AtomicStateWriter, receiver: Receiver<Request>) {
    while let Ok(first) = receiver.recv() {
        let mut pending: Vec<(String, Vec<u8>)> = Vec::new();
        let mut acks = Vec::new();

        let mut next = Some(first);
        while let Some(request) = next {
            match request {
                Request::Write { name, bytes } => {
                    match pending.iter_mut().find(|(queued, _)| *queued == name) {
                        Some(slot) => {
                            log::debug!("Coalescing queued write of '{}'", name);
                            slot.1 = bytes;
                        }
                        None => pending.push((name, bytes)),
                    }
                }
                Request::Flush(ack) => acks.push(ack),
            }
            next = receiver.try_recv().ok();
        }

        for (name, bytes) in pending {
            if let Err(err) = writer.write(&name, &bytes) {
                log::error!("Failed to save '{}': {}", name, err);
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
    log::debug!("State writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn flush_waits_for_submitted_writes() {
        let temp = tempdir().unwrap();
        let queue = SaveQueue::start(AtomicStateWriter::new(temp.path())).unwrap();

        queue.submit("SESSION_a", b"one".to_vec()).unwrap();
        queue.flush().unwrap();

        assert_eq!(
            queue.writer().read("SESSION_a").unwrap().as_deref(),
            Some(&b"one"[..])
        );
    }

    #[test]
    fn latest_submission_wins() {
        let temp = tempdir().unwrap();
        let queue = SaveQueue::start(AtomicStateWriter::new(temp.path())).unwrap();

        for generation in 0..50u32 {
            queue
                .submit("SESSION_a", generation.to_string().into_bytes())
                .unwrap();
        }
        queue.flush().unwrap();

        assert_eq!(
            queue.writer().read("SESSION_a").unwrap().as_deref(),
            Some(&b"49"[..])
        );
    }

    #[test]
    fn drop_completes_pending_writes() {
        let temp = tempdir().unwrap();
        let writer = AtomicStateWriter::new(temp.path());
        {
            let queue = SaveQueue::start(writer.clone()).unwrap();
            queue.submit("SESSIONS", b"index".to_vec()).unwrap();
        }
        assert_eq!(writer.read("SESSIONS").unwrap().as_deref(), Some(&b"index"[..]));
    }
}
