//! Scripted connection for exercising the worker without hardware

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::message::{DeviceDescriptor, Message};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// How long an unscripted `read_line` waits before returning an empty line
const IDLE_READ: Duration = Duration::from_millis(10);

pub(crate) struct ScriptedConnection {
    reads: Mutex<VecDeque<Result<Message, ConnectionError>>>,
    written: Mutex<Vec<Message>>,
    fail_open: bool,
    fail_write_at: Option<usize>,
    open: AtomicBool,
    read_calls: AtomicUsize,
    write_calls: AtomicUsize,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    writes_held: Mutex<bool>,
    write_gate: Condvar,
}

impl ScriptedConnection {
    pub(crate) fn new() -> Self {
        Self {
            reads: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            fail_open: false,
            fail_write_at: None,
            open: AtomicBool::new(false),
            read_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            writes_held: Mutex::new(false),
            write_gate: Condvar::new(),
        }
    }

    /// Queue lines returned by successive `read_line` calls
    pub(crate) fn with_reads<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Message>,
    {
        self.reads
            .lock()
            .extend(lines.into_iter().map(|line| Ok(line.into())));
        self
    }

    /// Make the next unscripted read fail
    pub(crate) fn fail_read(self) -> Self {
        self.reads
            .lock()
            .push_back(Err(ConnectionError::Io("device unplugged".to_string())));
        self
    }

    pub(crate) fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail the `n`th write call (1-based)
    pub(crate) fn fail_write_at(mut self, n: usize) -> Self {
        self.fail_write_at = Some(n);
        self
    }

    /// Block writers inside `write` until [`release_writes`](Self::release_writes)
    pub(crate) fn hold_writes(&self) {
        *self.writes_held.lock() = true;
    }

    pub(crate) fn release_writes(&self) {
        *self.writes_held.lock() = false;
        self.write_gate.notify_all();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn written(&self) -> Vec<Message> {
        self.written.lock().clone()
    }

    pub(crate) fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Connection for ScriptedConnection {
    fn open(&self, device: &DeviceDescriptor) -> Result<(), ConnectionError> {
        if self.fail_open {
            return Err(ConnectionError::Open {
                device: device.to_string(),
                reason: "no such device".to_string(),
            });
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), ConnectionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn flush_input(&self) -> Result<(), ConnectionError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush_output(&self) -> Result<(), ConnectionError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_line(&self) -> Result<Message, ConnectionError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.reads.lock().pop_front() {
            return next;
        }
        std::thread::sleep(IDLE_READ);
        Ok(Message::default())
    }

    fn write(&self, message: &Message) -> Result<(), ConnectionError> {
        let n = self.write_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let mut held = self.writes_held.lock();
        while *held {
            self.write_gate.wait(&mut held);
        }
        drop(held);

        if self.fail_write_at == Some(n) {
            return Err(ConnectionError::Io("write failed".to_string()));
        }
        self.written.lock().push(message.clone());
        Ok(())
    }

    fn get_available_devices(&self) -> Result<Vec<DeviceDescriptor>, ConnectionError> {
        Ok(vec![DeviceDescriptor::from("mock0"), DeviceDescriptor::from("mock1")])
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub(crate) async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
