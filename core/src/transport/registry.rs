//! Listener threads and their shutdown registry. Grounded on
//! `original_source/clkmgr/common/msgq_tport.hpp`'s `Listener` class
//! (owned queue + thread + atomic exit flag) and on the teacher's
//! `pty.rs` pattern of a background thread doing blocking I/O with a
//! polled exit condition, reworked from a `std::promise`/`future`
//! completion signal into a plain `JoinHandle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};

use crate::codec::MAX_BUFFER_LEN;
use crate::error::ClkmgrError;
use crate::message::Message;
use crate::transport::queue::{open_queue, recv_timeout, unlink_queue};

/// How often a listener's blocking receive times out to re-check the
/// stop flag. Not part of the wire protocol; purely an internal
/// responsiveness knob.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long `ListenerRegistry::stop_all` sleeps after raising every
/// stop flag before joining, giving in-flight receives a chance to
/// observe the request (spec.md section 4.3: "a short global sleep
/// lets them observe the request").
const STOP_GRACE_PERIOD: Duration = Duration::from_millis(250);

pub type MessageHandler = Box<dyn Fn(Message) + Send + Sync>;

/// One background thread decoding datagrams off a named queue and
/// dispatching them to a handler keyed by `msg_id` (the handler itself
/// does the `match` on the parsed `Message`).
pub struct Listener {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    owns_queue: bool,
}

impl Listener {
    /// Spawns a listener on `name`, creating the queue if `create` is
    /// set (the proxy creates its well-known queue; a client's inbound
    /// queue is also created by the client that owns it).
    pub fn spawn(
        name: impl Into<String>,
        create: bool,
        handler: MessageHandler,
    ) -> Result<Self, ClkmgrError> {
        let name = name.into();
        let mq = open_queue(&name, create, false)?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(format!("clkmgr-listener-{thread_name}"))
            .spawn(move || {
                let mut buf = vec![0u8; MAX_BUFFER_LEN];
                loop {
                    if thread_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match recv_timeout(&mq, &mut buf, POLL_INTERVAL) {
                        Ok(Some(len)) => match Message::parse(&buf[..len]) {
                            Ok(msg) => handler(msg),
                            Err(e) => warn!("{thread_name}: dropping malformed datagram: {e}"),
                        },
                        Ok(None) => continue,
                        Err(e) => {
                            error!("{thread_name}: listener receive failed: {e}");
                            break;
                        }
                    }
                }
                debug!("{thread_name}: listener thread exiting");
            })
            .map_err(ClkmgrError::Io)?;

        Ok(Listener {
            name,
            stop,
            handle: Some(handle),
            owns_queue: create,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks the loop to exit at its next receive timeout. Does not
    /// block; callers wanting a guarantee that no handler runs again
    /// must call `finalize`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Joins the thread and, if this listener created its queue,
    /// unlinks it. After this returns no handler will run again.
    pub fn finalize(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if self.owns_queue {
            if let Err(e) = unlink_queue(&self.name) {
                warn!("failed to unlink queue {}: {e}", self.name);
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// An explicitly owned registry of listeners, scoped to the process
/// that constructs it (the proxy binary, or a client facade) rather
/// than a global singleton, per spec.md section 9's first REDESIGN
/// FLAG.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        ListenerRegistry {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, listener: Listener) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Signals every registered listener to exit, then sleeps briefly
    /// so in-flight blocking receives observe the request.
    pub fn stop_all(&self) {
        let guard = self.listeners.lock().unwrap();
        for listener in guard.iter() {
            listener.stop();
        }
        drop(guard);
        thread::sleep(STOP_GRACE_PERIOD);
    }

    /// Joins and unlinks every registered listener. Call after
    /// `stop_all`.
    pub fn finalize_all(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock().unwrap());
        for listener in listeners {
            listener.finalize();
        }
    }
}
