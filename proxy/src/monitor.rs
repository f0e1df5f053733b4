//! One worker thread per external source (a PTP instance or a chrony
//! instance) per time base, polling the source and feeding the
//! aggregator. Grounded on the teacher's `pty.rs` `spawn_pty` (plain
//! `std::thread::spawn` workers doing blocking I/O and
//! `try_wait`-on-a-cadence polling under a shared `Arc<Mutex<_>>`),
//! generalized from PTY process polling into external daemon polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::error;

use clkmgr_core::error::ClkmgrError;
use clkmgr_core::interval::DEFAULT_POLL_INTERVAL_US;
use clkmgr_core::timebase::{PtpSnapshot, SysSnapshot};

use crate::aggregator::TimeBaseAggregator;

/// Produces a `PtpSnapshot` for a given time base on demand (blocking).
/// The real `ptp4l` management-socket client is an external
/// collaborator out of scope per spec.md section 1; this trait is the
/// boundary it plugs into.
pub trait PtpSource: Send + Sync {
    fn poll(&self) -> Result<PtpSnapshot, ClkmgrError>;
    fn polling_interval_us(&self) -> i64 {
        DEFAULT_POLL_INTERVAL_US
    }
}

/// Produces a `SysSnapshot` similarly, standing in for a `chrony`
/// management-socket client.
pub trait SysClockSource: Send + Sync {
    fn poll(&self) -> Result<SysSnapshot, ClkmgrError>;
    fn polling_interval_us(&self) -> i64 {
        DEFAULT_POLL_INTERVAL_US
    }
}

/// A one-shot synchronization primitive all monitor threads wait on
/// before entering their poll loops, replacing the busy-sleep "is init
/// done yet" loop spec.md section 9 flags for removal.
#[derive(Default)]
pub struct InitBarrier {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl InitBarrier {
    pub fn new() -> Self {
        InitBarrier {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn wait(&self) {
        let mut guard = self.ready.lock().unwrap();
        while !*guard {
            guard = self.cv.wait(guard).unwrap();
        }
    }

    /// Called once the aggregator and transmitters are fully
    /// registered; wakes every waiting monitor thread.
    pub fn release(&self) {
        let mut guard = self.ready.lock().unwrap();
        *guard = true;
        self.cv.notify_all();
    }
}

fn poll_duration(interval_us: i64) -> Duration {
    if interval_us <= 0 {
        Duration::from_micros(DEFAULT_POLL_INTERVAL_US as u64)
    } else {
        Duration::from_micros(interval_us as u64)
    }
}

/// Owns every monitor thread; `stop` then joins via `finalize`, the
/// same two-phase shutdown the queue transport's listener registry
/// uses.
#[derive(Default)]
pub struct DaemonMonitor {
    stop: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DaemonMonitor {
    pub fn new() -> Self {
        DaemonMonitor {
            stop: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn spawn_ptp(
        &self,
        aggregator: Arc<TimeBaseAggregator>,
        time_base_index: u32,
        source: Arc<dyn PtpSource>,
        barrier: Arc<InitBarrier>,
    ) {
        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name(format!("clkmgr-monitor-ptp-{time_base_index}"))
            .spawn(move || {
                barrier.wait();
                while !stop.load(Ordering::Relaxed) {
                    match source.poll() {
                        Ok(snap) => aggregator.push_ptp(time_base_index, snap),
                        Err(e) => error!("ptp poll for time base {time_base_index} failed: {e}"),
                    }
                    thread::sleep(poll_duration(source.polling_interval_us()));
                }
            })
            .expect("spawning ptp monitor thread");
        self.handles.lock().unwrap().push(handle);
    }

    pub fn spawn_sys(
        &self,
        aggregator: Arc<TimeBaseAggregator>,
        time_base_index: u32,
        source: Arc<dyn SysClockSource>,
        barrier: Arc<InitBarrier>,
    ) {
        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name(format!("clkmgr-monitor-sys-{time_base_index}"))
            .spawn(move || {
                barrier.wait();
                while !stop.load(Ordering::Relaxed) {
                    match source.poll() {
                        Ok(snap) => aggregator.push_sys(time_base_index, snap),
                        Err(e) => error!("sys poll for time base {time_base_index} failed: {e}"),
                    }
                    thread::sleep(poll_duration(source.polling_interval_us()));
                }
            })
            .expect("spawning sys monitor thread");
        self.handles.lock().unwrap().push(handle);
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn finalize(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// Test/demo source reading a `PtpSnapshot` from a JSON file on every
/// poll, standing in for the real `ptp4l` management-socket client the
/// monitor loop needs something concrete to poll against.
pub struct FileBackedPtpSource {
    path: std::path::PathBuf,
    interval_us: i64,
}

impl FileBackedPtpSource {
    pub fn new(path: impl Into<std::path::PathBuf>, interval_us: i64) -> Self {
        FileBackedPtpSource {
            path: path.into(),
            interval_us,
        }
    }
}

impl PtpSource for FileBackedPtpSource {
    fn poll(&self) -> Result<PtpSnapshot, ClkmgrError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| ClkmgrError::Config(format!("reading {}: {e}", self.path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ClkmgrError::Config(format!("parsing {}: {e}", self.path.display())))
    }

    fn polling_interval_us(&self) -> i64 {
        self.interval_us
    }
}

/// Test/demo source for the system-clock side, analogous to
/// `FileBackedPtpSource`.
pub struct FileBackedSysSource {
    path: std::path::PathBuf,
    interval_us: i64,
}

impl FileBackedSysSource {
    pub fn new(path: impl Into<std::path::PathBuf>, interval_us: i64) -> Self {
        FileBackedSysSource {
            path: path.into(),
            interval_us,
        }
    }
}

impl SysClockSource for FileBackedSysSource {
    fn poll(&self) -> Result<SysSnapshot, ClkmgrError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| ClkmgrError::Config(format!("reading {}: {e}", self.path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ClkmgrError::Config(format!("parsing {}: {e}", self.path.display())))
    }

    fn polling_interval_us(&self) -> i64 {
        self.interval_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;
    use std::io::Write;

    struct FixedPtpSource(PtpSnapshot);
    impl PtpSource for FixedPtpSource {
        fn poll(&self) -> Result<PtpSnapshot, ClkmgrError> {
            Ok(self.0)
        }
        fn polling_interval_us(&self) -> i64 {
            10_000 // 10ms, fast enough for a test
        }
    }

    #[test]
    fn init_barrier_releases_waiters() {
        let barrier = Arc::new(InitBarrier::new());
        let waiter_barrier = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            waiter_barrier.wait();
        });
        thread::sleep(Duration::from_millis(20));
        barrier.release();
        handle.join().unwrap();
    }

    #[test]
    fn monitor_thread_pushes_into_aggregator() {
        let sessions = Arc::new(SessionRegistry::new());
        let aggregator = Arc::new(TimeBaseAggregator::new(sessions, [1]));
        let monitor = DaemonMonitor::new();
        let barrier = Arc::new(InitBarrier::new());
        let source = Arc::new(FixedPtpSource(PtpSnapshot {
            offset_ns: 123,
            gm_identity: [9; 8],
            as_capable: true,
            synced_to_primary: true,
            instance_id: 0,
            sync_interval_us: 1_000_000,
        }));

        monitor.spawn_ptp(Arc::clone(&aggregator), 1, source, Arc::clone(&barrier));
        barrier.release();
        thread::sleep(Duration::from_millis(50));
        monitor.stop();
        monitor.finalize();

        assert_eq!(aggregator.snapshot(1).unwrap().ptp.unwrap().offset_ns, 123);
    }

    #[test]
    fn file_backed_ptp_source_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"offset_ns":5,"gm_identity":[0,0,0,0,0,0,0,1],"as_capable":true,"synced_to_primary":false,"instance_id":0,"sync_interval_us":1000000}}"#
        )
        .unwrap();
        let source = FileBackedPtpSource::new(file.path(), 1_000_000);
        let snap = source.poll().unwrap();
        assert_eq!(snap.offset_ns, 5);
    }
}
