use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};

use clkmgr_core::config::{ConfigSource, JsonConfigSource, StaticConfigSource};
use clkmgr_core::timebase::TimeBaseCfg;
use clkmgr_core::transport::{Listener, ListenerRegistry, PROXY_QUEUE_NAME};
use clkmgr_core::Message;

use clkmgr_proxy::dispatch::{handle_connect, handle_subscribe, ProxyState};
use clkmgr_proxy::monitor::{FileBackedPtpSource, FileBackedSysSource};
use clkmgr_proxy::{DaemonMonitor, InitBarrier, SessionRegistry, TimeBaseAggregator};

/// Default configuration used when no config file is given, so the
/// binary has something to run against out of the box.
fn default_timebases() -> Vec<TimeBaseCfg> {
    vec![TimeBaseCfg {
        time_base_index: 1,
        name: "eth0-ptp".into(),
        interface_name: "eth0".into(),
        transport_specific: 1,
        domain_number: 0,
        have_sys: true,
        have_ptp: true,
    }]
}

fn load_timebases() -> Vec<TimeBaseCfg> {
    match std::env::var("CLKMGR_CONFIG") {
        Ok(path) => match JsonConfigSource::new(PathBuf::from(&path)).load() {
            Ok(tbs) => tbs,
            Err(e) => {
                error!("failed to load {path}: {e}, falling back to defaults");
                StaticConfigSource::new(default_timebases()).load().unwrap()
            }
        },
        Err(_) => StaticConfigSource::new(default_timebases()).load().unwrap(),
    }
}

fn main() {
    clkmgr_proxy::logging::init();

    let timebases = load_timebases();
    info!("loaded {} configured time base(s)", timebases.len());

    let sessions = Arc::new(SessionRegistry::new());
    let aggregator = Arc::new(TimeBaseAggregator::new(
        Arc::clone(&sessions),
        timebases.iter().map(|tb| tb.time_base_index),
    ));
    let state = Arc::new(ProxyState {
        sessions: Arc::clone(&sessions),
        aggregator: Arc::clone(&aggregator),
        timebases: timebases.clone(),
    });

    let listener_registry = ListenerRegistry::new();
    let dispatch_state = Arc::clone(&state);
    let listener = Listener::spawn(PROXY_QUEUE_NAME, true, Box::new(move |msg| match msg {
        Message::Connect { header, body } => handle_connect(&dispatch_state, &header, &body),
        Message::Subscribe { header, body } => handle_subscribe(&dispatch_state, &header, &body),
        Message::Notify { header, .. } => {
            // Proxy never receives Notify; a well-behaved client only sends
            // Connect/Subscribe on this queue.
            error!("unexpected Notify on proxy queue from session {:#06x}", header.session_id);
        }
    }))
    .expect("binding proxy queue");
    listener_registry.register(listener);

    let monitor = DaemonMonitor::new();
    let barrier = Arc::new(InitBarrier::new());
    let spool_dir = std::env::var("CLKMGR_SPOOL_DIR").unwrap_or_else(|_| "/tmp/clkmgr".into());
    std::fs::create_dir_all(&spool_dir).ok();

    for tb in &timebases {
        if tb.have_ptp {
            let path = format!("{spool_dir}/tb{}-ptp.json", tb.time_base_index);
            monitor.spawn_ptp(
                Arc::clone(&aggregator),
                tb.time_base_index,
                Arc::new(FileBackedPtpSource::new(path, 1_000_000)),
                Arc::clone(&barrier),
            );
        }
        if tb.have_sys {
            let path = format!("{spool_dir}/tb{}-sys.json", tb.time_base_index);
            monitor.spawn_sys(
                Arc::clone(&aggregator),
                tb.time_base_index,
                Arc::new(FileBackedSysSource::new(path, 1_000_000)),
                Arc::clone(&barrier),
            );
        }
    }
    barrier.release();

    info!("clkmgr-proxyd ready on {PROXY_QUEUE_NAME}; type 'quit' to shut down");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(l) if l.trim() == "quit" => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    info!("shutting down");
    monitor.stop();
    monitor.finalize();
    listener_registry.stop_all();
    listener_registry.finalize_all();
}
