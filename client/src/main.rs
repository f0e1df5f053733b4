use std::io::BufRead;

use log::{error, info};

use clkmgr_core::events::{CompositeMask, EventMask};
use clkmgr_core::timebase::{Threshold, ThresholdKind};

use clkmgr_client::{ClockManagerClient, ClockStatus, Subscription};

/// `timeBaseIndex` this demo subscribes to; matches the proxy's default
/// single-time-base configuration.
const DEMO_TIME_BASE_INDEX: u32 = 1;

fn demo_subscription() -> Subscription {
    Subscription {
        event_mask: EventMask::OFFSET_IN_RANGE | EventMask::SYNCED_TO_GM | EventMask::GM_CHANGED,
        composite_mask: CompositeMask::AS_CAPABLE | CompositeMask::SYNCED_TO_GM,
        gm_offset_threshold: Some(Threshold::new(ThresholdKind::GmOffset, -1000, 1000).unwrap()),
        sys_offset_threshold: Some(Threshold::new(ThresholdKind::SysOffset, -500_000, 500_000).unwrap()),
    }
}

fn main() {
    clkmgr_client::logging::init();

    let client_id = format!("clkmgr-client-demo-{}", uuid::Uuid::new_v4());
    let client = ClockManagerClient::new(client_id.clone()).expect("binding client inbound queue");

    match client.connect() {
        Ok(true) => info!("connected as {client_id}, time bases: {:?}", client.timebases()),
        Ok(false) => {
            error!("proxy refused connect");
            return;
        }
        Err(e) => {
            error!("connect failed: {e}");
            return;
        }
    }

    match client.subscribe(DEMO_TIME_BASE_INDEX, demo_subscription()) {
        Ok(true) => info!("subscribed to time base {DEMO_TIME_BASE_INDEX}"),
        Ok(false) => error!("proxy rejected subscribe to time base {DEMO_TIME_BASE_INDEX}"),
        Err(e) => error!("subscribe failed: {e}"),
    }

    info!("type 'status' to poll once, 'wait' to block up to 5s, or 'quit'");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "quit" => break,
            "status" => print_status(&client, 0),
            "wait" => print_status(&client, 5),
            _ => continue,
        }
    }

    client.disconnect();
}

fn print_status(client: &ClockManagerClient, timeout_secs: i64) {
    match client.status_wait(timeout_secs, DEMO_TIME_BASE_INDEX) {
        Ok(ClockStatus::EventDetected(status)) => {
            info!(
                "event detected: offsetInRange={} syncedWithGm={} asCapable={} composite={} gmChanged={} sysOffsetInRange={}",
                status.offset_in_range,
                status.synced_with_gm,
                status.as_capable,
                status.composite_event,
                status.gm_changed,
                status.sys_offset_in_range
            );
        }
        Ok(ClockStatus::NoEventDetected(status)) => {
            info!("no event; last raw snapshot: {:?}", status.raw);
        }
        Ok(ClockStatus::LostConnection) => error!("lost connection to proxy"),
        Err(e) => error!("statusWait failed: {e}"),
    }
}
