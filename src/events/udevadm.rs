//! Udevadm event subscription
//!
//! Boundary adapter for the kernel's device event stream: spawns
//! `udevadm monitor --udev --property` and parses its property blocks into
//! DeviceEvents. Events and parse errors travel on separate channels; the
//! child process is killed when the subscription is cancelled.

use crate::error::{Error, Result};
use crate::events::device::{
    DeviceAttributes, DeviceEvent, EventAction, UDEV_ACTION, UDEV_DEVNAME,
};
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// An active device event subscription
pub struct EventSubscription {
    /// Parsed hardware notifications
    pub events: mpsc::Receiver<DeviceEvent>,
    /// Parse failures, delivered out of band
    pub errors: mpsc::Receiver<Error>,
}

/// Spawns and owns the udevadm monitor process
#[derive(Debug, Clone)]
pub struct UdevadmMonitor {
    /// Path to the udevadm binary
    pub program: String,
}

impl Default for UdevadmMonitor {
    fn default() -> Self {
        Self {
            program: "udevadm".to_string(),
        }
    }
}

impl UdevadmMonitor {
    /// Monitor over the system udevadm binary
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the monitor. Fatal if the process cannot be spawned; after
    /// that, all failures flow through the error channel.
    pub fn subscribe(&self, cancel: CancellationToken) -> Result<EventSubscription> {
        let mut child = Command::new(&self.program)
            .args(["monitor", "--udev", "--property", "--subsystem-match=block"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::EventSource(format!("failed to spawn udevadm: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::EventSource("udevadm stdout unavailable".into()))?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            info!("Started udevadm monitor");
            let mut lines = BufReader::new(stdout).lines();
            let mut block: Vec<String> = Vec::new();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Stopping udevadm monitor");
                        let _ = child.kill().await;
                        return;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                if let Some(result) = parse_property_block(&block) {
                                    let send = match result {
                                        Ok(event) => event_tx.send(event).await.is_ok(),
                                        Err(e) => error_tx.send(e).await.is_ok(),
                                    };
                                    if !send {
                                        return;
                                    }
                                }
                                block.clear();
                            } else {
                                block.push(line);
                            }
                        }
                        Ok(None) => {
                            warn!("udevadm monitor stream ended");
                            return;
                        }
                        Err(e) => {
                            let _ = error_tx
                                .send(Error::EventSource(format!("udevadm read failed: {}", e)))
                                .await;
                            return;
                        }
                    },
                }
            }
        });

        Ok(EventSubscription {
            events: event_rx,
            errors: error_rx,
        })
    }
}

/// Parse one monitor output block into an event.
///
/// Returns None for blocks the agent does not care about (header-only
/// output, actions other than add/remove) and an error for blocks that
/// carry an action but are otherwise malformed.
pub fn parse_property_block(lines: &[String]) -> Option<std::result::Result<DeviceEvent, Error>> {
    let mut env = BTreeMap::new();
    for line in lines {
        // Header lines ("UDEV [ts] add /devices/... (block)") carry no '='
        if let Some((key, value)) = line.split_once('=') {
            env.insert(key.to_string(), value.to_string());
        }
    }

    let action = env.get(UDEV_ACTION)?;
    let action = EventAction::parse(action)?;

    if !env.contains_key(UDEV_DEVNAME) {
        return Some(Err(Error::EventParse(format!(
            "device event without {}: {:?}",
            UDEV_DEVNAME, lines
        ))));
    }

    Some(Ok(DeviceEvent {
        action,
        attributes: DeviceAttributes::new(env),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::device::UDEV_ID_TYPE;
    use assert_matches::assert_matches;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_add_block() {
        let block = lines(&[
            "UDEV  [2345.123456] add      /devices/pci0000:00/0000:00:1f.2/ata1/host0/target0:0:0/0:0:0:0/block/sdb (block)",
            "ACTION=add",
            "DEVNAME=/dev/sdb",
            "SUBSYSTEM=block",
            "ID_TYPE=disk",
        ]);

        let event = parse_property_block(&block).unwrap().unwrap();
        assert_eq!(event.action, EventAction::Add);
        assert_eq!(event.attributes.dev_path(), "/dev/sdb");
        assert_eq!(event.attributes.get(UDEV_ID_TYPE), Some("disk"));
    }

    #[test]
    fn test_parse_remove_block() {
        let block = lines(&["ACTION=remove", "DEVNAME=/dev/sdb", "SUBSYSTEM=block"]);
        let event = parse_property_block(&block).unwrap().unwrap();
        assert_eq!(event.action, EventAction::Remove);
    }

    #[test]
    fn test_unhandled_action_is_skipped() {
        let block = lines(&["ACTION=change", "DEVNAME=/dev/sdb"]);
        assert!(parse_property_block(&block).is_none());
    }

    #[test]
    fn test_block_without_action_is_skipped() {
        let block = lines(&["DEVNAME=/dev/sdb"]);
        assert!(parse_property_block(&block).is_none());
    }

    #[test]
    fn test_block_without_devname_is_an_error() {
        let block = lines(&["ACTION=add", "SUBSYSTEM=block"]);
        let result = parse_property_block(&block).unwrap();
        assert_matches!(result, Err(Error::EventParse(_)));
    }
}
