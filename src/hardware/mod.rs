//! Coin-acceptor and button-board bridge.
//!
//! Strictly decoupled from game state: the bridge owns the serial link and
//! posts [`HardwareEvent`]s over a channel; the server subscribes and applies
//! its own policy. A connect loop with exponential backoff (5 s growing by
//! 1.5x up to 60 s) keeps the link alive; a liveness probe detects a silent
//! device and re-enters the loop. Serial errors never propagate into game
//! logic.
//!
//! `mock_mode` replaces the device with a scripted event generator for
//! device-free operation; the real link needs the `serial` cargo feature.

pub mod framer;

use std::time::Duration;

use log::{info, warn};
use tokio::sync::{mpsc, watch};

use crate::config::SerialConfig;
use crate::hardware::framer::DeviceFrame;

/// Events the device can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    CoinInserted { count: u32 },
    CoinReturned { front: u32, left: u32, right: u32 },
    ButtonPressed { kind: u8, code: u8, action: u8 },
    FaultReported { code: u8, level: u8 },
}

/// Device frame command ids.
pub const CMD_COIN_IN: u8 = 0x01;
pub const CMD_COIN_OUT: u8 = 0x02;
pub const CMD_BUTTON: u8 = 0x03;
pub const CMD_FAULT: u8 = 0x04;
pub const CMD_PROBE: u8 = 0x10;

/// Initial reconnect delay.
const BACKOFF_START: Duration = Duration::from_secs(5);
/// Reconnect delay growth factor, capped at [`BACKOFF_CAP`].
const BACKOFF_FACTOR: f64 = 1.5;
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Translate one validated device frame into an event. Probe replies and
/// unknown commands yield nothing.
pub fn decode_event(frame: &DeviceFrame) -> Option<HardwareEvent> {
    match (frame.cmd, frame.payload.as_slice()) {
        (CMD_COIN_IN, [count]) => Some(HardwareEvent::CoinInserted {
            count: *count as u32,
        }),
        (CMD_COIN_OUT, [front, left, right]) => Some(HardwareEvent::CoinReturned {
            front: *front as u32,
            left: *left as u32,
            right: *right as u32,
        }),
        (CMD_BUTTON, [kind, code, action]) => Some(HardwareEvent::ButtonPressed {
            kind: *kind,
            code: *code,
            action: *action,
        }),
        (CMD_FAULT, [code, level]) => Some(HardwareEvent::FaultReported {
            code: *code,
            level: *level,
        }),
        _ => None,
    }
}

/// Next delay in the reconnect schedule.
pub fn next_backoff(current: Duration) -> Duration {
    let next = current.mul_f64(BACKOFF_FACTOR);
    next.min(BACKOFF_CAP)
}

/// Start the bridge. Returns the event stream; the bridge task owns the link
/// and dies with the shutdown signal.
pub fn spawn(
    config: SerialConfig,
    shutdown: watch::Receiver<bool>,
) -> mpsc::UnboundedReceiver<HardwareEvent> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    if !config.enabled {
        return events_rx;
    }
    if config.mock_mode {
        tokio::spawn(mock_loop(events_tx, shutdown));
    } else {
        #[cfg(feature = "serial")]
        {
            tokio::spawn(connect_loop(config, events_tx, shutdown));
        }
        #[cfg(not(feature = "serial"))]
        {
            warn!("serial link configured but the binary was built without the serial feature");
        }
    }
    events_rx
}

/// Scripted generator standing in for the device.
async fn mock_loop(
    events_tx: mpsc::UnboundedSender<HardwareEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("hardware bridge running in mock mode");
    let script = [
        HardwareEvent::CoinInserted { count: 1 },
        HardwareEvent::ButtonPressed {
            kind: 1,
            code: 3,
            action: 1,
        },
        HardwareEvent::CoinInserted { count: 2 },
    ];
    let mut ticker = tokio::time::interval(Duration::from_secs(7));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut cursor = 0usize;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let event = script[cursor % script.len()].clone();
                cursor += 1;
                if events_tx.send(event).is_err() {
                    return;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Connect loop with backoff around the blocking serial device.
#[cfg(feature = "serial")]
async fn connect_loop(
    config: SerialConfig,
    events_tx: mpsc::UnboundedSender<HardwareEvent>,
    shutdown: watch::Receiver<bool>,
) {
    let mut delay = BACKOFF_START;
    loop {
        if *shutdown.borrow() {
            return;
        }
        let port = config.stm32.port.clone();
        let baud = config.stm32.baud_rate;
        let tx = events_tx.clone();
        let link_shutdown = shutdown.clone();
        info!("opening serial device {} @ {} baud", port, baud);
        let result =
            tokio::task::spawn_blocking(move || drive_device(&port, baud, tx, link_shutdown))
                .await;
        match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => warn!("serial link lost: {}; retrying in {:?}", e, delay),
            Err(e) => warn!("serial task failed: {}; retrying in {:?}", e, delay),
        }
        tokio::time::sleep(delay).await;
        delay = next_backoff(delay);
    }
}

/// Blocking read loop over one opened device. Returns Ok on shutdown, Err to
/// trigger a reconnect.
#[cfg(feature = "serial")]
fn drive_device(
    port: &str,
    baud: u32,
    events_tx: mpsc::UnboundedSender<HardwareEvent>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), crate::errors::GameError> {
    use crate::errors::GameError;
    use crate::hardware::framer::DeviceFramer;
    use std::io::{Read, Write};

    let mut device = serialport::new(port, baud)
        .timeout(Duration::from_millis(500))
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()
        .map_err(|e| GameError::SerialOpen(e.to_string()))?;
    info!("serial device {} open", port);

    let mut framer = DeviceFramer::new();
    let mut buf = [0u8; 256];
    let mut silent_reads = 0u32;
    let mut probe_sent = false;
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }
        match device.read(&mut buf) {
            Ok(0) => {
                silent_reads += 1;
            }
            Ok(n) => {
                silent_reads = 0;
                probe_sent = false;
                framer.push(&buf[..n]);
                while let Some(frame) = framer.next_frame() {
                    if let Some(event) = decode_event(&frame) {
                        if events_tx.send(event).is_err() {
                            return Ok(());
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                silent_reads += 1;
            }
            Err(e) => return Err(GameError::Io(e)),
        }

        // Liveness: a long-silent device gets one probe, then a reconnect.
        if silent_reads >= 20 {
            if probe_sent {
                return Err(GameError::SerialTimeout);
            }
            let probe = DeviceFrame {
                cmd: CMD_PROBE,
                payload: Vec::new(),
            };
            device
                .write_all(&probe.encode())
                .map_err(GameError::Io)?;
            probe_sent = true;
            silent_reads = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_event_kinds() {
        let cases = [
            (
                DeviceFrame {
                    cmd: CMD_COIN_IN,
                    payload: vec![3],
                },
                HardwareEvent::CoinInserted { count: 3 },
            ),
            (
                DeviceFrame {
                    cmd: CMD_COIN_OUT,
                    payload: vec![1, 2, 3],
                },
                HardwareEvent::CoinReturned {
                    front: 1,
                    left: 2,
                    right: 3,
                },
            ),
            (
                DeviceFrame {
                    cmd: CMD_BUTTON,
                    payload: vec![1, 5, 0],
                },
                HardwareEvent::ButtonPressed {
                    kind: 1,
                    code: 5,
                    action: 0,
                },
            ),
            (
                DeviceFrame {
                    cmd: CMD_FAULT,
                    payload: vec![9, 2],
                },
                HardwareEvent::FaultReported { code: 9, level: 2 },
            ),
        ];
        for (frame, expected) in cases {
            assert_eq!(decode_event(&frame), Some(expected));
        }
    }

    #[test]
    fn malformed_payloads_yield_nothing() {
        assert_eq!(
            decode_event(&DeviceFrame {
                cmd: CMD_COIN_IN,
                payload: vec![]
            }),
            None
        );
        assert_eq!(
            decode_event(&DeviceFrame {
                cmd: 0x77,
                payload: vec![1]
            }),
            None
        );
        assert_eq!(
            decode_event(&DeviceFrame {
                cmd: CMD_PROBE,
                payload: vec![]
            }),
            None
        );
    }

    #[test]
    fn backoff_grows_to_the_cap() {
        let mut delay = BACKOFF_START;
        let mut seen = vec![delay];
        for _ in 0..10 {
            delay = next_backoff(delay);
            seen.push(delay);
        }
        assert_eq!(seen[0], Duration::from_secs(5));
        assert!(seen[1] > seen[0]);
        assert_eq!(*seen.last().unwrap(), BACKOFF_CAP);
    }

    #[tokio::test(start_paused = true)]
    async fn mock_mode_emits_scripted_events() {
        let config = SerialConfig {
            enabled: true,
            mock_mode: true,
            ..Default::default()
        };
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut events = spawn(config, shutdown_rx);
        tokio::time::advance(Duration::from_secs(8)).await;
        let first = events.recv().await.expect("scripted event");
        assert_eq!(first, HardwareEvent::CoinInserted { count: 1 });
    }

    #[tokio::test]
    async fn disabled_bridge_emits_nothing() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut events = spawn(SerialConfig::default(), shutdown_rx);
        assert!(events.try_recv().is_err());
    }
}
