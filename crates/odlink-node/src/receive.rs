use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use odlink_frame::{Container, FrameError, Reassembler, TimeStamp};
use odlink_transport::{Conference, TransportError, MAX_DATAGRAM};
use prost::Message;
use tracing::{debug, warn};

use crate::dispatch::DispatchEngine;

/// Long-lived receive task: reads datagrams, reassembles frames, and
/// offers each decoded container to the dispatch engine.
///
/// The task owns the socket and never blocks on user code; per-iteration
/// errors are reported and the loop continues. It exits when `running`
/// is cleared (observed at the latest after the socket read timeout).
pub(crate) fn run_receive_loop(
    conference: Conference,
    engine: Arc<DispatchEngine>,
    running: Arc<AtomicBool>,
    resync_window: usize,
) {
    let mut reassembler = Reassembler::new(resync_window);
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while running.load(Ordering::SeqCst) {
        let read = match conference.recv(&mut buf) {
            Ok(n) => n,
            Err(TransportError::Socket(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                // Timed-out read; just re-check the shutdown flag.
                continue;
            }
            Err(err) => {
                // Transient by policy: report and keep the loop alive.
                warn!(error = %err, "socket read failed");
                continue;
            }
        };

        reassembler.extend(&buf[..read]);
        drain(&mut reassembler, &engine);
    }
    debug!("receive loop exiting");
}

/// Pull every complete frame currently buffered and hand it on.
fn drain(reassembler: &mut Reassembler, engine: &DispatchEngine) {
    loop {
        match reassembler.next_payload() {
            Ok(Some(payload)) => match Container::decode(payload) {
                Ok(mut container) => {
                    if container.received.is_none() {
                        container.received = Some(TimeStamp::now());
                    }
                    // QueueFull is already surfaced by the engine.
                    let _ = engine.enqueue(container);
                }
                Err(err) => {
                    warn!(error = %err, "discarding undecodable container");
                }
            },
            Ok(None) => break,
            Err(FrameError::Desync { dropped }) => {
                // Recovery already advanced past the garbage; keep going.
                warn!(dropped, "frame desynchronization on the conference");
            }
            Err(err) => {
                warn!(error = %err, "frame extraction failed");
                break;
            }
        }
    }
}
