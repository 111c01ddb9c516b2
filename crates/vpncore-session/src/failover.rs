//! Connection Failover Monitor
//!
//! Detects a dead tunnel by sending MTU-sized probes toward the
//! gateway on a fixed interval and watching whether the received-byte
//! counter advances. The probe transport itself is caller-supplied;
//! this module owns the sampling loop, the verdict, and cooperative
//! cancellation through a cookie's cancel channel.
//!
//! The loop always terminates: on an early reply, on cancellation, on a
//! probe failure, or when the probe budget runs out.

use crossbeam_channel::{Receiver, select, tick};
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Probe interval used by [`DroppedMonitor::default`].
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Probe budget used by [`DroppedMonitor::default`]: how many probes go
/// out before the drop verdict is taken.
pub const DEFAULT_PROBE_BUDGET: u16 = 5;

/// IP header (20) plus ICMP echo header (8): subtracted from the MTU to
/// size the probe payload.
pub const MTU_OVERHEAD: u16 = 28;

/// Sends liveness probes toward the gateway. The transport (ICMP
/// socket, test double, ...) is bound to the gateway by the caller.
pub trait Prober {
    /// Send one probe with the given sequence number and payload size.
    fn probe(&mut self, seq: u16, payload_len: usize) -> io::Result<()>;

    /// Wait up to `timeout` for a probe reply.
    fn recv_reply(&mut self, timeout: Duration) -> io::Result<()>;
}

/// The monitor's conclusion about the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Traffic still arrives; the tunnel looks fine.
    Alive,
    /// Probes went out but the received-byte counter never advanced.
    Dropped,
}

/// Configured failover monitor.
#[derive(Debug, Clone, Copy)]
pub struct DroppedMonitor {
    interval: Duration,
    budget: u16,
}

impl Default for DroppedMonitor {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
            budget: DEFAULT_PROBE_BUDGET,
        }
    }
}

impl DroppedMonitor {
    /// A monitor with a custom probe interval and budget.
    pub fn new(interval: Duration, budget: u16) -> Self {
        Self { interval, budget }
    }

    /// Run the monitor until a verdict, cancellation, or failure.
    ///
    /// `cancel` is a cookie cancellation receiver: it becomes ready
    /// when the caller cancels, and the monitor stops without a verdict
    /// ([`FailoverError::Cancelled`]). `sample_rx` reads the tunnel's
    /// monotonically increasing received-byte counter.
    pub fn start<P, S>(
        &self,
        cancel: &Receiver<()>,
        gateway: IpAddr,
        mtu: u16,
        prober: &mut P,
        mut sample_rx: S,
    ) -> Result<Verdict, FailoverError>
    where
        P: Prober + ?Sized,
        S: FnMut() -> io::Result<u64>,
    {
        if mtu <= MTU_OVERHEAD {
            return Err(FailoverError::InvalidMtu(mtu));
        }
        let payload_len = usize::from(mtu - MTU_OVERHEAD);

        let start_rx = sample_rx().map_err(FailoverError::Sample)?;
        debug!("failover: starting at rx={start_rx}, gateway={gateway}, mtu={mtu}");

        // First probe; an early reply means the path works.
        prober.probe(1, payload_len).map_err(FailoverError::Probe)?;
        if prober.recv_reply(self.interval).is_ok() {
            debug!("failover: got early reply, tunnel alive");
            return Ok(Verdict::Alive);
        }

        // Fire the remaining probes without waiting for replies; the
        // receive counter is the ground truth.
        let ticker = tick(self.interval);
        for seq in 2..=self.budget {
            debug!("failover: sending probe {seq}/{}", self.budget);
            prober.probe(seq, payload_len).map_err(FailoverError::Probe)?;
            select! {
                recv(ticker) -> _ => {}
                recv(cancel) -> _ => {
                    debug!("failover: cancelled");
                    return Err(FailoverError::Cancelled);
                }
            }
        }

        let end_rx = sample_rx().map_err(FailoverError::Sample)?;
        debug!("failover: final rx={end_rx} (started at {start_rx})");
        Ok(if end_rx <= start_rx {
            Verdict::Dropped
        } else {
            Verdict::Alive
        })
    }
}

/// Failover monitoring failures. `Cancelled` carries no verdict and is
/// distinct from a clean [`Verdict::Alive`].
#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    #[error("mtu {0} is too small for a probe")]
    InvalidMtu(u16),

    #[error("failover was cancelled")]
    Cancelled,

    #[error("a failover monitor is already running")]
    AlreadyRunning,

    #[error("failed to send probe: {0}")]
    Probe(#[source] io::Error),

    #[error("failed to sample received bytes: {0}")]
    Sample(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Probe transport double: records sends, optionally replies once.
    struct FakeProber {
        sent: Vec<(u16, usize)>,
        reply_early: bool,
    }

    impl FakeProber {
        fn silent() -> Self {
            Self {
                sent: Vec::new(),
                reply_early: false,
            }
        }
    }

    impl Prober for FakeProber {
        fn probe(&mut self, seq: u16, payload_len: usize) -> io::Result<()> {
            self.sent.push((seq, payload_len));
            Ok(())
        }

        fn recv_reply(&mut self, _timeout: Duration) -> io::Result<()> {
            if self.reply_early {
                Ok(())
            } else {
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
        }
    }

    fn fast_monitor() -> DroppedMonitor {
        DroppedMonitor::new(Duration::from_millis(1), 5)
    }

    fn gateway() -> IpAddr {
        "10.0.0.1".parse().unwrap()
    }

    fn open_cancel() -> (crossbeam_channel::Sender<()>, Receiver<()>) {
        bounded(0)
    }

    #[test]
    fn test_dropped_when_rx_never_advances() {
        let (_cancel_tx, cancel_rx) = open_cancel();
        let mut prober = FakeProber::silent();

        let verdict = fast_monitor()
            .start(&cancel_rx, gateway(), 1392, &mut prober, || Ok(1000))
            .unwrap();

        assert_eq!(verdict, Verdict::Dropped);
        // full budget went out, sized mtu - overhead
        assert_eq!(prober.sent.len(), 5);
        assert!(prober.sent.iter().all(|&(_, len)| len == 1392 - 28));
        assert_eq!(prober.sent[0].0, 1);
        assert_eq!(prober.sent.last().unwrap().0, 5);
    }

    #[test]
    fn test_alive_when_rx_advances() {
        let (_cancel_tx, cancel_rx) = open_cancel();
        let mut prober = FakeProber::silent();
        let mut rx = 0u64;

        let verdict = fast_monitor()
            .start(&cancel_rx, gateway(), 1392, &mut prober, move || {
                rx += 4096;
                Ok(rx)
            })
            .unwrap();

        assert_eq!(verdict, Verdict::Alive);
    }

    #[test]
    fn test_early_reply_short_circuits() {
        let (_cancel_tx, cancel_rx) = open_cancel();
        let mut prober = FakeProber {
            sent: Vec::new(),
            reply_early: true,
        };

        let verdict = fast_monitor()
            .start(&cancel_rx, gateway(), 1392, &mut prober, || Ok(0))
            .unwrap();

        assert_eq!(verdict, Verdict::Alive);
        assert_eq!(prober.sent.len(), 1);
    }

    #[test]
    fn test_cancel_stops_without_verdict() {
        let (cancel_tx, cancel_rx) = open_cancel();
        // slow ticks so the select is parked on the cancel channel
        let monitor = DroppedMonitor::new(Duration::from_secs(60), 5);

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(cancel_tx);
        });

        let mut prober = FakeProber::silent();
        let err = monitor
            .start(&cancel_rx, gateway(), 1392, &mut prober, || Ok(0))
            .unwrap_err();
        assert!(matches!(err, FailoverError::Cancelled));
        canceller.join().unwrap();
    }

    #[test]
    fn test_tiny_mtu_is_rejected() {
        let (_cancel_tx, cancel_rx) = open_cancel();
        let mut prober = FakeProber::silent();
        assert!(matches!(
            fast_monitor().start(&cancel_rx, gateway(), 20, &mut prober, || Ok(0)),
            Err(FailoverError::InvalidMtu(20))
        ));
    }

    #[test]
    fn test_probe_failure_surfaces() {
        struct FailingProber;
        impl Prober for FailingProber {
            fn probe(&mut self, _: u16, _: usize) -> io::Result<()> {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            }
            fn recv_reply(&mut self, _: Duration) -> io::Result<()> {
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
        }

        let (_cancel_tx, cancel_rx) = open_cancel();
        assert!(matches!(
            fast_monitor().start(&cancel_rx, gateway(), 1392, &mut FailingProber, || Ok(0)),
            Err(FailoverError::Probe(_))
        ));
    }

    #[test]
    fn test_sampler_failure_surfaces() {
        let (_cancel_tx, cancel_rx) = open_cancel();
        let mut prober = FakeProber::silent();
        let calls = Arc::new(Mutex::new(0));

        let c = calls.clone();
        let err = fast_monitor()
            .start(&cancel_rx, gateway(), 1392, &mut prober, move || {
                *c.lock().unwrap() += 1;
                Err(io::Error::from(io::ErrorKind::NotFound))
            })
            .unwrap_err();
        assert!(matches!(err, FailoverError::Sample(_)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
