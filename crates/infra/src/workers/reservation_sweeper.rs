use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::WorkerHandle;
use crate::reservation::ReservationRegistry;

/// Periodically drops expired reservation holds.
///
/// Expired holds already stop counting the moment they expire; the sweep only
/// reclaims their memory.
#[derive(Debug)]
pub struct ReservationSweeper;

impl ReservationSweeper {
    pub fn spawn(
        registry: Arc<ReservationRegistry>,
        interval: Duration,
    ) -> io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("reservation-sweeper".to_string())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let removed = registry.expire_sweep();
                            if removed > 0 {
                                debug!(removed, "expired reservations swept");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("reservation sweeper stopped");
            })?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}
