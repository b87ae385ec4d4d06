//! A pool of pre-generated protocol parameters.
//!
//! Some DKG implementations need parameters that are expensive to compute
//! (safe primes and the like). The pool computes them ahead of time on the
//! blocking thread pool so an attempt does not have to wait for them.

use std::{fmt::Display, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, info, warn};

use crate::ProtocolLatch;

/// How often a paused generator checks whether the protocol finished.
const LATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Keeps up to `size` pre-generated values ready to be taken.
///
/// Taking a value lets the background task generate a new one. Dropping the
/// pool stops the background task.
#[derive(Debug)]
pub struct ParamsPool<T> {
    values: Mutex<mpsc::Receiver<T>>,
    pump: JoinHandle<()>,
}

impl<T: Send + 'static> ParamsPool<T> {
    /// Start filling a pool of `size` values with `generator`.
    ///
    /// The task sleeps `generation_delay` after each delivered value to leave
    /// CPU time to the rest of the node. When a `latch` is given, no
    /// generation starts while a protocol holds it. Failed generations are
    /// logged and retried.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<F, E>(
        size: usize,
        generation_delay: Duration,
        latch: Option<ProtocolLatch>,
        generator: F,
    ) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Display + Send + 'static,
    {
        info!(
            size,
            ?generation_delay,
            "pre-parameters target pool size is [{size}]"
        );

        let (sender, receiver) = mpsc::channel(size.max(1));
        let pump = tokio::spawn(pump(sender, Arc::new(generator), generation_delay, latch));

        Self {
            values: Mutex::new(receiver),
            pump,
        }
    }

    /// Take a value, waiting for one to be generated if the pool is empty.
    ///
    /// Returns `None` only if the generator panicked.
    pub async fn get(&self) -> Option<T> {
        self.values.lock().await.recv().await
    }
}

impl<T> Drop for ParamsPool<T> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump<T, F, E>(
    sender: mpsc::Sender<T>,
    generator: Arc<F>,
    generation_delay: Duration,
    latch: Option<ProtocolLatch>,
) where
    T: Send + 'static,
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    E: Display + Send + 'static,
{
    loop {
        if let Some(latch) = &latch {
            while latch.is_executing() {
                tokio::time::sleep(LATCH_POLL_INTERVAL).await;
            }
        }

        let start = Instant::now();
        let generate = generator.clone();
        let generated = match tokio::task::spawn_blocking(move || generate()).await {
            Ok(generated) => generated,
            Err(err) => {
                error!("pre-parameters generator stopped: {err}");
                return;
            }
        };

        let value = match generated {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    elapsed = ?start.elapsed(),
                    "failed to generate pre-parameters: {err}"
                );
                continue;
            }
        };

        if sender.send(value).await.is_err() {
            return;
        }
        info!(
            elapsed = ?start.elapsed(),
            pool_size = sender.max_capacity() - sender.capacity(),
            "generated new pre-parameters"
        );

        tokio::time::sleep(generation_delay).await;
    }
}
