use std::{sync::Arc, time::Duration};

use dkg_core::{BlockCounter, Error};
use tokio::{
    runtime::Handle,
    sync::{oneshot, watch},
    task::JoinHandle,
};

/// A block counter whose height only moves when told to.
#[derive(Debug)]
pub struct LocalBlockCounter {
    height: watch::Sender<u64>,
}

impl LocalBlockCounter {
    /// Create a counter at `initial_height`.
    pub fn new(initial_height: u64) -> Self {
        let (height, _) = watch::channel(initial_height);
        Self { height }
    }

    /// Produce `blocks` new blocks. Returns the new height.
    pub fn mine(&self, blocks: u64) -> u64 {
        self.height.send_modify(|height| *height += blocks);
        *self.height.borrow()
    }

    /// Move to `height`. Heights below the current one are ignored.
    pub fn set_height(&self, height: u64) {
        self.height.send_if_modified(|current| {
            if height > *current {
                *current = height;
                true
            } else {
                false
            }
        });
    }

    /// Produce one block every `block_time` until the returned task is
    /// aborted.
    pub fn mine_every(self: &Arc<Self>, block_time: Duration) -> JoinHandle<()> {
        let counter = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(block_time);
            // The first tick completes immediately.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                counter.mine(1);
            }
        })
    }
}

impl BlockCounter for LocalBlockCounter {
    fn current_block(&self) -> Result<u64, Error> {
        Ok(*self.height.borrow())
    }

    fn block_height_waiter(&self, height: u64) -> Result<oneshot::Receiver<u64>, Error> {
        let (mut reached_tx, reached_rx) = oneshot::channel();

        let current = *self.height.borrow();
        if current >= height {
            let _ = reached_tx.send(current);
            return Ok(reached_rx);
        }

        let runtime = Handle::try_current()
            .map_err(|err| Error::Chain(format!("cannot watch block height: {err}")))?;
        let mut heights = self.height.subscribe();
        runtime.spawn(async move {
            // Stop watching once nobody waits for the height anymore.
            let reached = tokio::select! {
                reached = heights.wait_for(|current| *current >= height) => {
                    reached.map(|current| *current).ok()
                }
                _ = reached_tx.closed() => None,
            };
            if let Some(reached) = reached {
                let _ = reached_tx.send(reached);
            }
        });

        Ok(reached_rx)
    }
}
