/*!
    polling watcher for statusword flags

    Most confirmations on a drive are a handful of statusword bits raising or dropping: set-point
    acknowledge, homing attained, target reached. [wait_for_flags] is the single loop behind all of
    them: it re-reads a 16 bit source until a mask condition holds or a deadline passes, on a
    monotonic clock. It never retries and never interprets - deciding what a timeout means is the
    caller's business.
*/

use core::future::Future;
use core::time::Duration;
use tokio::time::{Instant, sleep};


/// failure of [wait_for_flags]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchError<E> {
    /// the source failed, the watcher stops immediately
    Source(E),
    /// the condition was not observed before the deadline
    Expired {
        mask: u16,
        set: bool,
    },
}

/**
    poll `read` until the masked bits match, or `timeout` elapses

    The condition is `status & mask == mask` when `set`, `status & mask == 0` otherwise. The source
    is read before any sleep, so a condition already holding returns without waiting at all. On
    expiry the last poll has happened no earlier than `timeout` and no later than `timeout` plus one
    `poll_interval`.
*/
pub async fn wait_for_flags<F, Fut, E>(
    mut read: F,
    mask: u16,
    set: bool,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), WatchError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u16, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let status = read().await.map_err(WatchError::Source)?;
        log::trace!("statusword = {:#06x}", status);

        let matched = if set {status & mask == mask} else {status & mask == 0};
        if matched
            {return Ok(())}
        if Instant::now() >= deadline
            {return Err(WatchError::Expired {mask, set})}

        sleep(poll_interval).await;
    }
}
