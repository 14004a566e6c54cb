use std::{future::Future, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::debug;

/// Why a refresh ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshReason {
    /// The polling interval elapsed (also fired once on start).
    Tick,
    /// The refresh signal was raised after a mutating action.
    Triggered,
}

/// Background task running a refresh callback on a fixed interval and whenever the refresh
/// signal fires. The timer restarts after a triggered refresh. Dropping the subscription
/// stops the task.
pub struct RefreshSubscription {
    handle: JoinHandle<()>,
}

impl RefreshSubscription {
    pub fn spawn<F, Fut>(period: Duration, mut trigger: watch::Receiver<u64>, mut refresh: F) -> Self
    where
        F: FnMut(RefreshReason) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let reason = tokio::select! {
                    _ = ticker.tick() => RefreshReason::Tick,
                    changed = trigger.changed() => {
                        if changed.is_err() {
                            debug!("refresh signal closed");
                            return;
                        }
                        ticker.reset();
                        RefreshReason::Triggered
                    }
                };
                refresh(reason).await;
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppContext;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use tokio::time::sleep;

    fn recorder() -> (
        Arc<Mutex<Vec<RefreshReason>>>,
        impl FnMut(RefreshReason) -> std::future::Ready<()> + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |reason| {
            sink.lock().unwrap().push(reason);
            std::future::ready(())
        })
    }

    #[tokio::test]
    async fn test_ticks_on_interval() {
        let context = AppContext::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let _subscription =
            RefreshSubscription::spawn(Duration::from_millis(20), context.subscribe(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(())
            });

        sleep(Duration::from_millis(130)).await;
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_trigger_refreshes_immediately() {
        let context = AppContext::new();
        let (seen, refresh) = recorder();
        let _subscription =
            RefreshSubscription::spawn(Duration::from_secs(3_600), context.subscribe(), refresh);

        sleep(Duration::from_millis(30)).await;
        assert_eq!(*seen.lock().unwrap(), vec![RefreshReason::Tick]);

        context.trigger_refresh();
        sleep(Duration::from_millis(30)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![RefreshReason::Tick, RefreshReason::Triggered]
        );
    }

    #[tokio::test]
    async fn test_drop_stops_refreshing() {
        let context = AppContext::new();
        let (seen, refresh) = recorder();
        let subscription =
            RefreshSubscription::spawn(Duration::from_secs(3_600), context.subscribe(), refresh);
        sleep(Duration::from_millis(30)).await;
        drop(subscription);
        sleep(Duration::from_millis(10)).await;

        context.trigger_refresh();
        sleep(Duration::from_millis(30)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stops_when_signal_closes() {
        let context = AppContext::new();
        let (_seen, refresh) = recorder();
        let subscription =
            RefreshSubscription::spawn(Duration::from_secs(3_600), context.subscribe(), refresh);
        drop(context);
        sleep(Duration::from_millis(30)).await;
        assert!(subscription.is_finished());
    }
}
