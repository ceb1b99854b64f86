use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use queue::{Delivery, FifoQueue, QueueError, ReleaseOutcome};
use stages::{Disposition, RelayConsumer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Invocation loop configuration.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Maximum concurrent invocations.
    pub pool_size: usize,
    /// Wall-clock budget of one invocation.
    pub invocation_timeout: Duration,
    /// How long a failed message stays invisible before redelivery.
    pub redelivery_delay: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            pool_size: 2,
            invocation_timeout: Duration::from_secs(10),
            redelivery_delay: Duration::from_secs(30),
        }
    }
}

/// What became of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The consumer succeeded (or consumed a bad message) and the message
    /// was removed.
    Acked,
    /// The invocation failed and the message was handed back to the queue.
    Released(ReleaseOutcome),
    /// The queue refused the ack or release.
    Rejected(QueueError),
}

/// Feeds queue deliveries to the relay consumer, one record per invocation.
#[derive(Clone)]
pub struct QueueDispatcher {
    queue: Arc<FifoQueue>,
    consumer: Arc<RelayConsumer>,
    settings: DispatcherSettings,
}

impl QueueDispatcher {
    /// Creates a dispatcher; `pool_size` is raised to at least one.
    pub fn new(
        queue: Arc<FifoQueue>,
        consumer: Arc<RelayConsumer>,
        mut settings: DispatcherSettings,
    ) -> Self {
        settings.pool_size = settings.pool_size.max(1);
        Self {
            queue,
            consumer,
            settings,
        }
    }

    /// Runs the invocation loop until `shutdown` resolves, then waits for
    /// in-flight invocations to finish.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let permits = Arc::new(Semaphore::new(self.settings.pool_size));
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            queue = %self.queue.name(),
            pool_size = self.settings.pool_size,
            "Dispatcher started"
        );

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let delivery = tokio::select! {
                _ = &mut shutdown => break,
                delivery = self.queue.receive() => delivery,
            };

            while let Some(finished) = in_flight.try_join_next() {
                log_join(finished);
            }

            let dispatcher = self.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                dispatcher.dispatch(delivery).await;
            });
        }

        info!(in_flight = in_flight.len(), "Dispatcher stopping, draining invocations");
        while let Some(finished) = in_flight.join_next().await {
            log_join(finished);
        }
        info!("Dispatcher stopped");
    }

    /// Runs one invocation for `delivery` and settles it with the queue.
    ///
    /// The invocation runs in its own task, so a panic inside it is handled
    /// like an error or a timeout: the message is released for redelivery.
    pub async fn dispatch(&self, delivery: Delivery) -> DispatchOutcome {
        let Delivery { message, receipt } = delivery;
        let message_id = message.message_id.clone();

        let consumer = self.consumer.clone();
        let mut invocation =
            tokio::spawn(async move { consumer.handle_invocation(vec![message]).await });

        let disposition =
            match tokio::time::timeout(self.settings.invocation_timeout, &mut invocation).await {
                Ok(Ok(Ok(report))) => report.disposition,
                Ok(Ok(Err(e))) => {
                    warn!(%message_id, error = %e, "Invocation failed");
                    Disposition::Redeliver
                }
                Ok(Err(e)) => {
                    error!(%message_id, error = %e, "Invocation ended abnormally");
                    Disposition::Redeliver
                }
                Err(_) => {
                    invocation.abort();
                    warn!(
                        %message_id,
                        budget_ms = self.settings.invocation_timeout.as_millis() as u64,
                        "Invocation exceeded its time budget"
                    );
                    Disposition::Redeliver
                }
            };

        let settled = match disposition {
            Disposition::Ack => self.queue.ack(&receipt).map(|()| DispatchOutcome::Acked),
            Disposition::Redeliver => self
                .queue
                .release(&receipt, self.settings.redelivery_delay)
                .map(DispatchOutcome::Released),
        };
        settled.unwrap_or_else(|e| {
            error!(%message_id, error = %e, "Queue refused to settle delivery");
            DispatchOutcome::Rejected(e)
        })
    }
}

fn log_join(finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Invocation task failed");
    }
}
