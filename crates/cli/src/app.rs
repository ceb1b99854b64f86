//! Wiring: builds every component from a [`RelayConfig`] and runs them.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use backend::HttpBackendInvoker;
use faux_backend::FauxBackend;
use listener::{admin_router, ingress_router, DispatcherSettings, QueueDispatcher};
use queue::{FifoQueue, QueueSettings};
use relay::{
    BodyFieldGroupKey, ConstantGroupKey, ErrorReporter, GroupKeyPolicy, RecordReader, RecordStore,
};
use stages::{
    ConsumerSettings, IngestionHandler, IngestionSettings, RelayConsumer, TracingErrorReporter,
};
use store::{FileRecordStore, InMemoryRecordStore};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{BackendTarget, RelayConfig};

/// A started relay. Dropping it without calling [`RunningRelay::shutdown`]
/// leaves its tasks running until the runtime stops.
pub struct RunningRelay {
    ingress_addr: SocketAddr,
    admin_addr: SocketAddr,
    queue: Arc<FifoQueue>,
    faux_backend: Option<FauxBackend>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningRelay {
    /// Bound ingress address.
    pub fn ingress_addr(&self) -> SocketAddr {
        self.ingress_addr
    }

    /// Bound admin address.
    pub fn admin_addr(&self) -> SocketAddr {
        self.admin_addr
    }

    /// The relay's queue.
    pub fn queue(&self) -> &Arc<FifoQueue> {
        &self.queue
    }

    /// The faux backend, when one was started.
    pub fn faux_backend(&self) -> Option<&FauxBackend> {
        self.faux_backend.as_ref()
    }

    /// Stops accepting calls and deliveries, then waits for in-flight work.
    pub async fn shutdown(self) -> Result<()> {
        info!("Relay shutting down");
        let _ = self.stop.send(true);
        for task in self.tasks {
            task.await.context("relay task panicked")?;
        }
        info!("Relay stopped");
        Ok(())
    }
}

fn stopped(mut stop: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = stop.wait_for(|stopped| *stopped).await;
    }
}

fn split_store<S>(store: Arc<S>) -> (Arc<dyn RecordStore>, Arc<dyn RecordReader>)
where
    S: RecordStore + RecordReader + 'static,
{
    (store.clone(), store)
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    app: axum::Router,
    stop: watch::Receiver<bool>,
) {
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(stopped(stop))
        .await
    {
        warn!(listener = name, error = %e, "Listener stopped with an error");
    }
}

/// Builds every component and starts the listeners and the dispatcher.
pub async fn start(config: RelayConfig) -> Result<RunningRelay> {
    let faux_backend = match config.faux_backend_addr {
        Some(addr) => Some(
            FauxBackend::spawn(addr)
                .await
                .with_context(|| format!("failed to start faux backend on {addr}"))?,
        ),
        None => None,
    };
    let backend_url = match (&config.backend, &faux_backend) {
        (BackendTarget::Url(url), _) => url.clone(),
        (BackendTarget::Faux, Some(faux)) => faux.url(),
        (BackendTarget::Faux, None) => {
            anyhow::bail!("faux backend selected but no address configured")
        }
    };

    let queue_settings = QueueSettings {
        dedup_window: config.dedup_window,
        max_receive_count: config.max_receive_count,
    };
    let queue = Arc::new(match &config.store_dir {
        Some(dir) => FifoQueue::open(dir, config.queue_name.clone(), queue_settings)?,
        None => FifoQueue::new(config.queue_name.clone(), queue_settings),
    });

    let (store, reader) = match &config.store_dir {
        Some(dir) => split_store(Arc::new(
            FileRecordStore::open(dir, config.table_name.clone()).await?,
        )),
        None => split_store(Arc::new(InMemoryRecordStore::new(config.table_name.clone()))),
    };

    let backend = Arc::new(HttpBackendInvoker::new(&backend_url, config.backend_timeout)?);
    let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingErrorReporter);
    let group_keys: Arc<dyn GroupKeyPolicy> = match &config.group_by_field {
        Some(field) => Arc::new(BodyFieldGroupKey::new(field.clone())),
        None => Arc::new(ConstantGroupKey::default()),
    };

    let ingestion = Arc::new(IngestionHandler::new(
        queue.clone(),
        group_keys,
        reporter.clone(),
        IngestionSettings {
            queue_name: config.queue_name.clone(),
        },
    ));
    let consumer = Arc::new(RelayConsumer::new(
        store,
        backend,
        reporter,
        ConsumerSettings {
            table_name: config.table_name.clone(),
        },
    ));
    let dispatcher = QueueDispatcher::new(
        queue.clone(),
        consumer,
        DispatcherSettings {
            pool_size: config.pool_size,
            invocation_timeout: config.invocation_timeout,
            redelivery_delay: config.redelivery_delay,
        },
    );

    let ingress = TcpListener::bind(config.ingress_addr)
        .await
        .with_context(|| format!("failed to bind ingress on {}", config.ingress_addr))?;
    let admin = TcpListener::bind(config.admin_addr)
        .await
        .with_context(|| format!("failed to bind admin listener on {}", config.admin_addr))?;
    let ingress_addr = ingress.local_addr()?;
    let admin_addr = admin.local_addr()?;

    let (stop, stop_rx) = watch::channel(false);
    let tasks = vec![
        tokio::spawn(serve("ingress", ingress, ingress_router(ingestion), stop_rx.clone())),
        tokio::spawn(serve("admin", admin, admin_router(reader), stop_rx.clone())),
        tokio::spawn(dispatcher.run(stopped(stop_rx))),
    ];

    info!(
        %ingress_addr,
        %admin_addr,
        backend = %backend_url,
        queue = %config.queue_name,
        table = %config.table_name,
        "Relay started"
    );

    Ok(RunningRelay {
        ingress_addr,
        admin_addr,
        queue,
        faux_backend,
        stop,
        tasks,
    })
}
