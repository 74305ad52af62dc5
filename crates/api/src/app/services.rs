use std::{path::PathBuf, sync::Arc};

use axum::http::StatusCode;
use sqlx::PgPool;

use wholesale_infra::{
    config::{EnvProperties, Settings},
    ledger_store::{LedgerStore, PostgresLedgerStore, SheetLedgerStore, StoreError},
    orders::{OrderStore, SheetOrderStore},
    renderer::{DocumentRenderer, FilesystemRenderer},
    schema::Sheet,
    sequence::{CounterStore, InMemoryCounterStore, PostgresCounterStore},
    service::{PaymentService, ServiceError},
};

use crate::app::errors;

// Type-erased stores so in-memory and Postgres wiring share one service type.
pub type DynLedgerStore = Arc<dyn LedgerStore>;
pub type DynOrderStore = Arc<dyn OrderStore>;
pub type DynCounterStore = Arc<dyn CounterStore>;
pub type DynRenderer = Arc<dyn DocumentRenderer>;

pub type Payments = PaymentService<DynLedgerStore, DynOrderStore, DynCounterStore, DynRenderer>;

/// Header row for the default (empty) order tab.
pub const ORDER_TAB_HEADERS: &[&str] = &[
    "SO#",
    "Customer ID",
    "Product Description",
    "Order Total",
    "Paid-to-Date",
    "Remaining Balance",
];

const DEFAULT_ORDERS_TAB: &str = "Orders";
const DEFAULT_DOCS_DIR: &str = "documents";

#[derive(Clone)]
pub struct AppServices {
    payments: Arc<Payments>,
    backend: &'static str,
}

impl AppServices {
    /// In-memory ledger and counters over the given order tabs.
    pub fn in_memory(settings: Settings, order_tabs: Vec<Sheet>, docs_dir: impl Into<PathBuf>) -> Self {
        let ledger: DynLedgerStore =
            Arc::new(SheetLedgerStore::new().with_scan_window(settings.ledger_scan_window));
        let counters: DynCounterStore = Arc::new(InMemoryCounterStore::new());
        Self::assemble(settings, ledger, counters, order_tabs, docs_dir.into(), "in_memory")
    }

    /// Postgres ledger and counters; order tabs stay in memory.
    pub async fn persistent(
        settings: Settings,
        pool: PgPool,
        order_tabs: Vec<Sheet>,
        docs_dir: impl Into<PathBuf>,
    ) -> Result<Self, ServiceError> {
        let ledger = PostgresLedgerStore::connect(pool.clone())
            .await?
            .with_scan_window(settings.ledger_scan_window);
        let counters = PostgresCounterStore::connect(pool).await?;
        Ok(Self::assemble(
            settings,
            Arc::new(ledger),
            Arc::new(counters),
            order_tabs,
            docs_dir.into(),
            "postgres",
        ))
    }

    fn assemble(
        settings: Settings,
        ledger: DynLedgerStore,
        counters: DynCounterStore,
        order_tabs: Vec<Sheet>,
        docs_dir: PathBuf,
        backend: &'static str,
    ) -> Self {
        let orders: DynOrderStore = Arc::new(
            SheetOrderStore::new(order_tabs, settings.order_columns.clone())
                .with_tab_names(&settings.orders_tab_names),
        );
        let renderer: DynRenderer = Arc::new(FilesystemRenderer::new(docs_dir));
        Self {
            payments: Arc::new(PaymentService::new(ledger, orders, counters, renderer, settings)),
            backend,
        }
    }

    pub fn payments(&self) -> &Payments {
        &self.payments
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Run a service call on the blocking pool and map its error to a response.
    ///
    /// Service calls hold std locks and the Postgres adapters block on the
    /// runtime handle, so they never run on an async worker thread.
    pub async fn run<T, F>(&self, f: F) -> Result<T, axum::response::Response>
    where
        F: FnOnce(&Payments) -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let payments = self.payments.clone();
        match tokio::task::spawn_blocking(move || f(&payments)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(errors::service_error_to_response(e)),
            Err(e) => {
                tracing::error!(error = %e, "blocking service call panicked or was cancelled");
                Err(errors::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "the request could not be completed",
                ))
            }
        }
    }
}

/// Wire services from the process environment.
///
/// `USE_PERSISTENT_STORES=true` with `DATABASE_URL` selects Postgres for the
/// ledger and document counters; everything else is in memory.
pub async fn build_services() -> Result<AppServices, ServiceError> {
    let settings = Settings::from_properties(&EnvProperties)?;

    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let docs_dir = std::env::var("WH_DOCS_DIR").unwrap_or_else(|_| DEFAULT_DOCS_DIR.to_string());
    let tab_name = settings
        .orders_tab_names
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_ORDERS_TAB.to_string());
    let order_tabs = vec![Sheet::new(tab_name, ORDER_TAB_HEADERS)];

    if use_persistent {
        let url = std::env::var("DATABASE_URL").map_err(|_| {
            ServiceError::Configuration("USE_PERSISTENT_STORES=true but DATABASE_URL is not set".to_string())
        })?;
        let pool = PgPool::connect(&url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("postgres connect failed: {e}")))?;
        tracing::info!("using postgres ledger and counter stores");
        return AppServices::persistent(settings, pool, order_tabs, docs_dir).await;
    }

    tracing::info!(docs_dir = %docs_dir, "using in-memory ledger and counter stores");
    Ok(AppServices::in_memory(settings, order_tabs, docs_dir))
}
