use crate::error::{Result, StorageError};
use crate::retry::{RetryExecutor, Transient};
use crate::MetricsStore;
use async_trait::async_trait;
use sea_orm::sqlx;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, QueryResult, RuntimeErr,
    Statement, TransactionTrait, Value,
};
use std::collections::BTreeMap;
use std::time::Duration;
use telemon_common::error::ModelError;
use telemon_common::types::{metric_key, Metric, MetricKind, MetricValue};

const PING_TIMEOUT: Duration = Duration::from_secs(1);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS metrics (
    id    TEXT NOT NULL,
    mtype TEXT NOT NULL,
    delta BIGINT,
    value DOUBLE PRECISION,
    PRIMARY KEY (id, mtype)
)";

const UPSERT_GAUGE: &str = "INSERT INTO metrics (id, mtype, value) VALUES ($1, $2, $3)
    ON CONFLICT (id, mtype) DO UPDATE SET value = EXCLUDED.value
    RETURNING id, mtype, delta, value";

// The addition happens in SQL so concurrent writers never lose an increment.
const UPSERT_COUNTER: &str = "INSERT INTO metrics (id, mtype, delta) VALUES ($1, $2, $3)
    ON CONFLICT (id, mtype) DO UPDATE SET delta = metrics.delta + EXCLUDED.delta
    RETURNING id, mtype, delta, value";

const SELECT_ONE: &str = "SELECT id, mtype, delta, value FROM metrics WHERE id = $1 AND mtype = $2";

const SELECT_BY_TYPE: &str =
    "SELECT id, mtype, delta, value FROM metrics WHERE mtype = $1 ORDER BY id";

/// SQLSTATE class 08 codes that indicate a broken or refused connection.
const TRANSIENT_SQLSTATES: [&str; 5] = ["08000", "08003", "08006", "08001", "08004"];

/// SQLSTATE for `numeric_value_out_of_range`, raised when a BIGINT sum overflows.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// [`MetricsStore`] backed by a PostgreSQL `metrics` table.
///
/// Every statement goes through a [`RetryExecutor`]; only connection-level
/// failures are retried. A retried counter upsert whose first attempt
/// committed before the connection dropped is applied twice.
pub struct PostgresStore {
    db: DatabaseConnection,
    retry: RetryExecutor,
}

impl PostgresStore {
    /// Connects to `dsn` and makes sure the schema exists.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let retry = RetryExecutor::default();
        let db = retry.run("connect", || Database::connect(dsn)).await?;
        let store = Self::with_connection(db, retry);
        store.init_schema().await?;
        tracing::info!("Connected to PostgreSQL metrics store");
        Ok(store)
    }

    pub fn with_connection(db: DatabaseConnection, retry: RetryExecutor) -> Self {
        Self { db, retry }
    }

    /// Creates the `metrics` table if missing. Safe to run repeatedly.
    pub async fn init_schema(&self) -> Result<()> {
        let db = &self.db;
        self.retry
            .run("init_schema", move || async move {
                db.execute_unprepared(SCHEMA).await
            })
            .await?;
        Ok(())
    }
}

fn upsert_statement(metric: &Metric) -> Statement {
    let (sql, payload) = match metric.value {
        MetricValue::Gauge(v) => (UPSERT_GAUGE, Value::from(v)),
        MetricValue::Counter(d) => (UPSERT_COUNTER, Value::from(d)),
    };
    Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        [
            metric.id.clone().into(),
            metric.kind().as_str().into(),
            payload,
        ],
    )
}

async fn upsert<C: ConnectionTrait>(
    conn: &C,
    metric: &Metric,
) -> std::result::Result<QueryResult, DbErr> {
    conn.query_one(upsert_statement(metric))
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("upsert of '{}' returned no row", metric.id)))
}

fn row_to_metric(row: &QueryResult) -> Result<Metric> {
    let id: String = row.try_get("", "id")?;
    let mtype: String = row.try_get("", "mtype")?;
    let delta: Option<i64> = row.try_get("", "delta")?;
    let value: Option<f64> = row.try_get("", "value")?;

    let metric = match (mtype.parse::<MetricKind>()?, value, delta) {
        (MetricKind::Gauge, Some(v), _) => Metric::gauge(id, v),
        (MetricKind::Counter, _, Some(d)) => Metric::counter(id, d),
        (MetricKind::Gauge, None, _) => {
            return Err(ModelError::PayloadMismatch {
                id,
                kind: "gauge",
                field: "value",
            }
            .into())
        }
        (MetricKind::Counter, _, None) => {
            return Err(ModelError::PayloadMismatch {
                id,
                kind: "counter",
                field: "delta",
            }
            .into())
        }
    };
    Ok(metric)
}

/// Maps an overflowing counter sum to [`StorageError::CounterOverflow`].
fn map_write_error(err: DbErr, metric_id: &str) -> StorageError {
    if sqlstate(&err).as_deref() == Some(NUMERIC_OUT_OF_RANGE) {
        StorageError::CounterOverflow {
            id: metric_id.to_string(),
        }
    } else {
        StorageError::Database(err)
    }
}

fn sqlx_error(err: &DbErr) -> Option<&sqlx::Error> {
    match err {
        DbErr::Conn(RuntimeErr::SqlxError(e))
        | DbErr::Exec(RuntimeErr::SqlxError(e))
        | DbErr::Query(RuntimeErr::SqlxError(e)) => Some(e),
        _ => None,
    }
}

fn sqlstate(err: &DbErr) -> Option<String> {
    match sqlx_error(err)? {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn sqlx_is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

pub(crate) fn is_transient_sqlstate(code: &str) -> bool {
    TRANSIENT_SQLSTATES.contains(&code)
}

impl Transient for DbErr {
    fn is_transient(&self) -> bool {
        match self {
            DbErr::ConnectionAcquire(_) => true,
            other => sqlx_error(other).is_some_and(sqlx_is_transient),
        }
    }
}

/// A failed batch transaction, with the position of the metric whose upsert
/// failed when the error came from a statement rather than begin/commit.
struct BatchError {
    index: Option<usize>,
    source: DbErr,
}

impl From<DbErr> for BatchError {
    fn from(source: DbErr) -> Self {
        Self {
            index: None,
            source,
        }
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(idx) => write!(f, "metric #{idx}: {}", self.source),
            None => self.source.fmt(f),
        }
    }
}

impl Transient for BatchError {
    fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}

#[async_trait]
impl MetricsStore for PostgresStore {
    async fn save(&self, metric: &Metric) -> Result<Metric> {
        metric.checked_key()?;
        let db = &self.db;
        let row = self
            .retry
            .run("save", move || async move { upsert(db, metric).await })
            .await
            .map_err(|e| map_write_error(e, &metric.id))?;
        row_to_metric(&row)
    }

    async fn save_all(&self, metrics: &[Metric]) -> Result<Vec<Metric>> {
        if metrics.is_empty() {
            return Ok(Vec::new());
        }
        // Rows are locked in key order so concurrent batches cannot deadlock.
        // Repeated keys are applied in input order.
        let mut ordered: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, metric) in metrics.iter().enumerate() {
            ordered.entry(metric.checked_key()?).or_default().push(idx);
        }
        let ordered = &ordered;
        let db = &self.db;

        let rows = self
            .retry
            .run("save_all", move || async move {
                let txn = db.begin().await.map_err(BatchError::from)?;
                let mut rows: Vec<Option<QueryResult>> = metrics.iter().map(|_| None).collect();
                for indices in ordered.values() {
                    for &idx in indices {
                        let row = upsert(&txn, &metrics[idx])
                            .await
                            .map_err(|source| BatchError {
                                index: Some(idx),
                                source,
                            })?;
                        rows[idx] = Some(row);
                    }
                }
                txn.commit().await.map_err(BatchError::from)?;
                Ok::<_, BatchError>(rows)
            })
            .await
            .map_err(|e| match e.index {
                Some(idx) => map_write_error(e.source, &metrics[idx].id),
                None => StorageError::Database(e.source),
            })?;

        rows.iter()
            .flatten()
            .map(row_to_metric)
            .collect()
    }

    async fn get_by_type_and_id(&self, id: &str, kind: MetricKind) -> Result<Option<Metric>> {
        metric_key(id, kind)?;
        let db = &self.db;
        let row = self
            .retry
            .run("get_by_type_and_id", move || async move {
                db.query_one(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    SELECT_ONE,
                    [id.into(), kind.as_str().into()],
                ))
                .await
            })
            .await?;
        row.as_ref().map(row_to_metric).transpose()
    }

    async fn get_all_by_type(&self, kind: MetricKind) -> Result<Vec<Metric>> {
        let db = &self.db;
        let rows = self
            .retry
            .run("get_all_by_type", move || async move {
                db.query_all(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    SELECT_BY_TYPE,
                    [kind.as_str().into()],
                ))
                .await
            })
            .await?;
        rows.iter().map(row_to_metric).collect()
    }

    async fn ping(&self) -> Result<()> {
        tokio::time::timeout(PING_TIMEOUT, self.db.ping())
            .await
            .map_err(|_| StorageError::PingTimeout)??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_class_sqlstates_are_transient() {
        for code in ["08000", "08003", "08006", "08001", "08004"] {
            assert!(is_transient_sqlstate(code), "{code} should be transient");
        }
        assert!(!is_transient_sqlstate("23505"));
        assert!(!is_transient_sqlstate("42P01"));
    }

    #[test]
    fn acquire_timeout_is_transient() {
        let err = DbErr::ConnectionAcquire(sea_orm::error::ConnAcquireErr::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = DbErr::Conn(RuntimeErr::SqlxError(sqlx::Error::Io(io).into()));
        assert!(err.is_transient());
    }

    #[test]
    fn statement_errors_are_permanent() {
        assert!(!DbErr::Custom("syntax".into()).is_transient());
        assert!(!DbErr::RecordNotFound("gone".into()).is_transient());
        let err = DbErr::Query(RuntimeErr::Internal("bad column".into()));
        assert!(!err.is_transient());
    }

    #[test]
    fn batch_error_keeps_position_and_classification() {
        let err = BatchError {
            index: Some(2),
            source: DbErr::ConnectionAcquire(sea_orm::error::ConnAcquireErr::Timeout),
        };
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("metric #2: "));

        let err = BatchError::from(DbErr::Custom("commit refused".into()));
        assert!(!err.is_transient());
        assert_eq!(err.index, None);
    }

    #[test]
    fn counter_upsert_adds_in_sql() {
        let stmt = upsert_statement(&Metric::counter("PollCount", 5));
        assert!(stmt.sql.contains("metrics.delta + EXCLUDED.delta"));
        let stmt = upsert_statement(&Metric::gauge("Alloc", 1.5));
        assert!(stmt.sql.contains("value = EXCLUDED.value"));
    }
}
