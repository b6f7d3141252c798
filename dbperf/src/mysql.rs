//! [`ConnectionPool`] backed by a sqlx MySQL pool.
//!
//! Every pooled connection runs with `autocommit=0`, so nothing is durable until the runner
//! commits.
use dbperf_core::{
    Connection, ConnectionConfig, ConnectionPool, DbError, KeyRange, PoolConfig, ServerInfo,
    Statement, TlsConfig, TABLE_NAME,
};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::pool::PoolConnection;
use sqlx::{Executor, MySql, QueryBuilder};
use std::time::Duration;
use tracing::{debug, trace};

fn create_table_sql() -> String {
    format!(
        "CREATE TABLE {TABLE_NAME} (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            test_data VARCHAR(255),
            numeric_value BIGINT,
            recorded_at TIMESTAMP,
            INDEX idx_numeric_value (numeric_value),
            INDEX idx_recorded_at (recorded_at)
        ) ENGINE=InnoDB"
    )
}

#[derive(Clone, Debug)]
pub struct MySqlStore {
    pool: sqlx::MySqlPool,
    acquire_timeout: Duration,
}

impl MySqlStore {
    /// Builds the pool without connecting; the first `acquire` opens the first connection.
    pub fn new(connection: &ConnectionConfig, pool: &PoolConfig) -> Self {
        let mut options = MySqlConnectOptions::new()
            .host(&connection.host)
            .port(connection.port)
            .username(&connection.user)
            .password(&connection.password)
            .database(&connection.database);
        if let Some(tls) = &connection.tls {
            options = with_tls(options, tls);
        }

        debug!("Opening a pool of {pool}");
        let sqlx_pool = MySqlPoolOptions::new()
            .max_connections(pool.size)
            .acquire_timeout(pool.connect_timeout)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET autocommit = 0").await?;
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        Self {
            pool: sqlx_pool,
            acquire_timeout: pool.connect_timeout,
        }
    }
}

fn with_tls(mut options: MySqlConnectOptions, tls: &TlsConfig) -> MySqlConnectOptions {
    options = match &tls.ca {
        Some(ca) => options.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(ca),
        None => options.ssl_mode(MySqlSslMode::Required),
    };
    if let Some(cert) = &tls.cert {
        options = options.ssl_client_cert(cert);
    }
    if let Some(key) = &tls.key {
        options = options.ssl_client_key(key);
    }
    options
}

fn statement_error(err: sqlx::Error) -> DbError {
    DbError::Statement(err.to_string())
}

impl ConnectionPool for MySqlStore {
    type Conn = MySqlSession;

    async fn acquire(&self) -> Result<MySqlSession, DbError> {
        match self.pool.acquire().await {
            Ok(conn) => Ok(MySqlSession { conn }),
            Err(sqlx::Error::PoolTimedOut) => Err(DbError::PoolTimeout(self.acquire_timeout)),
            Err(err) => Err(DbError::Connect(err.to_string())),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// One checked-out connection. Returned to the pool on drop.
pub struct MySqlSession {
    conn: PoolConnection<MySql>,
}

impl Connection for MySqlSession {
    async fn execute(&mut self, statement: Statement) -> Result<u64, DbError> {
        trace!("{}", statement.name());
        let conn = &mut *self.conn;
        let rows = match statement {
            Statement::Insert(row) => sqlx::query(&format!(
                "INSERT INTO {TABLE_NAME} (test_data, numeric_value, recorded_at) \
                 VALUES (?, ?, ?)"
            ))
            .bind(row.test_data)
            .bind(row.numeric_value)
            .bind(row.recorded_at)
            .execute(conn)
            .await
            .map_err(statement_error)?
            .rows_affected(),

            Statement::InsertBatch(rows) => {
                if rows.is_empty() {
                    return Ok(0);
                }
                let mut builder = QueryBuilder::<MySql>::new(format!(
                    "INSERT INTO {TABLE_NAME} (test_data, numeric_value, recorded_at) "
                ));
                builder.push_values(rows, |mut values, row| {
                    values
                        .push_bind(row.test_data)
                        .push_bind(row.numeric_value)
                        .push_bind(row.recorded_at);
                });
                builder
                    .build()
                    .execute(conn)
                    .await
                    .map_err(statement_error)?
                    .rows_affected()
            }

            Statement::Update { id, test_data } => sqlx::query(&format!(
                "UPDATE {TABLE_NAME} SET test_data = ? WHERE id = ?"
            ))
            .bind(test_data)
            .bind(id)
            .execute(conn)
            .await
            .map_err(statement_error)?
            .rows_affected(),

            Statement::PointRead { id } => {
                let found = sqlx::query(&format!("SELECT * FROM {TABLE_NAME} WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(conn)
                    .await
                    .map_err(statement_error)?;
                u64::from(found.is_some())
            }

            Statement::RangeRead { first, last } => sqlx::query(&format!(
                "SELECT * FROM {TABLE_NAME} WHERE id BETWEEN ? AND ?"
            ))
            .bind(first)
            .bind(last)
            .fetch_all(conn)
            .await
            .map_err(statement_error)?
            .len() as u64,
        };
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        (&mut *self.conn)
            .execute("COMMIT")
            .await
            .map_err(statement_error)?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<ServerInfo, DbError> {
        let (version, database, user): (String, Option<String>, String) =
            sqlx::query_as("SELECT VERSION(), DATABASE(), CURRENT_USER()")
                .fetch_one(&mut *self.conn)
                .await
                .map_err(|err| DbError::Connect(err.to_string()))?;
        let cipher: Option<(String, String)> = sqlx::query_as("SHOW STATUS LIKE 'Ssl_cipher'")
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|err| DbError::Connect(err.to_string()))?;

        Ok(ServerInfo {
            version,
            database,
            user,
            ssl_cipher: cipher.map(|(_, value)| value).filter(|v| !v.is_empty()),
        })
    }

    async fn create_table(&mut self) -> Result<(), DbError> {
        self.drop_table().await?;
        (&mut *self.conn)
            .execute(create_table_sql().as_str())
            .await
            .map_err(statement_error)?;
        Ok(())
    }

    async fn drop_table(&mut self) -> Result<(), DbError> {
        (&mut *self.conn)
            .execute(format!("DROP TABLE IF EXISTS {TABLE_NAME}").as_str())
            .await
            .map_err(statement_error)?;
        Ok(())
    }

    async fn key_range(&mut self) -> Result<KeyRange, DbError> {
        // Ends any open read snapshot so rows committed by other connections are visible.
        self.commit().await?;
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as(&format!("SELECT MIN(id), MAX(id) FROM {TABLE_NAME}"))
                .fetch_one(&mut *self.conn)
                .await
                .map_err(statement_error)?;
        Ok(KeyRange::from_bounds(
            min.and_then(|v| u64::try_from(v).ok()),
            max.and_then(|v| u64::try_from(v).ok()),
        ))
    }
}
