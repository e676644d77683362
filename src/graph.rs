//! Thin client around the graph-store dependency.
//!
//! The graph database is reachable over the Bolt wire protocol (shared by
//! Neo4j and Memgraph). This crate only issues a `Ping()`-style probe and
//! passes the opaque handle to tool handlers; schema and query language are
//! out of scope.

use std::time::{Duration, Instant};

use neo4rs::Graph;

use crate::config::DependencySettings;
use crate::error::{Error, Result};

/// An opaque connection handle to the configured graph-store dependency.
pub struct GraphHandle {
    graph: Graph,
}

impl GraphHandle {
    /// Establish a connection handle. Connection is lazy in `neo4rs`; this
    /// constructor never blocks on network I/O itself, so the caller can
    /// start the health probe and bind the listener before the first
    /// round trip completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Graph`] if the driver rejects the URI or credentials outright.
    pub async fn connect(settings: &DependencySettings, user: &str, password: &str) -> Result<Self> {
        let uri = format!("bolt://{}:{}", settings.host, settings.port);
        let graph = Graph::new(uri, user, password).await.map_err(Error::Graph)?;
        Ok(Self { graph })
    }

    /// Issue a trivial no-op round-trip (`RETURN 1`) bounded by `timeout`.
    /// Used by the dependency health probe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the round trip exceeds `timeout`, or
    /// [`Error::Graph`] if the driver reports a connection failure.
    pub async fn ping(&self, timeout: Duration) -> Result<Duration> {
        let started = Instant::now();
        let probe = async {
            let mut rows = self.graph.execute(neo4rs::query("RETURN 1")).await?;
            rows.next().await?;
            Ok::<(), neo4rs::Error>(())
        };
        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(err)) => Err(Error::Graph(err)),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    /// Run a parameterized read query and collect a single named string
    /// column from every row. Tool handlers know their own query shape; this
    /// stays a thin pass-through rather than a general row-to-JSON mapper.
    /// Parameters are bound through the driver, never interpolated into
    /// `cypher` directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Graph`] if the query fails or the column is absent
    /// or not a string on some row.
    pub async fn query_string_column(
        &self,
        cypher: &str,
        params: &[(&str, String)],
        column: &str,
    ) -> Result<Vec<String>> {
        let mut query = neo4rs::query(cypher);
        for (key, value) in params {
            query = query.param(key, value.clone());
        }
        let mut result = self.graph.execute(query).await.map_err(Error::Graph)?;
        let mut values = Vec::new();
        while let Some(row) = result.next().await.map_err(Error::Graph)? {
            let value: String = row
                .get(column)
                .map_err(|e| Error::Graph(neo4rs::Error::DeserializationError(e)))?;
            values.push(value);
        }
        Ok(values)
    }
}
