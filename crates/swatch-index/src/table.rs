//! LanceDB connection helpers.
use lancedb::{connect, Connection, Table};

use swatch_core::{Error, Result};

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(|e| Error::Unavailable(format!("cannot open catalog store at {uri}: {e}")))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(Error::unavailable)?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn open_table(conn: &Connection, name: &str) -> Result<Table> {
    if !table_exists(conn, name).await? {
        return Err(Error::Unavailable(format!("catalog table '{name}' does not exist")));
    }
    conn.open_table(name).execute().await.map_err(Error::unavailable)
}
