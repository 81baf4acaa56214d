use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder};
use serde_json::{Map, Value};

use crate::config::schema::MysqlConfig;
use crate::datastore::{with_deadline, DatastoreProbe, ProbeError};

/// `SELECT VERSION();` over a fresh connection.
pub struct MysqlProbe {
    opts: Opts,
    deadline: Duration,
}

impl MysqlProbe {
    pub fn new(config: &MysqlConfig, deadline: Duration) -> Self {
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()));
        Self {
            opts: opts.into(),
            deadline,
        }
    }
}

#[async_trait]
impl DatastoreProbe for MysqlProbe {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn probe(&self) -> Result<Map<String, Value>, ProbeError> {
        with_deadline("MySQL", self.deadline, async {
            let mut conn = Conn::new(self.opts.clone()).await?;
            let version: Option<String> = conn.query_first("SELECT VERSION();").await?;
            conn.disconnect().await?;

            let mut fields = Map::new();
            fields.insert("version".into(), version.map_or(Value::Null, Value::String));
            Ok::<_, ProbeError>(fields)
        })
        .await
    }
}
