use std::env;
use std::time::Duration;

use chrono::NaiveDate;
use postgres::types::ToSql;
use postgres::Row;
use postgres_native_tls::MakeTlsConnector;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;
use tracing::{debug, error};

use super::{RecordStore, StoreError};
use crate::model::{Job, JobStatus, Member, MemberUpdate, NameEmail, SenderCredential};

const MEMBER_COLUMNS: &str = "id::text, job_id::text, name_email, thread_id, message_id, \
     reference_id, subject, body";

#[derive(Debug)]
struct LoggingErrorHandler;

impl r2d2::HandleError<postgres::Error> for LoggingErrorHandler {
    fn handle_error(&self, err: postgres::Error) {
        error!("record_store postgres pool error: {:?}", err);
    }
}

/// Jobs, members, profiles and subscriptions in the Supabase Postgres database.
#[derive(Clone)]
pub struct SupabaseRecordStore {
    pool: Pool<PostgresConnectionManager<MakeTlsConnector>>,
}

impl SupabaseRecordStore {
    pub fn from_env() -> Result<Self, StoreError> {
        let db_url = env::var("SUPABASE_DB_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(StoreError::MissingDbUrl)?;
        Self::new(&db_url)
    }

    pub fn new(db_url: &str) -> Result<Self, StoreError> {
        let config: postgres::Config = db_url.parse()?;

        let mut tls_builder = native_tls::TlsConnector::builder();
        if env::var("SUPABASE_TLS_ALLOW_INVALID_CERTS")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
        {
            tls_builder.danger_accept_invalid_certs(true);
            tls_builder.danger_accept_invalid_hostnames(true);
        }
        let tls_connector = tls_builder
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let tls = MakeTlsConnector::new(tls_connector);

        let manager = PostgresConnectionManager::new(config, tls);
        let pool = Pool::builder()
            .max_size(4)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(60)))
            .error_handler(Box::new(LoggingErrorHandler))
            .build(manager)?;

        Ok(Self { pool })
    }

    fn conn(
        &self,
    ) -> Result<PooledConnection<PostgresConnectionManager<MakeTlsConnector>>, StoreError> {
        Ok(self.pool.get()?)
    }
}

fn job_from_row(row: &Row) -> Result<Job, StoreError> {
    let status: Option<String> = row.try_get(3)?;
    let end_date: Option<NaiveDate> = row.try_get(7)?;
    Ok(Job {
        id: row.try_get(0)?,
        user_id: row.try_get(1)?,
        mailbox_address: row.try_get::<_, Option<String>>(2)?.unwrap_or_default(),
        status: JobStatus::parse(status.as_deref().unwrap_or_default()),
        subject: row.try_get(4)?,
        first_message: row.try_get(5)?,
        namespace: row.try_get(6)?,
        end_date,
    })
}

fn optional_text(row: Option<Row>) -> Result<Option<String>, StoreError> {
    match row {
        Some(row) => Ok(row.try_get::<_, Option<String>>(0)?),
        None => Ok(None),
    }
}

fn member_from_row(row: &Row) -> Result<Member, StoreError> {
    let name_email: Option<Value> = row.try_get(2)?;
    let name_email: NameEmail = match name_email {
        Some(value) => serde_json::from_value(value)?,
        None => NameEmail {
            name: None,
            email: String::new(),
        },
    };
    Ok(Member {
        id: row.try_get(0)?,
        job_id: row.try_get(1)?,
        name_email,
        thread_id: row.try_get(3)?,
        message_id: row.try_get(4)?,
        reference_id: row.try_get(5)?,
        subject: row.try_get(6)?,
        body: row.try_get(7)?,
    })
}

impl RecordStore for SupabaseRecordStore {
    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "SELECT id::text, user_id::text, \"Job_email\", status, subject, first_message, \
             namespace, job_end_date
             FROM jobs WHERE id::text = $1",
            &[&job_id],
        )?;
        row.as_ref().map(job_from_row).transpose()
    }

    fn subscription_status(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "SELECT status FROM subscriptions WHERE user_id::text = $1 LIMIT 1",
            &[&user_id],
        )?;
        optional_text(row)
    }

    fn get_user_email(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "SELECT email FROM profiles WHERE id::text = $1",
            &[&user_id],
        )?;
        optional_text(row)
    }

    fn list_members(&self, job_id: &str) -> Result<Vec<Member>, StoreError> {
        let mut conn = self.conn()?;
        let rows = conn.query(
            format!("SELECT {} FROM members WHERE job_id::text = $1", MEMBER_COLUMNS).as_str(),
            &[&job_id],
        )?;
        rows.iter().map(member_from_row).collect()
    }

    fn get_member(&self, member_id: &str) -> Result<Option<Member>, StoreError> {
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            format!("SELECT {} FROM members WHERE id::text = $1", MEMBER_COLUMNS).as_str(),
            &[&member_id],
        )?;
        row.as_ref().map(member_from_row).transpose()
    }

    fn update_member(&self, member_id: &str, update: &MemberUpdate) -> Result<(), StoreError> {
        let fields = update.fields();
        if fields.is_empty() {
            return Err(StoreError::EmptyUpdate(member_id.to_string()));
        }

        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(idx, (column, _))| format!("{} = ${}", column, idx + 1))
            .collect();
        let sql = format!(
            "UPDATE members SET {} WHERE id::text = ${}",
            assignments.join(", "),
            fields.len() + 1
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = fields
            .iter()
            .map(|(_, value)| value as &(dyn ToSql + Sync))
            .collect();
        params.push(&member_id);

        debug!("updating member {} ({} fields)", member_id, fields.len());
        let mut conn = self.conn()?;
        let updated = conn.execute(sql.as_str(), &params)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("member {}", member_id)));
        }
        Ok(())
    }

    fn get_sender_credentials(
        &self,
        user_id: &str,
    ) -> Result<Option<Vec<SenderCredential>>, StoreError> {
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "SELECT sender FROM profiles WHERE id::text = $1",
            &[&user_id],
        )?;
        let Some(row) = row else {
            return Ok(None);
        };
        let sender: Option<Value> = row.try_get(0)?;
        match sender {
            None | Some(Value::Null) => Ok(Some(Vec::new())),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    fn update_sender_credentials(
        &self,
        user_id: &str,
        senders: &[SenderCredential],
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(senders)?;
        let mut conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE profiles SET sender = $1 WHERE id::text = $2",
            &[&value, &user_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("profile {}", user_id)));
        }
        Ok(())
    }
}
