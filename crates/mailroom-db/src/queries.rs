use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use mailroom_types::models::{
    Campaign, CampaignRecipient, CampaignStatus, Contact, NewContact, RecipientLog,
    RecipientStatus, UnsubscribeToken,
};

use crate::Database;
use crate::store::{CampaignStore, ContactStore, RecipientStore, TokenStore};

const CAMPAIGN_COLUMNS: &str =
    "id, title, subject, html_body, status, scheduled_at, created_at";
const CONTACT_COLUMNS: &str =
    "id, name, email, consent, subscribed_to_list, unsubscribed_at, created_at";
const RECIPIENT_COLUMNS: &str = "id, campaign_id, contact_id, status, error_message, sent_at";
const TOKEN_COLUMNS: &str = "id, contact_id, token, created_at, used_at";

// -- Contacts --

impl ContactStore for Database {
    fn insert_contact(
        &self,
        contact: &NewContact,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Contact>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO contacts (name, email, consent, subscribed_to_list, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO NOTHING",
                params![
                    contact.name,
                    contact.email,
                    contact.consent,
                    contact.subscribed_to_list,
                    to_sql_time(created_at),
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }

            Ok(Some(Contact {
                id: conn.last_insert_rowid(),
                name: contact.name.clone(),
                email: contact.email.clone(),
                consent: contact.consent,
                subscribed_to_list: contact.subscribed_to_list,
                unsubscribed_at: None,
                created_at,
            }))
        })
    }

    fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], contact_from_row).optional()?)
        })
    }

    fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        self.with_conn(|conn| {
            // The column is COLLATE NOCASE, so this compares case-insensitively.
            let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], contact_from_row).optional()?)
        })
    }

    fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id");
            query_contacts(conn, &sql)
        })
    }

    fn eligible_contacts(&self) -> Result<Vec<Contact>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts
                 WHERE consent = 1 AND unsubscribed_at IS NULL AND subscribed_to_list = 1
                 ORDER BY id"
            );
            query_contacts(conn, &sql)
        })
    }

    fn mark_contact_unsubscribed(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE contacts SET unsubscribed_at = ?2 WHERE id = ?1 AND unsubscribed_at IS NULL",
                params![id, to_sql_time(at)],
            )?;
            Ok(changed > 0)
        })
    }
}

fn query_contacts(conn: &Connection, sql: &str) -> Result<Vec<Contact>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], contact_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// -- Campaigns --

impl CampaignStore for Database {
    fn insert_campaign(
        &self,
        title: &str,
        subject: &str,
        html_body: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Campaign> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO campaigns (title, subject, html_body, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    title,
                    subject,
                    html_body,
                    CampaignStatus::Draft.as_str(),
                    to_sql_time(created_at),
                ],
            )?;

            Ok(Campaign {
                id: conn.last_insert_rowid(),
                title: title.to_string(),
                subject: subject.to_string(),
                html_body: html_body.to_string(),
                status: CampaignStatus::Draft,
                scheduled_at: None,
                created_at,
            })
        })
    }

    fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], campaign_from_row).optional()?)
        })
    }

    fn schedule_campaign(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = ?2, scheduled_at = ?3
                 WHERE id = ?1 AND status IN (?4, ?2)",
                params![
                    id,
                    CampaignStatus::Scheduled.as_str(),
                    to_sql_time(at),
                    CampaignStatus::Draft.as_str(),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    fn set_campaign_status(&self, id: i64, status: CampaignStatus) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    fn claim_due_campaign(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = ?3
                 WHERE id = ?1 AND status = ?2
                   AND scheduled_at IS NOT NULL AND scheduled_at <= ?4",
                params![
                    id,
                    CampaignStatus::Scheduled.as_str(),
                    CampaignStatus::Sending.as_str(),
                    to_sql_time(now),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE status = ?1 AND scheduled_at IS NOT NULL AND scheduled_at <= ?2
                 ORDER BY scheduled_at, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![CampaignStatus::Scheduled.as_str(), to_sql_time(now)],
                    campaign_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// -- Recipients --

impl RecipientStore for Database {
    fn recipient_exists(&self, campaign_id: i64, contact_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM campaign_recipients WHERE campaign_id = ?1 AND contact_id = ?2",
                    params![campaign_id, contact_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn insert_pending_recipient(
        &self,
        campaign_id: i64,
        contact_id: i64,
    ) -> Result<Option<CampaignRecipient>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO campaign_recipients (campaign_id, contact_id, status)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(campaign_id, contact_id) DO NOTHING",
                params![campaign_id, contact_id, RecipientStatus::Pending.as_str()],
            )?;
            if inserted == 0 {
                return Ok(None);
            }

            Ok(Some(CampaignRecipient {
                id: conn.last_insert_rowid(),
                campaign_id,
                contact_id,
                status: RecipientStatus::Pending,
                error_message: None,
                sent_at: None,
            }))
        })
    }

    fn update_recipient(&self, recipient: &CampaignRecipient) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE campaign_recipients SET status = ?2, error_message = ?3, sent_at = ?4
                 WHERE id = ?1",
                params![
                    recipient.id,
                    recipient.status.as_str(),
                    recipient.error_message,
                    recipient.sent_at.map(to_sql_time),
                ],
            )?;
            Ok(())
        })
    }

    fn recipients_for_campaign(&self, campaign_id: i64) -> Result<Vec<CampaignRecipient>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RECIPIENT_COLUMNS} FROM campaign_recipients
                 WHERE campaign_id = ?1
                 ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([campaign_id], recipient_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn count_recipients(&self, campaign_id: i64, status: RecipientStatus) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = ?1 AND status = ?2",
                params![campaign_id, status.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    fn recent_failures(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>> {
        self.with_conn(|conn| {
            query_recipient_logs(
                conn,
                "SELECT c.email, r.error_message, r.sent_at
                 FROM campaign_recipients r
                 JOIN contacts c ON c.id = r.contact_id
                 WHERE r.campaign_id = ?1 AND r.status = ?2
                 ORDER BY r.id DESC
                 LIMIT ?3",
                campaign_id,
                RecipientStatus::Failed,
                limit,
            )
        })
    }

    fn recent_successes(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>> {
        self.with_conn(|conn| {
            query_recipient_logs(
                conn,
                "SELECT c.email, r.error_message, r.sent_at
                 FROM campaign_recipients r
                 JOIN contacts c ON c.id = r.contact_id
                 WHERE r.campaign_id = ?1 AND r.status = ?2 AND r.sent_at IS NOT NULL
                 ORDER BY r.sent_at DESC, r.id DESC
                 LIMIT ?3",
                campaign_id,
                RecipientStatus::Sent,
                limit,
            )
        })
    }
}

fn query_recipient_logs(
    conn: &Connection,
    sql: &str,
    campaign_id: i64,
    status: RecipientStatus,
    limit: usize,
) -> Result<Vec<RecipientLog>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![campaign_id, status.as_str(), limit as i64], |row| {
            Ok(RecipientLog {
                email: row.get(0)?,
                error_message: row.get(1)?,
                sent_at: opt_time_col(row, 2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// -- Unsubscribe tokens --

impl TokenStore for Database {
    fn latest_token_for_contact(&self, contact_id: i64) -> Result<Option<UnsubscribeToken>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {TOKEN_COLUMNS} FROM unsubscribe_tokens
                 WHERE contact_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1"
            );
            Ok(conn.query_row(&sql, [contact_id], token_from_row).optional()?)
        })
    }

    fn insert_token(
        &self,
        contact_id: i64,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<UnsubscribeToken> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO unsubscribe_tokens (contact_id, token, created_at) VALUES (?1, ?2, ?3)",
                params![contact_id, token, to_sql_time(created_at)],
            )?;

            Ok(UnsubscribeToken {
                id: conn.last_insert_rowid(),
                contact_id,
                token: token.to_string(),
                created_at,
                used_at: None,
            })
        })
    }

    fn find_token(&self, token: &str) -> Result<Option<UnsubscribeToken>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {TOKEN_COLUMNS} FROM unsubscribe_tokens WHERE token = ?1");
            Ok(conn.query_row(&sql, [token], token_from_row).optional()?)
        })
    }

    fn mark_token_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE unsubscribe_tokens SET used_at = ?2 WHERE id = ?1 AND used_at IS NULL",
                params![id, to_sql_time(at)],
            )?;
            Ok(changed > 0)
        })
    }
}

// -- Row mapping --

/// Fixed-width RFC 3339 so text comparison in SQL orders like time.
fn to_sql_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        title: row.get(1)?,
        subject: row.get(2)?,
        html_body: row.get(3)?,
        status: parse_col(row, 4)?,
        scheduled_at: opt_time_col(row, 5)?,
        created_at: time_col(row, 6)?,
    })
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        consent: row.get(3)?,
        subscribed_to_list: row.get(4)?,
        unsubscribed_at: opt_time_col(row, 5)?,
        created_at: time_col(row, 6)?,
    })
}

fn recipient_from_row(row: &Row<'_>) -> rusqlite::Result<CampaignRecipient> {
    Ok(CampaignRecipient {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        contact_id: row.get(2)?,
        status: parse_col(row, 3)?,
        error_message: row.get(4)?,
        sent_at: opt_time_col(row, 5)?,
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<UnsubscribeToken> {
    Ok(UnsubscribeToken {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        token: row.get(2)?,
        created_at: time_col(row, 3)?,
        used_at: opt_time_col(row, 4)?,
    })
}
