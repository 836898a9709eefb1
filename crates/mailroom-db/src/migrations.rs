use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE campaigns (
                id            INTEGER PRIMARY KEY,
                title         TEXT NOT NULL,
                subject       TEXT NOT NULL,
                html_body     TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'DRAFT',
                scheduled_at  TEXT,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_campaigns_due
                ON campaigns(status, scheduled_at);

            CREATE TABLE contacts (
                id                  INTEGER PRIMARY KEY,
                name                TEXT NOT NULL,
                email               TEXT NOT NULL UNIQUE COLLATE NOCASE,
                consent             INTEGER NOT NULL,
                subscribed_to_list  INTEGER NOT NULL,
                unsubscribed_at     TEXT,
                created_at          TEXT NOT NULL
            );

            CREATE TABLE campaign_recipients (
                id             INTEGER PRIMARY KEY,
                campaign_id    INTEGER NOT NULL REFERENCES campaigns(id),
                contact_id     INTEGER NOT NULL REFERENCES contacts(id),
                status         TEXT NOT NULL,
                error_message  TEXT,
                sent_at        TEXT,
                UNIQUE(campaign_id, contact_id)
            );

            CREATE INDEX idx_recipients_campaign_status
                ON campaign_recipients(campaign_id, status);

            CREATE TABLE unsubscribe_tokens (
                id          INTEGER PRIMARY KEY,
                contact_id  INTEGER NOT NULL REFERENCES contacts(id),
                token       TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL,
                used_at     TEXT
            );

            CREATE INDEX idx_tokens_contact
                ON unsubscribe_tokens(contact_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
