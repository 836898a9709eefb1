use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};

use mailroom_db::{ContactStore, Store};
use mailroom_types::api::ImportContactsResponse;
use mailroom_types::models::{Contact, NewContact};

use crate::error::DispatchError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+$").expect("email pattern is valid")
});

/// Any line break: CRLF, LF, CR, VT, FF, NEL and the Unicode separators.
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\r\n|[\n\x0B\x0C\r\u{85}\u{2028}\u{2029}]")
        .expect("line break pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trailing empty lines are dropped, so a final newline adds no line.
/// Text without any break is a single line, even when empty.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = LINE_BREAK.split(text).collect();
    if lines.len() > 1 {
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
    }
    lines
}

#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn Store>,
}

impl ContactService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        name: &str,
        email: &str,
        consent: bool,
        subscribed_to_list: bool,
    ) -> Result<Contact, DispatchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DispatchError::validation("Name is required."));
        }
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(DispatchError::validation("Invalid email address."));
        }

        let new = NewContact {
            name: name.to_string(),
            email,
            consent,
            subscribed_to_list,
        };

        let contact = self
            .store
            .insert_contact(&new, Utc::now())?
            .ok_or_else(|| DispatchError::validation("Email already registered."))?;

        info!(contact_id = contact.id, "Contact created");
        Ok(contact)
    }

    /// Imports one email per line. Blank lines are skipped but still count
    /// toward `total_lines`.
    pub fn import_lines(&self, text: &str) -> Result<ImportContactsResponse, DispatchError> {
        let mut report = ImportContactsResponse::default();
        let mut seen = HashSet::new();

        let lines = split_lines(text);
        report.total_lines = lines.len();

        for line in lines {
            let email = normalize_email(line);
            if email.is_empty() {
                continue;
            }

            if !is_valid_email(&email) {
                report.invalid_emails.push(email);
                continue;
            }

            if !seen.insert(email.clone())
                || self.store.find_contact_by_email(&email)?.is_some()
            {
                report.duplicated_emails.push(email);
                continue;
            }

            let name = email.split('@').next().unwrap_or_default().to_string();
            let new = NewContact {
                name,
                email: email.clone(),
                consent: true,
                subscribed_to_list: true,
            };

            match self.store.insert_contact(&new, Utc::now())? {
                Some(_) => report.imported_emails.push(email),
                None => {
                    debug!(email = %email, "Import lost insert race to an existing contact");
                    report.duplicated_emails.push(email);
                }
            }
        }

        report.imported = report.imported_emails.len();
        report.skipped_invalid = report.invalid_emails.len();
        report.skipped_duplicated = report.duplicated_emails.len();

        info!(
            total = report.total_lines,
            imported = report.imported,
            invalid = report.skipped_invalid,
            duplicated = report.skipped_duplicated,
            "Contact import finished"
        );
        Ok(report)
    }

    pub fn list(&self) -> Result<Vec<Contact>, DispatchError> {
        Ok(self.store.list_contacts()?)
    }
}
