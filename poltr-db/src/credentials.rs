//! Queries over the `credentials` table.

use rusqlite::{params, OptionalExtension};

use crate::models::Credential;
use crate::{DbError, DbResult, Gateway};

impl Gateway {
    pub fn insert_credential(&self, cred: &Credential) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credentials
                    (did, handle, email, pds_hostname, pw_ciphertext, pw_nonce, pseudonym_template_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    cred.did,
                    cred.handle,
                    cred.email,
                    cred.pds_hostname,
                    cred.pw_ciphertext,
                    cred.pw_nonce,
                    cred.pseudonym_template_id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn find_credential_by_did(&self, did: &str) -> DbResult<Option<Credential>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT did, handle, email, pds_hostname, pw_ciphertext, pw_nonce, pseudonym_template_id
                 FROM credentials WHERE did = ?1",
                params![did],
                row_to_credential,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn find_credential_by_email(&self, email: &str) -> DbResult<Option<Credential>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT did, handle, email, pds_hostname, pw_ciphertext, pw_nonce, pseudonym_template_id
                 FROM credentials WHERE email = ?1",
                params![email],
                row_to_credential,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn email_taken(&self, email: &str) -> DbResult<bool> {
        Ok(self.find_credential_by_email(email)?.is_some())
    }

    pub fn set_pseudonym_template(&self, did: &str, template_id: i64) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE credentials SET pseudonym_template_id = ?1 WHERE did = ?2",
                params![template_id, did],
            )?;
            Ok(())
        })
    }

    pub fn count_credentials(&self) -> DbResult<i64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))
                .map_err(DbError::from)
        })
    }

    pub fn delete_credential(&self, did: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM credentials WHERE did = ?1", params![did])?;
            Ok(())
        })
    }
}

fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        did: row.get(0)?,
        handle: row.get(1)?,
        email: row.get(2)?,
        pds_hostname: row.get(3)?,
        pw_ciphertext: row.get(4)?,
        pw_nonce: row.get(5)?,
        pseudonym_template_id: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(did: &str, email: &str) -> Credential {
        Credential {
            did: did.to_string(),
            handle: "alice.poltr.info".to_string(),
            email: email.to_string(),
            pds_hostname: "pds.poltr.info".to_string(),
            pw_ciphertext: vec![1, 2, 3],
            pw_nonce: vec![4, 5, 6],
            pseudonym_template_id: None,
        }
    }

    #[test]
    fn insert_and_find_round_trips() {
        let gw = Gateway::open_memory().unwrap();
        gw.insert_credential(&sample("did:plc:abc", "alice@example.com"))
            .unwrap();
        let found = gw.find_credential_by_did("did:plc:abc").unwrap().unwrap();
        assert_eq!(found.email, "alice@example.com");
        assert_eq!(found.pw_ciphertext, vec![1, 2, 3]);
    }

    #[test]
    fn find_by_email_and_availability() {
        let gw = Gateway::open_memory().unwrap();
        gw.insert_credential(&sample("did:plc:abc", "alice@example.com"))
            .unwrap();
        assert!(gw.email_taken("alice@example.com").unwrap());
        assert!(!gw.email_taken("bob@example.com").unwrap());
        assert!(gw.find_credential_by_email("bob@example.com").unwrap().is_none());
    }

    #[test]
    fn missing_did_returns_none() {
        let gw = Gateway::open_memory().unwrap();
        assert!(gw.find_credential_by_did("did:plc:ghost").unwrap().is_none());
    }
}
