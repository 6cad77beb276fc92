//! Queries over `mountain_templates`: the fixed name/color pool the
//! pseudonym generator draws from.

use rand::seq::SliceRandom;
use rusqlite::params;

use crate::models::MountainTemplate;
use crate::{DbResult, Gateway};

impl Gateway {
    pub fn insert_mountain_template(
        &self,
        name: &str,
        fullname: &str,
        canton: &str,
        height: f64,
    ) -> DbResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mountain_templates (name, fullname, canton, height) VALUES (?1, ?2, ?3, ?4)",
                params![name, fullname, canton, height],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_mountain_templates(&self) -> DbResult<Vec<MountainTemplate>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, fullname, canton, height FROM mountain_templates")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MountainTemplate {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        fullname: row.get(2)?,
                        canton: row.get(3)?,
                        height: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn random_mountain_template(&self) -> DbResult<Option<MountainTemplate>> {
        let templates = self.list_mountain_templates()?;
        Ok(templates.choose(&mut rand::thread_rng()).cloned())
    }

    pub fn find_mountain_template(&self, id: i64) -> DbResult<Option<MountainTemplate>> {
        Ok(self
            .list_mountain_templates()?
            .into_iter()
            .find(|t| t.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_list_and_lookup() {
        let gw = Gateway::open_memory().unwrap();
        let id = gw
            .insert_mountain_template("Eiger", "Eiger", "BE", 3967.0)
            .unwrap();
        let all = gw.list_mountain_templates().unwrap();
        assert_eq!(all.len(), 1);
        let found = gw.find_mountain_template(id).unwrap().unwrap();
        assert_eq!(found.name, "Eiger");
    }

    #[test]
    fn random_draw_returns_none_when_empty() {
        let gw = Gateway::open_memory().unwrap();
        assert!(gw.random_mountain_template().unwrap().is_none());
    }
}
