//! Per-company vacancy counts over the persisted store.

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use tracing::error;

use crate::db::ConnectionProvider;
use crate::error::Result;
use crate::pipeline::staging::numbered_placeholders;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyCount {
    pub name: String,
    pub count: i64,
}

/// Never fails: errors are logged and reported as an empty list.
pub fn companies_vacancy_count<P>(provider: &P, registry: &Registry) -> Vec<CompanyCount>
where
    P: ConnectionProvider + ?Sized,
{
    let ids = registry.all_ids();
    if ids.is_empty() {
        return Vec::new();
    }
    match provider.with_connection(|conn| query_counts(conn, &ids)) {
        Ok(counts) => counts,
        Err(e) => {
            error!(companies = ids.len(), error = %e, "Failed to count vacancies per company");
            Vec::new()
        }
    }
}

fn query_counts(conn: &Connection, ids: &[&str]) -> Result<Vec<CompanyCount>> {
    let list = numbered_placeholders(1, ids.len());
    let sql = format!(
        "SELECT c.name, COUNT(v.id) AS vacancy_count
         FROM companies c
         LEFT JOIN vacancies v ON v.company_id = c.id
         WHERE c.hh_id IN ({list}) OR c.sj_id IN ({list})
         GROUP BY c.id, c.name
         ORDER BY vacancy_count DESC, c.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok(CompanyCount {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, Database};
    use crate::model::{Employer, Source, Vacancy};
    use crate::registry::TargetCompany;

    fn companies() -> Vec<TargetCompany> {
        vec![
            TargetCompany::new("Acme", Some("1"), None),
            TargetCompany::new("Globex", None, Some("2")),
            TargetCompany::new("Initech", Some("3"), None),
        ]
    }

    #[test]
    fn counts_sorted_by_volume() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            db::init_schema(conn)?;
            db::seed_companies(conn, &companies())?;
            let rows = [
                ("a", "1", Source::Hh),
                ("b", "2", Source::Sj),
                ("c", "2", Source::Sj),
            ];
            let batch: Vec<Vacancy> = rows
                .into_iter()
                .map(|(id, emp, src)| {
                    Vacancy::new(id, "Dev")
                        .with_source(src)
                        .with_employer(Employer::from_parts(Some(emp), None))
                })
                .collect();
            db::save_vacancies(conn, &batch)
        })
        .unwrap();

        let registry = Registry::from_companies(&companies());
        let counts = companies_vacancy_count(&db, &registry);
        let got: Vec<(&str, i64)> = counts.iter().map(|c| (c.name.as_str(), c.count)).collect();
        assert_eq!(got, vec![("Globex", 2), ("Acme", 1), ("Initech", 0)]);
    }

    #[test]
    fn missing_tables_give_empty_list() {
        let db = Database::open_in_memory().unwrap();
        let registry = Registry::from_companies(&companies());
        assert!(companies_vacancy_count(&db, &registry).is_empty());
    }

    #[test]
    fn empty_registry_skips_query() {
        let db = Database::open_in_memory().unwrap();
        assert!(companies_vacancy_count(&db, &Registry::default()).is_empty());
    }
}
