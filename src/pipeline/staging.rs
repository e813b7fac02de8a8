//! Temp-table staging and the single filter/dedup query.
//!
//! Everything here runs inside a transaction the caller never commits, so
//! the `TEMP` table disappears with the rollback.

use rusqlite::{params, params_from_iter, Connection};

use crate::error::Result;
use crate::model::{Vacancy, EMPLOYER_PLACEHOLDER};
use crate::normalize::normalize_text;
use crate::registry::Registry;
use crate::segment::Segmenter;

pub const UNKNOWN_SOURCE: &str = "unknown";

/// One staged row per input vacancy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchRecord {
    pub vacancy_id: String,
    pub title_normalized: String,
    pub employer_id: Option<String>,
    pub employer_name_normalized: String,
    pub source: String,
    pub salary_from: Option<i64>,
    pub salary_to: Option<i64>,
    pub original_index: i64,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub responsibilities: Option<String>,
}

impl ScratchRecord {
    /// Sections are always recomputed from the description, ignoring
    /// whatever the vacancy already carries.
    pub fn from_vacancy(index: usize, vacancy: &Vacancy, segmenter: &Segmenter) -> Self {
        let name = normalize_text(vacancy.employer.name().unwrap_or_default());
        let employer_name_normalized = if name.is_empty() {
            normalize_text(EMPLOYER_PLACEHOLDER)
        } else {
            name
        };
        let sections = vacancy
            .description
            .as_deref()
            .map(|d| segmenter.extract(d))
            .unwrap_or_default();
        let salary = vacancy.salary.as_ref();

        ScratchRecord {
            vacancy_id: vacancy.id.clone(),
            title_normalized: normalize_text(&vacancy.title),
            employer_id: vacancy.employer.id().map(String::from),
            employer_name_normalized,
            source: vacancy
                .source
                .as_ref()
                .map_or_else(|| UNKNOWN_SOURCE.to_string(), |s| s.as_tag().to_string()),
            salary_from: salary.and_then(|s| s.from),
            salary_to: salary.and_then(|s| s.to),
            original_index: index as i64,
            description: vacancy.description.clone(),
            requirements: sections.requirements,
            responsibilities: sections.responsibilities,
        }
    }
}

pub fn build_records(vacancies: &[Vacancy], segmenter: &Segmenter) -> Vec<ScratchRecord> {
    vacancies
        .iter()
        .enumerate()
        .map(|(i, v)| ScratchRecord::from_vacancy(i, v, segmenter))
        .collect()
}

const CREATE_SCRATCH: &str = "
    CREATE TEMP TABLE scratch_vacancies (
        vacancy_id               TEXT PRIMARY KEY,
        title_normalized         TEXT NOT NULL,
        employer_id              TEXT,
        employer_name_normalized TEXT NOT NULL,
        source                   TEXT NOT NULL,
        salary_from              INTEGER,
        salary_to                INTEGER,
        original_index           INTEGER NOT NULL,
        description              TEXT,
        requirements             TEXT,
        responsibilities         TEXT
    )";

/// Create the scratch table and insert every record with one prepared statement.
pub fn stage(conn: &Connection, records: &[ScratchRecord]) -> Result<usize> {
    conn.execute_batch(CREATE_SCRATCH)?;
    let mut stmt = conn.prepare(
        "INSERT INTO temp.scratch_vacancies
         (vacancy_id, title_normalized, employer_id, employer_name_normalized, source,
          salary_from, salary_to, original_index, description, requirements, responsibilities)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    let mut count = 0;
    for r in records {
        count += stmt.execute(params![
            r.vacancy_id,
            r.title_normalized,
            r.employer_id,
            r.employer_name_normalized,
            r.source,
            r.salary_from,
            r.salary_to,
            r.original_index,
            r.description,
            r.requirements,
            r.responsibilities,
        ])?;
    }
    Ok(count)
}

/// `?start, ?start+1, ...`, or `NULL` for an empty list so `IN (NULL)`
/// matches nothing.
pub(crate) fn numbered_placeholders(start: usize, count: usize) -> String {
    if count == 0 {
        return "NULL".to_string();
    }
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn survivors_sql(hh_count: usize, sj_count: usize) -> String {
    let hh = numbered_placeholders(1, hh_count);
    let sj = numbered_placeholders(1 + hh_count, sj_count);
    format!(
        "WITH matched AS (
            SELECT vacancy_id,
                   original_index,
                   ROW_NUMBER() OVER (
                       PARTITION BY title_normalized, employer_name_normalized
                       ORDER BY original_index
                   ) AS row_num
            FROM temp.scratch_vacancies
            WHERE (source = 'hh' AND employer_id IN ({hh}))
               OR (source = 'sj' AND employer_id IN ({sj}))
               OR employer_id IN ({hh})
               OR employer_id IN ({sj})
        )
        SELECT vacancy_id FROM matched
        WHERE row_num = 1
        ORDER BY original_index"
    )
}

/// Ids of the earliest allowlisted record per (title, employer) group, in
/// input order.
pub fn select_survivors(conn: &Connection, registry: &Registry) -> Result<Vec<String>> {
    let hh_ids = registry.sorted_hh_ids();
    let sj_ids = registry.sorted_sj_ids();
    let sql = survivors_sql(hh_ids.len(), sj_ids.len());
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(hh_ids.iter().chain(sj_ids.iter())), |row| {
            row.get::<_, String>(0)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Employer, Salary, Source};
    use crate::registry::TargetCompany;

    fn registry(hh: &[&str], sj: &[&str]) -> Registry {
        let mut companies: Vec<TargetCompany> = hh
            .iter()
            .map(|id| TargetCompany::new(&format!("hh{}", id), Some(id), None))
            .collect();
        companies.extend(
            sj.iter()
                .map(|id| TargetCompany::new(&format!("sj{}", id), None, Some(id))),
        );
        Registry::from_companies(&companies)
    }

    fn staged(conn: &Connection, vacancies: &[Vacancy]) {
        let records = build_records(vacancies, &Segmenter::default());
        assert_eq!(stage(conn, &records).unwrap(), vacancies.len());
    }

    fn hh(id: &str, title: &str, employer: &str) -> Vacancy {
        Vacancy::new(id, title)
            .with_source(Source::Hh)
            .with_employer(Employer::from_parts(Some(employer), Some("Acme")))
    }

    #[test]
    fn placeholders() {
        assert_eq!(numbered_placeholders(1, 0), "NULL");
        assert_eq!(numbered_placeholders(3, 2), "?3, ?4");
    }

    #[test]
    fn record_for_unknown_employer() {
        let v = Vacancy::new("v1", "  Backend DEV ");
        let r = ScratchRecord::from_vacancy(4, &v, &Segmenter::default());
        assert_eq!(r.employer_id, None);
        assert_eq!(r.employer_name_normalized, "не указана");
        assert_eq!(r.title_normalized, "backend dev");
        assert_eq!(r.source, "unknown");
        assert_eq!(r.original_index, 4);
        assert_eq!(r.salary_from, None);
    }

    #[test]
    fn blank_employer_name_shares_placeholder_key() {
        let built = Vacancy::new("v1", "Dev").with_employer(Employer::Full {
            id: "1".into(),
            name: " ".into(),
        });
        let parsed = Vacancy::new("v2", "Dev").with_employer(Employer::from_parts(Some("1"), Some("")));
        assert_eq!(parsed.employer, Employer::IdOnly { id: "1".into() });

        let a = ScratchRecord::from_vacancy(0, &built, &Segmenter::default());
        let b = ScratchRecord::from_vacancy(1, &parsed, &Segmenter::default());
        assert_eq!(a.employer_name_normalized, "не указана");
        assert_eq!(a.employer_name_normalized, b.employer_name_normalized);
        assert_eq!(a.employer_id.as_deref(), Some("1"));
    }

    #[test]
    fn record_recomputes_sections_from_description() {
        let mut v = hh("v1", "Dev", "1")
            .with_description("<p><strong>Требования:</strong></p><p>Python 3.8+, Django</p>");
        v.requirements = Some("stale".into());
        v.responsibilities = Some("stale".into());
        v.salary = Salary::new(Some(10), Some(20), None);
        let r = ScratchRecord::from_vacancy(0, &v, &Segmenter::default());
        assert_eq!(r.requirements.as_deref(), Some("Python 3.8+, Django"));
        assert_eq!(r.responsibilities, None);
        assert_eq!((r.salary_from, r.salary_to), (Some(10), Some(20)));
        assert_eq!(r.employer_name_normalized, "acme");
    }

    #[test]
    fn survivors_follow_source_and_fallback() {
        let conn = Connection::open_in_memory().unwrap();
        let mut misfiled = hh("c", "Misfiled", "900");
        misfiled.source = Some(Source::Other("habr".into()));
        staged(
            &conn,
            &[
                hh("a", "Dev", "1"),
                hh("b", "Dev", "2"),
                misfiled,
                hh("d", "QA", "1"),
            ],
        );
        let ids = select_survivors(&conn, &registry(&["1"], &["900"])).unwrap();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn duplicate_group_keeps_lowest_index() {
        let conn = Connection::open_in_memory().unwrap();
        staged(
            &conn,
            &[
                hh("x", "Other", "1"),
                hh("a", "Backend Dev", "1"),
                hh("b", " backend dev ", "1"),
                hh("c", "Backend Dev", "1"),
            ],
        );
        let ids = select_survivors(&conn, &registry(&["1"], &[])).unwrap();
        assert_eq!(ids, vec!["x", "a"]);
    }

    #[test]
    fn empty_allowlist_matches_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        staged(&conn, &[hh("a", "Dev", "1"), Vacancy::new("b", "No employer")]);
        assert!(select_survivors(&conn, &Registry::default()).unwrap().is_empty());
    }

    #[test]
    fn injection_shaped_ids_are_bound() {
        let conn = Connection::open_in_memory().unwrap();
        staged(&conn, &[hh("a", "Dev", "1' OR '1'='1")]);
        let ids = select_survivors(&conn, &registry(&["1' OR '1'='1"], &[])).unwrap();
        assert_eq!(ids, vec!["a"]);
    }
}
