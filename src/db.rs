use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::model::{Employer, Salary, Source, Vacancy};
use crate::normalize::normalize_text;
use crate::registry::{CompanySource, TargetCompany};

/// Hands out exclusive access to one connection for a unit of work.
pub trait ConnectionProvider {
    fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>;
}

impl<P: ConnectionProvider + ?Sized> ConnectionProvider for &P {
    fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        (**self).with_connection(work)
    }
}

impl<P: ConnectionProvider + ?Sized> ConnectionProvider for Arc<P> {
    fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        (**self).with_connection(work)
    }
}

/// One SQLite connection shared behind a mutex.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(connect(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Database {
            conn: Mutex::new(conn),
        }
    }
}

impl ConnectionProvider for Database {
    fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::Unavailable("connection mutex poisoned".into()))?;
        work(&mut conn)
    }
}

impl CompanySource for Database {
    fn all_companies(&self) -> Result<Vec<TargetCompany>> {
        self.with_connection(|conn| fetch_companies(conn))
    }
}

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Unavailable(format!("cannot create {:?}: {}", parent, e)))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS companies (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            hh_id       TEXT UNIQUE,
            sj_id       TEXT UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS vacancies (
            id               TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            title_normalized TEXT NOT NULL,
            url              TEXT,
            source           TEXT,
            employer_id      TEXT,
            employer_name    TEXT,
            company_id       INTEGER REFERENCES companies(id),
            salary_from      INTEGER,
            salary_to        INTEGER,
            salary_currency  TEXT,
            area             TEXT,
            experience       TEXT,
            employment       TEXT,
            description      TEXT,
            requirements     TEXT,
            responsibilities TEXT,
            published_at     TEXT,
            created_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_vacancies_company ON vacancies(company_id);
        CREATE INDEX IF NOT EXISTS idx_vacancies_title ON vacancies(title_normalized);
        ",
    )?;
    Ok(())
}

// ── Companies ──

/// Insert or refresh companies by name. Missing ids never erase stored ones.
pub fn seed_companies(conn: &Connection, companies: &[TargetCompany]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO companies (name, hh_id, sj_id, description)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                 hh_id = COALESCE(excluded.hh_id, companies.hh_id),
                 sj_id = COALESCE(excluded.sj_id, companies.sj_id),
                 description = COALESCE(excluded.description, companies.description)",
        )?;
        for c in companies {
            count += stmt.execute(params![c.name, c.hh_id, c.sj_id, c.description])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_companies(conn: &Connection) -> Result<Vec<TargetCompany>> {
    let mut stmt =
        conn.prepare("SELECT name, hh_id, sj_id, description FROM companies ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TargetCompany {
                name: row.get(0)?,
                hh_id: row.get(1)?,
                sj_id: row.get(2)?,
                description: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Vacancies ──

/// Upsert a batch in one transaction. `company_id` is resolved from the
/// employer id, preferring the vacancy's own source namespace.
pub fn save_vacancies(conn: &Connection, vacancies: &[Vacancy]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO vacancies
             (id, title, title_normalized, url, source, employer_id, employer_name, company_id,
              salary_from, salary_to, salary_currency, area, experience, employment,
              description, requirements, responsibilities, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                     (SELECT id FROM companies
                      WHERE ?6 IS NOT NULL AND (hh_id = ?6 OR sj_id = ?6)
                      ORDER BY CASE
                          WHEN (?5 = 'hh' AND hh_id = ?6) OR (?5 = 'sj' AND sj_id = ?6) THEN 0
                          ELSE 1
                      END
                      LIMIT 1),
                     ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )?;
        for v in vacancies {
            let salary = v.salary.as_ref();
            count += stmt.execute(params![
                v.id,
                v.title,
                normalize_text(&v.title),
                v.url,
                v.source.as_ref().map(|s| s.as_tag().to_string()),
                v.employer.id(),
                v.employer.name(),
                salary.and_then(|s| s.from),
                salary.and_then(|s| s.to),
                salary.and_then(|s| s.currency.clone()),
                v.area,
                v.experience,
                v.employment,
                v.description,
                v.requirements,
                v.responsibilities,
                v.published_at.map(|d| d.to_rfc3339()),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

const VACANCY_COLUMNS: &str = "id, title, url, source, employer_id, employer_name,
    salary_from, salary_to, salary_currency, area, experience, employment,
    description, requirements, responsibilities, published_at";

fn row_to_vacancy(row: &Row) -> rusqlite::Result<Vacancy> {
    let source: Option<String> = row.get(3)?;
    let employer_id: Option<String> = row.get(4)?;
    let employer_name: Option<String> = row.get(5)?;
    let published: Option<String> = row.get(15)?;
    Ok(Vacancy {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        source: source.as_deref().map(Source::from_tag),
        employer: Employer::from_parts(employer_id.as_deref(), employer_name.as_deref()),
        salary: Salary::new(row.get(6)?, row.get(7)?, row.get(8)?),
        area: row.get(9)?,
        experience: row.get(10)?,
        employment: row.get(11)?,
        description: row.get(12)?,
        requirements: row.get(13)?,
        responsibilities: row.get(14)?,
        published_at: published
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
    })
}

pub fn count_vacancies(conn: &Connection) -> Result<usize> {
    let n: usize = conn.query_row("SELECT COUNT(*) FROM vacancies", [], |r| r.get(0))?;
    Ok(n)
}

pub fn fetch_all(conn: &Connection) -> Result<Vec<Vacancy>> {
    let sql = format!(
        "SELECT {} FROM vacancies ORDER BY COALESCE(employer_name, ''), title",
        VACANCY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_vacancy)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Case-insensitive substring match on the title (Unicode-aware via the
/// pre-lowered `title_normalized` column).
pub fn search_by_keyword(conn: &Connection, keyword: &str) -> Result<Vec<Vacancy>> {
    let needle = normalize_text(keyword);
    if needle.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{}%", escape_like(&needle));
    let sql = format!(
        "SELECT {} FROM vacancies
         WHERE title_normalized LIKE ?1 ESCAPE '\\'
         ORDER BY COALESCE(employer_name, ''), title",
        VACANCY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([pattern], row_to_vacancy)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

const SALARY_MIDPOINT: &str = "CASE
        WHEN salary_from IS NOT NULL AND salary_to IS NOT NULL THEN (salary_from + salary_to) / 2.0
        WHEN salary_from IS NOT NULL THEN salary_from
        ELSE salary_to
    END";

const RUBLE_ONLY: &str = "(salary_currency IS NULL
        OR UPPER(salary_currency) IN ('RUR', 'RUB')
        OR salary_currency = 'руб.')";

/// Mean salary midpoint over ruble (or unspecified currency) vacancies.
pub fn average_salary(conn: &Connection) -> Result<Option<f64>> {
    let sql = format!(
        "SELECT AVG({}) FROM vacancies
         WHERE (salary_from IS NOT NULL OR salary_to IS NOT NULL) AND {}",
        SALARY_MIDPOINT, RUBLE_ONLY
    );
    let avg: Option<f64> = conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(avg)
}

pub fn vacancies_above_average(conn: &Connection) -> Result<Vec<Vacancy>> {
    let Some(avg) = average_salary(conn)? else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "SELECT {cols} FROM vacancies
         WHERE {mid} > ?1 AND {rub}
         ORDER BY {mid} DESC, COALESCE(employer_name, ''), title",
        cols = VACANCY_COLUMNS,
        mid = SALARY_MIDPOINT,
        rub = RUBLE_ONLY
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([avg], row_to_vacancy)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Vacancies with a salary range reaching `min` and starting at or below
/// `max`, best paid first. `limit` keeps the top N.
pub fn fetch_by_salary(
    conn: &Connection,
    min: Option<i64>,
    max: Option<i64>,
    limit: Option<usize>,
) -> Result<Vec<Vacancy>> {
    let mut conditions = vec!["(salary_from IS NOT NULL OR salary_to IS NOT NULL)".to_string()];
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(min) = min {
        let n = params.len() + 1;
        conditions.push(format!("(salary_from >= ?{n} OR salary_to >= ?{n})"));
        params.push(Box::new(min));
    }
    if let Some(max) = max {
        let n = params.len() + 1;
        conditions.push(format!("(salary_from <= ?{n} OR salary_to <= ?{n})"));
        params.push(Box::new(max));
    }
    let limit_clause = match limit {
        Some(limit) => {
            params.push(Box::new(limit as i64));
            format!(" LIMIT ?{}", params.len())
        }
        None => String::new(),
    };

    let sql = format!(
        "SELECT {} FROM vacancies
         WHERE {}
         ORDER BY {} DESC, COALESCE(employer_name, ''), title{}",
        VACANCY_COLUMNS,
        conditions.join(" AND "),
        SALARY_MIDPOINT,
        limit_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), row_to_vacancy)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM vacancies", [])?)
}

pub fn delete_by_id(conn: &Connection, id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM vacancies WHERE id = ?1", [id.trim()])?)
}

/// Same title matching as [`search_by_keyword`]. A blank keyword deletes nothing.
pub fn delete_by_keyword(conn: &Connection, keyword: &str) -> Result<usize> {
    let needle = normalize_text(keyword);
    if needle.is_empty() {
        return Ok(0);
    }
    let pattern = format!("%{}%", escape_like(&needle));
    Ok(conn.execute(
        "DELETE FROM vacancies WHERE title_normalized LIKE ?1 ESCAPE '\\'",
        [pattern],
    )?)
}
