//! HeadHunter (`api.hh.ru`).

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use super::{http_client, id_of, text_of};
use crate::config::HhSettings;
use crate::error::Result;
use crate::model::{Employer, Salary, Source, Vacancy};
use crate::normalize::{normalize_area, normalize_employment, normalize_experience};
use crate::segment::{clean_html, fill_missing_sections};

const PUBLISHED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, PUBLISHED_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Snippets carry `<highlighttext>` markup.
fn snippet(item: &Value, key: &str) -> Option<String> {
    text_of(item.get("snippet").and_then(|s| s.get(key)))
        .map(|s| clean_html(&s))
        .filter(|s| !s.is_empty())
}

fn salary(item: &Value) -> Option<Salary> {
    let s = item.get("salary")?;
    Salary::new(
        s.get("from").and_then(Value::as_i64),
        s.get("to").and_then(Value::as_i64),
        text_of(s.get("currency")),
    )
}

/// One `items[]` entry. Records without an id or a title are skipped.
pub fn parse_vacancy(item: &Value) -> Option<Vacancy> {
    let id = id_of(item.get("id"))?;
    let title = text_of(item.get("name"))?;

    let mut vacancy = Vacancy::new(id, title)
        .with_source(Source::Hh)
        .with_employer(item.get("employer").map(Employer::from_value).unwrap_or_default());
    vacancy.url = text_of(item.get("alternate_url"));
    vacancy.salary = salary(item);
    vacancy.area = item.get("area").and_then(normalize_area);
    vacancy.experience = item.get("experience").and_then(normalize_experience);
    vacancy.employment = item.get("employment").and_then(normalize_employment);
    vacancy.requirements = snippet(item, "requirement");
    vacancy.responsibilities = snippet(item, "responsibility");
    vacancy.description = text_of(item.get("description"));
    vacancy.published_at = text_of(item.get("published_at")).and_then(|s| parse_published(&s));

    fill_missing_sections(&mut vacancy);
    Some(vacancy)
}

/// Parsed vacancies plus the raw item count (for pagination).
pub fn parse_page(body: &Value) -> (usize, Vec<Vacancy>) {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    (items.len(), items.iter().filter_map(parse_vacancy).collect())
}

pub struct HhClient {
    http: reqwest::Client,
    base_url: String,
    per_page: u32,
    max_pages: u32,
}

impl HhClient {
    pub fn new(settings: &HhSettings) -> Result<Self> {
        Ok(HhClient {
            http: http_client()?,
            base_url: settings.base_url.clone(),
            per_page: settings.per_page,
            max_pages: settings.max_pages,
        })
    }

    pub fn page_params(
        &self,
        employer_id: &str,
        query: Option<&str>,
        page: u32,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("employer_id", employer_id.to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            params.push(("text", q.to_string()));
        }
        params
    }

    pub async fn fetch_employer(&self, employer_id: &str, query: Option<&str>) -> Result<Vec<Vacancy>> {
        let mut out = Vec::new();
        for page in 0..self.max_pages {
            let body: Value = self
                .http
                .get(&self.base_url)
                .query(&self.page_params(employer_id, query, page))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let (raw, parsed) = parse_page(&body);
            debug!(employer = employer_id, page, raw, parsed = parsed.len(), "HeadHunter page");
            out.extend(parsed);

            let last_page = body
                .get("pages")
                .and_then(Value::as_u64)
                .is_some_and(|pages| u64::from(page) + 1 >= pages);
            if raw < self.per_page as usize || last_page {
                break;
            }
        }
        Ok(out)
    }
}
