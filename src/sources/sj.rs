//! SuperJob (`api.superjob.ru`). Requires an app key.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use super::{http_client, id_of, text_of};
use crate::config::SjSettings;
use crate::error::{Error, Result};
use crate::model::{Employer, Salary, Source, Vacancy};
use crate::normalize::{normalize_area, normalize_employer, normalize_employment, normalize_experience};
use crate::segment::fill_missing_sections;

const API_KEY_HEADER: &str = "X-Api-App-Id";

/// `0` means "not specified" for both bounds.
fn payment(item: &Value, key: &str) -> Option<i64> {
    item.get(key).and_then(Value::as_i64).filter(|p| *p > 0)
}

fn employer(item: &Value) -> Employer {
    let client = item.get("client");
    let id = id_of(client.and_then(|c| c.get("id"))).or_else(|| id_of(item.get("id_client")));
    let name = client
        .and_then(|c| c.get("title"))
        .and_then(normalize_employer)
        .or_else(|| item.get("firm_name").and_then(normalize_employer));
    Employer::from_parts(id.as_deref(), name.as_deref())
}

pub fn parse_vacancy(item: &Value) -> Option<Vacancy> {
    let id = id_of(item.get("id"))?;
    let title = text_of(item.get("profession"))?;

    let mut vacancy = Vacancy::new(id, title)
        .with_source(Source::Sj)
        .with_employer(employer(item));
    vacancy.url = text_of(item.get("link"));
    vacancy.salary = Salary::new(
        payment(item, "payment_from"),
        payment(item, "payment_to"),
        text_of(item.get("currency")),
    );
    vacancy.area = item.get("town").and_then(normalize_area);
    vacancy.experience = item.get("experience").and_then(normalize_experience);
    vacancy.employment = item.get("type_of_work").and_then(normalize_employment);
    vacancy.requirements = text_of(item.get("candidat"));
    vacancy.responsibilities = text_of(item.get("work"));
    vacancy.description = text_of(item.get("vacancyRichText"));
    vacancy.published_at = item
        .get("date_published")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    fill_missing_sections(&mut vacancy);
    Some(vacancy)
}

/// Parsed vacancies plus whether another page exists.
pub fn parse_page(body: &Value) -> (bool, Vec<Vacancy>) {
    let items = body
        .get("objects")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let more = body.get("more").and_then(Value::as_bool).unwrap_or(false);
    (more && !items.is_empty(), items.iter().filter_map(parse_vacancy).collect())
}

pub struct SjClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    per_page: u32,
    max_pages: u32,
}

impl SjClient {
    pub fn new(settings: &SjSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Unavailable("SuperJob API key is not configured".into()))?;
        Ok(SjClient {
            http: http_client()?,
            base_url: settings.base_url.clone(),
            api_key: api_key.to_string(),
            per_page: settings.per_page,
            max_pages: settings.max_pages,
        })
    }

    pub fn page_params(
        &self,
        client_id: &str,
        query: Option<&str>,
        page: u32,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("id_client", client_id.to_string()),
            ("count", self.per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            params.push(("keyword", q.to_string()));
        }
        params
    }

    pub async fn fetch_employer(&self, client_id: &str, query: Option<&str>) -> Result<Vec<Vacancy>> {
        let mut out = Vec::new();
        for page in 0..self.max_pages {
            let body: Value = self
                .http
                .get(&self.base_url)
                .header(API_KEY_HEADER, &self.api_key)
                .query(&self.page_params(client_id, query, page))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let (more, parsed) = parse_page(&body);
            debug!(employer = client_id, page, parsed = parsed.len(), more, "SuperJob page");
            out.extend(parsed);
            if !more {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;

    fn item() -> Value {
        json!({
            "id": 46281057,
            "profession": "Frontend-разработчик",
            "link": "https://www.superjob.ru/vakansii/46281057.html",
            "client": {"id": 0, "title": ""},
            "id_client": 900,
            "firm_name": "Acme",
            "payment_from": 0,
            "payment_to": 180000,
            "currency": "rub",
            "town": {"id": 4, "title": "Москва"},
            "experience": {"id": 2, "title": "От 1 года"},
            "type_of_work": {"id": 6, "title": "Полный рабочий день"},
            "candidat": "Опыт работы с React от 2 лет",
            "work": "",
            "vacancyRichText": "<p><b>Обязанности:</b></p><p>Разработка интерфейсов</p>",
            "date_published": 1709280000
        })
    }

    #[test]
    fn parses_item_with_fallbacks() {
        let v = parse_vacancy(&item()).unwrap();
        assert_eq!(v.id, "46281057");
        assert_eq!(v.source, Some(Source::Sj));
        assert_eq!(
            v.employer,
            Employer::Full {
                id: "900".into(),
                name: "Acme".into()
            }
        );
        assert_eq!(v.salary, Salary::new(None, Some(180000), Some("rub".into())));
        assert_eq!(v.area.as_deref(), Some("Москва"));
        assert_eq!(v.employment.as_deref(), Some("Полный рабочий день"));
        assert_eq!(v.requirements.as_deref(), Some("Опыт работы с React от 2 лет"));
        assert_eq!(v.responsibilities.as_deref(), Some("Разработка интерфейсов"));
        assert_eq!(
            v.published_at.map(|d| d.to_rfc3339()).as_deref(),
            Some("2024-03-01T08:00:00+00:00")
        );
    }

    #[test]
    fn client_block_wins_when_present() {
        let mut raw = item();
        raw["client"] = json!({"id": 77, "title": "Globex"});
        let v = parse_vacancy(&raw).unwrap();
        assert_eq!(v.employer.id(), Some("77"));
        assert_eq!(v.employer.name(), Some("Globex"));
    }

    #[test]
    fn zero_payments_mean_no_salary() {
        let mut raw = item();
        raw["payment_to"] = json!(0);
        assert_eq!(parse_vacancy(&raw).unwrap().salary, None);
    }

    #[test]
    fn page_more_flag() {
        let (more, parsed) = parse_page(&json!({"objects": [item()], "more": true}));
        assert!(more);
        assert_eq!(parsed.len(), 1);
        assert!(!parse_page(&json!({"objects": [], "more": true})).0);
    }

    #[test]
    fn client_requires_key() {
        let settings = Settings::from_toml("").unwrap();
        assert!(matches!(SjClient::new(&settings.sj), Err(Error::Unavailable(_))));

        let settings = Settings::from_toml("[sj]\napi_key = \"k\"").unwrap();
        let client = SjClient::new(&settings.sj).unwrap();
        assert_eq!(
            client.page_params("900", None, 1),
            vec![
                ("id_client", "900".to_string()),
                ("count", "100".to_string()),
                ("page", "1".to_string()),
            ]
        );
    }
}
