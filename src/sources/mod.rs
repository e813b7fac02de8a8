//! Job-board adapters: JSON parsers and paginated async clients.

pub mod hh;
pub mod sj;

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::model::Vacancy;
use crate::normalize::{is_truthy, render};
use crate::registry::Registry;

pub use hh::HhClient;
pub use sj::SjClient;

const USER_AGENT: &str = concat!("vacancy_aggregator/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Rendered id, `None` for falsy values.
pub(crate) fn id_of(value: Option<&Value>) -> Option<String> {
    value
        .filter(|v| is_truthy(v))
        .map(render)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn text_of(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Fetch every allowlisted employer from each enabled board. A failing
/// employer is logged and skipped.
pub async fn fetch_for_registry(
    registry: &Registry,
    hh: &HhClient,
    sj: Option<&SjClient>,
    query: Option<&str>,
) -> Vec<Vacancy> {
    let hh_ids = registry.sorted_hh_ids();
    let sj_ids = if sj.is_some() {
        registry.sorted_sj_ids()
    } else {
        Vec::new()
    };

    let pb = progress_bar(hh_ids.len() + sj_ids.len());
    let mut out = Vec::new();

    for id in hh_ids {
        pb.set_message(format!("hh:{}", id));
        match hh.fetch_employer(id, query).await {
            Ok(found) => out.extend(found),
            Err(e) => warn!(employer = id, error = %e, "HeadHunter fetch failed"),
        }
        pb.inc(1);
    }
    if let Some(sj) = sj {
        for id in sj_ids {
            pb.set_message(format!("sj:{}", id));
            match sj.fetch_employer(id, query).await {
                Ok(found) => out.extend(found),
                Err(e) => warn!(employer = id, error = %e, "SuperJob fetch failed"),
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_render_numbers_and_skip_falsy() {
        assert_eq!(id_of(Some(&json!(123))).as_deref(), Some("123"));
        assert_eq!(id_of(Some(&json!(" 7 "))).as_deref(), Some("7"));
        assert_eq!(id_of(Some(&json!(0))), None);
        assert_eq!(id_of(Some(&json!(""))), None);
        assert_eq!(id_of(None), None);
    }
}
