pub mod staging;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::db::ConnectionProvider;
use crate::error::Result;
use crate::model::Vacancy;
use crate::registry::Registry;
use crate::segment::Segmenter;
use crate::stats::{self, CompanyCount};

/// Allowlist filter plus (title, employer) deduplication over one batch.
pub struct FilterPipeline<P> {
    provider: P,
    registry: Arc<Registry>,
    segmenter: Segmenter,
}

impl<P: ConnectionProvider> FilterPipeline<P> {
    pub fn new(provider: P, registry: Arc<Registry>) -> Self {
        FilterPipeline {
            provider,
            registry,
            segmenter: Segmenter::default(),
        }
    }

    /// Earliest allowlisted vacancy per (title, employer), in input order.
    /// Failures are logged and yield an empty result.
    pub fn filter_and_deduplicate(&self, vacancies: &[Vacancy]) -> Vec<Vacancy> {
        if vacancies.is_empty() {
            return Vec::new();
        }
        info!(batch = vacancies.len(), "Filtering vacancies");
        match self.run(vacancies) {
            Ok(filtered) => {
                info!(
                    batch = vacancies.len(),
                    kept = filtered.len(),
                    "Filtering done"
                );
                filtered
            }
            Err(e) => {
                error!(batch = vacancies.len(), error = %e, "Vacancy filtering failed");
                Vec::new()
            }
        }
    }

    /// Vacancy counts per target company; empty on any failure.
    pub fn get_companies_vacancy_count(&self) -> Vec<CompanyCount> {
        stats::companies_vacancy_count(&self.provider, &self.registry)
    }

    fn run(&self, vacancies: &[Vacancy]) -> Result<Vec<Vacancy>> {
        let records = staging::build_records(vacancies, &self.segmenter);
        let survivors = self.provider.with_connection(|conn| {
            // Never committed: dropping `tx` rolls back and removes the temp table.
            let tx = conn.transaction()?;
            let staged = staging::stage(&tx, &records)?;
            debug!(staged, "Staged scratch records");
            let ids = staging::select_survivors(&tx, &self.registry)?;
            debug!(survivors = ids.len(), "Selected survivors");
            Ok(ids)
        })?;

        if survivors.is_empty() {
            self.warn_no_matches(vacancies.len());
            return Ok(Vec::new());
        }
        Ok(reconstruct(vacancies, &survivors))
    }

    fn warn_no_matches(&self, batch: usize) {
        if self.registry.is_empty() {
            warn!(batch, "Target company allowlist is empty, nothing can match");
        } else {
            warn!(
                batch,
                hh_ids = self.registry.hh_ids().len(),
                sj_ids = self.registry.sj_ids().len(),
                "No vacancies matched the target company allowlist"
            );
        }
    }
}

/// Map surviving ids back to the input vacancies; unknown ids are skipped.
fn reconstruct(vacancies: &[Vacancy], survivors: &[String]) -> Vec<Vacancy> {
    let by_id: HashMap<&str, &Vacancy> = vacancies.iter().map(|v| (v.id.as_str(), v)).collect();
    survivors
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|v| (*v).clone())
        .collect()
}
