use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCompany {
    pub name: String,
    #[serde(default)]
    pub hh_id: Option<String>,
    #[serde(default)]
    pub sj_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TargetCompany {
    pub fn new(name: &str, hh_id: Option<&str>, sj_id: Option<&str>) -> Self {
        TargetCompany {
            name: name.to_string(),
            hh_id: hh_id.map(String::from),
            sj_id: sj_id.map(String::from),
            description: None,
        }
    }
}

/// Anything that can list the allowlisted companies.
pub trait CompanySource {
    fn all_companies(&self) -> Result<Vec<TargetCompany>>;
}

impl CompanySource for Vec<TargetCompany> {
    fn all_companies(&self) -> Result<Vec<TargetCompany>> {
        Ok(self.clone())
    }
}

/// Built-in allowlist (HeadHunter employer ids).
pub fn builtin_companies() -> Vec<TargetCompany> {
    [
        ("Яндекс", "1740", "Поисковая система и интернет-сервисы"),
        ("Тинькофф", "78638", "Банк и экосистема финансовых сервисов"),
        ("СБЕР", "3529", "Банк и финтех-экосистема"),
        ("Wildberries", "64174", "Интернет-ритейлер"),
        ("OZON", "2180", "E-commerce площадка"),
        ("VK", "15478", "Социальные сети и интернет-сервисы"),
        ("Kaspersky", "1057", "Информационная безопасность"),
        ("Авито", "84585", "Сервис объявлений"),
        ("X5 Retail Group", "4934", "Продуктовая розничная сеть"),
        ("Ростелеком", "2748", "Телекоммуникации"),
        ("Альфа-Банк", "80", "Банк"),
        ("JetBrains", "1122", "Инструменты разработки"),
        ("2GIS", "64356", "Справочно-навигационные сервисы"),
        ("Skyeng", "1201321", "Онлайн-образование"),
        ("Delivery Club", "633442", "Доставка еды"),
    ]
    .into_iter()
    .map(|(name, hh_id, description)| TargetCompany {
        name: name.to_string(),
        hh_id: Some(hh_id.to_string()),
        sj_id: None,
        description: Some(description.to_string()),
    })
    .collect()
}

/// Per-source id sets, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    hh_ids: HashSet<String>,
    sj_ids: HashSet<String>,
}

impl Registry {
    /// Load once from `source`. Retrieval failures propagate.
    pub fn load<S: CompanySource + ?Sized>(source: &S) -> Result<Self> {
        let companies = source.all_companies()?;
        let registry = Self::from_companies(&companies);
        info!(
            hh_ids = registry.hh_ids.len(),
            sj_ids = registry.sj_ids.len(),
            "Loaded target company registry"
        );
        Ok(registry)
    }

    pub fn from_companies(companies: &[TargetCompany]) -> Self {
        Registry {
            hh_ids: id_set(companies.iter().map(|c| c.hh_id.as_deref())),
            sj_ids: id_set(companies.iter().map(|c| c.sj_id.as_deref())),
        }
    }

    pub fn hh_ids(&self) -> &HashSet<String> {
        &self.hh_ids
    }

    pub fn sj_ids(&self) -> &HashSet<String> {
        &self.sj_ids
    }

    pub fn is_empty(&self) -> bool {
        self.hh_ids.is_empty() && self.sj_ids.is_empty()
    }

    /// Union of both id sets, sorted for stable parameter binding.
    pub fn all_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .hh_ids
            .union(&self.sj_ids)
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn sorted_hh_ids(&self) -> Vec<&str> {
        sorted(&self.hh_ids)
    }

    pub fn sorted_sj_ids(&self) -> Vec<&str> {
        sorted(&self.sj_ids)
    }
}

fn id_set<'a>(ids: impl Iterator<Item = Option<&'a str>>) -> HashSet<String> {
    ids.flatten()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

fn sorted(set: &HashSet<String>) -> Vec<&str> {
    let mut ids: Vec<&str> = set.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Unreachable;

    impl CompanySource for Unreachable {
        fn all_companies(&self) -> Result<Vec<TargetCompany>> {
            Err(Error::Unavailable("companies table offline".into()))
        }
    }

    #[test]
    fn splits_ids_per_source() {
        let companies = vec![
            TargetCompany::new("Both", Some("1"), Some("100")),
            TargetCompany::new("HH only", Some("2"), None),
            TargetCompany::new("SJ only", None, Some("200")),
            TargetCompany::new("Blank", Some("  "), Some("")),
        ];
        let r = Registry::load(&companies).unwrap();
        assert_eq!(r.sorted_hh_ids(), vec!["1", "2"]);
        assert_eq!(r.sorted_sj_ids(), vec!["100", "200"]);
        assert_eq!(r.all_ids(), vec!["1", "100", "2", "200"]);
    }

    #[test]
    fn empty_source_gives_empty_registry() {
        let r = Registry::load(&Vec::<TargetCompany>::new()).unwrap();
        assert!(r.is_empty());
        assert!(r.all_ids().is_empty());
    }

    #[test]
    fn load_failure_propagates() {
        assert!(matches!(Registry::load(&Unreachable), Err(Error::Unavailable(_))));
    }

    #[test]
    fn builtin_list_is_hh_only() {
        let r = Registry::from_companies(&builtin_companies());
        assert_eq!(r.hh_ids().len(), 15);
        assert!(r.hh_ids().contains("1740"));
        assert!(r.sj_ids().is_empty());
    }
}
