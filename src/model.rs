use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::normalize::{is_truthy, normalize_employer, render};

/// Marker used for vacancies whose employer has no usable name.
pub const EMPLOYER_PLACEHOLDER: &str = "Не указана";

/// Job board a vacancy came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Hh,
    Sj,
    Other(String),
}

impl Source {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "hh" | "hh.ru" | "headhunter" => Source::Hh,
            "sj" | "superjob" | "superjob.ru" => Source::Sj,
            _ => Source::Other(tag.trim().to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Source::Hh => "hh",
            Source::Sj => "sj",
            Source::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Source::from_tag(&tag))
    }
}

/// Employer shape, decided once when a vacancy is built.
///
/// Serialized as `null`, `{"id"}`, `{"name"}` or `{"id", "name"}`. Any JSON
/// shape is accepted on input, see [`Employer::from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Employer {
    #[default]
    Unknown,
    IdOnly { id: String },
    NameOnly { name: String },
    Full { id: String, name: String },
}

impl Employer {
    /// Build from optional parts, dropping blank ones.
    pub fn from_parts(id: Option<&str>, name: Option<&str>) -> Self {
        let id = id.map(str::trim).filter(|s| !s.is_empty());
        let name = name.map(str::trim).filter(|s| !s.is_empty());
        match (id, name) {
            (Some(id), Some(name)) => Employer::Full {
                id: id.to_string(),
                name: name.to_string(),
            },
            (Some(id), None) => Employer::IdOnly { id: id.to_string() },
            (None, Some(name)) => Employer::NameOnly {
                name: name.to_string(),
            },
            (None, None) => Employer::Unknown,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Employer::IdOnly { id } | Employer::Full { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Employer::NameOnly { name } | Employer::Full { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Object (`id` plus a name-like key), bare name, bare numeric id or null.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let id = map
                    .get("id")
                    .filter(|v| is_truthy(v))
                    .map(render);
                let name = ["name", "title", "firm_name"]
                    .iter()
                    .filter_map(|k| map.get(*k))
                    .find_map(normalize_employer);
                Employer::from_parts(id.as_deref(), name.as_deref())
            }
            Value::Number(_) if is_truthy(value) => Employer::from_parts(Some(&render(value)), None),
            other => Employer::from_parts(None, normalize_employer(other).as_deref()),
        }
    }

    /// Name for display, falling back to the placeholder.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(EMPLOYER_PLACEHOLDER)
    }
}

#[derive(Serialize)]
struct EmployerRepr<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl Serialize for Employer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Employer::Unknown => serializer.serialize_none(),
            other => EmployerRepr {
                id: other.id(),
                name: other.name(),
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Employer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Employer::from_value(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Salary {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub currency: Option<String>,
}

impl Salary {
    /// `None` when neither bound is set.
    pub fn new(from: Option<i64>, to: Option<i64>, currency: Option<String>) -> Option<Self> {
        if from.is_none() && to.is_none() {
            return None;
        }
        Some(Salary { from, to, currency })
    }
}

impl fmt::Display for Salary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cur = self.currency.as_deref().unwrap_or("RUR");
        match (self.from, self.to) {
            (Some(a), Some(b)) => write!(f, "{} - {} {}", a, b, cur),
            (Some(a), None) => write!(f, "от {} {}", a, cur),
            (None, Some(b)) => write!(f, "до {} {}", b, cur),
            (None, None) => f.write_str("Не указана"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vacancy {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub employer: Employer,
    #[serde(default)]
    pub salary: Option<Salary>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub responsibilities: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub employment: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Vacancy {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Vacancy {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_employer(mut self, employer: Employer) -> Self {
        self.employer = employer;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Parse a JSON array of vacancies.
pub fn parse_batch(json: &str) -> crate::error::Result<Vec<Vacancy>> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tags() {
        assert_eq!(Source::from_tag("hh"), Source::Hh);
        assert_eq!(Source::from_tag("hh.ru"), Source::Hh);
        assert_eq!(Source::from_tag("SuperJob.ru"), Source::Sj);
        assert_eq!(Source::from_tag("habr"), Source::Other("habr".into()));
        assert_eq!(Source::Sj.as_tag(), "sj");
    }

    #[test]
    fn employer_from_parts() {
        assert_eq!(Employer::from_parts(None, None), Employer::Unknown);
        assert_eq!(Employer::from_parts(Some(" "), Some("")), Employer::Unknown);
        assert_eq!(
            Employer::from_parts(Some("1740"), None),
            Employer::IdOnly { id: "1740".into() }
        );
        let full = Employer::from_parts(Some("1740"), Some(" Яндекс "));
        assert_eq!(full.id(), Some("1740"));
        assert_eq!(full.name(), Some("Яндекс"));
    }

    #[test]
    fn employer_display_falls_back() {
        assert_eq!(Employer::Unknown.display_name(), EMPLOYER_PLACEHOLDER);
        assert_eq!(Employer::IdOnly { id: "1".into() }.display_name(), EMPLOYER_PLACEHOLDER);
    }

    #[test]
    fn salary_display() {
        let s = Salary::new(Some(100), Some(200), None).unwrap();
        assert_eq!(s.to_string(), "100 - 200 RUR");
        assert_eq!(Salary::new(None, Some(90), Some("USD".into())).unwrap().to_string(), "до 90 USD");
        assert!(Salary::new(None, None, None).is_none());
    }

    #[test]
    fn employer_accepts_loose_json_shapes() {
        let batch = parse_batch(
            r#"[
                {"id": "a", "title": "Dev", "employer": null},
                {"id": "b", "title": "Dev", "employer": " Acme "},
                {"id": "c", "title": "Dev", "employer": {"id": "123", "name": "Acme"}},
                {"id": "d", "title": "Dev", "employer": {"id": 42}},
                {"id": "e", "title": "Dev", "employer": {"firm_name": "Globex", "id": 0}},
                {"id": "f", "title": "Dev", "employer": 7},
                {"id": "g", "title": "Dev", "employer": {"id": "1", "name": ""}},
                {"id": "h", "title": "Dev"}
            ]"#,
        )
        .unwrap();
        let employers: Vec<Employer> = batch.into_iter().map(|v| v.employer).collect();
        assert_eq!(
            employers,
            vec![
                Employer::Unknown,
                Employer::NameOnly { name: "Acme".into() },
                Employer::Full {
                    id: "123".into(),
                    name: "Acme".into()
                },
                Employer::IdOnly { id: "42".into() },
                Employer::NameOnly {
                    name: "Globex".into()
                },
                Employer::IdOnly { id: "7".into() },
                Employer::IdOnly { id: "1".into() },
                Employer::Unknown,
            ]
        );
    }

    #[test]
    fn employer_serializes_to_plain_shape() {
        let full = Employer::from_parts(Some("123"), Some("Acme"));
        assert_eq!(
            serde_json::to_value(&full).unwrap(),
            serde_json::json!({"id": "123", "name": "Acme"})
        );
        let id_only = Employer::from_parts(Some("9"), None);
        assert_eq!(serde_json::to_value(&id_only).unwrap(), serde_json::json!({"id": "9"}));
        assert_eq!(serde_json::to_value(&Employer::Unknown).unwrap(), Value::Null);

        for e in [full, id_only, Employer::Unknown, Employer::from_parts(None, Some("Acme"))] {
            let back: Employer = serde_json::from_value(serde_json::to_value(&e).unwrap()).unwrap();
            assert_eq!(back, e);
        }
    }

    #[test]
    fn malformed_batch_is_json_error() {
        assert!(matches!(
            parse_batch("{not json"),
            Err(crate::error::Error::Json(_))
        ));
    }

    #[test]
    fn vacancy_json_roundtrip_keeps_source_tag() {
        let v = Vacancy::new("v1", "Backend Dev")
            .with_source(Source::Hh)
            .with_employer(Employer::from_parts(Some("123"), Some("Acme")));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["source"], "hh");
        let back: Vacancy = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }
}
