//! Test specifications and the YAML payload format they carry.
//!
//! A payload looks like:
//!
//! ```yaml
//! wordLists:
//!   filePaths:
//!     - "' OR 1=1 --"
//!     - admin
//! validate:
//!   response_code:
//!     gte: 200
//!     lt: 300
//!   response_payload:
//!     length:
//!       gt: 10
//!     contains_all: ["id"]
//!     contains_either: ["admin", "root"]
//! ```

use crate::error::SpecificationError;
use serde::{Deserialize, Serialize};

/// Bucket a specification's verdicts are folded into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestCategory {
    SqlInjection,
    Bola,
    Custom(String),
}

impl TestCategory {
    /// Resolve a category from a specification name.
    ///
    /// Names are compared after folding case and collapsing anything that is
    /// not alphanumeric into `_`, so "SQL Injection", "sql-injection" and
    /// "SQL Injection (login form)" all land in [`TestCategory::SqlInjection`].
    pub fn from_name(name: &str) -> Self {
        let slug = slugify(name);

        if is_family(&slug, &["sql_injection", "sqli"]) {
            TestCategory::SqlInjection
        } else if is_family(&slug, &["bola", "broken_object_level_authorization"]) {
            TestCategory::Bola
        } else {
            TestCategory::Custom(slug)
        }
    }

    /// Whether the key can sit next to `endpoint` in a flattened result row.
    /// Empty keys and field names of that row are not.
    pub fn is_usable(&self) -> bool {
        let key = self.key();
        !key.is_empty() && !RESERVED_KEYS.contains(&key)
    }

    /// Key used in verdict maps and JSON output.
    pub fn key(&self) -> &str {
        match self {
            TestCategory::SqlInjection => "sqli",
            TestCategory::Bola => "bola",
            TestCategory::Custom(key) => key,
        }
    }
}

impl Serialize for TestCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

const RESERVED_KEYS: &[&str] = &["endpoint"];

fn is_family(slug: &str, stems: &[&str]) -> bool {
    stems.iter().any(|stem| {
        slug == *stem
            || slug
                .strip_prefix(stem)
                .is_some_and(|rest| rest.starts_with('_'))
    })
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// A stored, named test payload.
#[derive(Debug, Clone, Serialize)]
pub struct TestSpecification {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub payload: String,
    pub category: TestCategory,
}

impl TestSpecification {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        description: Option<String>,
        payload: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let category = TestCategory::from_name(&name);
        Self {
            id,
            name,
            description,
            payload: payload.into(),
            category,
        }
    }

    pub fn plan(&self) -> Result<TestPlan, SpecificationError> {
        TestPlan::parse(&self.payload)
    }
}

/// Half-open status range `gte <= status < lt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRange {
    #[serde(default)]
    pub gte: Option<i64>,
    #[serde(default)]
    pub lt: Option<i64>,
}

/// Bounds on the body length, counted in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    #[serde(default)]
    pub gt: Option<i64>,
    #[serde(default)]
    pub lt: Option<i64>,
    #[serde(default)]
    pub eq: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BodyAssertions {
    pub length: Option<LengthBounds>,
    pub contains_all: Option<Vec<String>>,
    pub contains_either: Option<Vec<String>>,
}

/// Decoded form of a [`TestSpecification`] payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestPlan {
    pub word_list: Vec<String>,
    pub response_code: Option<CodeRange>,
    pub response_payload: Option<BodyAssertions>,
}

impl TestPlan {
    pub fn parse(payload: &str) -> Result<Self, SpecificationError> {
        if payload.trim().is_empty() {
            return Err(SpecificationError::Empty);
        }

        let raw: RawPayload = serde_yaml::from_str(payload)?;

        let response_code = raw.validate.as_ref().and_then(|v| v.response_code);
        if let Some(CodeRange {
            gte: Some(gte),
            lt: Some(lt),
        }) = response_code
            && gte >= lt
        {
            return Err(SpecificationError::EmptyCodeRange { gte, lt });
        }

        let response_payload = raw
            .validate
            .and_then(|v| v.response_payload)
            .map(|body| BodyAssertions {
                length: body.length,
                contains_all: body.contains_all.map(OneOrMany::into_vec),
                contains_either: body.contains_either.map(OneOrMany::into_vec),
            });

        Ok(TestPlan {
            word_list: raw
                .word_lists
                .and_then(|w| w.file_paths)
                .unwrap_or_default(),
            response_code,
            response_payload,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(rename = "wordLists", default)]
    word_lists: Option<RawWordLists>,
    #[serde(default)]
    validate: Option<RawValidate>,
}

#[derive(Debug, Deserialize)]
struct RawWordLists {
    #[serde(rename = "filePaths", default)]
    file_paths: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawValidate {
    #[serde(default)]
    response_code: Option<CodeRange>,
    #[serde(default)]
    response_payload: Option<RawBodyAssertions>,
}

#[derive(Debug, Deserialize)]
struct RawBodyAssertions {
    #[serde(default)]
    length: Option<LengthBounds>,
    #[serde(default)]
    contains_all: Option<OneOrMany>,
    #[serde(default)]
    contains_either: Option<OneOrMany>,
}

/// Older payloads wrote a lone string where a list is expected.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("SQL Injection"), "sql_injection");
        assert_eq!(slugify("  Rate--limit check! "), "rate_limit_check");
        assert_eq!(slugify("BOLA"), "bola");
    }

    #[test]
    fn test_unusable_category_keys() {
        assert!(!TestCategory::from_name("!!!").is_usable());
        assert!(!TestCategory::from_name("Endpoint").is_usable());
        assert!(TestCategory::from_name("Endpoint enumeration").is_usable());
        assert!(TestCategory::from_name("SQL Injection").is_usable());
    }

    #[test]
    fn test_family_needs_word_boundary() {
        assert!(is_family("sqli_login", &["sqli"]));
        assert!(!is_family("sqlite_dump", &["sqli"]));
    }
}
