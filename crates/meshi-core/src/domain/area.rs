//! Area - 掲載サイトのエリア階層
//!
//! 大サービスエリア(SS) > サービスエリア(SA) > 大エリア(Z) > 中エリア(Y) > 小エリア(X)。
//! コードの形式はすべて正規表現で検証し、不正なら副作用の前に弾きます。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::errors::ValidationError;

type Pattern = LazyLock<Option<Regex>>;

static LARGE_SERVICE_AREA: Pattern = LazyLock::new(|| anchored(r"SS[0-9]{2}"));
static SERVICE_AREA: Pattern = LazyLock::new(|| anchored(r"SA[0-9]{2}"));
static LARGE_AREA: Pattern = LazyLock::new(|| anchored(r"Z[0-9]{3}"));
static MIDDLE_AREA: Pattern = LazyLock::new(|| anchored(r"Y[0-9]{3}"));
static SMALL_AREA: Pattern = LazyLock::new(|| anchored(r"X[A-Z0-9]{3}"));
static RESTAURANT_ID: Pattern = LazyLock::new(|| anchored(r"J[0-9]+"));

fn anchored(body: &str) -> Option<Regex> {
    Regex::new(&format!("^{body}$")).ok()
}

// 正規表現が作れなかった場合も不一致として扱う（fail closed）
fn check(re: &Pattern, field: &'static str, value: &str) -> Result<(), ValidationError> {
    match re.as_ref() {
        Some(re) if re.is_match(value) => Ok(()),
        _ => Err(ValidationError::field(field, value)),
    }
}

pub fn validate_middle_area_code(code: &str) -> Result<(), ValidationError> {
    check(&MIDDLE_AREA, "middle_area_code", code)
}

pub fn validate_small_area_code(code: &str) -> Result<(), ValidationError> {
    check(&SMALL_AREA, "small_area_code", code)
}

pub fn validate_restaurant_id(id: &str) -> Result<(), ValidationError> {
    check(&RESTAURANT_ID, "id", id)
}

/// 小エリアまでのエリア系譜
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaPath {
    pub large_service_area_code: String,
    pub large_service_area_name: String,
    pub service_area_code: String,
    pub service_area_name: String,
    pub large_area_code: String,
    pub large_area_name: String,
    pub middle_area_code: String,
    pub middle_area_name: String,
    pub small_area_code: String,
    pub small_area_name: String,
}

impl AreaPath {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check(
            &LARGE_SERVICE_AREA,
            "large_service_area_code",
            &self.large_service_area_code,
        )?;
        check(&SERVICE_AREA, "service_area_code", &self.service_area_code)?;
        check(&LARGE_AREA, "large_area_code", &self.large_area_code)?;
        validate_middle_area_code(&self.middle_area_code)?;
        validate_small_area_code(&self.small_area_code)?;

        let names = [
            ("large_service_area_name", &self.large_service_area_name),
            ("service_area_name", &self.service_area_name),
            ("large_area_name", &self.large_area_name),
            ("middle_area_name", &self.middle_area_name),
            ("small_area_name", &self.small_area_name),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(ValidationError::field(field, name.as_str()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_area() -> AreaPath {
    AreaPath {
        large_service_area_code: "SS10".into(),
        large_service_area_name: "関東".into(),
        service_area_code: "SA11".into(),
        service_area_name: "埼玉".into(),
        large_area_code: "Z011".into(),
        large_area_name: "大宮・浦和・川口".into(),
        middle_area_code: "Y005".into(),
        middle_area_name: "大宮".into(),
        small_area_code: "X005".into(),
        small_area_name: "大宮駅東口".into(),
    }
}
