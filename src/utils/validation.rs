use std::collections::BTreeSet;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::errors::AppError;

pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(AppError::from)
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if username.is_empty() || !username.chars().all(allowed) {
        let mut err = ValidationError::new("username");
        err.message = Some(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("This field may not be blank.".into());
        return Err(err);
    }
    Ok(())
}

/// Email is optional on accounts: an empty string is stored as "no email".
pub fn validate_blank_or_email(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || validator::validate_email(value) {
        return Ok(());
    }
    let mut err = ValidationError::new("email");
    err.message = Some("Enter a valid email address.".into());
    Err(err)
}

/// Deserializes a string with surrounding whitespace removed.
pub fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// Like [`trimmed`] for optional fields. Use together with `#[serde(default)]`.
pub fn trimmed_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(raw.map(|value| value.trim().to_string()))
}

/// Collapses repeated ids while keeping a stable order.
pub fn unique_ids(ids: &[Uuid]) -> Vec<Uuid> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Requested ids that are absent from `found`.
pub fn missing_ids(requested: &[Uuid], found: &[Uuid]) -> Vec<Uuid> {
    let found: BTreeSet<_> = found.iter().collect();
    requested.iter().filter(|id| !found.contains(id)).copied().collect()
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
/// in partial updates. Use together with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Serde adapter for optional dates written as `dd-mm-yyyy`.
pub mod dmy_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer};

    pub const FORMAT: &str = "%d-%m-%Y";

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), FORMAT)
                .map(Some)
                .map_err(|_| {
                    serde::de::Error::custom(
                        "Date has wrong format. Use one of these formats instead: DD-MM-YYYY.",
                    )
                }),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct WithDob {
        #[serde(default, deserialize_with = "dmy_date::deserialize")]
        dob: Option<NaiveDate>,
    }

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        parent: Option<Option<Uuid>>,
    }

    #[test]
    fn double_option_separates_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.parent, None);
        let cleared: Patch = serde_json::from_str(r#"{"parent": null}"#).unwrap();
        assert_eq!(cleared.parent, Some(None));
        let id = Uuid::new_v4();
        let set: Patch = serde_json::from_str(&format!(r#"{{"parent": "{}"}}"#, id)).unwrap();
        assert_eq!(set.parent, Some(Some(id)));
    }

    #[test]
    fn email_may_be_blank_but_not_malformed() {
        assert!(validate_blank_or_email("").is_ok());
        assert!(validate_blank_or_email("house@princeton-plainsboro.org").is_ok());
        let err = validate_blank_or_email("house at ppth").unwrap_err();
        assert_eq!(err.code, "email");
    }

    #[derive(Deserialize)]
    struct Named {
        #[serde(deserialize_with = "trimmed")]
        name: String,
        #[serde(default, deserialize_with = "trimmed_option")]
        alias: Option<String>,
    }

    #[test]
    fn trimmed_strips_surrounding_whitespace() {
        let named: Named =
            serde_json::from_str(r#"{"name": "  Cardiology ", "alias": " Heart "}"#).unwrap();
        assert_eq!(named.name, "Cardiology");
        assert_eq!(named.alias.as_deref(), Some("Heart"));

        let named: Named = serde_json::from_str(r#"{"name": "ICU"}"#).unwrap();
        assert_eq!(named.alias, None);
    }

    #[test]
    fn usernames_follow_allowed_alphabet() {
        assert!(validate_username("dr.who+1@clinic").is_ok());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn dob_uses_day_month_year() {
        let parsed: WithDob = serde_json::from_str(r#"{"dob": "31-01-1990"}"#).unwrap();
        assert_eq!(parsed.dob, NaiveDate::from_ymd_opt(1990, 1, 31));

        let missing: WithDob = serde_json::from_str("{}").unwrap();
        assert!(missing.dob.is_none());

        assert!(serde_json::from_str::<WithDob>(r#"{"dob": "1990-01-31"}"#).is_err());
    }

    #[test]
    fn id_helpers_dedupe_and_diff() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let unique = unique_ids(&[a, b, a, b]);
        assert_eq!(unique.len(), 2);
        assert_eq!(missing_ids(&[a, b, c], &[b]), vec![a, c]);
        assert!(missing_ids(&[a], &[a, b]).is_empty());
    }
}
