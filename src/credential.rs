//! Default credentials for seeded accounts.
//!
//! A seeded student's first password is their birth date as `YYMMDD`. Only
//! the bcrypt hash ever reaches the store.

use chrono::{Datelike, NaiveDate};

use crate::error::Result;

/// Fixed-width `YYMMDD` rendering of a birth date.
pub fn default_credential(birth_date: NaiveDate) -> String {
    format!(
        "{:02}{:02}{:02}",
        birth_date.year().rem_euclid(100),
        birth_date.month(),
        birth_date.day()
    )
}

/// One-way hash of a raw credential.
pub fn hash_credential(raw: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(raw, cost)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_birth_date() {
        let date = NaiveDate::from_ymd_opt(2003, 1, 1).unwrap();
        assert_eq!(default_credential(date), "030101");
        let date = NaiveDate::from_ymd_opt(1999, 11, 5).unwrap();
        assert_eq!(default_credential(date), "991105");
    }

    #[test]
    fn hash_is_not_reversible_text() {
        let hash = hash_credential("030101", 4).unwrap();
        assert_ne!(hash, "030101");
        assert!(!hash.contains("030101"));
        assert!(bcrypt::verify("030101", &hash).unwrap());
        assert!(!bcrypt::verify("030102", &hash).unwrap());
    }

    proptest! {
        #[test]
        fn credential_is_six_digits(days in 0i64..60_000) {
            let base = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
            let date = base + chrono::Duration::days(days);
            let cred = default_credential(date);
            prop_assert_eq!(cred.len(), 6);
            prop_assert!(cred.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
