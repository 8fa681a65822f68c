//! Base accounts: eight students, two per grade, and one administrator.

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{empty_table, Precondition, SeedStep, Seeded};
use crate::credential::{default_credential, hash_credential};
use crate::error::{BootstrapError, Result};
use crate::model::{NewUser, UserRole};
use crate::ports::BootstrapStore;

struct AccountTemplate {
    student_num: i32,
    name: &'static str,
    email: &'static str,
    phone: &'static str,
    birth: (i32, u32, u32),
    department: &'static str,
    grade: Option<i32>,
    role: UserRole,
}

const fn student(
    student_num: i32,
    name: &'static str,
    email: &'static str,
    phone: &'static str,
    birth: (i32, u32, u32),
    department: &'static str,
    grade: i32,
) -> AccountTemplate {
    AccountTemplate {
        student_num,
        name,
        email,
        phone,
        birth,
        department,
        grade: Some(grade),
        role: UserRole::Student,
    }
}

const STUDENTS: [AccountTemplate; 8] = [
    student(
        2024001,
        "Kim Chulsoo",
        "chulsoo.kim@scms.ac.kr",
        "010-1234-5601",
        (2003, 1, 1),
        "Computer Engineering",
        1,
    ),
    student(
        2024002,
        "Lee Younghee",
        "younghee.lee@scms.ac.kr",
        "010-1234-5602",
        (2004, 2, 15),
        "Business Administration",
        1,
    ),
    student(
        2023001,
        "Park Minsu",
        "minsu.park@scms.ac.kr",
        "010-1234-5603",
        (2002, 3, 10),
        "Electronic Engineering",
        2,
    ),
    student(
        2023002,
        "Choi Jieun",
        "jieun.choi@scms.ac.kr",
        "010-1234-5604",
        (2001, 8, 25),
        "English Language and Literature",
        2,
    ),
    student(
        2022001,
        "Jung Woojin",
        "woojin.jung@scms.ac.kr",
        "010-1234-5605",
        (2001, 6, 20),
        "Mechanical Engineering",
        3,
    ),
    student(
        2022002,
        "Kang Haneul",
        "haneul.kang@scms.ac.kr",
        "010-1234-5606",
        (1999, 11, 5),
        "Chemical Engineering",
        3,
    ),
    student(
        2021001,
        "Yoon Seohyun",
        "seohyun.yoon@scms.ac.kr",
        "010-1234-5607",
        (2000, 4, 12),
        "Nursing",
        4,
    ),
    student(
        2021002,
        "Lim Doyun",
        "doyun.lim@scms.ac.kr",
        "010-1234-5608",
        (1999, 2, 28),
        "Architecture",
        4,
    ),
];

const ADMIN: AccountTemplate = AccountTemplate {
    student_num: 9_999_999,
    name: "Administrator",
    email: "admin@scms.ac.kr",
    phone: "010-0000-0000",
    birth: (1990, 1, 1),
    department: "Administration Office",
    grade: None,
    role: UserRole::Admin,
};

/// Seeds the account table when it is empty.
#[derive(Clone)]
pub struct UserSeed {
    bcrypt_cost: u32,
    admin_password: Option<String>,
}

impl UserSeed {
    pub fn new(bcrypt_cost: u32, admin_password: Option<String>) -> Self {
        Self {
            bcrypt_cost,
            admin_password,
        }
    }

    /// Every account in insertion order, credentials already hashed.
    pub fn records(&self) -> Result<Vec<NewUser>> {
        let mut users = Vec::with_capacity(STUDENTS.len() + 1);
        for template in &STUDENTS {
            users.push(self.build(template, None)?);
        }

        if self.admin_password.is_none() {
            warn!(
                target: "bootstrap.seed",
                dataset = "users",
                "no administrator password configured, deriving it from the birth date"
            );
        }
        users.push(self.build(&ADMIN, self.admin_password.as_deref())?);

        Ok(users)
    }

    fn build(&self, template: &AccountTemplate, raw_credential: Option<&str>) -> Result<NewUser> {
        let (y, m, d) = template.birth;
        let birth_date = NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| {
            BootstrapError::InvalidRecord(format!(
                "invalid birth date for {}",
                template.student_num
            ))
        })?;
        let raw = match raw_credential {
            Some(raw) => raw.to_string(),
            None => default_credential(birth_date),
        };
        debug!(
            target: "bootstrap.seed",
            student_num = template.student_num,
            role = %template.role,
            "prepared account"
        );

        Ok(NewUser {
            student_num: template.student_num,
            name: template.name.to_string(),
            email: template.email.to_string(),
            phone: template.phone.to_string(),
            password_hash: hash_credential(&raw, self.bcrypt_cost)?,
            birth_date,
            department: template.department.to_string(),
            grade: template.grade,
            role: template.role,
        })
    }
}

#[async_trait]
impl SeedStep for UserSeed {
    fn dataset(&self) -> &'static str {
        "users"
    }

    async fn precondition(&self, store: &dyn BootstrapStore) -> Result<Precondition> {
        Ok(empty_table(store.count_users().await?))
    }

    async fn seed(&self, store: &dyn BootstrapStore) -> Result<Seeded> {
        // bcrypt is CPU-bound; keep it off the async workers.
        let accounts = self.clone();
        let users = tokio::task::spawn_blocking(move || accounts.records())
            .await
            .map_err(|e| {
                BootstrapError::Internal(
                    anyhow::Error::new(e).context("credential hashing task failed"),
                )
            })??;
        Ok(Seeded::Inserted(store.insert_users(&users).await?))
    }
}
