use crate::model::{generate_id, Id, Timestamp};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Published,
    Archived,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "draft",
            CourseStatus::Published => "published",
            CourseStatus::Archived => "archived",
        }
    }

    /// Draft -> Published -> Archived, and back to Draft from either
    pub fn can_transition_to(&self, next: CourseStatus) -> bool {
        use CourseStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Draft, Published) | (Published, Archived) => true,
            (Published, Draft) | (Archived, Draft) => true,
            _ => false,
        }
    }
}

impl FromStr for CourseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(anyhow::anyhow!("unknown course status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Id,
    pub organization_id: Id,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub status: CourseStatus,
    /// Credits debited from the organization per enrollment
    pub credit_cost: i64,
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Course {
    pub fn new(
        organization_id: Id,
        slug: String,
        title: String,
        description: Option<String>,
        credit_cost: i64,
        created_by: String,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: generate_id(),
            organization_id,
            slug,
            title,
            description,
            status: CourseStatus::Draft,
            credit_cost,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub title: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub credit_cost: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub status: Option<CourseStatus>,
    pub credit_cost: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Withdrawn,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Withdrawn => "withdrawn",
        }
    }
}

impl FromStr for EnrollmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "withdrawn" => Ok(Self::Withdrawn),
            other => Err(anyhow::anyhow!("unknown enrollment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Id,
    pub course_id: Id,
    pub organization_id: Id,
    pub user_id: String,
    pub status: EnrollmentStatus,
    /// Percent complete, 0..=100
    pub progress: i32,
    pub enrolled_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Enrollment {
    pub fn new(course_id: Id, organization_id: Id, user_id: String) -> Self {
        Self {
            id: generate_id(),
            course_id,
            organization_id,
            user_id,
            status: EnrollmentStatus::Active,
            progress: 0,
            enrolled_at: chrono::Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrollRequest {
    /// Enroll someone else; requires course management rights
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressUpdate {
    pub progress: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Id,
    pub enrollment_id: Id,
    pub course_id: Id,
    pub user_id: String,
    pub verification_code: String,
    pub issued_at: Timestamp,
}

/// Public verification view
#[derive(Debug, Clone, Serialize)]
pub struct CertificateVerification {
    pub valid: bool,
    pub certificate: Certificate,
    pub course_title: String,
    pub organization_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_status_transitions() {
        use CourseStatus::*;
        assert!(Draft.can_transition_to(Published));
        assert!(Published.can_transition_to(Archived));
        assert!(Archived.can_transition_to(Draft));
        assert!(Published.can_transition_to(Draft));
        assert!(!Draft.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Published));
        assert!(Draft.can_transition_to(Draft));
    }
}
