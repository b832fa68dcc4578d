use crate::error::{AppError, AppResult};
use crate::logic::enrollments::EnrollmentOperations;
use crate::logic::permissions::{require_member, Permission};
use crate::logic::tokens::generate_verification_code;
use crate::model::{
    generate_id, Certificate, CertificateVerification, EnrollmentStatus, Id, UserContext,
};
use crate::store::traits::Store;

pub struct CertificateOperations;

impl CertificateOperations {
    /// Issue the certificate of a completed enrollment. Issuing twice returns the first one.
    pub async fn issue<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        enrollment_id: &Id,
    ) -> AppResult<Certificate> {
        let actor = require_member(store, organization_id, &user.user_id).await?;
        let enrollment = EnrollmentOperations::load(store, organization_id, enrollment_id).await?;
        if actor.user_id != enrollment.user_id
            && !actor.role.has_permission(Permission::ManageCourses)
        {
            return Err(AppError::forbidden(
                "Cannot issue a certificate for another member",
            ));
        }

        if enrollment.status != EnrollmentStatus::Completed {
            return Err(AppError::bad_request(
                "Certificates are only issued for completed enrollments",
            ));
        }

        if let Some(existing) = store.get_certificate_for_enrollment(&enrollment.id).await? {
            return Ok(existing);
        }

        let certificate = Certificate {
            id: generate_id(),
            enrollment_id: enrollment.id.clone(),
            course_id: enrollment.course_id.clone(),
            user_id: enrollment.user_id.clone(),
            verification_code: generate_verification_code(),
            issued_at: chrono::Utc::now(),
        };
        store.insert_certificate(certificate.clone()).await?;

        log::info!(
            "Certificate {} issued to {} for course {}",
            certificate.verification_code,
            certificate.user_id,
            certificate.course_id
        );
        Ok(certificate)
    }

    /// Public lookup by verification code
    pub async fn verify<S: Store>(store: &S, code: &str) -> AppResult<CertificateVerification> {
        let code = code.trim().to_ascii_uppercase();
        let certificate = store
            .get_certificate_by_code(&code)
            .await?
            .ok_or_else(|| AppError::not_found("Certificate not found"))?;

        let course = store
            .get_course(&certificate.course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Certificate not found"))?;
        let organization = store
            .get_organization(&course.organization_id)
            .await?
            .ok_or_else(|| AppError::not_found("Certificate not found"))?;

        Ok(CertificateVerification {
            valid: true,
            certificate,
            course_title: course.title,
            organization_name: organization.name,
        })
    }

    pub async fn list_mine<S: Store>(store: &S, user: &UserContext) -> AppResult<Vec<Certificate>> {
        Ok(store.list_certificates_for_user(&user.user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{CourseOperations, OrganizationOperations};
    use crate::model::{CourseStatus, CourseUpdate, EnrollRequest, Member, NewCourse, NewOrganization, Role};
    use crate::store::traits::MemberStore;
    use crate::store::MemoryStore;

    async fn enrolled() -> (MemoryStore, Id, UserContext, Id) {
        let store = MemoryStore::new();
        let owner = UserContext::new("ada".into());
        let org = OrganizationOperations::create(
            &store,
            &owner,
            NewOrganization {
                name: "Acme Academy".into(),
                slug: None,
            },
        )
        .await
        .unwrap();
        store
            .upsert_member(Member::new(org.id.clone(), "bob".into(), None, Role::Member))
            .await
            .unwrap();
        let course = CourseOperations::create(
            &store,
            &owner,
            &org.id,
            NewCourse {
                title: "Ownership".into(),
                slug: None,
                description: None,
                credit_cost: 0,
            },
        )
        .await
        .unwrap();
        CourseOperations::update(
            &store,
            &owner,
            &org.id,
            &course.id,
            CourseUpdate {
                status: Some(CourseStatus::Published),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let bob = UserContext::new("bob".into());
        let enrollment =
            EnrollmentOperations::enroll(&store, &bob, &org.id, &course.id, EnrollRequest::default())
                .await
                .unwrap();
        (store, org.id, bob, enrollment.id)
    }

    #[tokio::test]
    async fn test_requires_completion() {
        let (store, org_id, bob, enrollment_id) = enrolled().await;
        let err = CertificateOperations::issue(&store, &bob, &org_id, &enrollment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_issue_is_idempotent_and_verifiable() {
        let (store, org_id, bob, enrollment_id) = enrolled().await;
        EnrollmentOperations::update_progress(&store, &bob, &org_id, &enrollment_id, 100)
            .await
            .unwrap();

        let first = CertificateOperations::issue(&store, &bob, &org_id, &enrollment_id)
            .await
            .unwrap();
        let second = CertificateOperations::issue(&store, &bob, &org_id, &enrollment_id)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.verification_code.len(), 12);

        let verification =
            CertificateOperations::verify(&store, &first.verification_code.to_lowercase())
                .await
                .unwrap();
        assert!(verification.valid);
        assert_eq!(verification.course_title, "Ownership");
        assert_eq!(verification.organization_name, "Acme Academy");

        assert_eq!(CertificateOperations::list_mine(&store, &bob).await.unwrap().len(), 1);

        let err = CertificateOperations::verify(&store, "000000000000").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
