use crate::error::{AppError, AppResult};
use crate::logic::courses::CourseOperations;
use crate::logic::permissions::{require_member, require_permission, Permission};
use crate::model::{
    CourseStatus, CreditTransaction, EnrollRequest, Enrollment, EnrollmentStatus, Id, Member,
    UserContext,
};
use crate::store::traits::Store;

pub const ENROLLMENT_DEBIT_REASON: &str = "enrollment";
pub const ENROLLMENT_REFUND_REASON: &str = "enrollment_refund";

/// The enrollment's own user or a course manager
fn can_manage_enrollment(actor: &Member, enrollment: &Enrollment) -> bool {
    actor.user_id == enrollment.user_id || actor.role.has_permission(Permission::ManageCourses)
}

pub struct EnrollmentOperations;

impl EnrollmentOperations {
    /// Enroll the caller, or with `user_id` set another member, into a published course.
    /// The course's credit cost is debited from the organization first.
    pub async fn enroll<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        course_id: &Id,
        request: EnrollRequest,
    ) -> AppResult<Enrollment> {
        let actor = require_member(store, organization_id, &user.user_id).await?;

        let learner_id = match request.user_id {
            Some(target) if target != actor.user_id => {
                if !actor.role.has_permission(Permission::ManageCourses) {
                    return Err(AppError::forbidden(
                        "Only course managers can enroll other members",
                    ));
                }
                store
                    .get_member(organization_id, &target)
                    .await?
                    .ok_or_else(|| AppError::not_found("Member not found"))?
                    .user_id
            }
            _ => actor.user_id.clone(),
        };

        let course = CourseOperations::load(store, organization_id, course_id).await?;
        if course.status != CourseStatus::Published {
            return Err(AppError::bad_request("Course is not open for enrollment"));
        }

        // A withdrawn enrollment is reopened rather than duplicated
        let mut enrollment = match store.find_enrollment(&course.id, &learner_id).await? {
            Some(existing) if existing.status != EnrollmentStatus::Withdrawn => {
                return Err(AppError::conflict("Already enrolled in this course"));
            }
            Some(mut withdrawn) => {
                withdrawn.status = EnrollmentStatus::Active;
                withdrawn.enrolled_at = chrono::Utc::now();
                withdrawn
            }
            None => Enrollment::new(course.id.clone(), organization_id.clone(), learner_id),
        };
        enrollment.completed_at = None;

        if course.credit_cost > 0 {
            let debit = CreditTransaction::new(
                organization_id.clone(),
                -course.credit_cost,
                ENROLLMENT_DEBIT_REASON,
                Some(enrollment.id.clone()),
            );
            let balance = store
                .apply_credit_transaction(debit)
                .await?
                .ok_or_else(|| {
                    AppError::payment_required(format!(
                        "Insufficient credits: course costs {}",
                        course.credit_cost
                    ))
                })?;
            log::debug!(
                "Debited {} credits from {} (balance {})",
                course.credit_cost,
                organization_id,
                balance
            );
        }

        if let Err(err) = store.upsert_enrollment(enrollment.clone()).await {
            if course.credit_cost > 0 {
                let refund = CreditTransaction::new(
                    organization_id.clone(),
                    course.credit_cost,
                    ENROLLMENT_REFUND_REASON,
                    Some(enrollment.id.clone()),
                );
                if let Err(refund_err) = store.apply_credit_transaction(refund).await {
                    log::error!(
                        "Failed to refund {} credits to {}: {}",
                        course.credit_cost,
                        organization_id,
                        refund_err
                    );
                }
            }
            return Err(err.into());
        }

        log::info!(
            "User {} enrolled in course {} ({} credits)",
            enrollment.user_id,
            course.id,
            course.credit_cost
        );
        Ok(enrollment)
    }

    /// Progress only moves forward; 100 completes the enrollment
    pub async fn update_progress<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        enrollment_id: &Id,
        progress: i32,
    ) -> AppResult<Enrollment> {
        let actor = require_member(store, organization_id, &user.user_id).await?;
        let mut enrollment = Self::load(store, organization_id, enrollment_id).await?;
        if !can_manage_enrollment(&actor, &enrollment) {
            return Err(AppError::forbidden("Cannot update another member's progress"));
        }

        if !(0..=100).contains(&progress) {
            return Err(AppError::bad_request("Progress must be between 0 and 100"));
        }
        match enrollment.status {
            EnrollmentStatus::Withdrawn => {
                return Err(AppError::bad_request("Enrollment has been withdrawn"))
            }
            EnrollmentStatus::Completed if progress == 100 => return Ok(enrollment),
            _ => {}
        }
        if progress < enrollment.progress {
            return Err(AppError::bad_request(format!(
                "Progress cannot go backwards ({} < {})",
                progress, enrollment.progress
            )));
        }

        enrollment.progress = progress;
        if progress == 100 {
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.completed_at = Some(chrono::Utc::now());
            log::info!(
                "User {} completed course {}",
                enrollment.user_id,
                enrollment.course_id
            );
        }
        store.upsert_enrollment(enrollment.clone()).await?;
        Ok(enrollment)
    }

    pub async fn withdraw<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        enrollment_id: &Id,
    ) -> AppResult<Enrollment> {
        let actor = require_member(store, organization_id, &user.user_id).await?;
        let mut enrollment = Self::load(store, organization_id, enrollment_id).await?;
        if !can_manage_enrollment(&actor, &enrollment) {
            return Err(AppError::forbidden("Cannot withdraw another member"));
        }

        match enrollment.status {
            EnrollmentStatus::Completed => Err(AppError::conflict(
                "Completed enrollments cannot be withdrawn",
            )),
            EnrollmentStatus::Withdrawn => Err(AppError::conflict("Already withdrawn")),
            EnrollmentStatus::Active => {
                enrollment.status = EnrollmentStatus::Withdrawn;
                store.upsert_enrollment(enrollment.clone()).await?;
                Ok(enrollment)
            }
        }
    }

    pub async fn list_for_course<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        course_id: &Id,
    ) -> AppResult<Vec<Enrollment>> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageCourses)
            .await?;
        let course = CourseOperations::load(store, organization_id, course_id).await?;
        Ok(store.list_enrollments_for_course(&course.id).await?)
    }

    pub async fn list_mine<S: Store>(store: &S, user: &UserContext) -> AppResult<Vec<Enrollment>> {
        Ok(store.list_enrollments_for_user(&user.user_id).await?)
    }

    pub(crate) async fn load<S: Store>(
        store: &S,
        organization_id: &Id,
        enrollment_id: &Id,
    ) -> AppResult<Enrollment> {
        store
            .get_enrollment(enrollment_id)
            .await?
            .filter(|e| &e.organization_id == organization_id)
            .ok_or_else(|| AppError::not_found("Enrollment not found"))
    }
}
