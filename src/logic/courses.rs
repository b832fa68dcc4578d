use crate::error::{AppError, AppResult};
use crate::logic::permissions::{require_member, require_permission, Permission};
use crate::model::{
    derive_slug, is_valid_slug, Course, CourseStatus, CourseUpdate, Id, NewCourse, UserContext,
};
use crate::store::traits::{CourseStore, Store};

fn validate_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    if title.is_empty() || title.len() > 200 {
        return Err(AppError::bad_request(
            "Course title must be between 1 and 200 characters",
        ));
    }
    Ok(title.to_string())
}

fn validate_credit_cost(credit_cost: i64) -> AppResult<i64> {
    if credit_cost < 0 {
        return Err(AppError::bad_request("credit_cost cannot be negative"));
    }
    Ok(credit_cost)
}

pub struct CourseOperations;

impl CourseOperations {
    pub async fn create<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        input: NewCourse,
    ) -> AppResult<Course> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageCourses)
            .await?;

        let title = validate_title(&input.title)?;
        let credit_cost = validate_credit_cost(input.credit_cost)?;
        let slug = match input.slug {
            Some(slug) => slug.trim().to_string(),
            None => derive_slug(&title, "course"),
        };
        if !is_valid_slug(&slug) {
            return Err(AppError::bad_request(format!("Invalid course slug '{}'", slug)));
        }
        if store.get_course_by_slug(organization_id, &slug).await?.is_some() {
            return Err(AppError::conflict(format!(
                "A course with slug '{}' already exists",
                slug
            )));
        }

        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let course = Course::new(
            organization_id.clone(),
            slug,
            title,
            description,
            credit_cost,
            user.user_id.clone(),
        );
        store.upsert_course(course.clone()).await?;
        log::info!(
            "Course '{}' ({}) created in {} by {}",
            course.slug,
            course.id,
            organization_id,
            user.user_id
        );
        Ok(course)
    }

    /// Course managers see every course, everyone else only published ones
    pub async fn list<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<Vec<Course>> {
        let member = require_member(store, organization_id, &user.user_id).await?;
        let courses = store.list_courses(organization_id).await?;
        if member.role.has_permission(Permission::ManageCourses) {
            return Ok(courses);
        }
        Ok(courses
            .into_iter()
            .filter(|c| c.status == CourseStatus::Published)
            .collect())
    }

    pub async fn list_published<S: CourseStore + ?Sized>(
        store: &S,
        organization_id: &Id,
    ) -> AppResult<Vec<Course>> {
        let courses = store.list_courses(organization_id).await?;
        Ok(courses
            .into_iter()
            .filter(|c| c.status == CourseStatus::Published)
            .collect())
    }

    pub async fn get<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        course_id: &Id,
    ) -> AppResult<Course> {
        let member = require_member(store, organization_id, &user.user_id).await?;
        let course = Self::load(store, organization_id, course_id).await?;
        if course.status != CourseStatus::Published
            && !member.role.has_permission(Permission::ManageCourses)
        {
            return Err(AppError::not_found("Course not found"));
        }
        Ok(course)
    }

    pub async fn update<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        course_id: &Id,
        update: CourseUpdate,
    ) -> AppResult<Course> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageCourses)
            .await?;
        let mut course = Self::load(store, organization_id, course_id).await?;

        if let Some(title) = update.title {
            course.title = validate_title(&title)?;
        }
        if let Some(description) = update.description {
            let description = description.trim().to_string();
            course.description = (!description.is_empty()).then_some(description);
        }
        if let Some(credit_cost) = update.credit_cost {
            course.credit_cost = validate_credit_cost(credit_cost)?;
        }
        if let Some(slug) = update.slug {
            let slug = slug.trim().to_string();
            if !is_valid_slug(&slug) {
                return Err(AppError::bad_request(format!("Invalid course slug '{}'", slug)));
            }
            if slug != course.slug {
                if store.get_course_by_slug(organization_id, &slug).await?.is_some() {
                    return Err(AppError::conflict(format!(
                        "A course with slug '{}' already exists",
                        slug
                    )));
                }
                course.slug = slug;
            }
        }
        if let Some(status) = update.status {
            if !course.status.can_transition_to(status) {
                return Err(AppError::bad_request(format!(
                    "Cannot move course from {} to {}",
                    course.status.as_str(),
                    status.as_str()
                )));
            }
            if status != course.status {
                log::info!(
                    "Course {} status {} -> {}",
                    course.id,
                    course.status.as_str(),
                    status.as_str()
                );
            }
            course.status = status;
        }

        course.updated_at = chrono::Utc::now();
        store.upsert_course(course.clone()).await?;
        Ok(course)
    }

    /// Courses with enrollments are kept; archive them instead
    pub async fn delete<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        course_id: &Id,
    ) -> AppResult<()> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageCourses)
            .await?;
        let course = Self::load(store, organization_id, course_id).await?;

        if !store.list_enrollments_for_course(&course.id).await?.is_empty() {
            return Err(AppError::conflict(
                "Course has enrollments; archive it instead",
            ));
        }
        store.delete_course(&course.id).await?;
        log::info!("Course {} deleted by {}", course.id, user.user_id);
        Ok(())
    }

    /// Fetch a course and make sure it belongs to the organization
    pub(crate) async fn load<S: CourseStore + ?Sized>(
        store: &S,
        organization_id: &Id,
        course_id: &Id,
    ) -> AppResult<Course> {
        store
            .get_course(course_id)
            .await?
            .filter(|c| &c.organization_id == organization_id)
            .ok_or_else(|| AppError::not_found("Course not found"))
    }
}
