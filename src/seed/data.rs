use crate::model::{
    Course, CourseStatus, CreditTransaction, Id, Member, Organization, Plan, Role, Subscription,
    Theme, UserContext,
};
use crate::store::traits::Store;
use anyhow::Result;
use serde_json::json;

pub const DEMO_ORGANIZATION_SLUG: &str = "demo-academy";

/// Helper function to create a Course with system audit info
fn create_system_course(
    organization_id: &Id,
    slug: &str,
    title: &str,
    description: &str,
    credit_cost: i64,
    status: CourseStatus,
) -> Course {
    let mut course = Course::new(
        organization_id.clone(),
        slug.to_string(),
        title.to_string(),
        Some(description.to_string()),
        credit_cost,
        UserContext::system().user_id,
    );
    course.status = status;
    course
}

/// Loads a demo organization owned by the system user. Does nothing when it already exists.
pub async fn load_seed_data<S: Store>(store: &S) -> Result<()> {
    if store
        .get_organization_by_slug(DEMO_ORGANIZATION_SLUG)
        .await?
        .is_some()
    {
        log::info!("Seed organization already present, skipping");
        return Ok(());
    }

    let organization_id = create_organization(store).await?;
    load_courses(store, &organization_id).await?;
    load_themes(store, &organization_id).await?;

    log::info!("Seeded organization {}", organization_id);
    Ok(())
}

async fn create_organization<S: Store>(store: &S) -> Result<Id> {
    let system = UserContext::system();
    let organization = Organization::new(
        "Demo Academy".to_string(),
        DEMO_ORGANIZATION_SLUG.to_string(),
        system.user_id.clone(),
    );
    let organization_id = organization.id.clone();
    store.upsert_organization(organization).await?;

    store
        .upsert_member(Member::new(
            organization_id.clone(),
            system.user_id,
            system.user_email,
            Role::Owner,
        ))
        .await?;

    let mut subscription = Subscription::free(organization_id.clone());
    subscription.plan = Plan::Starter;
    store.upsert_subscription(subscription).await?;
    store
        .apply_credit_transaction(CreditTransaction::new(
            organization_id.clone(),
            Plan::Starter.monthly_credits(),
            "seed",
            None,
        ))
        .await?;

    Ok(organization_id)
}

async fn load_courses<S: Store>(store: &S, organization_id: &Id) -> Result<()> {
    let courses = vec![
        create_system_course(
            organization_id,
            "getting-started",
            "Getting Started",
            "A free tour of the platform",
            0,
            CourseStatus::Published,
        ),
        create_system_course(
            organization_id,
            "data-literacy",
            "Data Literacy",
            "Reading charts, tables and dashboards",
            10,
            CourseStatus::Published,
        ),
        create_system_course(
            organization_id,
            "advanced-analytics",
            "Advanced Analytics",
            "Work in progress",
            25,
            CourseStatus::Draft,
        ),
    ];

    for course in courses {
        store.upsert_course(course).await?;
    }
    Ok(())
}

async fn load_themes<S: Store>(store: &S, organization_id: &Id) -> Result<()> {
    let light = Theme::new(
        organization_id.clone(),
        "Light".to_string(),
        json!({"primary_color": "#1d4ed8", "background": "#ffffff"}),
    );
    let dark = Theme::new(
        organization_id.clone(),
        "Dark".to_string(),
        json!({"primary_color": "#60a5fa", "background": "#111827"}),
    );
    let light_id = light.id.clone();

    store.upsert_theme(light).await?;
    store.upsert_theme(dark).await?;
    store.activate_theme(organization_id, &light_id).await?;
    Ok(())
}
