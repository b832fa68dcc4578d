pub mod api_keys;
pub mod billing;
pub mod certificates;
pub mod courses;
pub mod enrollments;
pub mod invitations;
pub mod organizations;
pub mod permissions;
pub mod rate_limits;
pub mod themes;
pub mod tokens;

pub use api_keys::ApiKeyOperations;
pub use billing::BillingOperations;
pub use certificates::CertificateOperations;
pub use courses::CourseOperations;
pub use enrollments::EnrollmentOperations;
pub use invitations::InvitationOperations;
pub use organizations::OrganizationOperations;
pub use permissions::{require_member, require_permission, Permission};
pub use rate_limits::RateLimitOperations;
pub use themes::ThemeOperations;
