//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, authorization of the acting user, caching and the side
//! effects (email, gateway calls) of each operation.

pub mod availability;
pub mod category;
pub mod comment;
pub mod course;
pub mod dashboard;
pub mod degree;
pub mod email;
pub mod enrollment;
pub mod markdown;
pub mod mentorship;
pub mod oauth;
pub mod password;
pub mod payment;
pub mod post;
pub mod rate_limiter;
pub mod referral;
pub mod slug;
pub mod subscription;
pub mod tag;
pub mod user;

pub use availability::generate_available_slots;
pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use course::{CourseService, CourseServiceError};
pub use dashboard::{DashboardService, DashboardSources};
pub use degree::{DegreeService, DegreeServiceError};
pub use email::EmailService;
pub use enrollment::{EnrollmentService, EnrollmentServiceError};
pub use markdown::MarkdownRenderer;
pub use mentorship::{MentorshipService, MentorshipServiceError, SessionRole};
pub use oauth::{OAuthError, OAuthService};
pub use password::{hash_password, verify_password};
pub use payment::{Catalog, PaymentService, PaymentServiceError, WebhookOutcome};
pub use post::{PostService, PostServiceError};
pub use rate_limiter::{LoginLimit, LoginRateLimiter};
pub use referral::{ReferralError, ReferralService};
pub use slug::generate_slug;
pub use subscription::{SubscriptionService, SubscriptionServiceError};
pub use tag::{TagService, TagServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
