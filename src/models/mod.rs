//! Data models
//!
//! Database entities, their status enums and the input types services
//! accept. Enums are stored as lowercase strings in the database.

/// Declares a string-backed enum with `as_str`, `FromStr`, `Display` and
/// `Default`, serialized with the same lowercase text that is stored.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
        default = $default:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(anyhow::anyhow!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

mod category;
mod comment;
mod course;
mod degree;
mod enrollment;
mod mentorship;
mod pagination;
mod payment;
mod post;
mod referral;
mod session;
mod subscription;
mod tag;
mod user;

pub use category::{Category, CreateCategoryInput, UpdateCategoryInput};
pub use comment::{Comment, CommentStatus, CommentWithAuthor, CreateCommentInput};
pub use course::{
    Course, CourseDetail, CourseFilter, CourseLevel, CourseModule, CreateCourseInput,
    CreateLessonInput, CreateModuleInput, Lesson, LessonContentType, ModuleWithLessons,
    PublishStatus, UpdateCourseInput, UpdateLessonInput, UpdateModuleInput,
};
pub use degree::{
    CreateDegreeInput, DegreeDetail, DegreeEnrollment, DegreeEnrollmentStatus,
    DegreeEnrollmentWithProgram, DegreeProgram, UpdateDegreeInput,
};
pub use enrollment::{
    progress_percent, CourseProgress, Enrollment, EnrollmentStatus, EnrollmentWithCourse,
};
pub use mentorship::{
    BookSessionInput, CreateMentorshipProgramInput, MentorshipEnrollment, MentorshipProgram,
    MentorshipSession, SessionStatus, TimeSlot, UpdateMentorshipProgramInput,
};
pub use pagination::{ListParams, PagedResult};
pub use payment::{
    normalize_currency, CheckoutOrder, CreateOrderInput, ItemType, NewOrder, Order, OrderStatus, Payment,
    PaymentFilter, PaymentStatus, PaymentWithOrder, VerifyPaymentInput, DEFAULT_CURRENCY,
};
pub use post::{CreatePostInput, Post, PostFilter, PostWithMeta, UpdatePostInput};
pub use referral::{DiscountType, Referral, ReferralCode};
pub use session::{OAuthAccount, OAuthState, Session};
pub use subscription::{
    CreatePlanInput, SubscriptionPlan, SubscriptionStatus, UpdatePlanInput, UserSubscription,
};
pub use tag::{Tag, TagWithCount};
pub(crate) use user::gravatar_url;
pub use user::{AdminUpdateUserInput, UpdateProfileInput, User, UserFilter, UserRole, UserStatus, UserSummary};
