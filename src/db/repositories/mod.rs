//! Database repositories
//!
//! One trait plus one `Sqlx*Repository` per aggregate. Each implementation
//! dispatches on the pool's driver and carries SQL for SQLite and MySQL.

/// Run one statement against whichever pool is configured and evaluate to
/// the affected row count.
macro_rules! execute {
    ($self:ident, $query:expr, $ctx:literal, $($bind:expr),* $(,)?) => {
        match $self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query($query)
                $(.bind($bind))*
                .execute($self.pool.sqlite()?)
                .await
                .context($ctx)?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query($query)
                $(.bind($bind))*
                .execute($self.pool.mysql()?)
                .await
                .context($ctx)?
                .rows_affected(),
        }
    };
}

pub mod category;
pub mod comment;
pub mod course;
pub mod degree;
pub mod enrollment;
pub mod mentorship;
pub mod oauth;
pub mod order;
pub mod post;
pub mod referral;
pub mod session;
pub mod subscription;
pub mod tag;
pub mod user;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use course::{CourseRepository, SqlxCourseRepository};
pub use degree::{DegreeRepository, SqlxDegreeRepository};
pub use enrollment::{EnrollmentRepository, InstructorCourseStats, SqlxEnrollmentRepository};
pub use mentorship::{MentorshipRepository, SqlxMentorshipRepository};
pub use oauth::{OAuthRepository, SqlxOAuthRepository};
pub use order::{OrderRepository, SqlxOrderRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use referral::{ReferralRepository, SqlxReferralRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
