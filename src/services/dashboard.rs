//! Dashboard figures for admins, instructors and students

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::db::repositories::{
    CommentRepository, CourseRepository, EnrollmentRepository, InstructorCourseStats, MentorshipRepository,
    OrderRepository, PostRepository, ReferralRepository, SubscriptionRepository, UserRepository,
};
use crate::models::{
    CommentStatus, EnrollmentWithCourse, MentorshipSession, PublishStatus, UserSubscription,
};

/// Upcoming sessions shown on a student dashboard
const UPCOMING_SESSIONS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub users_by_role: BTreeMap<String, i64>,
    pub total_users: i64,
    pub courses_by_status: BTreeMap<String, i64>,
    pub active_enrollments: i64,
    pub successful_payments: i64,
    /// Minor units
    pub revenue: i64,
    pub posts_by_status: BTreeMap<String, i64>,
    pub pending_comments: i64,
    pub active_mentorship_programs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstructorDashboard {
    pub courses: Vec<InstructorCourseStats>,
    pub total_enrollments: i64,
    pub total_revenue: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboard {
    pub enrollments: Vec<EnrollmentWithCourse>,
    pub upcoming_sessions: Vec<MentorshipSession>,
    pub subscription: Option<UserSubscription>,
    pub referral_credit: i64,
}

/// Repositories the dashboards read from
#[derive(Clone)]
pub struct DashboardSources {
    pub users: Arc<dyn UserRepository>,
    pub courses: Arc<dyn CourseRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub mentorship: Arc<dyn MentorshipRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub referrals: Arc<dyn ReferralRepository>,
}

pub struct DashboardService {
    sources: DashboardSources,
}

impl DashboardService {
    pub fn new(sources: DashboardSources) -> Self {
        Self { sources }
    }

    pub async fn admin(&self) -> anyhow::Result<AdminDashboard> {
        let s = &self.sources;
        let users_by_role = s.users.count_by_role().await?;
        let total_users = users_by_role.iter().map(|(_, n)| n).sum();
        let (successful_payments, revenue) = s.orders.revenue().await?;

        Ok(AdminDashboard {
            users_by_role: to_map(users_by_role),
            total_users,
            courses_by_status: to_map(s.courses.count_by_status().await?),
            active_enrollments: s.enrollments.count_active().await?,
            successful_payments,
            revenue,
            posts_by_status: to_map(s.posts.count_by_status().await?),
            pending_comments: s.comments.count_by_status(CommentStatus::Pending).await?,
            active_mentorship_programs: s.mentorship.count_programs(PublishStatus::Published).await?,
        })
    }

    pub async fn instructor(&self, instructor_id: i64) -> anyhow::Result<InstructorDashboard> {
        let courses = self.sources.enrollments.instructor_stats(instructor_id).await?;
        Ok(InstructorDashboard {
            total_enrollments: courses.iter().map(|c| c.enrollments).sum(),
            total_revenue: courses.iter().map(|c| c.revenue).sum(),
            courses,
        })
    }

    pub async fn student(&self, user_id: i64) -> anyhow::Result<StudentDashboard> {
        let s = &self.sources;
        let now = Utc::now();
        Ok(StudentDashboard {
            enrollments: s.enrollments.list_for_user(user_id).await?,
            upcoming_sessions: s.mentorship.upcoming_for_user(user_id, now, UPCOMING_SESSIONS).await?,
            subscription: s.subscriptions.current_for_user(user_id, now).await?,
            referral_credit: s
                .referrals
                .get_code_by_user(user_id)
                .await?
                .map_or(0, |c| c.earned_credit),
        })
    }
}

/// Keyed by the wire name of each status or role
fn to_map<K: std::fmt::Display>(counts: Vec<(K, i64)>) -> BTreeMap<String, i64> {
    counts.into_iter().map(|(k, n)| (k.to_string(), n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_course, insert_lessons, insert_user, setup_pool};
    use crate::db::repositories::{
        SqlxCommentRepository, SqlxCourseRepository, SqlxEnrollmentRepository, SqlxMentorshipRepository,
        SqlxOrderRepository, SqlxPostRepository, SqlxReferralRepository, SqlxSubscriptionRepository,
        SqlxUserRepository,
    };
    use crate::db::DynDatabasePool;

    fn service(pool: &DynDatabasePool) -> DashboardService {
        DashboardService::new(DashboardSources {
            users: SqlxUserRepository::boxed(pool.clone()),
            courses: SqlxCourseRepository::boxed(pool.clone()),
            enrollments: SqlxEnrollmentRepository::boxed(pool.clone()),
            orders: SqlxOrderRepository::boxed(pool.clone()),
            posts: SqlxPostRepository::boxed(pool.clone()),
            comments: SqlxCommentRepository::boxed(pool.clone()),
            mentorship: SqlxMentorshipRepository::boxed(pool.clone()),
            subscriptions: SqlxSubscriptionRepository::boxed(pool.clone()),
            referrals: SqlxReferralRepository::boxed(pool.clone()),
        })
    }

    #[tokio::test]
    async fn test_admin_dashboard_counts() {
        let pool = setup_pool().await;
        let owner = insert_user(&pool, "t@example.com").await;
        insert_user(&pool, "s@example.com").await;
        insert_course(&pool, owner, "live", 0, PublishStatus::Published).await;
        insert_course(&pool, owner, "wip", 0, PublishStatus::Draft).await;

        let dashboard = service(&pool).admin().await.unwrap();
        assert_eq!(dashboard.total_users, 2);
        assert_eq!(dashboard.users_by_role.get("student"), Some(&2));
        assert_eq!(dashboard.courses_by_status.get("published"), Some(&1));
        assert_eq!(dashboard.courses_by_status.get("draft"), Some(&1));
        assert_eq!(dashboard.revenue, 0);
        assert_eq!(dashboard.pending_comments, 0);
    }

    #[tokio::test]
    async fn test_instructor_and_student_dashboards() {
        let pool = setup_pool().await;
        let owner = insert_user(&pool, "t@example.com").await;
        let student = insert_user(&pool, "s@example.com").await;
        let course = insert_course(&pool, owner, "intro", 0, PublishStatus::Published).await;
        insert_lessons(&pool, course, 2).await;
        SqlxEnrollmentRepository::new(pool.clone())
            .create(student, course, None)
            .await
            .unwrap();

        let dashboards = service(&pool);
        let instructor = dashboards.instructor(owner).await.unwrap();
        assert_eq!(instructor.courses.len(), 1);
        assert_eq!(instructor.total_enrollments, 1);

        let me = dashboards.student(student).await.unwrap();
        assert_eq!(me.enrollments.len(), 1);
        assert!(me.upcoming_sessions.is_empty());
        assert!(me.subscription.is_none());
        assert_eq!(me.referral_credit, 0);
    }
}
