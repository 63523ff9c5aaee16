//! Application wiring
//!
//! Builds every repository and service over one pool and returns the
//! [`AppState`] the router runs on. The payment gateway and mailer are
//! passed in so tests can substitute their own.

use std::sync::Arc;

use crate::api::AppState;
use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxCourseRepository, SqlxDegreeRepository,
    SqlxEnrollmentRepository, SqlxMentorshipRepository, SqlxOAuthRepository, SqlxOrderRepository,
    SqlxPostRepository, SqlxReferralRepository, SqlxSessionRepository, SqlxSubscriptionRepository,
    SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::gateway::PaymentGateway;
use crate::services::{
    Catalog, CategoryService, CommentService, CourseService, DashboardService, DashboardSources,
    DegreeService, EmailService, EnrollmentService, LoginRateLimiter, MentorshipService, OAuthService,
    PaymentService, PostService, ReferralService, SubscriptionService, TagService, UserService,
};
use crate::storage::StorageService;

pub fn build_state(
    config: Config,
    pool: DynDatabasePool,
    gateway: Arc<dyn PaymentGateway>,
    email: Arc<EmailService>,
) -> AppState {
    let cache = create_cache(&config.cache);

    // Repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let oauth_repo = SqlxOAuthRepository::boxed(pool.clone());
    let course_repo = SqlxCourseRepository::boxed(pool.clone());
    let enrollment_repo = SqlxEnrollmentRepository::boxed(pool.clone());
    let degree_repo = SqlxDegreeRepository::boxed(pool.clone());
    let mentorship_repo = SqlxMentorshipRepository::boxed(pool.clone());
    let post_repo = SqlxPostRepository::boxed(pool.clone());
    let category_repo = SqlxCategoryRepository::boxed(pool.clone());
    let tag_repo = SqlxTagRepository::boxed(pool.clone());
    let comment_repo = SqlxCommentRepository::boxed(pool.clone());
    let order_repo = SqlxOrderRepository::boxed(pool.clone());
    let referral_repo = SqlxReferralRepository::boxed(pool.clone());
    let subscription_repo = SqlxSubscriptionRepository::boxed(pool.clone());

    // Services
    let user_service = Arc::new(UserService::with_session_days(
        user_repo.clone(),
        session_repo,
        config.auth.session_days,
    ));
    let oauth_service = Arc::new(OAuthService::new(
        &config.auth,
        &config.server.base_url,
        oauth_repo,
        user_service.clone(),
    ));
    let course_service = Arc::new(CourseService::new(
        course_repo.clone(),
        user_repo.clone(),
        enrollment_repo.clone(),
        cache.clone(),
    ));
    let enrollment_service = Arc::new(EnrollmentService::new(
        enrollment_repo.clone(),
        course_repo.clone(),
        email.clone(),
    ));
    let degree_service = Arc::new(DegreeService::new(
        degree_repo,
        course_repo.clone(),
        enrollment_repo.clone(),
        email.clone(),
    ));
    let mentorship_service = Arc::new(MentorshipService::new(
        mentorship_repo.clone(),
        user_repo.clone(),
        email.clone(),
        config.mentorship.clone(),
    ));
    let category_service = Arc::new(CategoryService::new(category_repo));
    let tag_service = Arc::new(TagService::new(tag_repo));
    let post_service = Arc::new(PostService::new(
        post_repo.clone(),
        user_repo.clone(),
        category_service.clone(),
        tag_service.clone(),
        cache.clone(),
    ));
    let comment_service = Arc::new(CommentService::new(comment_repo.clone(), post_repo.clone()));
    let referral_service = Arc::new(ReferralService::new(
        referral_repo.clone(),
        config.referral.clone(),
    ));
    let subscription_service = Arc::new(SubscriptionService::new(
        subscription_repo.clone(),
        cache,
    ));
    let payment_service = Arc::new(PaymentService::new(
        order_repo.clone(),
        user_repo.clone(),
        gateway,
        Catalog {
            courses: course_service.clone(),
            enrollments: enrollment_service.clone(),
            degrees: degree_service.clone(),
            mentorship: mentorship_service.clone(),
            subscriptions: subscription_service.clone(),
        },
        referral_service.clone(),
        email,
    ));
    let dashboard_service = Arc::new(DashboardService::new(DashboardSources {
        users: user_repo,
        courses: course_repo,
        enrollments: enrollment_repo,
        orders: order_repo,
        posts: post_repo,
        comments: comment_repo,
        mentorship: mentorship_repo,
        subscriptions: subscription_repo,
        referrals: referral_repo,
    }));
    let storage = Arc::new(StorageService::new(&config.storage, config.upload.clone()));

    AppState {
        pool,
        config: Arc::new(config),
        user_service,
        oauth_service,
        course_service,
        enrollment_service,
        degree_service,
        mentorship_service,
        post_service,
        category_service,
        tag_service,
        comment_service,
        payment_service,
        referral_service,
        subscription_service,
        dashboard_service,
        storage,
        rate_limiter: Arc::new(LoginRateLimiter::new()),
    }
}
