//! Payment service
//!
//! Checkout runs in three steps:
//!
//! 1. [`PaymentService::create_order`] prices the item, applies a referral
//!    discount and opens a gateway order.
//! 2. The client pays through the gateway widget.
//! 3. [`PaymentService::verify`] (or the `payment.captured` webhook) checks
//!    the signature and settles the payment.
//!
//! Settling is a compare-and-set on the unsettled payment, so whichever of
//! verification and webhook arrives first fulfils the order and the other
//! becomes a no-op. A declined attempt does not close the order: the
//! customer may retry on the same gateway order and the paid retry settles.

use std::sync::Arc;

use crate::db::repositories::{OrderRepository, UserRepository};
use crate::gateway::{CreateOrderRequest, GatewayError, PaymentGateway, WebhookEvent};
use crate::models::{
    CheckoutOrder, CreateOrderInput, ItemType, ListParams, NewOrder, Order, PagedResult, Payment,
    PaymentFilter, PaymentStatus, PaymentWithOrder, PublishStatus, User, VerifyPaymentInput,
};
use crate::services::course::{CourseService, CourseServiceError};
use crate::services::degree::{DegreeService, DegreeServiceError};
use crate::services::email::EmailService;
use crate::services::enrollment::{EnrollmentService, EnrollmentServiceError};
use crate::services::mentorship::{MentorshipService, MentorshipServiceError};
use crate::services::referral::{ReferralError, ReferralService};
use crate::services::subscription::{SubscriptionService, SubscriptionServiceError};

#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not allowed to access this order")]
    Forbidden,

    #[error("You already have access to this item")]
    AlreadyOwned,

    #[error("Item is not available: {0}")]
    Unavailable(String),

    #[error("Payment was already processed")]
    AlreadyProcessed,

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Only successful payments can be refunded")]
    NotRefundable,

    #[error(transparent)]
    Referral(ReferralError),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ReferralError> for PaymentServiceError {
    fn from(err: ReferralError) -> Self {
        match err {
            ReferralError::InternalError(e) => PaymentServiceError::InternalError(e),
            other => PaymentServiceError::Referral(other),
        }
    }
}

impl From<CourseServiceError> for PaymentServiceError {
    fn from(err: CourseServiceError) -> Self {
        match err {
            CourseServiceError::NotFound(what) => PaymentServiceError::NotFound(what),
            CourseServiceError::InternalError(e) => PaymentServiceError::InternalError(e),
            other => PaymentServiceError::ValidationError(other.to_string()),
        }
    }
}

impl From<EnrollmentServiceError> for PaymentServiceError {
    fn from(err: EnrollmentServiceError) -> Self {
        match err {
            EnrollmentServiceError::NotFound(what) => PaymentServiceError::NotFound(what),
            EnrollmentServiceError::InternalError(e) => PaymentServiceError::InternalError(e),
            other => PaymentServiceError::ValidationError(other.to_string()),
        }
    }
}

impl From<DegreeServiceError> for PaymentServiceError {
    fn from(err: DegreeServiceError) -> Self {
        match err {
            DegreeServiceError::NotFound(what) => PaymentServiceError::NotFound(what),
            DegreeServiceError::InternalError(e) => PaymentServiceError::InternalError(e),
            other => PaymentServiceError::ValidationError(other.to_string()),
        }
    }
}

impl From<MentorshipServiceError> for PaymentServiceError {
    fn from(err: MentorshipServiceError) -> Self {
        match err {
            MentorshipServiceError::NotFound(what) => PaymentServiceError::NotFound(what),
            MentorshipServiceError::ProgramFull => PaymentServiceError::Unavailable("program is full".into()),
            MentorshipServiceError::InternalError(e) => PaymentServiceError::InternalError(e),
            other => PaymentServiceError::ValidationError(other.to_string()),
        }
    }
}

impl From<SubscriptionServiceError> for PaymentServiceError {
    fn from(err: SubscriptionServiceError) -> Self {
        match err {
            SubscriptionServiceError::NotFound(id) => PaymentServiceError::NotFound(format!("plan {}", id)),
            SubscriptionServiceError::InternalError(e) => PaymentServiceError::InternalError(e),
            other => PaymentServiceError::ValidationError(other.to_string()),
        }
    }
}

/// Services that sell items and grant them once paid
#[derive(Clone)]
pub struct Catalog {
    pub courses: Arc<CourseService>,
    pub enrollments: Arc<EnrollmentService>,
    pub degrees: Arc<DegreeService>,
    pub mentorship: Arc<MentorshipService>,
    pub subscriptions: Arc<SubscriptionService>,
}

/// Price and label of something being bought
#[derive(Debug, Clone)]
struct PurchaseItem {
    title: String,
    price: i64,
    currency: String,
}

/// What a webhook delivery did
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    /// The payment was settled by this delivery
    Captured,
    Failed,
    /// Valid delivery with nothing left to do
    Ignored,
}

pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Catalog,
    referrals: Arc<ReferralService>,
    email: Arc<EmailService>,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserRepository>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Catalog,
        referrals: Arc<ReferralService>,
        email: Arc<EmailService>,
    ) -> Self {
        Self {
            orders,
            users,
            gateway,
            catalog,
            referrals,
            email,
        }
    }

    /// Price the item and open a gateway order for it
    ///
    /// # Errors
    /// - `NotFound` if the item does not exist or is not on sale
    /// - `AlreadyOwned` if the user already has access
    /// - `Referral` if the referral code is rejected
    /// - `Gateway` if the gateway order could not be created; the local
    ///   order is marked failed
    pub async fn create_order(&self, user: &User, input: CreateOrderInput) -> Result<CheckoutOrder, PaymentServiceError> {
        let item = self.resolve_item(user, input.item_type, input.item_id).await?;
        if item.price <= 0 {
            return Err(PaymentServiceError::ValidationError(
                "This item is free; enroll directly".into(),
            ));
        }

        let referral = match input.referral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(self.referrals.validate(user, code, Some(item.price)).await?),
            _ => None,
        };
        let discount = referral
            .as_ref()
            .and_then(|r| r.discount_amount)
            .unwrap_or(0)
            .clamp(0, item.price);
        let amount = item.price - discount;
        if amount == 0 {
            return Err(PaymentServiceError::ValidationError(
                "Discount covers the full price; nothing to pay".into(),
            ));
        }

        let (order, _payment) = self
            .orders
            .create(&NewOrder {
                user_id: user.id,
                item_type: input.item_type,
                item_id: input.item_id,
                amount,
                original_amount: item.price,
                discount_amount: discount,
                currency: item.currency.clone(),
                referral_code: referral.map(|r| r.code),
            })
            .await?;

        let gateway_order = match self
            .gateway
            .create_order(&CreateOrderRequest {
                amount,
                currency: item.currency.clone(),
                receipt: order.id.to_string(),
            })
            .await
        {
            Ok(gateway_order) => gateway_order,
            Err(e) => {
                tracing::error!(order_id = order.id, "Gateway order creation failed: {}", e);
                self.orders.mark_failed(order.id, None, &e.to_string()).await?;
                return Err(e.into());
            }
        };
        self.orders.set_gateway_order_id(order.id, &gateway_order.id).await?;

        tracing::info!(
            order_id = order.id,
            gateway_order_id = %gateway_order.id,
            user_id = user.id,
            item_type = %input.item_type,
            item_id = input.item_id,
            amount,
            "Payment order created"
        );

        Ok(CheckoutOrder {
            order_id: order.id,
            gateway_order_id: gateway_order.id,
            amount,
            original_amount: item.price,
            discount_amount: discount,
            currency: item.currency,
            key_id: self.gateway.key_id().to_string(),
            item_type: input.item_type,
            item_id: input.item_id,
            title: item.title,
        })
    }

    /// Settle a payment from the checkout callback
    ///
    /// A bad signature leaves the payment unsettled. A second verification
    /// of a settled payment fails with `AlreadyProcessed`.
    pub async fn verify(&self, user: &User, input: VerifyPaymentInput) -> Result<Payment, PaymentServiceError> {
        let order = self
            .orders
            .get_order_by_gateway_id(&input.gateway_order_id)
            .await?
            .ok_or_else(|| PaymentServiceError::NotFound(format!("order {}", input.gateway_order_id)))?;
        if order.user_id != user.id {
            return Err(PaymentServiceError::Forbidden);
        }

        if !self.gateway.verify_payment_signature(
            &input.gateway_order_id,
            &input.gateway_payment_id,
            &input.signature,
        ) {
            tracing::warn!(order_id = order.id, user_id = user.id, "Payment signature mismatch");
            return Err(PaymentServiceError::InvalidSignature);
        }

        if !self
            .settle(&order, &input.gateway_payment_id, Some(&input.signature))
            .await?
        {
            return Err(PaymentServiceError::AlreadyProcessed);
        }

        self.orders
            .get_payment_by_order(order.id)
            .await?
            .ok_or_else(|| PaymentServiceError::NotFound(format!("payment for order {}", order.id)))
    }

    /// Handle a signed webhook delivery
    pub async fn handle_webhook(&self, body: &[u8], signature: &str) -> Result<WebhookOutcome, PaymentServiceError> {
        if !self.gateway.verify_webhook_signature(body, signature) {
            tracing::warn!("Webhook signature mismatch");
            return Err(PaymentServiceError::InvalidSignature);
        }
        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| PaymentServiceError::ValidationError(format!("Invalid webhook payload: {}", e)))?;

        let handled = matches!(event.event.as_str(), "payment.captured" | "payment.failed");
        let Some(payment) = event.payment().filter(|_| handled) else {
            tracing::debug!(event = %event.event, "Webhook event ignored");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(gateway_order_id) = payment.order_id.as_deref() else {
            tracing::warn!(event = %event.event, payment_id = %payment.id, "Webhook payment without order id");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(order) = self.orders.get_order_by_gateway_id(gateway_order_id).await? else {
            tracing::warn!(gateway_order_id, "Webhook for unknown order");
            return Ok(WebhookOutcome::Ignored);
        };

        if event.event == "payment.captured" {
            if self.settle(&order, &payment.id, None).await? {
                return Ok(WebhookOutcome::Captured);
            }
        } else {
            let reason = payment.error_description.as_deref().unwrap_or("Payment failed");
            if self.orders.mark_failed(order.id, Some(&payment.id), reason).await? {
                tracing::info!(order_id = order.id, reason, "Payment failed");
                return Ok(WebhookOutcome::Failed);
            }
        }
        Ok(WebhookOutcome::Ignored)
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<PaymentWithOrder>, PaymentServiceError> {
        self.list(
            &PaymentFilter {
                status: None,
                user_id: Some(user_id),
            },
            params,
        )
        .await
    }

    pub async fn list(
        &self,
        filter: &PaymentFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PaymentWithOrder>, PaymentServiceError> {
        let (items, total) = self.orders.list(filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Successful payment count and revenue in minor units
    pub async fn revenue(&self) -> Result<(i64, i64), PaymentServiceError> {
        Ok(self.orders.revenue().await?)
    }

    /// Refund a successful payment in full and revoke what it granted
    pub async fn refund(&self, payment_id: i64) -> Result<Payment, PaymentServiceError> {
        let payment = self
            .orders
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentServiceError::NotFound(format!("payment {}", payment_id)))?;
        if payment.status != PaymentStatus::Success {
            return Err(PaymentServiceError::NotRefundable);
        }
        let gateway_payment_id = payment
            .gateway_payment_id
            .as_deref()
            .ok_or(PaymentServiceError::NotRefundable)?;

        // Only the claimant talks to the gateway
        if !self.orders.claim_refund(payment.id).await? {
            return Err(PaymentServiceError::NotRefundable);
        }
        let refund = match self.gateway.refund(gateway_payment_id, payment.amount).await {
            Ok(refund) => refund,
            Err(e) => {
                tracing::error!(payment_id, "Gateway refund failed: {}", e);
                self.orders.release_refund(payment.id).await?;
                return Err(e.into());
            }
        };
        if !self.orders.mark_refunded(payment.id, &refund.id).await? {
            return Err(PaymentServiceError::NotRefundable);
        }

        let order = self
            .orders
            .get_order(payment.order_id)
            .await?
            .ok_or_else(|| PaymentServiceError::NotFound(format!("order {}", payment.order_id)))?;
        self.revoke(&order).await?;

        tracing::info!(payment_id, order_id = order.id, refund_id = %refund.id, "Payment refunded");
        self.orders
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentServiceError::NotFound(format!("payment {}", payment_id)))
    }

    /// Mark the payment successful and fulfil the order. Returns false when
    /// the payment was already settled.
    async fn settle(
        &self,
        order: &Order,
        gateway_payment_id: &str,
        signature: Option<&str>,
    ) -> Result<bool, PaymentServiceError> {
        if !self.orders.mark_success(order.id, gateway_payment_id, signature).await? {
            tracing::info!(order_id = order.id, "Payment already settled");
            return Ok(false);
        }
        tracing::info!(order_id = order.id, gateway_payment_id, amount = order.amount, "Payment captured");

        if let Err(e) = self.fulfil(order).await {
            tracing::error!(order_id = order.id, "Fulfilment failed after payment: {}", e);
            return Err(e);
        }
        self.record_referral(order).await;
        self.send_receipt(order, gateway_payment_id).await;
        Ok(true)
    }

    async fn fulfil(&self, order: &Order) -> Result<(), PaymentServiceError> {
        let (user_id, item_id, order_id) = (order.user_id, order.item_id, order.id);
        match order.item_type {
            ItemType::Course => self.catalog.enrollments.grant_access(user_id, item_id, order_id).await?,
            ItemType::Degree => self.catalog.degrees.grant_access(user_id, item_id, order_id).await?,
            ItemType::Mentorship => self.catalog.mentorship.grant_access(user_id, item_id, order_id).await?,
            ItemType::Subscription => {
                self.catalog.subscriptions.fulfil(user_id, item_id, order_id).await?;
            }
        }
        Ok(())
    }

    async fn revoke(&self, order: &Order) -> Result<(), PaymentServiceError> {
        let revoked = match order.item_type {
            ItemType::Course => self.catalog.enrollments.revoke_by_order(order.id).await?,
            ItemType::Degree => self.catalog.degrees.revoke_by_order(order.id).await?,
            ItemType::Mentorship => self.catalog.mentorship.revoke_by_order(order.id).await?,
            ItemType::Subscription => self.catalog.subscriptions.cancel_by_order(order.id).await?,
        };
        tracing::debug!(order_id = order.id, revoked, "Access revoked");
        Ok(())
    }

    /// Referral bookkeeping never fails a settled payment
    async fn record_referral(&self, order: &Order) {
        let Some(code) = order.referral_code.as_deref() else {
            return;
        };
        let result = match self.referrals.get_code(code).await {
            Ok(Some(referral_code)) => {
                self.referrals
                    .record_redemption(&referral_code, order.user_id, order.id, order.discount_amount, order.amount)
                    .await
            }
            Ok(None) => {
                tracing::warn!(order_id = order.id, code, "Referral code vanished before redemption");
                return;
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(order_id = order.id, code, "Failed to record referral: {}", e);
        }
    }

    async fn send_receipt(&self, order: &Order, gateway_payment_id: &str) {
        let user = match self.users.get_by_id(order.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(order_id = order.id, "Failed to load user for receipt: {}", e);
                return;
            }
        };
        let title = self.item_title(order.item_type, order.item_id).await;
        if let Err(e) = self
            .email
            .send_payment_receipt(&user.email, &user.name, &title, order.amount, &order.currency, gateway_payment_id)
            .await
        {
            tracing::warn!(order_id = order.id, "Failed to send payment receipt: {}", e);
        }
    }

    async fn item_title(&self, item_type: ItemType, item_id: i64) -> String {
        let title = match item_type {
            ItemType::Course => self.catalog.courses.get_by_id(item_id).await.ok().map(|c| c.title),
            ItemType::Degree => self.catalog.degrees.get_by_id(item_id).await.ok().map(|d| d.title),
            ItemType::Mentorship => self.catalog.mentorship.get_program(item_id).await.ok().map(|p| p.title),
            ItemType::Subscription => self.catalog.subscriptions.get_plan(item_id).await.ok().map(|p| p.name),
        };
        title.unwrap_or_else(|| format!("{} #{}", item_type, item_id))
    }

    /// Look up what is being bought and check the user may buy it
    async fn resolve_item(
        &self,
        user: &User,
        item_type: ItemType,
        item_id: i64,
    ) -> Result<PurchaseItem, PaymentServiceError> {
        let not_found = || PaymentServiceError::NotFound(format!("{} {}", item_type, item_id));
        match item_type {
            ItemType::Course => {
                let course = self.catalog.courses.get_by_id(item_id).await?;
                if !course.is_published() {
                    return Err(not_found());
                }
                if self.catalog.enrollments.has_access(user.id, item_id).await? {
                    return Err(PaymentServiceError::AlreadyOwned);
                }
                Ok(PurchaseItem {
                    title: course.title,
                    price: course.price,
                    currency: course.currency,
                })
            }
            ItemType::Degree => {
                let program = self.catalog.degrees.get_by_id(item_id).await?;
                if program.status != PublishStatus::Published {
                    return Err(not_found());
                }
                if self.catalog.degrees.has_access(user.id, item_id).await? {
                    return Err(PaymentServiceError::AlreadyOwned);
                }
                Ok(PurchaseItem {
                    title: program.title,
                    price: program.price,
                    currency: program.currency,
                })
            }
            ItemType::Mentorship => {
                let program = self.catalog.mentorship.get_published_program(item_id).await?;
                if program.mentor_id == user.id {
                    return Err(PaymentServiceError::ValidationError(
                        "Mentors cannot enroll in their own program".into(),
                    ));
                }
                if self.catalog.mentorship.has_access(user.id, item_id).await? {
                    return Err(PaymentServiceError::AlreadyOwned);
                }
                self.catalog.mentorship.ensure_capacity(&program).await?;
                Ok(PurchaseItem {
                    title: program.title,
                    price: program.price,
                    currency: program.currency,
                })
            }
            // Buying a plan while subscribed extends the current period
            ItemType::Subscription => {
                let plan = self.catalog.subscriptions.get_plan(item_id).await?;
                if !plan.active {
                    return Err(not_found());
                }
                Ok(PurchaseItem {
                    title: plan.name,
                    price: plan.price,
                    currency: plan.currency,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::{MentorshipConfig, ReferralConfig};
    use crate::db::repositories::test_support::{insert_course, insert_lessons, insert_user, setup_pool};
    use crate::db::repositories::{
        EnrollmentRepository, ReferralRepository, SqlxCourseRepository, SqlxDegreeRepository,
        SqlxEnrollmentRepository, SqlxMentorshipRepository, SqlxOrderRepository, SqlxReferralRepository,
        SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::gateway::{signature, GatewayOrder, GatewayRefund};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const KEY_SECRET: &str = "test_key_secret";
    const WEBHOOK_SECRET: &str = "test_webhook_secret";

    /// In-process gateway signing with fixed secrets
    #[derive(Default)]
    struct MockGateway {
        fail_orders: AtomicBool,
        fail_refunds: AtomicBool,
        refunds: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        fn key_id(&self) -> &str {
            "rzp_test_key"
        }

        async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
            if self.fail_orders.load(Ordering::SeqCst) {
                return Err(GatewayError::Request("connection refused".into()));
            }
            Ok(GatewayOrder {
                id: format!("order_mock_{}", request.receipt),
                amount: request.amount,
                currency: request.currency.clone(),
                status: "created".into(),
            })
        }

        async fn refund(&self, gateway_payment_id: &str, amount: i64) -> Result<GatewayRefund, GatewayError> {
            if self.fail_refunds.load(Ordering::SeqCst) {
                return Err(GatewayError::Request("refund rejected".into()));
            }
            self.refunds.fetch_add(1, Ordering::SeqCst);
            Ok(GatewayRefund {
                id: format!("rfnd_{}", gateway_payment_id),
                amount,
                status: "processed".into(),
            })
        }

        fn verify_payment_signature(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
            signature::verify_payment_signature(KEY_SECRET, gateway_order_id, gateway_payment_id, signature)
        }

        fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
            signature::verify_webhook_signature(WEBHOOK_SECRET, body, signature)
        }
    }

    struct Fixture {
        service: PaymentService,
        gateway: Arc<MockGateway>,
        pool: DynDatabasePool,
        buyer: User,
        course_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = setup_pool().await;
        let cache = Arc::new(MemoryCache::new());
        let email = Arc::new(EmailService::disabled());
        let users = SqlxUserRepository::boxed(pool.clone());
        let courses = SqlxCourseRepository::boxed(pool.clone());
        let enrollments = SqlxEnrollmentRepository::boxed(pool.clone());

        let catalog = Catalog {
            courses: Arc::new(CourseService::new(
                courses.clone(),
                users.clone(),
                enrollments.clone(),
                cache.clone(),
            )),
            enrollments: Arc::new(EnrollmentService::new(enrollments.clone(), courses.clone(), email.clone())),
            degrees: Arc::new(DegreeService::new(
                SqlxDegreeRepository::boxed(pool.clone()),
                courses.clone(),
                enrollments.clone(),
                email.clone(),
            )),
            mentorship: Arc::new(MentorshipService::new(
                SqlxMentorshipRepository::boxed(pool.clone()),
                users.clone(),
                email.clone(),
                MentorshipConfig::default(),
            )),
            subscriptions: Arc::new(SubscriptionService::new(
                SqlxSubscriptionRepository::boxed(pool.clone()),
                cache,
            )),
        };
        let referrals = Arc::new(ReferralService::new(
            SqlxReferralRepository::boxed(pool.clone()),
            ReferralConfig::default(),
        ));
        let gateway = Arc::new(MockGateway::default());
        let service = PaymentService::new(
            SqlxOrderRepository::boxed(pool.clone()),
            users.clone(),
            gateway.clone(),
            catalog,
            referrals,
            email,
        );

        let instructor = insert_user(&pool, "instructor@example.com").await;
        let course_id = insert_course(&pool, instructor, "rust-101", 99_900, PublishStatus::Published).await;
        insert_lessons(&pool, course_id, 2).await;
        let buyer_id = insert_user(&pool, "buyer@example.com").await;
        let buyer = users.get_by_id(buyer_id).await.unwrap().unwrap();

        Fixture {
            service,
            gateway,
            pool,
            buyer,
            course_id,
        }
    }

    fn course_order(course_id: i64, referral_code: Option<String>) -> CreateOrderInput {
        CreateOrderInput {
            item_type: ItemType::Course,
            item_id: course_id,
            referral_code,
        }
    }

    fn signed(checkout: &CheckoutOrder, payment_id: &str) -> VerifyPaymentInput {
        VerifyPaymentInput {
            gateway_order_id: checkout.gateway_order_id.clone(),
            gateway_payment_id: payment_id.into(),
            signature: signature::payment_signature(KEY_SECRET, &checkout.gateway_order_id, payment_id),
        }
    }

    #[tokio::test]
    async fn test_checkout_verifies_once_and_enrolls() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();
        assert_eq!(checkout.amount, 99_900);
        assert_eq!(checkout.discount_amount, 0);
        assert_eq!(checkout.key_id, "rzp_test_key");
        assert_eq!(checkout.title, "rust-101");

        let payment = f.service.verify(&f.buyer, signed(&checkout, "pay_1")).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_1"));

        let enrollment = SqlxEnrollmentRepository::new(f.pool.clone())
            .get(f.buyer.id, f.course_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.order_id, Some(checkout.order_id));

        assert!(matches!(
            f.service.verify(&f.buyer, signed(&checkout, "pay_1")).await,
            Err(PaymentServiceError::AlreadyProcessed)
        ));
        assert!(matches!(
            f.service.create_order(&f.buyer, course_order(f.course_id, None)).await,
            Err(PaymentServiceError::AlreadyOwned)
        ));
        assert_eq!(f.service.revenue().await.unwrap(), (1, 99_900));
    }

    #[tokio::test]
    async fn test_tampered_signature_leaves_payment_pending() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();

        let mut input = signed(&checkout, "pay_1");
        input.gateway_payment_id = "pay_2".into();
        assert!(matches!(
            f.service.verify(&f.buyer, input).await,
            Err(PaymentServiceError::InvalidSignature)
        ));

        let history = f.service.list_for_user(f.buyer.id, &ListParams::default()).await.unwrap();
        assert_eq!(history.items[0].payment.status, PaymentStatus::Pending);

        // Someone else's order
        let other_id = insert_user(&f.pool, "other@example.com").await;
        let other = SqlxUserRepository::new(f.pool.clone()).get_by_id(other_id).await.unwrap().unwrap();
        assert!(matches!(
            f.service.verify(&other, signed(&checkout, "pay_1")).await,
            Err(PaymentServiceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_marks_order_failed() {
        let f = setup().await;
        f.gateway.fail_orders.store(true, Ordering::SeqCst);

        let result = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await;
        assert!(matches!(result, Err(PaymentServiceError::Gateway(_))));

        let history = f.service.list_for_user(f.buyer.id, &ListParams::default()).await.unwrap();
        assert_eq!(history.items[0].payment.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_referral_discount_and_credit() {
        let f = setup().await;
        let referrer_id = insert_user(&f.pool, "referrer@example.com").await;
        let referrer = SqlxUserRepository::new(f.pool.clone()).get_by_id(referrer_id).await.unwrap().unwrap();
        let referrals = ReferralService::new(SqlxReferralRepository::boxed(f.pool.clone()), ReferralConfig::default());
        let code = referrals.get_or_create_code(&referrer).await.unwrap();

        let checkout = f
            .service
            .create_order(&f.buyer, course_order(f.course_id, Some(code.code.to_lowercase())))
            .await
            .unwrap();
        assert_eq!(checkout.original_amount, 99_900);
        assert_eq!(checkout.discount_amount, 9_990);
        assert_eq!(checkout.amount, 89_910);

        f.service.verify(&f.buyer, signed(&checkout, "pay_ref")).await.unwrap();

        let code = SqlxReferralRepository::new(f.pool.clone())
            .get_code(&code.code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.uses, 1);
        assert_eq!(code.earned_credit, 8_991);

        // Self-referral is rejected before any order exists
        assert!(matches!(
            f.service
                .create_order(&referrer, course_order(f.course_id, Some(code.code.clone())))
                .await,
            Err(PaymentServiceError::Referral(ReferralError::SelfReferral))
        ));
    }

    #[tokio::test]
    async fn test_webhook_capture_and_failure() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();

        let body = serde_json::json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_hook",
                "order_id": checkout.gateway_order_id,
                "amount": checkout.amount,
                "status": "captured"
            }}}
        })
        .to_string();
        let sig = signature::sign(WEBHOOK_SECRET, body.as_bytes());

        assert!(matches!(
            f.service.handle_webhook(body.as_bytes(), "deadbeef").await,
            Err(PaymentServiceError::InvalidSignature)
        ));
        assert_eq!(
            f.service.handle_webhook(body.as_bytes(), &sig).await.unwrap(),
            WebhookOutcome::Captured
        );
        // Redelivery and the late client verification are both no-ops
        assert_eq!(
            f.service.handle_webhook(body.as_bytes(), &sig).await.unwrap(),
            WebhookOutcome::Ignored
        );
        assert!(matches!(
            f.service.verify(&f.buyer, signed(&checkout, "pay_hook")).await,
            Err(PaymentServiceError::AlreadyProcessed)
        ));

        let unknown = r#"{"event":"refund.created"}"#;
        let sig = signature::sign(WEBHOOK_SECRET, unknown.as_bytes());
        assert_eq!(
            f.service.handle_webhook(unknown.as_bytes(), &sig).await.unwrap(),
            WebhookOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_webhook_failure_marks_pending_payment_failed() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();

        let body = serde_json::json!({
            "event": "payment.failed",
            "payload": {"payment": {"entity": {
                "id": "pay_bad",
                "order_id": checkout.gateway_order_id,
                "error_description": "Card declined"
            }}}
        })
        .to_string();
        let sig = signature::sign(WEBHOOK_SECRET, body.as_bytes());
        assert_eq!(
            f.service.handle_webhook(body.as_bytes(), &sig).await.unwrap(),
            WebhookOutcome::Failed
        );

        let history = f.service.list_for_user(f.buyer.id, &ListParams::default()).await.unwrap();
        let payment = &history.items[0].payment;
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("Card declined"));
    }

    #[tokio::test]
    async fn test_paid_retry_after_declined_attempt() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();

        let declined = serde_json::json!({
            "event": "payment.failed",
            "payload": {"payment": {"entity": {
                "id": "pay_attempt1",
                "order_id": checkout.gateway_order_id,
                "error_description": "Card declined"
            }}}
        })
        .to_string();
        let sig = signature::sign(WEBHOOK_SECRET, declined.as_bytes());
        assert_eq!(
            f.service.handle_webhook(declined.as_bytes(), &sig).await.unwrap(),
            WebhookOutcome::Failed
        );

        let payment = f.service.verify(&f.buyer, signed(&checkout, "pay_attempt2")).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_attempt2"));
        assert_eq!(payment.failure_reason, None);

        let enrollment = SqlxEnrollmentRepository::new(f.pool.clone())
            .get(f.buyer.id, f.course_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.order_id, Some(checkout.order_id));

        // The captured webhook for the retry is then a no-op
        let captured = serde_json::json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_attempt2",
                "order_id": checkout.gateway_order_id,
                "amount": checkout.amount,
                "status": "captured"
            }}}
        })
        .to_string();
        let sig = signature::sign(WEBHOOK_SECRET, captured.as_bytes());
        assert_eq!(
            f.service.handle_webhook(captured.as_bytes(), &sig).await.unwrap(),
            WebhookOutcome::Ignored
        );
        // A late failure for the first attempt cannot undo the settlement
        let sig = signature::sign(WEBHOOK_SECRET, declined.as_bytes());
        assert_eq!(
            f.service.handle_webhook(declined.as_bytes(), &sig).await.unwrap(),
            WebhookOutcome::Ignored
        );
        assert_eq!(f.service.revenue().await.unwrap(), (1, 99_900));
    }

    #[tokio::test]
    async fn test_concurrent_refunds_reach_gateway_once() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();
        let payment = f.service.verify(&f.buyer, signed(&checkout, "pay_c")).await.unwrap();

        let (first, second) = tokio::join!(f.service.refund(payment.id), f.service.refund(payment.id));
        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        assert!(matches!(
            first.err().or(second.err()),
            Some(PaymentServiceError::NotRefundable)
        ));
        assert_eq!(f.gateway.refunds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_refund_can_be_retried() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();
        let payment = f.service.verify(&f.buyer, signed(&checkout, "pay_g")).await.unwrap();

        f.gateway.fail_refunds.store(true, Ordering::SeqCst);
        assert!(matches!(
            f.service.refund(payment.id).await,
            Err(PaymentServiceError::Gateway(_))
        ));
        let history = f.service.list_for_user(f.buyer.id, &ListParams::default()).await.unwrap();
        assert_eq!(history.items[0].payment.status, PaymentStatus::Success);

        f.gateway.fail_refunds.store(false, Ordering::SeqCst);
        let refunded = f.service.refund(payment.id).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(f.gateway.refunds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refund_revokes_enrollment() {
        let f = setup().await;
        let checkout = f.service.create_order(&f.buyer, course_order(f.course_id, None)).await.unwrap();
        let payment = f.service.verify(&f.buyer, signed(&checkout, "pay_r")).await.unwrap();

        let refunded = f.service.refund(payment.id).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.refund_id.as_deref(), Some("rfnd_pay_r"));

        let enrollment = SqlxEnrollmentRepository::new(f.pool.clone())
            .get(f.buyer.id, f.course_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!enrollment.grants_access());

        assert!(matches!(
            f.service.refund(payment.id).await,
            Err(PaymentServiceError::NotRefundable)
        ));
    }

    #[tokio::test]
    async fn test_rejects_free_and_unpublished_items() {
        let f = setup().await;
        let instructor = insert_user(&f.pool, "t2@example.com").await;
        let free = insert_course(&f.pool, instructor, "free", 0, PublishStatus::Published).await;
        let draft = insert_course(&f.pool, instructor, "draft", 5_000, PublishStatus::Draft).await;

        assert!(matches!(
            f.service.create_order(&f.buyer, course_order(free, None)).await,
            Err(PaymentServiceError::ValidationError(_))
        ));
        assert!(matches!(
            f.service.create_order(&f.buyer, course_order(draft, None)).await,
            Err(PaymentServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.create_order(&f.buyer, course_order(9_999, None)).await,
            Err(PaymentServiceError::NotFound(_))
        ));
    }
}
