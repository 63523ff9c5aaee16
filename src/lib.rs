//! Kalpla - E-learning and startup mentorship platform
//!
//! This library provides the backend of the Kalpla platform: courses and
//! degree programs, mentorship booking, a blog, Razorpay checkout with
//! referrals and subscriptions, and the JSON API over all of it.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod gateway;
pub mod models;
pub mod services;
pub mod storage;
