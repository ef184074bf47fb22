//! Per-view state owners and the services behind them.
//!
//! Each hook owns its cached state, exposes operations that resolve to
//! `bool` (with the failure message kept in the view), and keeps itself in
//! step with the backend through the change feed.

pub mod auth;
pub mod average_rating;
pub mod catalog;
pub mod comments;
pub mod favorites;
pub mod ratings;
