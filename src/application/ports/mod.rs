//! Collaborator contracts consumed by the subscription use cases.

pub mod auth;
pub mod change_feed;
pub mod checkout;
pub mod subscription_store;
