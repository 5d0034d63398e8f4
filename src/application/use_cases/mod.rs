pub mod polling_fallback;
pub mod subscription_management;
pub mod subscription_tracker;
