pub mod change_event;
pub mod notification;
pub mod plan;
pub mod reconnect_policy;
pub mod subscription;
