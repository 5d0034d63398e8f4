//! Test utilities shared by the unit tests.
//!
//! This module provides:
//! - Fixture factories with sensible defaults and override closures
//! - In-memory implementations of the store, feed, auth and checkout ports

mod factories;
mod feed_mocks;
mod gateway_mocks;
mod store_mocks;

pub use factories::*;
pub use feed_mocks::*;
pub use gateway_mocks::*;
pub use store_mocks::*;

/// Lets spawned tasks run until they block, without advancing a paused clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
