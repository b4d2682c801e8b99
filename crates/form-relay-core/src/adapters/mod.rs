//! # Store Adapters
//!
//! Infrastructure implementations of the engine's persistence traits. Only
//! the in-memory variants live here; the relational implementations belong
//! to the application's storage layer.

mod memory;

pub use memory::{
    MemoryDeliveryLogStore, MemoryIntegrationStore, MemorySubscriptionStore, MemoryWebhookStore,
};
