//! OVHcloud provider plugin.
//!
//! Translates declarative resource state into REST calls against the
//! OVHcloud API, polling vendor-side asynchronous tasks until they reach
//! a terminal status. The host runtime drives the provider through the
//! [`ProviderService`] trait: CRUD, exists and import callbacks keyed by
//! the resource-schema field maps in [`schema`].
//!
//! # Resources
//!
//! | Type name | Vendor object |
//! |---|---|
//! | `ovh_domain_record` | DNS record in a domain zone |
//! | `ovh_publiccloud_private_network` | vRack-backed private network |
//! | `ovh_publiccloud_private_network_subnet` | Subnet of a private network |
//! | `ovh_publiccloud_user` | Public cloud project user |
//! | `ovh_vrack_publiccloud_attachment` | vRack ↔ project attachment |
//!
//! # Quick Start
//!
//! ```ignore
//! use ovh_provider::{init_logging, OvhProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = OvhProvider::new();
//!     provider.configure(json!({"endpoint": "ovh-eu"})).await?;
//!
//!     let state = provider
//!         .create("ovh_publiccloud_private_network", json!({
//!             "project_id": "0123456789",
//!             "name": "backend",
//!             "regions": ["GRA1", "SBG3"],
//!         }))
//!         .await?;
//!     println!("network id: {}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! Provider configuration defaults from the environment
//! (`OVH_ENDPOINT`, `OVH_APPLICATION_KEY`, `OVH_APPLICATION_SECRET`,
//! `OVH_CONSUMER_KEY`, `OS_AUTH_URL`, `OS_USERNAME`, `OS_PASSWORD`,
//! `OS_TENANT_NAME`, `OS_ENDPOINT_TYPE`), as do a few resource
//! attributes (`OVH_PROJECT_ID`, `OVH_VRACK_ID`,
//! `OVH_DOMAIN_DEFAULT_TTL`).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod poll;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{Credentials, Method, OvhClient, RestTransport, Transport};
pub use config::{Connection, ProviderConfig};
pub use error::{ApiError, ProviderError};
pub use logging::{init_logging, try_init_logging};
pub use poll::StateWaiter;
pub use provider::{OvhProvider, ProviderService, Resource};
pub use schema::ProviderSchema;
pub use types::{AttributeChange, ImportedResource, PlanResult};
pub use validation::{validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
