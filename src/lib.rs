//! Nimbus Provider SDK
//!
//! This crate provides the building blocks for declarative cloud
//! infrastructure providers: drive remote resources through REST control
//! planes whose operations are asynchronous, paginated, and eventually
//! consistent, exposing a declarative create/read/update/delete surface on
//! top.
//!
//! # Overview
//!
//! The SDK provides:
//!
//! - **REST client**: Declarative request construction and execution ([`client`])
//! - **Path extraction**: Total dotted-path lookups over response documents ([`path`])
//! - **Error classification**: Business error codes mapped onto absence ([`classify`])
//! - **Pagination**: Offset and marker collection of multi-page listings ([`paginate`])
//! - **State-poll waiter**: Bounded polling of asynchronous transitions ([`waiter`])
//! - **Set reconciliation**: Diff-based convergence of tags and memberships ([`reconcile`])
//! - **Schema & validation**: Resource schemas with defaults, computed fields
//!   and immutability ([`schema`], [`validation`])
//! - **Lifecycle orchestration**: The four verbs plus import, composed from
//!   all of the above ([`resource`])
//! - **Logging**: Integration with `tracing` for structured logging ([`logging`])
//!
//! # Quick Start
//!
//! ```ignore
//! use nimbus_provider_sdk::{
//!     classify::NotFoundRule,
//!     client::RestClient,
//!     resource::{EndpointSpec, Orchestrator, ReadStrategy, ResourceSpec, WaitSpec},
//!     schema::{Attribute, Schema},
//! };
//! use reqwest::Method;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     nimbus_provider_sdk::init_logging();
//!
//!     let spec = ResourceSpec::new(
//!         "network",
//!         Schema::v0()
//!             .with_attribute("name", Attribute::required_string())
//!             .with_attribute("cidr", Attribute::required_string().with_force_new())
//!             .with_attribute("id", Attribute::computed_string())
//!             .with_attribute("status", Attribute::computed_string()),
//!         EndpointSpec::new(Method::POST, "v1/networks").with_body_root("network"),
//!         ReadStrategy::Get(EndpointSpec::new(Method::GET, "v1/networks/{id}")),
//!         EndpointSpec::new(Method::DELETE, "v1/networks/{id}"),
//!         "network.id",
//!     )
//!     .with_not_found_rules(vec![NotFoundRule::on_400("error_code", &["VPC.0202"])])
//!     .with_wait(WaitSpec::new("network.status", &["ACTIVE"], &["ERROR"], &["DELETED"]));
//!
//!     let orchestrator = Orchestrator::new(RestClient::new("https://cloud.example.com")?);
//!     let (id, state) = orchestrator
//!         .create(&spec, &json!({"name": "net", "cidr": "10.0.0.0/16"}))
//!         .await?;
//!     tracing::info!(%id, "network ready");
//!     orchestrator.delete(&spec, &id).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod client;
pub mod error;
pub mod logging;
pub mod paginate;
pub mod path;
pub mod reconcile;
pub mod resource;
pub mod schema;
pub mod testing;
pub mod validation;
pub mod waiter;

// Re-export main types at crate root
pub use classify::{apply_rules, NotFoundRule};
pub use client::{ApiRequest, RestClient};
pub use error::{ErrorClassification, ProviderError};
pub use logging::{init_logging, try_init_logging};
pub use paginate::{PageMode, Paginator};
pub use path::{path_search, path_str};
pub use reconcile::{diff_ids, diff_tags, MemberEquality, SetDiff, SetOps, Tag};
pub use resource::{
    parse_import_id, EndpointSpec, Orchestrator, ReadStrategy, ResourceSpec, TagSpec, UpdateGroup,
    WaitSpec,
};
pub use schema::{Attribute, AttributeType, Block, Diagnostic, DiagnosticSeverity, Schema};
pub use validation::{immutable_violations, is_valid, validate, validate_result};
pub use waiter::{AbsencePolicy, HttpRefresh, PollState, StateRefresh, StateWaiter, WaitConfig};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use reqwest;
pub use serde_json;
pub use tracing;
