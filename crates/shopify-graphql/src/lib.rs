//! Shopify GraphQL - Admin API gateway for application code.
//!
//! This crate provides:
//! - A bundled introspection schema, loaded once per process.
//! - Parsing of query text with root-field validation and caller locations.
//! - Query execution against `<site>/admin/api/graphql.json`, with site and
//!   headers resolved from an [`ApiContext`] on every request.
//! - An error taxonomy that separates throttling ([`GatewayError::Throttled`])
//!   from request errors ([`GatewayError::Graphql`]).
//!
//! The bundled `schema.json` is a small fixture covering a handful of Admin
//! API root fields. Deployments must replace it with a full introspection
//! dump of the API version they target, or pass one through
//! [`GatewayBuilder::with_schema_path`]; otherwise [`Schema::validate`]
//! rejects real root fields such as `draftOrders`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use shopify_graphql::{Gateway, GatewayError, StaticApiContext};
//!
//! # async fn run() -> Result<(), GatewayError> {
//! let context = StaticApiContext::with_site("https://my-shop.myshopify.com")?
//!     .with_access_token("shpat_...")?;
//! let gateway = Gateway::builder(Arc::new(context)).build()?;
//!
//! let operation = gateway.parse("query ShopName { shop { name } }")?;
//! match gateway.query(&operation, None).await {
//!     Ok(result) => println!("{:?}", result.data),
//!     Err(err) if err.is_throttled() => { /* back off and retry */ }
//!     Err(err) => return Err(err),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]

mod client;
mod config;
mod error;
mod operation;
mod retry;
mod schema;
mod transport;

pub use client::{Gateway, GatewayBuilder, GatewayMetrics, GatewayMetricsSnapshot};
pub use config::GatewayConfig;
pub use error::{
    ClassifiedError, GatewayError, GatewayResult, GraphqlError, GraphqlErrorLocation,
    GraphqlPathSegment, HttpErrorInfo, THROTTLED_MARKER, classify,
};
pub use operation::{
    ExecutionResult, GraphqlRequest, Operation, OperationKind, QueryCost, SourceLocation,
    ThrottleStatus,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use schema::{Schema, SchemaType};
pub use transport::{ACCESS_TOKEN_HEADER, ApiContext, GRAPHQL_PATH, StaticApiContext, Transport};
