//! HTTP boundary: request values, stage pipeline, routes and the `may_minihttp` server.

pub mod pipeline;
pub mod request;
pub mod routes;
pub mod service;

pub use pipeline::{Access, Pipeline, RequestContext, StageEnv};
pub use request::{ApiRequest, ApiResponse, Method, QueryParams};
pub use routes::Router;
pub use service::CashdeskService;
