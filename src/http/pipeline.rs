//! Ordered request stages run before a handler.
//!
//! Each stage is a plain function that either passes the context on or answers the request
//! itself. Routes declare an [`Access`] level and get the matching [`Pipeline`].

use crate::auth::{SessionIdentity, SessionIssuer};
use crate::error::{AuthFailure, CoreError};
use crate::http::request::{ApiRequest, ApiResponse, QueryParams};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// What a handler sees once the pipeline has run.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request: ApiRequest,
    pub query: QueryParams,
    /// Path parameters captured by the route pattern (`{id}`)
    pub params: HashMap<String, String>,
    pub identity: Option<SessionIdentity>,
}

impl RequestContext {
    pub fn new(request: ApiRequest, params: HashMap<String, String>) -> Self {
        Self {
            request,
            query: QueryParams::default(),
            params,
            identity: None,
        }
    }

    /// The authenticated caller. Only `Public` routes run without one.
    pub fn identity(&self) -> Result<&SessionIdentity, CoreError> {
        self.identity
            .as_ref()
            .ok_or(CoreError::Auth(AuthFailure::MissingToken))
    }

    pub fn param_i64(&self, name: &str) -> Result<i64, CoreError> {
        self.params
            .get(name)
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| CoreError::validation(format!("{name} must be an integer")))
    }
}

/// Inputs shared by every stage.
pub struct StageEnv<'a> {
    pub sessions: &'a dyn SessionIssuer,
    pub now: DateTime<Utc>,
}

/// Either the context for the next stage or the response that ends the request.
pub type StageResult = Result<RequestContext, ApiResponse>;

pub type Stage = fn(&StageEnv<'_>, RequestContext) -> StageResult;

pub fn parse_query(_env: &StageEnv<'_>, mut ctx: RequestContext) -> StageResult {
    ctx.query = QueryParams::parse(&ctx.request.query);
    Ok(ctx)
}

/// Require a valid bearer token: missing is 401, invalid or expired is 403.
pub fn authenticate(env: &StageEnv<'_>, mut ctx: RequestContext) -> StageResult {
    let token = ctx
        .request
        .bearer_token()
        .ok_or_else(|| ApiResponse::from_error(&CoreError::Auth(AuthFailure::MissingToken)))?;
    let identity = env.sessions.verify(token, env.now).map_err(|e| {
        log::debug!("rejected bearer token on {}: {}", ctx.request.path, e);
        ApiResponse::from_error(&CoreError::Auth(AuthFailure::InvalidToken))
    })?;
    ctx.identity = Some(identity);
    Ok(ctx)
}

pub fn require_admin(_env: &StageEnv<'_>, ctx: RequestContext) -> StageResult {
    match &ctx.identity {
        Some(identity) if identity.is_admin() => Ok(ctx),
        Some(identity) => {
            log::warn!(
                "user '{}' denied admin route {}",
                identity.username,
                ctx.request.path
            );
            Err(ApiResponse::from_error(&CoreError::Forbidden(
                "Admin access required".to_string(),
            )))
        }
        None => Err(ApiResponse::from_error(&CoreError::Auth(
            AuthFailure::MissingToken,
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Admin,
}

#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn for_access(access: Access) -> Self {
        let stages: Vec<Stage> = match access {
            Access::Public => vec![parse_query],
            Access::Authenticated => vec![parse_query, authenticate],
            Access::Admin => vec![parse_query, authenticate, require_admin],
        };
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the stages in order, stopping at the first that answers.
    pub fn run(&self, env: &StageEnv<'_>, ctx: RequestContext) -> StageResult {
        self.stages.iter().try_fold(ctx, |ctx, stage| stage(env, ctx))
    }
}
