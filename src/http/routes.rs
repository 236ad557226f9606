//! Route table and handlers.

use crate::app::Services;
use crate::auth::LoginRequest;
use crate::error::CoreResult;
use crate::http::pipeline::{Access, Pipeline, RequestContext, StageEnv};
use crate::http::request::{ApiRequest, ApiResponse, Method};
use crate::model::{NewUser, OperationDraft};
use crate::store::Page;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

type Handler = fn(&Router, &RequestContext) -> CoreResult<ApiResponse>;

struct Route {
    method: Method,
    segments: Vec<&'static str>,
    pipeline: Pipeline,
    handler: Handler,
}

impl Route {
    fn new(method: Method, pattern: &'static str, access: Access, handler: Handler) -> Self {
        Self {
            method,
            segments: split_path(pattern),
            pipeline: Pipeline::for_access(access),
            handler,
        }
    }

    /// Path parameters when `path` matches this route's pattern.
    fn matches(&self, path: &[&str]) -> Option<HashMap<String, String>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(path) {
            match pattern.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => {
                    params.insert(name.to_string(), (*actual).to_string());
                }
                None if pattern == actual => {}
                None => return None,
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Dispatches [`ApiRequest`]s to handlers through each route's pipeline.
#[derive(Clone)]
pub struct Router {
    services: Arc<Services>,
    routes: Arc<Vec<Route>>,
    started: Instant,
}

impl Router {
    pub fn new(services: Services) -> Self {
        let routes = vec![
            Route::new(Method::Post, "/api/auth/login", Access::Public, login),
            Route::new(
                Method::Post,
                "/api/auth/logout",
                Access::Authenticated,
                logout,
            ),
            Route::new(
                Method::Post,
                "/api/operations",
                Access::Authenticated,
                save_operation,
            ),
            Route::new(
                Method::Get,
                "/api/operations",
                Access::Authenticated,
                list_operations,
            ),
            Route::new(
                Method::Get,
                "/api/admin/audit-log",
                Access::Admin,
                audit_log,
            ),
            Route::new(Method::Get, "/api/admin/users", Access::Admin, list_users),
            Route::new(Method::Post, "/api/admin/users", Access::Admin, create_user),
            Route::new(
                Method::Put,
                "/api/admin/users/{id}/status",
                Access::Admin,
                set_user_status,
            ),
            Route::new(Method::Get, "/api/health", Access::Public, health),
            #[cfg(feature = "metrics")]
            Route::new(Method::Get, "/metrics", Access::Public, metrics),
        ];
        Self {
            services: Arc::new(services),
            routes: Arc::new(routes),
            started: Instant::now(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        let path = split_path(&request.path);
        let Some((route, params)) = self
            .routes
            .iter()
            .filter(|route| route.method == request.method)
            .find_map(|route| route.matches(&path).map(|params| (route, params)))
        else {
            log::debug!("no route for {} {}", request.method, request.path);
            return ApiResponse::not_found();
        };

        let env = StageEnv {
            sessions: self.services.sessions.as_ref(),
            now: Utc::now(),
        };
        let ctx = match route.pipeline.run(&env, RequestContext::new(request, params)) {
            Ok(ctx) => ctx,
            Err(rsp) => return rsp,
        };

        (route.handler)(self, &ctx).unwrap_or_else(|e| ApiResponse::from_error(&e))
    }
}

fn login(router: &Router, ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let request: LoginRequest = ctx.request.json()?;
    let success = router
        .services
        .auth
        .login(&request, &ctx.request.client_context())?;
    Ok(ApiResponse::json(
        200,
        &json!({ "success": true, "token": success.token, "user": success.user }),
    ))
}

fn logout(router: &Router, ctx: &RequestContext) -> CoreResult<ApiResponse> {
    router
        .services
        .auth
        .logout(ctx.identity()?, &ctx.request.client_context())?;
    Ok(ApiResponse::json(
        200,
        &json!({ "success": true, "message": "Logged out" }),
    ))
}

fn save_operation(router: &Router, ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let identity = ctx.identity()?;
    let draft: OperationDraft = ctx.request.json()?;
    let saved = router
        .services
        .operations
        .upsert(identity.user_id, &draft, &ctx.request.client_context())?;
    Ok(ApiResponse::json(
        200,
        &json!({
            "success": true,
            "data": saved.record,
            "created": saved.created,
            "message": "Operation saved successfully",
        }),
    ))
}

fn list_operations(router: &Router, ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let identity = ctx.identity()?;
    let page = Page::new(ctx.query.get_i64("limit")?, ctx.query.get_i64("offset")?)?;
    let records = router.services.operations.list(identity.user_id, page)?;
    let total = router.services.operations.count_active(identity.user_id)?;
    Ok(paginated(&records, page, total))
}

fn audit_log(router: &Router, ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let actor = ctx.query.get_i64("userId")?;
    let page = Page::new(ctx.query.get_i64("limit")?, ctx.query.get_i64("offset")?)?;
    let records = router.services.audit.query(actor, page)?;
    let total = router.services.audit.count(actor)?;
    Ok(paginated(&records, page, total))
}

fn paginated(data: &impl serde::Serialize, page: Page, total: i64) -> ApiResponse {
    ApiResponse::json(
        200,
        &json!({
            "success": true,
            "data": data,
            "pagination": { "limit": page.limit, "offset": page.offset, "total": total },
        }),
    )
}

fn list_users(router: &Router, _ctx: &RequestContext) -> CoreResult<ApiResponse> {
    Ok(ApiResponse::ok(&router.services.users.list()?))
}

fn create_user(router: &Router, ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let identity = ctx.identity()?;
    let new_user: NewUser = ctx.request.json()?;
    let profile = router.services.users.create(
        Some(identity.user_id),
        &new_user,
        &ctx.request.client_context(),
    )?;
    Ok(ApiResponse::json(201, &json!({ "success": true, "data": profile })))
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    active: bool,
}

fn set_user_status(router: &Router, ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let identity = ctx.identity()?;
    let user_id = ctx.param_i64("id")?;
    let change: StatusChange = ctx.request.json()?;
    let profile = router.services.users.set_active(
        identity.user_id,
        user_id,
        change.active,
        &ctx.request.client_context(),
    )?;
    Ok(ApiResponse::ok(&profile))
}

/// 200 when the store answers, 503 otherwise.
fn health(router: &Router, _ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let database = match router.services.pool.ping() {
        Ok(true) => "connected",
        Ok(false) => "unhealthy",
        Err(e) => {
            log::warn!("health check failed: {}", e);
            "unreachable"
        }
    };
    let healthy = database == "connected";
    Ok(ApiResponse::json(
        if healthy { 200 } else { 503 },
        &json!({
            "success": healthy,
            "status": if healthy { "healthy" } else { "unhealthy" },
            "database": database,
            "timestamp": Utc::now(),
            "version": env!("CARGO_PKG_VERSION"),
            "uptime": router.started.elapsed().as_secs(),
        }),
    ))
}

#[cfg(feature = "metrics")]
fn metrics(_router: &Router, _ctx: &RequestContext) -> CoreResult<ApiResponse> {
    let body = METRICS
        .render()
        .map_err(|e| crate::error::CoreError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok(ApiResponse::text(
        200,
        "Content-Type: text/plain; version=0.0.4; charset=utf-8",
        body,
    ))
}
