//! `may_minihttp` adapter around the [`Router`].

use crate::http::request::{ApiRequest, ApiResponse, Method};
use crate::http::routes::Router;
use may_minihttp::{HttpServer, HttpService, Request, Response};
use std::io::{self, Read};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// One clone per connection; all clones share the router's services.
#[derive(Clone)]
pub struct CashdeskService {
    router: Router,
    max_body_bytes: usize,
}

impl CashdeskService {
    pub fn new(router: Router, max_body_bytes: usize) -> Self {
        Self {
            router,
            max_body_bytes,
        }
    }

    /// Bind `addr` and serve until the listener stops.
    pub fn serve(self, addr: &str) -> io::Result<()> {
        log::info!("listening on http://{}", addr);
        let server = HttpServer(self).start(addr)?;
        server
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "http server panicked"))
    }

    fn read_request(&self, req: Request) -> Result<ApiRequest, ApiResponse> {
        let mut request = ApiRequest::new(Method::parse(req.method()), req.path());
        for header in req.headers() {
            request = request.with_header(header.name, String::from_utf8_lossy(header.value));
        }

        let limit = self.max_body_bytes as u64;
        let mut body = Vec::new();
        req.body()
            .take(limit + 1)
            .read_to_end(&mut body)
            .map_err(|e| {
                log::debug!("failed to read request body: {}", e);
                ApiResponse::message(400, "Malformed request body")
            })?;
        if body.len() as u64 > limit {
            return Err(ApiResponse::message(413, "Request body too large"));
        }
        Ok(request.with_body(body))
    }
}

impl HttpService for CashdeskService {
    fn call(&mut self, req: Request, rsp: &mut Response) -> io::Result<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::request_span(req.method(), req.path()).entered();

        let started = std::time::Instant::now();
        let reply = match self.read_request(req) {
            Ok(request) => {
                let (method, path) = (request.method, request.path.clone());
                let reply = self.router.handle(request);
                log::debug!(
                    "{} {} -> {} in {:?}",
                    method,
                    path,
                    reply.status,
                    started.elapsed()
                );
                reply
            }
            Err(reply) => reply,
        };

        rsp.status_code(usize::from(reply.status), reply.reason());
        rsp.header(reply.content_type);
        rsp.body_mut().extend_from_slice(&reply.body);
        Ok(())
    }
}
