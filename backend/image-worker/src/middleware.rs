//! Request metrics middleware
use crate::metrics;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;

/// Label for requests that matched no route, keeping path cardinality bounded
const UNMATCHED_PATH: &str = "unmatched";

/// Counts requests and observes latency per method, route and status
pub struct HttpMetrics;

impl<S, B> Transform<S, ServiceRequest> for HttpMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = HttpMetricsService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HttpMetricsService {
            service: Rc::new(service),
        }))
    }
}

pub struct HttpMetricsService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HttpMetricsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let res = service.call(req).await;
            let elapsed = start.elapsed().as_secs_f64();

            match &res {
                Ok(response) => {
                    let path = response
                        .request()
                        .match_pattern()
                        .unwrap_or_else(|| UNMATCHED_PATH.to_string());
                    metrics::record_http_request(
                        &method,
                        &path,
                        response.status().as_u16(),
                        elapsed,
                    );
                }
                Err(err) => {
                    let status = err.as_response_error().status_code().as_u16();
                    metrics::record_http_request(&method, UNMATCHED_PATH, status, elapsed);
                }
            }

            res
        })
    }
}
