use bench_http::GenericError;
use bench_metrics::METRICS_FACTORY;
use http::header::CONTENT_TYPE;
use http::{Response, StatusCode};
use hyper::Body;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use warp::{reply, Filter};

pub fn prometheus_metric(
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::get().and(warp::path("metrics")).map(|| {
        let encoder = TextEncoder::new();
        let metrics = METRICS_FACTORY.registry().gather();
        let mut resp_buffer = vec![];
        let result = encoder.encode(&metrics, &mut resp_buffer);
        let response = if result.is_ok() {
            Response::builder()
                .status(200)
                .header(CONTENT_TYPE, encoder.format_type())
                .body(Body::from(resp_buffer))
        } else {
            Response::builder()
                .status(500)
                .body(Body::from("Error exporting metrics"))
        };
        response.unwrap_or_else(|_| Response::new(Body::empty()))
    })
}

pub fn generic_result_to_reply_with_status<T: Serialize>(
    result: Result<T, GenericError>,
) -> reply::WithStatus<reply::Json> {
    match result {
        Ok(resp) => reply::with_status(reply::json(&resp), StatusCode::OK),
        Err(err) => generic_error_to_reply_with_status(err),
    }
}

pub fn generic_error_to_reply_with_status(err: GenericError) -> reply::WithStatus<reply::Json> {
    let status_code =
        StatusCode::from_u16(err.error_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    reply::with_status(reply::json(&err), status_code)
}
