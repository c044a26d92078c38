use crate::filters_common;
use bench::http_util;
use bench_executor::Benchmarker;
use bench_http::RunRequest;
use log::trace;
use std::convert::Infallible;
use warp::{reply, Filter, Reply};

pub fn get_routes(
    bench: &'static Benchmarker,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let prometheus_metric = filters_common::prometheus_metric();
    let bench_req = bench_req(bench);
    let status_req = status_req(bench);
    prometheus_metric.or(bench_req).or(status_req)
}

pub fn bench_req(
    bench: &'static Benchmarker,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::path::end())
        .and(warp::body::content_length_limit(1024 * 1024))
        .and(warp::body::json())
        .and_then(move |request: RunRequest| async move { execute(request, bench).await })
}

pub fn status_req(
    bench: &'static Benchmarker,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("status" / String))
        .and_then(move |token: String| async move { status(token, bench).await })
}

async fn status(token: String, bench: &Benchmarker) -> Result<impl Reply, Infallible> {
    let resp = http_util::handle_status(token, bench).await;
    trace!("resp: status: {:?}", &resp);
    Ok(filters_common::generic_result_to_reply_with_status(resp))
}

pub async fn execute(request: RunRequest, bench: &Benchmarker) -> Result<impl Reply, Infallible> {
    trace!("req: execute: {:?}", &request);
    let response = http_util::handle_request(request, bench).await;
    trace!("resp: execute: {:?}", &response);
    let reply: reply::WithStatus<reply::Json> =
        filters_common::generic_result_to_reply_with_status(response);
    Ok(reply)
}
