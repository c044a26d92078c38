use bench::BENCHMARKER;
use bench_executor::STATUS_CLEANUP_INTERVAL;
use common_env::http_port;
use log::info;

mod filters;
mod filters_common;

#[tokio::main]
async fn main() {
    //init logging
    tracing_subscriber::fmt::init();

    let config = BENCHMARKER.config();
    info!(
        "max workers: {}, permits: {}/{}, client timeout: {:?}",
        config.max_workers, config.initial_permits, config.permit_limit, config.client_timeout
    );

    info!("spawning status cleanup");
    tokio::spawn(BENCHMARKER.cleanup_status(STATUS_CLEANUP_INTERVAL));

    let routes = filters::get_routes(&BENCHMARKER);
    let port = http_port();
    info!("starting server on port {}...", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}
