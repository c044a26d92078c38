use bench_executor::{Benchmarker, RunError, RunState};
use bench_http::{GenericError, GenericResponse, RunRequest, RunSummary};
use log::trace;

pub async fn handle_request(
    request: RunRequest,
    bench: &Benchmarker,
) -> Result<RunSummary, GenericError> {
    bench.run(request).await.map_err(run_error)
}

pub async fn handle_status(
    token: String,
    bench: &Benchmarker,
) -> Result<GenericResponse<RunState>, GenericError> {
    let status = bench.status(&token).await;
    trace!("status: {}: {:?}", &token, &status);
    match status {
        Some(state) => {
            let mut response = GenericResponse::default();
            response.data.insert(token, state);
            Ok(response)
        }
        None => Err(GenericError::new("Run not found", 404)),
    }
}

fn run_error(err: RunError) -> GenericError {
    GenericError::new(&err.message, 400).with_data("code", format!("{:?}", err.code))
}
