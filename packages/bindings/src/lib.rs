use black_litterman_core::report::{self, AllocationInput, CovarianceInput, ImpliedReturnsInput};
use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Market and blended allocations; JSON request in, JSON envelope out.
#[napi]
pub fn allocate(input_json: String) -> NapiResult<String> {
    let input: AllocationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = report::run_allocation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn implied_returns(input_json: String) -> NapiResult<String> {
    let input: ImpliedReturnsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = report::run_implied_returns(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn estimate_covariance(input_json: String) -> NapiResult<String> {
    let input: CovarianceInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = report::run_covariance(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
