use reqwest::Client;

use crate::domain::RunOptions;
use crate::error::HttpError;

pub const USER_AGENT: &str = concat!("surge/", env!("CARGO_PKG_VERSION"));

/// Builds the client shared by every VU of a run.
///
/// # Errors
///
/// Returns an error when the TLS backend or connection pool cannot be
/// initialized.
pub fn build_client(options: &RunOptions) -> Result<Client, HttpError> {
    // A request may never outlive the iteration that issued it.
    let timeout = options.request_timeout.min(options.iteration_timeout);
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|source| HttpError::BuildClientFailed { source })
}
