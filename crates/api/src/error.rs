use std::num::ParseIntError;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("backend base URL '{raw}' is invalid"))]
    InvalidBaseUrl {
        stage: &'static str,
        raw: String,
        source: url::ParseError,
    },
    #[snafu(display("backend base URL '{raw}' cannot carry API paths"))]
    UnsupportedBaseUrl {
        stage: &'static str,
        raw: String,
    },
    #[snafu(display("failed to build HTTP client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("backend returned status {status} for {url}: {body}"))]
    Status {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode response from {url} on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        url: String,
        source: serde_json::Error,
    },
    #[snafu(display("backend rejected request on `{stage}`: {message}"))]
    Rejected {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("{entity} '{id}' was not found"))]
    NotFound {
        stage: &'static str,
        entity: &'static str,
        id: String,
    },
    #[snafu(display("api id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: ParseIntError,
    },
}

impl ApiError {
    /// Pipeline stage that produced the error, used as a structured log field.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidBaseUrl { stage, .. }
            | Self::UnsupportedBaseUrl { stage, .. }
            | Self::BuildClient { stage, .. }
            | Self::Transport { stage, .. }
            | Self::Status { stage, .. }
            | Self::Decode { stage, .. }
            | Self::Rejected { stage, .. }
            | Self::NotFound { stage, .. }
            | Self::InvalidId { stage, .. } => stage,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
