use thiserror::Error;

/// Errors raised while decoding section data coming from collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("Settings must be a JSON object, got {0}")]
    SettingsNotAnObject(&'static str),
}

pub type CommonResult<T> = Result<T, CommonError>;
