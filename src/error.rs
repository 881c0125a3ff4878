use thiserror::Error;

/// zenoh returns boxed errors that can't be turned into `anyhow` with `?`.
#[derive(Error, Debug)]
pub enum ErrorWrapper {
    #[error("zenoh error {0:?}")]
    ZenohError(zenoh::Error),
}
