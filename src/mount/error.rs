use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("mount connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected reply to {command:?}: {response:?}")]
    MalformedResponse { command: String, response: String },
    #[error("mount connection already terminated")]
    Terminated,
    #[error(
        "position el={elevation:.2}, az={azimuth:.2} is unreachable: elevation must be within \
         [{min_el:.2}, {max_el:.2}] and azimuth within [{min_az:.2}, {max_az:.2}]"
    )]
    PositionUnreachable {
        azimuth: f64,
        elevation: f64,
        min_el: f64,
        max_el: f64,
        min_az: f64,
        max_az: f64,
    },
}
