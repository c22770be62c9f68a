use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("nwlng out of bounds: {0}")]
    NwLngOutOfBounds(f64),
    #[error("nwlat out of bounds: {0}")]
    NwLatOutOfBounds(f64),
    #[error("selng out of bounds: {0}")]
    SeLngOutOfBounds(f64),
    #[error("selat out of bounds: {0}")]
    SeLatOutOfBounds(f64),
    #[error("selat ({selat}) must be less than nwlat ({nwlat})")]
    LatitudeInverted { nwlat: f64, selat: f64 },
    #[error("nwlng ({nwlng}) must be less than selng ({selng})")]
    LongitudeInverted { nwlng: f64, selng: f64 },
    #[error("search radius must be a finite, non-negative number of km, got {0}")]
    InvalidRadius(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid field {0}")]
    UnknownField(String),
    #[error("invalid location type {0}")]
    InvalidLocationType(String),
    #[error("unknown parameter {0}")]
    UnknownParameter(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
