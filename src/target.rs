use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::angle::AzEl;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("invalid manual position: {0}")]
    InvalidManualPosition(String),
    #[error("ephemeris error: {0}")]
    Ephemeris(String),
    #[error("position unavailable: {0}")]
    Unavailable(String),
}

/// Something that can tell where a target currently is.
///
/// Every call recomputes the position; callers that need the last value use
/// [`Target::position`].
pub trait PositionSource: Send + Sync {
    fn compute(&self) -> Result<AzEl, TargetError>;
}

/// A position that never moves.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub AzEl);

impl PositionSource for FixedPosition {
    fn compute(&self) -> Result<AzEl, TargetError> {
        Ok(self.0)
    }
}

/// Adds a constant offset to another source.
pub struct OffsetPosition {
    inner: Arc<dyn PositionSource>,
    offset: AzEl,
}

impl OffsetPosition {
    pub fn new(inner: Arc<dyn PositionSource>, offset: AzEl) -> Self {
        Self { inner, offset }
    }
}

impl PositionSource for OffsetPosition {
    fn compute(&self) -> Result<AzEl, TargetError> {
        Ok(self.inner.compute()? + self.offset)
    }
}

/// Adds an offset whose azimuth part is divided by `cos(elevation)`, keeping
/// the angular separation from the reference constant.
pub struct ElevationScaledOffset {
    inner: Arc<dyn PositionSource>,
    az_offset: f64,
    el_offset: f64,
}

impl ElevationScaledOffset {
    pub fn new(inner: Arc<dyn PositionSource>, offset: AzEl) -> Self {
        // scaling only makes sense for offsets in [-180, 180]
        Self {
            inner,
            az_offset: offset.signed_azimuth(),
            el_offset: offset.elevation(),
        }
    }
}

impl PositionSource for ElevationScaledOffset {
    fn compute(&self) -> Result<AzEl, TargetError> {
        let pos = self.inner.compute()?;
        Ok(AzEl::with_offset(pos, self.az_offset, self.el_offset))
    }
}

/// A named thing the mount can point at.
#[derive(Clone)]
pub struct Target {
    name: String,
    category: Option<String>,
    source: Arc<dyn PositionSource>,
    position: AzEl,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        category: Option<String>,
        source: Arc<dyn PositionSource>,
    ) -> Result<Self, TargetError> {
        let position = source.compute()?;
        Ok(Self {
            name: name.into(),
            category,
            source,
            position,
        })
    }

    pub fn fixed(name: impl Into<String>, position: AzEl) -> Self {
        Self {
            name: name.into(),
            category: None,
            source: Arc::new(FixedPosition(position)),
            position,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn source(&self) -> Arc<dyn PositionSource> {
        self.source.clone()
    }

    /// Last computed position.
    pub fn position(&self) -> AzEl {
        self.position
    }

    /// Refreshes and returns the current position.
    pub fn compute(&mut self) -> Result<AzEl, TargetError> {
        self.position = self.source.compute()?;
        Ok(self.position)
    }

    /// Same kind of target under a new name and position source.
    pub fn copy(
        &self,
        name: impl Into<String>,
        source: Arc<dyn PositionSource>,
    ) -> Result<Self, TargetError> {
        Target::new(name, self.category.clone(), source)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.position)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("position", &self.position)
            .finish()
    }
}
