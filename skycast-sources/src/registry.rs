//! Closed dispatch from [`FeedKind`] to a constructed Data Source.

use std::sync::Arc;

use skycast_core::{BuildError, DataSource, FeedKind, Params, SourceFactory};

use crate::radar_sweep::RadarSweep;
use crate::static_bundle::StaticBundle;
use crate::surface_obs::SurfaceObs;
use crate::vector_layer::VectorLayer;
use crate::SourceContext;

/// The production [`SourceFactory`]. Every variant shares one context.
#[derive(Clone)]
pub struct FeedRegistry {
    ctx: Arc<SourceContext>,
}

impl FeedRegistry {
    pub fn new(ctx: Arc<SourceContext>) -> Self {
        Self { ctx }
    }
}

impl SourceFactory for FeedRegistry {
    fn build(&self, kind: FeedKind, params: &Params) -> Result<Box<dyn DataSource>, BuildError> {
        let source: Box<dyn DataSource> = match kind {
            FeedKind::RadarSweep => Box::new(RadarSweep::new(&self.ctx, params)?),
            FeedKind::SurfaceObs => Box::new(SurfaceObs::new(&self.ctx, params)?),
            FeedKind::VectorLayer => Box::new(VectorLayer::new(&self.ctx, params)?),
            FeedKind::StaticBundle => Box::new(StaticBundle::new(&self.ctx, params)?),
        };
        Ok(source)
    }
}
