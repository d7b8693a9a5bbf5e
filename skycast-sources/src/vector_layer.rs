//! `vector-layer`: a pre-converted map layer under `<data_dir>/<domain>/`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use skycast_core::{BuildError, DataSource, FeedId, FetchError, NominalTime, Params, Payload};

use crate::local::read_if_changed;
use crate::SourceContext;

pub struct VectorLayer {
    id: FeedId,
    path: PathBuf,
    interval: Duration,
    last_served: Option<NominalTime>,
}

impl VectorLayer {
    pub fn new(ctx: &Arc<SourceContext>, params: &Params) -> Result<Self, BuildError> {
        let domain = params.require_name("domain")?;
        let name = params.require_name("name")?;
        Ok(Self {
            id: FeedId(format!("vector.{domain}.{name}")),
            path: ctx.data_dir.join(domain).join(format!("{name}.json")),
            interval: ctx.config.vector_refresh(),
            last_served: None,
        })
    }
}

#[async_trait]
impl DataSource for VectorLayer {
    fn id(&self) -> &FeedId {
        &self.id
    }

    async fn fetch(&mut self, _first_time: bool) -> Result<Payload, FetchError> {
        let (nominal, doc) = read_if_changed(&self.path, self.last_served).await?;
        let Value::Object(body) = doc else {
            return Err(FetchError::Parse(format!(
                "layer {} is not a JSON object",
                self.path.display()
            )));
        };
        self.last_served = Some(nominal);
        Ok(Payload::new(Some(nominal), body))
    }

    fn next_check_interval(&self) -> Duration {
        self.interval
    }
}
