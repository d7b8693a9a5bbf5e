//! `static-bundle`: a named JSON document from the static directory,
//! delivered under the `gui` handler as `{"<name>": <document>}`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use skycast_core::{BuildError, DataSource, FeedId, FetchError, NominalTime, Params, Payload};

use crate::local::read_if_changed;
use crate::SourceContext;

pub const STATIC_HANDLER: &str = "gui";

pub struct StaticBundle {
    id: FeedId,
    name: String,
    path: PathBuf,
    interval: Duration,
    last_served: Option<NominalTime>,
}

impl StaticBundle {
    pub fn new(ctx: &Arc<SourceContext>, params: &Params) -> Result<Self, BuildError> {
        let name = params.require_name("static")?.to_string();
        Ok(Self {
            id: FeedId::from(STATIC_HANDLER),
            path: ctx.static_dir.join(format!("{name}.json")),
            name,
            interval: ctx.config.static_refresh(),
            last_served: None,
        })
    }
}

#[async_trait]
impl DataSource for StaticBundle {
    fn id(&self) -> &FeedId {
        &self.id
    }

    async fn fetch(&mut self, _first_time: bool) -> Result<Payload, FetchError> {
        let (nominal, doc) = read_if_changed(&self.path, self.last_served).await?;
        self.last_served = Some(nominal);
        Ok(Payload::single(Some(nominal), self.name.clone(), doc))
    }

    fn next_check_interval(&self) -> Duration {
        self.interval
    }
}
