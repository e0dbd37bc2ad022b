//! Where candidate headlines come from.

use async_trait::async_trait;

use debrief_atlas::AtlasClient;
use debrief_shared::{Headline, Result};

/// Supplies the candidate headlines for a run.
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn sample(&self) -> Result<Vec<Headline>>;
}

/// Samples one headline per topic from a project on the embedding map.
pub struct AtlasSource {
    client: AtlasClient,
    project: String,
}

impl AtlasSource {
    pub fn new(client: AtlasClient, project: impl Into<String>) -> Self {
        Self {
            client,
            project: project.into(),
        }
    }
}

#[async_trait]
impl HeadlineSource for AtlasSource {
    async fn sample(&self) -> Result<Vec<Headline>> {
        self.client.sample_headlines(&self.project).await
    }
}

/// A fixed list of headlines.
pub struct StaticSource(pub Vec<Headline>);

#[async_trait]
impl HeadlineSource for StaticSource {
    async fn sample(&self) -> Result<Vec<Headline>> {
        Ok(self.0.clone())
    }
}
