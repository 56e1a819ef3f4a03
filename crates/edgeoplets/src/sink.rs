use async_trait::async_trait;
use edgecore::{StageError, Tuple};
use edgeruntime::{Oplet, OpletContext, PublishSubscribe};
use std::sync::Arc;

/// Hand every tuple to a function
pub struct SinkOplet {
    f: Box<dyn FnMut(Tuple) + Send>,
}

impl SinkOplet {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(Tuple) + Send + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Oplet for SinkOplet {
    fn kind(&self) -> &str {
        "sink.fn"
    }

    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError> {
        while let Some(tuple) = ctx.next().await {
            (self.f)(tuple);
        }
        Ok(())
    }
}

/// Publish every tuple to a topic of the runtime's [`PublishSubscribe`]
/// service.
pub struct PublishOplet {
    topic: String,
    pubsub: Option<Arc<PublishSubscribe>>,
}

impl PublishOplet {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            pubsub: None,
        }
    }
}

#[async_trait]
impl Oplet for PublishOplet {
    fn kind(&self) -> &str {
        "sink.publish"
    }

    async fn initialize(&mut self, ctx: &OpletContext) -> Result<(), StageError> {
        self.pubsub = Some(ctx.services().require_pubsub()?.clone());
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError> {
        let pubsub = self
            .pubsub
            .clone()
            .ok_or_else(|| StageError::MissingService("PublishSubscribe".to_string()))?;
        while let Some(tuple) = ctx.next().await {
            let delivered = pubsub.publish(&self.topic, tuple);
            tracing::trace!("Published to {} ({} subscribers)", self.topic, delivered);
        }
        Ok(())
    }
}
