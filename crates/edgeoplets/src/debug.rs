use async_trait::async_trait;
use edgecore::StageError;
use edgeruntime::{Oplet, OpletContext};

/// Sink that logs every tuple it receives
pub struct DebugSink;

#[async_trait]
impl Oplet for DebugSink {
    fn kind(&self) -> &str {
        "debug.log"
    }

    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError> {
        while let Some(tuple) = ctx.next().await {
            tracing::info!("DEBUG [{}]: {}", ctx.stage_id(), tuple);
        }
        Ok(())
    }
}
