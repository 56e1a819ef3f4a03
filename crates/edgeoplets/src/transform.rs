use async_trait::async_trait;
use edgecore::{StageError, Tuple};
use edgeruntime::{Oplet, OpletContext};

/// Apply a function to every tuple; `None` drops the tuple
pub struct MapOplet {
    f: Box<dyn FnMut(Tuple) -> Option<Tuple> + Send>,
}

impl MapOplet {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(Tuple) -> Option<Tuple> + Send + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Oplet for MapOplet {
    fn kind(&self) -> &str {
        "transform.map"
    }

    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError> {
        while let Some(tuple) = ctx.next().await {
            if let Some(mapped) = (self.f)(tuple) {
                ctx.submit(mapped).await?;
            }
        }
        Ok(())
    }
}

/// Parse string tuples as JSON
pub struct JsonParseOplet;

#[async_trait]
impl Oplet for JsonParseOplet {
    fn kind(&self) -> &str {
        "transform.json_parse"
    }

    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError> {
        while let Some(tuple) = ctx.next().await {
            let input = tuple.as_str().ok_or_else(|| {
                StageError::Failed(format!("expected a JSON string, got {}", tuple))
            })?;
            let parsed: Tuple = serde_json::from_str(input)
                .map_err(|e| StageError::Failed(format!("JSON parse error: {}", e)))?;
            ctx.submit(parsed).await?;
        }
        Ok(())
    }
}
