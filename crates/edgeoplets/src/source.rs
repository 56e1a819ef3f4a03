use async_trait::async_trait;
use edgecore::{StageError, Tuple};
use edgeruntime::{Oplet, OpletContext};
use std::collections::VecDeque;

/// Emit a fixed sequence of tuples, then finish
pub struct ValuesSource {
    values: VecDeque<Tuple>,
}

impl ValuesSource {
    pub fn new(values: impl IntoIterator<Item = Tuple>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Source of JSON strings.
    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(values.into_iter().map(|s| Tuple::String(s.into())))
    }
}

#[async_trait]
impl Oplet for ValuesSource {
    fn kind(&self) -> &str {
        "source.values"
    }

    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError> {
        while let Some(tuple) = self.values.pop_front() {
            if ctx.is_cancelled() {
                break;
            }
            ctx.submit(tuple).await?;
        }
        Ok(())
    }
}
