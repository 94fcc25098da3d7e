//! Descriptive responder: a prose overview of the dataset from context
//! alone. No SQL is issued on this path.

use uuid::Uuid;

use crate::context::DatabaseContext;
use crate::error::Result;
use crate::llm::LlmGateway;
use crate::prompts;

#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptiveResponder;

impl DescriptiveResponder {
    pub async fn describe(
        &self,
        gateway: &LlmGateway,
        session: Option<Uuid>,
        ctx: &DatabaseContext,
    ) -> Result<String> {
        let prompt = prompts::description_prompt(&ctx.render());
        let reply = gateway
            .complete(session, prompts::DESCRIBE_SYSTEM, &prompt)
            .await?;
        Ok(reply.trim().to_string())
    }
}
