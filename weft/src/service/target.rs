use async_trait::async_trait;
use weft_api::{Call, Payload};

use crate::error::CallError;

/// Anything that answers named calls: a single `Service` or a `ServiceCluster`.
#[async_trait]
pub trait CallTarget: Send + Sync {
    async fn call(&self, task: &str, params: Vec<Payload>) -> Result<Payload, CallError>;

    async fn call_typed<C: Call>(&self, request: C) -> Result<C::Output, CallError>
    where
        Self: Sized,
    {
        let params = request.to_params()?;
        let call = self.call(C::task_name(), params);
        let value = match C::timeout() {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| CallError::Timeout(limit))??,
            None => call.await?,
        };
        Ok(C::decode_output(Some(value))?)
    }
}

#[async_trait]
impl CallTarget for super::Service {
    async fn call(&self, task: &str, params: Vec<Payload>) -> Result<Payload, CallError> {
        super::Service::call(self, task, params).await
    }
}
