//! Closure convention adapter

use async_trait::async_trait;
use errmap_core::{BoxError, Convention, HandlingContext, HostContext};

/// Adapter running a synchronous closure as a convention
pub struct DelegateConvention<F> {
    apply: F,
}

impl<F> DelegateConvention<F>
where
    F: Fn(&mut HandlingContext<'_>, &HostContext) -> Result<(), BoxError> + Send + Sync,
{
    /// Wrap `apply`
    pub fn new(apply: F) -> Self {
        Self { apply }
    }
}

impl<F> std::fmt::Debug for DelegateConvention<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DelegateConvention(..)")
    }
}

#[async_trait]
impl<F> Convention for DelegateConvention<F>
where
    F: Fn(&mut HandlingContext<'_>, &HostContext) -> Result<(), BoxError> + Send + Sync,
{
    async fn apply(
        &self,
        ctx: &mut HandlingContext<'_>,
        host: &HostContext,
    ) -> Result<(), BoxError> {
        (self.apply)(ctx, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errmap_core::{Handling, MappingContext, SharedError};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("argument error")]
    struct ArgumentError;

    #[tokio::test]
    async fn test_delegate_sets_outcome() {
        let convention = DelegateConvention::new(|ctx, host| {
            if host.get::<u8>().is_some() {
                ctx.handled();
            }
            Ok(())
        });

        let error: SharedError = Arc::new(ArgumentError);
        let mut mapping = MappingContext::new();
        let mut ctx = HandlingContext::new("s1", error, &mut mapping);

        convention.apply(&mut ctx, &HostContext::empty()).await.unwrap();
        assert_eq!(ctx.outcome().handling(), Handling::Skip);

        convention
            .apply(&mut ctx, &HostContext::new(Arc::new(1u8)))
            .await
            .unwrap();
        assert_eq!(ctx.outcome().handling(), Handling::Handled);
    }

    #[tokio::test]
    async fn test_delegate_errors_propagate() {
        let convention = DelegateConvention::new(|_ctx, _host| Err("broken".into()));

        let mut mapping = MappingContext::new();
        let mut ctx = HandlingContext::new("s1", Arc::new(ArgumentError), &mut mapping);

        let result = convention.apply(&mut ctx, &HostContext::empty()).await;
        assert_eq!(result.map_err(|e| e.to_string()), Err("broken".to_string()));
    }
}
