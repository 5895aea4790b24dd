use anyhow::Result;
use extract::EntityKind;
use std::future::Future;

/// Remote fetch port: raw JSON text for a single product or recipe
pub trait EntityClient: Send + Sync + 'static {
    fn get_product(&self, id: &str) -> impl Future<Output = Result<String>> + Send;

    fn get_recipe(&self, id: &str) -> impl Future<Output = Result<String>> + Send;

    fn fetch(&self, kind: EntityKind, id: &str) -> impl Future<Output = Result<String>> + Send {
        async move {
            match kind {
                EntityKind::Product => self.get_product(id).await,
                EntityKind::Recipe => self.get_recipe(id).await,
            }
        }
    }
}

/// Hands out one independent client per worker
pub trait ClientFactory: Send + Sync {
    type Client: Send + Sync + 'static;

    fn new_client(&self) -> Result<Self::Client>;
}

impl<C, F> ClientFactory for F
where
    F: Fn() -> Result<C> + Send + Sync,
    C: Send + Sync + 'static,
{
    type Client = C;

    fn new_client(&self) -> Result<C> {
        self()
    }
}
