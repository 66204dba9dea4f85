use super::methods::MethodCallTranslatorRegistry;
use super::naming::{MemberNameResolver, NamingConvention, resolver_for};
use crate::serializer::{JsonSerializer, Serializer};
use std::sync::Arc;

/// Everything the compiler consults for one query. Built fresh per execution.
#[derive(Clone)]
pub struct QueryGenerationContext {
    pub member_name_resolver: Arc<dyn MemberNameResolver>,
    pub method_call_translators: Arc<MethodCallTranslatorRegistry>,
    pub serializer: Arc<dyn Serializer>,
    /// Project `META(..).id` next to the root document so results can be tracked.
    pub select_document_metadata: bool,
    /// Bucket used by `FromSource::Default`.
    pub default_bucket: String,
}

impl QueryGenerationContext {
    #[must_use]
    pub fn new(serializer: Arc<dyn Serializer>, naming: NamingConvention, default_bucket: impl Into<String>) -> Self {
        Self {
            member_name_resolver: resolver_for(&serializer, naming),
            method_call_translators: MethodCallTranslatorRegistry::shared(),
            serializer,
            select_document_metadata: false,
            default_bucket: default_bucket.into(),
        }
    }

    #[must_use]
    pub const fn with_document_metadata(mut self, on: bool) -> Self {
        self.select_document_metadata = on;
        self
    }
}

impl Default for QueryGenerationContext {
    fn default() -> Self {
        Self::new(Arc::new(JsonSerializer::new()), NamingConvention::AsIs, "default")
    }
}
