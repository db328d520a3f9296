//! Metadata-driven scheme policy
//!
//! The host describes how an error raised in its current operation should
//! be mapped by storing a [`MappingMetadata`] in the mapping context. The
//! [`MetadataPolicy`] turns it into a convention filter, or declines the
//! scheme outright.

use std::collections::BTreeSet;

use errmap_core::{
    ConventionFilter, HandlingContext, PolicyDecision, SchemeOptions, SchemePolicy,
};

/// Host-supplied mapping metadata for the current operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingMetadata {
    /// Errors from this operation must not be mapped
    pub excluded: bool,
    /// Tag sets a convention must match; each set must be empty or share a
    /// tag with the convention
    pub tag_filters: Vec<BTreeSet<String>>,
}

impl MappingMetadata {
    /// Metadata with no filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata excluding the operation from mapping
    pub fn excluded() -> Self {
        Self {
            excluded: true,
            tag_filters: Vec::new(),
        }
    }

    /// Add a tag set conventions must match
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_filters
            .push(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Convention filter requiring every tag set, if any was given
    pub fn convention_filter(&self) -> Option<ConventionFilter> {
        if self.tag_filters.is_empty() {
            return None;
        }
        Some(ConventionFilter::all(
            self.tag_filters
                .iter()
                .cloned()
                .map(ConventionFilter::tags),
        ))
    }
}

/// Policy reading [`MappingMetadata`] from the mapping context
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataPolicy;

impl SchemePolicy for MetadataPolicy {
    fn apply(&self, ctx: &mut HandlingContext<'_>, options: &SchemeOptions) -> PolicyDecision {
        let metadata = ctx
            .mapping_context()
            .data()
            .get::<MappingMetadata>()
            .cloned();

        if let Some(metadata) = metadata {
            if metadata.excluded {
                return PolicyDecision::decline("operation is excluded from mapping");
            }
            if let Some(filter) = metadata.convention_filter() {
                ctx.set_convention_filter(filter);
                return PolicyDecision::Proceed;
            }
        }

        if options.implicit_mapping {
            PolicyDecision::Proceed
        } else {
            PolicyDecision::decline("no mapping metadata and implicit mapping is disabled")
        }
    }
}
