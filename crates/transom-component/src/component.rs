use std::sync::Arc;

use transom_core::matcher::DomainMatcher;
use transom_core::types::{Dimensions, RenderContext};
use transom_core::{Result, TransomError};
use transom_props::{PropBag, PropSchema};

use crate::builtins::builtin_props;
use crate::options::{
    AutoResize, ComponentOptions, ComponentValidator, ContainerTemplate, ContextAttributes,
    PrerenderTemplate, UrlSource,
};
use crate::templates::{default_container_template, default_prerender_template};
use crate::validate::validate_options;

/// An immutable component definition. Built once per tag via
/// [`Component::new`] and shared by every render.
pub struct Component {
    tag: String,
    name: String,
    url: UrlSource,
    domain: Option<DomainMatcher>,
    allowed_parent_domains: DomainMatcher,
    schema: PropSchema,
    pub dimensions: Dimensions,
    pub auto_resize: AutoResize,
    pub attributes: ContextAttributes,
    pub default_context: RenderContext,
    pub container_template: ContainerTemplate,
    pub prerender_template: PrerenderTemplate,
    pub validate: Option<ComponentValidator>,
    pub singleton: bool,
}

pub type ComponentRef = Arc<Component>;

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("singleton", &self.singleton)
            .finish_non_exhaustive()
    }
}

impl Component {
    pub fn new(options: ComponentOptions) -> Result<Self> {
        validate_options(&options)?;

        let mut schema = builtin_props();
        schema.merge(options.props);

        Ok(Self {
            name: options.tag.replace('-', "_"),
            tag: options.tag,
            url: options.url,
            domain: options.domain,
            allowed_parent_domains: options.allowed_parent_domains,
            schema,
            dimensions: options.dimensions,
            auto_resize: options.auto_resize,
            attributes: options.attributes,
            default_context: options.default_context,
            container_template: options
                .container_template
                .unwrap_or_else(default_container_template),
            prerender_template: options
                .prerender_template
                .unwrap_or_else(default_prerender_template),
            validate: options.validate,
            singleton: options.singleton,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The tag with dashes folded to underscores; used in window names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// User props merged over the built-ins.
    pub fn schema(&self) -> &PropSchema {
        &self.schema
    }

    pub fn allowed_parent_domains(&self) -> &DomainMatcher {
        &self.allowed_parent_domains
    }

    pub fn url_for(&self, props: &PropBag) -> Result<String> {
        match &self.url {
            UrlSource::Fixed(url) => Ok(url.clone()),
            UrlSource::Dynamic(build) => build(props),
        }
    }

    /// The child's origin for this render. Relative component URLs load
    /// within the rendering page's own origin.
    pub fn origin_for(&self, props: &PropBag, page_origin: &str) -> Result<String> {
        let url = self.url_for(props)?;
        match url::Url::parse(&url) {
            Ok(parsed) => {
                let origin = parsed.origin().ascii_serialization();
                if origin == "null" {
                    Err(TransomError::other(format!(
                        "component '{}' url '{url}' has no origin",
                        self.tag
                    )))
                } else {
                    Ok(origin)
                }
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(page_origin.to_string()),
            Err(err) => Err(TransomError::other(format!(
                "component '{}' url '{url}' is invalid: {err}",
                self.tag
            ))),
        }
    }

    /// The matcher the parent holds child messages against: the declared
    /// `domain` option, or exactly the origin the URL resolves to.
    pub fn domain_matcher(&self, props: &PropBag, page_origin: &str) -> Result<DomainMatcher> {
        if let Some(domain) = &self.domain {
            return Ok(domain.clone());
        }
        Ok(DomainMatcher::exact(self.origin_for(props, page_origin)?))
    }
}
