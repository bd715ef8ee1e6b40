use futures_util::future::BoxFuture;
use std::sync::Arc;

use transom_core::matcher::DomainMatcher;
use transom_core::types::{Dimensions, RenderContext};
use transom_core::Result;
use transom_props::{PropBag, PropSchema};
use transom_transport::{AttributeMap, ElementRef, PageRef};

/// Where the child document lives: a fixed URL or one computed from the
/// render props.
#[derive(Clone)]
pub enum UrlSource {
    Fixed(String),
    Dynamic(Arc<dyn Fn(&PropBag) -> Result<String> + Send + Sync>),
}

impl From<&str> for UrlSource {
    fn from(url: &str) -> Self {
        UrlSource::Fixed(url.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(url: String) -> Self {
        UrlSource::Fixed(url)
    }
}

/// Which dimensions the child may drive, and from which of its elements.
#[derive(Debug, Clone, Default)]
pub struct AutoResize {
    pub width: bool,
    pub height: bool,
    /// Selector of the observed element; the document body when absent.
    pub element: Option<String>,
}

/// Extra attributes stamped onto the opened context, per context kind.
#[derive(Debug, Clone, Default)]
pub struct ContextAttributes {
    pub iframe: AttributeMap,
    pub popup: AttributeMap,
}

/// Everything the container template gets to work with.
pub struct TemplateContext {
    pub page: PageRef,
    pub uid: String,
    pub tag: String,
    pub context: RenderContext,
    pub dimensions: Dimensions,
    /// The caller's render target; the container is built under it.
    pub target: ElementRef,
    /// The render's props. For delegated renders this is the subset whose
    /// definitions opt into delegation.
    pub props: PropBag,
}

pub type ContainerTemplate =
    Arc<dyn Fn(TemplateContext) -> BoxFuture<'static, Result<ElementRef>> + Send + Sync>;

/// Produces the markup shown inside the frame while the child document
/// loads.
pub type PrerenderTemplate = Arc<dyn Fn(&str, RenderContext) -> String + Send + Sync>;

/// Cross-prop validation hook, run at render time after normalization.
pub type ComponentValidator = Arc<dyn Fn(&PropBag) -> std::result::Result<(), String> + Send + Sync>;

/// Declaration of one embeddable component. Passed to `create`; validated
/// there and frozen into a [`crate::Component`].
#[derive(Clone)]
pub struct ComponentOptions {
    pub tag: String,
    pub url: UrlSource,
    /// Expected child origin. Derived from the URL when absent.
    pub domain: Option<DomainMatcher>,
    /// Origins allowed to embed this component's child.
    pub allowed_parent_domains: DomainMatcher,
    pub props: PropSchema,
    pub dimensions: Dimensions,
    pub auto_resize: AutoResize,
    pub attributes: ContextAttributes,
    pub default_context: RenderContext,
    pub container_template: Option<ContainerTemplate>,
    pub prerender_template: Option<PrerenderTemplate>,
    pub validate: Option<ComponentValidator>,
    /// At most one live instance of this component at a time.
    pub singleton: bool,
}

impl ComponentOptions {
    pub fn new(tag: impl Into<String>, url: impl Into<UrlSource>) -> Self {
        Self {
            tag: tag.into(),
            url: url.into(),
            domain: None,
            allowed_parent_domains: DomainMatcher::Any,
            props: PropSchema::new(),
            dimensions: Dimensions::default(),
            auto_resize: AutoResize::default(),
            attributes: ContextAttributes::default(),
            default_context: RenderContext::default(),
            container_template: None,
            prerender_template: None,
            validate: None,
            singleton: false,
        }
    }
}
