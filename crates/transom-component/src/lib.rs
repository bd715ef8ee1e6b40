//! Component definitions: creation-time validation, built-in props, the
//! immutable [`Component`] value shared by every render, and the
//! registries that track components and live instances.

pub mod builtins;
pub mod component;
pub mod options;
pub mod registry;
pub mod templates;
pub mod validate;

pub use builtins::builtin_props;
pub use component::{Component, ComponentRef};
pub use options::{
    AutoResize, ComponentOptions, ComponentValidator, ContainerTemplate, ContextAttributes,
    PrerenderTemplate, TemplateContext, UrlSource,
};
pub use registry::{ActiveInstance, ActiveInstances, ComponentRegistry};
pub use templates::{default_container_template, default_prerender_template};
pub use validate::validate_options;
