use futures_util::FutureExt;
use std::sync::Arc;

use transom_core::types::RenderContext;

use crate::options::{ContainerTemplate, PrerenderTemplate, TemplateContext};

/// Builds a sized container element under the render target.
pub fn default_container_template() -> ContainerTemplate {
    Arc::new(|ctx: TemplateContext| {
        async move {
            let container = ctx
                .page
                .create_element(&format!("{}-container", ctx.tag), Some(&ctx.target))
                .await?;
            container
                .set_css_size(Some(ctx.dimensions.width), Some(ctx.dimensions.height))
                .await;
            Ok(container)
        }
        .boxed()
    })
}

/// A minimal loading document, shown until the child takes over.
pub fn default_prerender_template() -> PrerenderTemplate {
    Arc::new(|tag: &str, context: RenderContext| {
        format!(
            "<!doctype html><html><body class=\"{tag}-prerender {tag}-prerender-{context}\">\
             <div class=\"spinner\"></div></body></html>"
        )
    })
}
