use regex::Regex;
use std::sync::LazyLock;

use transom_core::errors::DefinitionError;
use transom_core::types::CssSize;

use crate::options::{ComponentOptions, UrlSource};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Creation-time checks. Everything here fails synchronously out of
/// `create`, before any instance exists.
pub fn validate_options(options: &ComponentOptions) -> Result<(), DefinitionError> {
    if !TAG_RE.is_match(&options.tag) {
        return Err(DefinitionError::InvalidTag(options.tag.clone()));
    }

    if let UrlSource::Fixed(url) = &options.url {
        if url.is_empty() {
            return Err(DefinitionError::MissingUrl(options.tag.clone()));
        }
    }

    check_dimension(&options.dimensions.width)?;
    check_dimension(&options.dimensions.height)?;

    for (name, def) in options.props.iter() {
        if def.required && def.default.is_some() {
            return Err(DefinitionError::RequiredWithDefault(name.to_string()));
        }
        if let Some(alias) = &def.alias {
            if alias == name {
                return Err(DefinitionError::InvalidProp {
                    name: name.to_string(),
                    reason: "alias matches the prop's own name".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn check_dimension(size: &CssSize) -> Result<(), DefinitionError> {
    let value = match size {
        CssSize::Px(px) => *px,
        CssSize::Percent(pct) => *pct,
    };
    if !value.is_finite() || value < 0.0 {
        return Err(DefinitionError::InvalidDimension(size.to_string()));
    }
    Ok(())
}
