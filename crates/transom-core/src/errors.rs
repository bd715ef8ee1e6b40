use crate::types::RenderContext;

// Every error here is Clone: a single failure fans out to the render future,
// the init waiters, and the onError prop, and all of them see the same value.

#[derive(Debug, Clone, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid tag '{0}': expected lowercase letters, digits and dashes")]
    InvalidTag(String),

    #[error("component '{0}' declares no url")]
    MissingUrl(String),

    #[error("invalid dimension '{0}': expected a px or % value")]
    InvalidDimension(String),

    #[error("component tag '{0}' is already registered")]
    DuplicateTag(String),

    #[error("prop '{0}' is required and can not also declare a default")]
    RequiredWithDefault(String),

    #[error("invalid prop definition '{name}': {reason}")]
    InvalidProp { name: String, reason: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SecurityError {
    #[error("domain '{domain}' is not allowed for component '{tag}'")]
    DomainNotAllowed { tag: String, domain: String },

    #[error("parent domain '{domain}' is not allowed for component '{tag}'")]
    ParentDomainNotAllowed { tag: String, domain: String },

    #[error("can not render into a window under a different top-level window")]
    DifferentTopWindow,

    #[error("remote render target must be addressed by selector, not by element handle")]
    RemoteElementNotSelector,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PropError {
    #[error("prop '{0}' is required")]
    Required(String),

    #[error("prop '{name}': expected {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("prop '{name}' failed validation: {reason}")]
    Validation { name: String, reason: String },

    #[error("prop function '{0}' called after its instance was destroyed")]
    InstanceGone(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("can not open popup window: popup blocked or closed immediately")]
    PopupBlocked,

    #[error("component '{tag}' timed out after {ms}ms waiting for the child")]
    Timeout { tag: String, ms: u64 },

    #[error("component instance is already rendered")]
    AlreadyRendered,

    #[error("singleton component '{0}' can only be rendered once at a time")]
    SingletonViolation(String),

    #[error("container element '{0}' not found")]
    ContainerNotFound(String),

    #[error("container is required to render '{tag}' in {context} context")]
    ContainerRequired {
        tag: String,
        context: RenderContext,
    },

    #[error("operation '{op}' is not supported in {context} context")]
    UnsupportedOperation {
        op: String,
        context: RenderContext,
    },

    #[error("delegate window did not accept rendering: {0}")]
    DelegateUnavailable(String),

    #[error("child window closed during render")]
    WindowClosedDuringRender,

    #[error("render failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PayloadError {
    #[error("window name does not carry an initialization payload")]
    NotAPayload,

    #[error("payload base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload json decode failed: {0}")]
    Json(String),

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u32),
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("target window is closed")]
    WindowClosed,

    #[error("no listener registered for method '{0}'")]
    NoListener(String),

    #[error("a listener is already registered for method '{0}'")]
    ListenerExists(String),

    #[error("remote call '{method}' failed: {message}")]
    Remote { method: String, message: String },

    #[error("call '{0}' timed out")]
    Timeout(String),

    #[error("message serialization failed: {0}")]
    Json(String),
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChildError {
    #[error("window is already attached to a component instance")]
    AlreadyAttached,

    #[error("window name carries no payload: was this window opened by a component?")]
    NotAChildWindow,

    #[error("could not resolve parent window for component '{0}'")]
    ParentNotFound(String),

    #[error("can not read initial props across origins")]
    PropsAccessDenied,

    #[error("can not read initial props from a file protocol window")]
    PropsAccessFile,

    #[error("initial props entry '{0}' missing from parent scope")]
    PropsMissing(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransomError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Prop(#[from] PropError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Child(#[from] ChildError),

    #[error("{original}; and failed to handle that error: {secondary}")]
    ErrorHandling { original: String, secondary: String },

    #[error("{0}")]
    Other(String),
}

impl TransomError {
    /// Wraps a failure that happened while an earlier failure was being
    /// handled. Neither error is swallowed.
    pub fn double_fault(original: &TransomError, secondary: &TransomError) -> Self {
        Self::ErrorHandling {
            original: original.to_string(),
            secondary: secondary.to_string(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_error_display() {
        let err = DefinitionError::InvalidTag("My Component".into());
        assert_eq!(
            err.to_string(),
            "invalid tag 'My Component': expected lowercase letters, digits and dashes"
        );

        let err = DefinitionError::RequiredWithDefault("amount".into());
        assert_eq!(
            err.to_string(),
            "prop 'amount' is required and can not also declare a default"
        );
    }

    #[test]
    fn security_error_display() {
        let err = SecurityError::DomainNotAllowed {
            tag: "checkout".into(),
            domain: "https://evil.example.com".into(),
        };
        assert_eq!(
            err.to_string(),
            "domain 'https://evil.example.com' is not allowed for component 'checkout'"
        );
    }

    #[test]
    fn prop_error_display() {
        let err = PropError::TypeMismatch {
            name: "amount".into(),
            expected: "number".into(),
            found: "string".into(),
        };
        assert_eq!(err.to_string(), "prop 'amount': expected number, got string");
    }

    #[test]
    fn render_error_display() {
        let err = RenderError::Timeout {
            tag: "checkout".into(),
            ms: 5000,
        };
        assert_eq!(
            err.to_string(),
            "component 'checkout' timed out after 5000ms waiting for the child"
        );
    }

    #[test]
    fn umbrella_from_definition() {
        let err: TransomError = DefinitionError::MissingUrl("checkout".into()).into();
        assert!(matches!(err, TransomError::Definition(_)));
        assert!(err.to_string().contains("checkout"));
    }

    #[test]
    fn umbrella_from_render() {
        let err: TransomError = RenderError::PopupBlocked.into();
        assert!(matches!(err, TransomError::Render(_)));
    }

    #[test]
    fn umbrella_from_rpc() {
        let err: TransomError = RpcError::WindowClosed.into();
        assert!(matches!(err, TransomError::Rpc(_)));
        assert_eq!(err.to_string(), "target window is closed");
    }

    #[test]
    fn payload_error_from_json() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: PayloadError = bad.unwrap_err().into();
        assert!(matches!(err, PayloadError::Json(_)));
    }

    #[test]
    fn double_fault_keeps_both_messages() {
        let original: TransomError = RenderError::PopupBlocked.into();
        let secondary: TransomError = RpcError::WindowClosed.into();
        let wrapped = TransomError::double_fault(&original, &secondary);
        let message = wrapped.to_string();
        assert!(message.contains("popup blocked"));
        assert!(message.contains("target window is closed"));
    }

    #[test]
    fn errors_are_clone() {
        let err: TransomError = ChildError::AlreadyAttached.into();
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
